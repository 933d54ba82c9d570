//! Replaceable backing allocator used to acquire page-sized regions.
//!
//! Four function slots (allocate / free / zeroed-allocate / reallocate)
//! defaulting to the Rust global allocator. The slots affect only
//! backing-page acquisition and release, never the user-visible pool or
//! arena `alloc`.
//!
//! Substitution is per-thread (the whole subsystem is single-threaded
//! cooperative) and needs the `std` feature; without it the system
//! allocator is always used.

use core::ptr;

use rust_alloc::alloc::Layout;

/// Minimum alignment of every backing region, and therefore of every pool
/// payload and page data region.
pub const BACKING_ALIGN: usize = 8;

pub type AllocFn = unsafe fn(size: usize) -> *mut u8;
pub type FreeFn = unsafe fn(ptr: *mut u8, size: usize);
pub type AllocZeroedFn = unsafe fn(size: usize) -> *mut u8;
pub type ReallocFn = unsafe fn(ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8;

/// The four-slot hook table.
#[derive(Clone, Copy)]
pub struct AllocHooks {
    pub alloc: AllocFn,
    pub free: FreeFn,
    pub alloc_zeroed: AllocZeroedFn,
    pub realloc: ReallocFn,
}

impl Default for AllocHooks {
    fn default() -> Self {
        Self {
            alloc: system_alloc,
            free: system_free,
            alloc_zeroed: system_alloc_zeroed,
            realloc: system_realloc,
        }
    }
}

fn backing_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), BACKING_ALIGN).ok()
}

unsafe fn system_alloc(size: usize) -> *mut u8 {
    let Some(layout) = backing_layout(size) else {
        return ptr::null_mut();
    };
    // SAFETY: layout has non-zero size
    unsafe { rust_alloc::alloc::alloc(layout) }
}

unsafe fn system_alloc_zeroed(size: usize) -> *mut u8 {
    let Some(layout) = backing_layout(size) else {
        return ptr::null_mut();
    };
    // SAFETY: layout has non-zero size
    unsafe { rust_alloc::alloc::alloc_zeroed(layout) }
}

unsafe fn system_free(ptr: *mut u8, size: usize) {
    if ptr.is_null() {
        return;
    }
    let Some(layout) = backing_layout(size) else {
        return;
    };
    // SAFETY: caller passes a pointer obtained from `system_alloc` with the
    // same size
    unsafe { rust_alloc::alloc::dealloc(ptr, layout) }
}

unsafe fn system_realloc(ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
    if ptr.is_null() {
        // SAFETY: plain allocation
        return unsafe { system_alloc(new_size) };
    }
    let Some(layout) = backing_layout(old_size) else {
        return ptr::null_mut();
    };
    // SAFETY: caller passes a pointer obtained from `system_alloc` with
    // `old_size`; new_size.max(1) keeps the size non-zero
    unsafe { rust_alloc::alloc::realloc(ptr, layout, new_size.max(1)) }
}

#[cfg(feature = "std")]
std::thread_local! {
    static HOOKS: core::cell::Cell<AllocHooks> = core::cell::Cell::new(AllocHooks::default());
}

/// Replace hook slots. `None` keeps the current value of that slot.
#[cfg(feature = "std")]
pub fn set_alloc_hooks(
    alloc: Option<AllocFn>,
    free: Option<FreeFn>,
    alloc_zeroed: Option<AllocZeroedFn>,
    realloc: Option<ReallocFn>,
) {
    HOOKS.with(|hooks| {
        let mut table = hooks.get();
        if let Some(f) = alloc {
            table.alloc = f;
        }
        if let Some(f) = free {
            table.free = f;
        }
        if let Some(f) = alloc_zeroed {
            table.alloc_zeroed = f;
        }
        if let Some(f) = realloc {
            table.realloc = f;
        }
        hooks.set(table);
    });
}

/// Restore every slot to the system allocator.
#[cfg(feature = "std")]
pub fn reset_alloc_hooks() {
    HOOKS.with(|hooks| hooks.set(AllocHooks::default()));
}

/// The hook table in effect for this thread.
pub fn current() -> AllocHooks {
    #[cfg(feature = "std")]
    {
        HOOKS.with(|hooks| hooks.get())
    }
    #[cfg(not(feature = "std"))]
    {
        AllocHooks::default()
    }
}

/// Acquire `size` bytes of backing memory through the current hooks.
pub(crate) fn acquire(size: usize, zero: bool) -> *mut u8 {
    let table = current();
    // SAFETY: hook contract: returns null or a region valid for `size`
    // bytes at `BACKING_ALIGN` alignment
    unsafe {
        if zero {
            (table.alloc_zeroed)(size)
        } else {
            (table.alloc)(size)
        }
    }
}

/// Release a region previously returned by [`acquire`].
///
/// # Safety
///
/// `ptr` must come from `acquire(size, _)` and not have been released.
pub(crate) unsafe fn release(ptr: *mut u8, size: usize) {
    let table = current();
    // SAFETY: forwarded caller contract
    unsafe { (table.free)(ptr, size) }
}

#[cfg(test)]
mod tests {
    use super::{AllocHooks, acquire, release};

    #[test]
    fn system_roundtrip() {
        let ptr = acquire(64, true);
        assert!(!ptr.is_null());
        // zeroed acquisition really zeroes
        // SAFETY: ptr is valid for 64 bytes
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        // SAFETY: ptr came from acquire(64, _)
        unsafe { release(ptr, 64) };
    }

    #[test]
    fn default_realloc_preserves_data() {
        let table = AllocHooks::default();
        // SAFETY: exercising the hook contract directly
        unsafe {
            let ptr = (table.alloc)(16);
            assert!(!ptr.is_null());
            for i in 0..16 {
                ptr.add(i).write(i as u8);
            }
            let grown = (table.realloc)(ptr, 16, 64);
            assert!(!grown.is_null());
            for i in 0..16 {
                assert_eq!(grown.add(i).read(), i as u8);
            }
            (table.free)(grown, 64);
        }
    }
}
