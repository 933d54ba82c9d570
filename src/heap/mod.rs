//! The heap façade: a [`Pool`]-backed allocator front end, and the
//! process-wide default instance behind the free functions.
//!
//! [`Memory`] bundles the pool with an arena factory and the scope
//! operations, and keeps a live-allocation records map (address ->
//! requested size) so callers get an outstanding-allocation count and
//! debug builds catch double disposes.
//!
//! The default instance is thread-local (the subsystem is single-threaded
//! cooperative), constructed lazily on first use with
//! [`DEFAULT_HEAP_PAGES`] pages, and torn down explicitly via
//! [`teardown`] or implicitly at thread exit.

use core::ptr::NonNull;
use std::cell::RefCell;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::arena::{Arena, ArenaError};
use crate::pool::{Pool, PoolError};
use crate::scope::{Scope, ScopeError};

#[cfg(test)]
mod tests;

/// Pages backing the default instance: 16 x 4 KiB.
pub const DEFAULT_HEAP_PAGES: usize = 16;

type Records = HashMap<usize, usize, FxBuildHasher>;

/// Pool + arena factory + scope operations behind one handle.
pub struct Memory {
    pool: Pool,
    records: Records,
}

impl Memory {
    /// A façade over a fresh pool of [`DEFAULT_HEAP_PAGES`] pages.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_pages(DEFAULT_HEAP_PAGES)
    }

    pub fn with_pages(pages: usize) -> Result<Self, PoolError> {
        Ok(Self {
            pool: Pool::create(pages)?,
            records: Records::default(),
        })
    }

    // ------------------------------------------------------------------
    // Pool surface
    // ------------------------------------------------------------------

    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_impl(size, false)
    }

    pub fn alloc_zeroed(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_impl(size, true)
    }

    fn alloc_impl(&mut self, size: usize, zero: bool) -> Option<NonNull<u8>> {
        let ptr = self.pool.alloc(size, zero)?;
        self.records.insert(ptr.as_ptr() as usize, size);
        Some(ptr)
    }

    /// Return an allocation to the pool. Null is a no-op.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from this façade's `alloc` family
    /// and not have been disposed since.
    pub unsafe fn dispose(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if self.records.remove(&(ptr as usize)).is_none() {
            debug_assert!(false, "dispose of unknown pointer {ptr:p}");
        }
        // SAFETY: forwarded caller contract
        unsafe { self.pool.free(ptr) };
    }

    /// Resize an allocation, preserving `min(old request, new_size)` bytes.
    ///
    /// Null `ptr` degenerates to `alloc`; `new_size == 0` degenerates to
    /// `dispose` and returns `None`. The data always moves, in-place growth
    /// is not attempted, and on allocation failure the old block
    /// is left untouched.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be a live allocation of this façade.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            // SAFETY: ptr is a live allocation per the caller contract
            unsafe { self.dispose(ptr) };
            return None;
        }

        // SAFETY: ptr is a live allocation per the caller contract
        unsafe {
            let old_size = self.pool.request_size(ptr);
            let new = self.alloc_impl(new_size, false)?;
            core::ptr::copy_nonoverlapping(ptr, new.as_ptr(), old_size.min(new_size));
            self.dispose(ptr);
            Some(new)
        }
    }

    /// Number of allocations handed out and not yet disposed.
    pub fn outstanding_allocs(&self) -> usize {
        self.records.len()
    }

    pub fn used_bytes(&self) -> usize {
        self.pool.used_bytes()
    }

    pub fn total_bytes(&self) -> usize {
        self.pool.total_bytes()
    }

    // ------------------------------------------------------------------
    // Arena factory and scope operations
    // ------------------------------------------------------------------

    /// A fresh arena. Its pages come from the same hook table as the
    /// pool's; its lifetime is independent of the façade.
    pub fn create_arena(&self) -> Result<Arena, ArenaError> {
        Arena::create()
    }

    /// See [`crate::scope::transfer`].
    pub fn transfer(
        &self,
        from: Scope<'_>,
        to: Scope<'_>,
        obj: NonNull<u8>,
    ) -> Result<(), ScopeError> {
        crate::scope::transfer(from, to, obj)
    }

    /// See [`crate::scope::import`].
    pub fn import(&self, scope: Scope<'_>, data: &[u8]) -> Result<NonNull<u8>, ScopeError> {
        crate::scope::import(scope, data)
    }

    /// See [`crate::scope::export`].
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads of `size` bytes.
    pub unsafe fn export(
        &self,
        scope: Scope<'_>,
        data: NonNull<u8>,
        size: usize,
    ) -> Result<rust_alloc::boxed::Box<[u8]>, ScopeError> {
        // SAFETY: forwarded caller contract
        unsafe { crate::scope::export(scope, data, size) }
    }
}

impl core::fmt::Debug for Memory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Memory")
            .field("pool", &self.pool)
            .field("outstanding", &self.records.len())
            .finish()
    }
}

// ----------------------------------------------------------------------
// Process-wide default instance
// ----------------------------------------------------------------------

std::thread_local! {
    static DEFAULT: RefCell<Option<Memory>> = const { RefCell::new(None) };
}

fn with_default<R>(f: impl FnOnce(&mut Memory) -> R) -> Option<R> {
    DEFAULT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Memory::new().ok();
        }
        slot.as_mut().map(f)
    })
}

/// Allocate from the default instance, constructing it on first use.
pub fn alloc(size: usize) -> Option<NonNull<u8>> {
    with_default(|memory| memory.alloc(size)).flatten()
}

pub fn alloc_zeroed(size: usize) -> Option<NonNull<u8>> {
    with_default(|memory| memory.alloc_zeroed(size)).flatten()
}

/// Dispose through the default instance. Null is a no-op.
///
/// # Safety
///
/// See [`Memory::dispose`].
pub unsafe fn dispose(ptr: *mut u8) {
    // SAFETY: forwarded caller contract
    with_default(|memory| unsafe { memory.dispose(ptr) });
}

/// Realloc through the default instance.
///
/// # Safety
///
/// See [`Memory::realloc`].
pub unsafe fn realloc(ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
    // SAFETY: forwarded caller contract
    with_default(|memory| unsafe { memory.realloc(ptr, new_size) }).flatten()
}

/// Drop the default instance. Optional; after teardown the next façade
/// call constructs a fresh instance.
pub fn teardown() {
    DEFAULT.with(|cell| *cell.borrow_mut() = None);
}

/// Whether the default instance currently exists.
pub fn is_initialized() -> bool {
    DEFAULT.with(|cell| cell.borrow().is_some())
}
