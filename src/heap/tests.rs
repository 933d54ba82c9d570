use core::sync::atomic::{AtomicUsize, Ordering};

use super::{DEFAULT_HEAP_PAGES, Memory};
use crate::hooks::{AllocHooks, reset_alloc_hooks, set_alloc_hooks};
use crate::page::PAGE_SIZE;

#[test]
fn facade_starts_with_sixteen_pages() {
    let memory = Memory::new().unwrap();
    assert_eq!(memory.total_bytes(), DEFAULT_HEAP_PAGES * PAGE_SIZE);
    assert_eq!(memory.used_bytes(), 0);
    assert_eq!(memory.outstanding_allocs(), 0);
}

#[test]
fn alloc_and_dispose_are_bookkept() {
    let mut memory = Memory::with_pages(1).unwrap();
    let a = memory.alloc(100).unwrap();
    let b = memory.alloc_zeroed(50).unwrap();
    assert_eq!(memory.outstanding_allocs(), 2);

    // SAFETY: b is valid for 50 bytes
    let bytes = unsafe { core::slice::from_raw_parts(b.as_ptr(), 50) };
    assert!(bytes.iter().all(|&x| x == 0));

    // SAFETY: a and b are live allocations of this façade
    unsafe {
        memory.dispose(a.as_ptr());
        memory.dispose(b.as_ptr());
    }
    assert_eq!(memory.outstanding_allocs(), 0);
    assert_eq!(memory.used_bytes(), 0);

    // SAFETY: null is documented as a no-op
    unsafe { memory.dispose(core::ptr::null_mut()) };
}

#[test]
fn realloc_null_allocates() {
    let mut memory = Memory::with_pages(1).unwrap();
    // SAFETY: null realloc degenerates to alloc
    let p = unsafe { memory.realloc(core::ptr::null_mut(), 32) }.unwrap();
    assert_eq!(memory.outstanding_allocs(), 1);
    // SAFETY: p is live
    unsafe { memory.dispose(p.as_ptr()) };
}

#[test]
fn realloc_zero_disposes() {
    let mut memory = Memory::with_pages(1).unwrap();
    let p = memory.alloc(32).unwrap();
    // SAFETY: p is live
    let out = unsafe { memory.realloc(p.as_ptr(), 0) };
    assert!(out.is_none());
    assert_eq!(memory.outstanding_allocs(), 0);
}

#[test]
fn realloc_preserves_data_across_the_move() {
    let mut memory = Memory::with_pages(1).unwrap();
    let p = memory.alloc(16).unwrap();
    for i in 0..16u8 {
        // SAFETY: p is valid for 16 bytes
        unsafe { p.as_ptr().add(i as usize).write(i) };
    }

    // SAFETY: p is live
    let grown = unsafe { memory.realloc(p.as_ptr(), 64) }.unwrap();
    // SAFETY: grown is valid for 64 bytes, first 16 copied
    for i in 0..16u8 {
        assert_eq!(unsafe { grown.as_ptr().add(i as usize).read() }, i);
    }
    assert_eq!(memory.outstanding_allocs(), 1);

    // shrink keeps the prefix
    // SAFETY: grown is live
    let shrunk = unsafe { memory.realloc(grown.as_ptr(), 8) }.unwrap();
    for i in 0..8u8 {
        assert_eq!(unsafe { shrunk.as_ptr().add(i as usize).read() }, i);
    }
}

#[test]
fn arena_factory_and_scope_ops_are_wired() {
    let memory = Memory::with_pages(1).unwrap();
    let a1 = memory.create_arena().unwrap();
    let a2 = memory.create_arena().unwrap();

    let p = memory.import((&a1).into(), &[9, 8, 7]).unwrap();
    memory.transfer((&a1).into(), (&a2).into(), p).unwrap();
    assert!(a2.is_tracking(p.as_ptr()));

    // SAFETY: p is valid for 3 bytes
    let out = unsafe { memory.export((&a2).into(), p, 3) }.unwrap();
    assert_eq!(&*out, &[9, 8, 7]);
}

#[test]
fn default_instance_is_lazy_and_tears_down() {
    super::teardown();
    assert!(!super::is_initialized());

    let p = super::alloc(64).unwrap();
    assert!(super::is_initialized());

    // SAFETY: p came from the default instance
    let q = unsafe { super::realloc(p.as_ptr(), 128) }.unwrap();
    // SAFETY: q is live
    unsafe { super::dispose(q.as_ptr()) };

    super::teardown();
    assert!(!super::is_initialized());
    // teardown is idempotent and the façade comes back on demand
    super::teardown();
    assert!(super::alloc_zeroed(16).is_some());
    super::teardown();
}

static HOOK_PAGES: AtomicUsize = AtomicUsize::new(0);

unsafe fn counting_alloc(size: usize) -> *mut u8 {
    HOOK_PAGES.fetch_add(1, Ordering::Relaxed);
    // SAFETY: delegate to the system slot with the same contract
    unsafe { (AllocHooks::default().alloc)(size) }
}

#[test]
fn hooks_see_page_acquisition_only() {
    set_alloc_hooks(Some(counting_alloc), None, None, None);
    let before = HOOK_PAGES.load(Ordering::Relaxed);

    let mut memory = Memory::with_pages(2).unwrap();
    assert_eq!(HOOK_PAGES.load(Ordering::Relaxed), before + 2);

    // user-visible allocs stay inside the already-acquired pages
    let p = memory.alloc(100).unwrap();
    assert_eq!(HOOK_PAGES.load(Ordering::Relaxed), before + 2);

    // SAFETY: p is live
    unsafe { memory.dispose(p.as_ptr()) };
    drop(memory);
    reset_alloc_hooks();
}
