//! `Pool`: a first-fit free-list allocator over fixed-size pages.
//!
//! The free list is doubly linked through the block headers and kept
//! sorted by address at all times, so coalescing after a free only has to
//! look at the two list neighbours. Adjacent free blocks in the same page
//! are merged eagerly; a block that grows back into a whole page is
//! returned to the backing allocator once the pool holds more than its
//! configured minimum of pages.

use rust_alloc::vec::Vec;

use core::ptr::NonNull;

use crate::page::{PAGE_SIZE, Page, PageError};
use crate::tag::HandleTag;

mod block;

pub(crate) use block::{HEADER_SIZE, header_of};
use block::{BlockHeader, block_total, payload_of};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The backing allocator could not provide a page.
    OutOfMemory,
}

impl From<PageError> for PoolError {
    fn from(_: PageError) -> Self {
        Self::OutOfMemory
    }
}

/// A free-list allocator supporting arbitrary alloc/free order.
#[repr(C)]
pub struct Pool {
    tag: HandleTag,
    pages: Vec<Page>,
    free_head: *mut BlockHeader,
    total_bytes: usize,
    used_bytes: usize,
    min_pages: usize,
}

impl Pool {
    /// A pool backed by `initial_pages` pages (at least one). The page
    /// count is also the floor below which whole-page free blocks are kept
    /// rather than released.
    pub fn create(initial_pages: usize) -> Result<Self, PoolError> {
        let initial_pages = initial_pages.max(1);
        let mut pool = Self {
            tag: HandleTag::POOL,
            pages: Vec::with_capacity(initial_pages),
            free_head: core::ptr::null_mut(),
            total_bytes: 0,
            used_bytes: 0,
            min_pages: initial_pages,
        };
        for _ in 0..initial_pages {
            pool.grow()?;
        }
        Ok(pool)
    }

    pub fn with_min_pages(mut self, min_pages: usize) -> Self {
        self.min_pages = min_pages.max(1);
        self
    }

    pub fn tag(&self) -> HandleTag {
        self.tag
    }

    /// Sum of page capacities currently backing the pool.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Sum of live block payloads.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether `ptr` lies inside one of this pool's pages.
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.pages.iter().any(|page| page.contains(ptr))
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocate `size` payload bytes, 8-aligned, optionally zeroed.
    ///
    /// Returns `None` for a zero-size request, on size arithmetic
    /// overflow, for requests no single page can hold, and when the
    /// backing allocator refuses a new page.
    pub fn alloc(&mut self, size: usize, zero: bool) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let total = block_total(size)?;
        if total > PAGE_SIZE {
            // blocks never cross a page boundary
            return None;
        }

        let block = loop {
            if let Some(block) = self.find_fit(total) {
                break block;
            }
            self.grow().ok()?;
        };

        // SAFETY: find_fit returns a live header on the free list
        unsafe {
            if (*block).size - total >= HEADER_SIZE {
                self.split(block, total);
            } else {
                self.unlink(block);
            }
            (*block).detach();
            (*block).alloc_size = size;
            self.used_bytes += (*block).payload_len();

            let payload = payload_of(block);
            if zero {
                core::ptr::write_bytes(payload, 0, (*block).payload_len());
            }
            Some(NonNull::new_unchecked(payload))
        }
    }

    /// Return `ptr` to the free list, coalescing with its neighbours.
    ///
    /// Null is a no-op.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have been returned by this pool's [`alloc`]
    /// and not freed since.
    ///
    /// [`alloc`]: Self::alloc
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(self.owns(ptr), "free of a pointer from another pool");

        // SAFETY: per the caller contract, a header precedes the payload
        unsafe {
            let block = header_of(ptr);
            self.used_bytes -= (*block).payload_len();
            // scrub the payload so stale data never leaks into a later
            // allocation
            core::ptr::write_bytes(ptr, 0, (*block).payload_len());
            (*block).alloc_size = 0;

            self.insert_free(block);
            let merged = self.coalesce(block);
            self.maybe_release_page(merged);
        }
    }

    /// The payload size originally requested for `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation from this pool.
    pub(crate) unsafe fn request_size(&self, ptr: *mut u8) -> usize {
        // SAFETY: caller contract
        unsafe { (*header_of(ptr)).alloc_size }
    }

    // ------------------------------------------------------------------
    // Free list maintenance
    // ------------------------------------------------------------------

    /// First free block with `size >= total`, in address order.
    fn find_fit(&self, total: usize) -> Option<*mut BlockHeader> {
        let mut cur = self.free_head;
        while !cur.is_null() {
            // SAFETY: free-list nodes are live headers
            unsafe {
                if (*cur).size >= total {
                    return Some(cur);
                }
                cur = (*cur).next_free;
            }
        }
        None
    }

    /// Chain a fresh page and hand its whole data region to the free list.
    fn grow(&mut self) -> Result<(), PoolError> {
        let page = Page::create(PAGE_SIZE)?;
        let block = page.data().as_ptr().cast::<BlockHeader>();
        // SAFETY: the page region is at least HEADER_SIZE bytes and
        // 8-aligned, so a header fits at its base
        unsafe {
            block.write(BlockHeader {
                size: page.capacity(),
                next_free: core::ptr::null_mut(),
                prev_free: core::ptr::null_mut(),
                owner: page.data().as_ptr(),
                alloc_size: 0,
            });
            self.insert_free(block);
        }
        self.total_bytes += page.capacity();
        self.pages.push(page);
        Ok(())
    }

    /// Splice `block` into the free list keeping address order.
    ///
    /// # Safety
    ///
    /// `block` must be a live header not currently on the list.
    unsafe fn insert_free(&mut self, block: *mut BlockHeader) {
        let mut prev: *mut BlockHeader = core::ptr::null_mut();
        let mut cur = self.free_head;
        while !cur.is_null() && cur < block {
            prev = cur;
            // SAFETY: free-list nodes are live headers
            cur = unsafe { (*cur).next_free };
        }

        // SAFETY: prev/cur are the list neighbours for block's address
        unsafe {
            (*block).prev_free = prev;
            (*block).next_free = cur;
            if prev.is_null() {
                self.free_head = block;
            } else {
                (*prev).next_free = block;
            }
            if !cur.is_null() {
                (*cur).prev_free = block;
            }
        }
    }

    /// Remove `block` from the free list.
    ///
    /// # Safety
    ///
    /// `block` must currently be on the list.
    unsafe fn unlink(&mut self, block: *mut BlockHeader) {
        // SAFETY: the links of a listed block point at listed blocks
        unsafe {
            let prev = (*block).prev_free;
            let next = (*block).next_free;
            if prev.is_null() {
                self.free_head = next;
            } else {
                (*prev).next_free = next;
            }
            if !next.is_null() {
                (*next).prev_free = prev;
            }
            (*block).detach();
        }
    }

    /// Shrink `block` to `total` bytes and put the remainder on the free
    /// list in `block`'s position.
    ///
    /// # Safety
    ///
    /// `block` must be on the free list with `size - total >= HEADER_SIZE`.
    unsafe fn split(&mut self, block: *mut BlockHeader, total: usize) {
        // SAFETY: the remainder region lies inside block's page, so a
        // header fits at its base; list links are rewired to keep address
        // order
        unsafe {
            let remainder = block.cast::<u8>().add(total).cast::<BlockHeader>();
            remainder.write(BlockHeader {
                size: (*block).size - total,
                next_free: (*block).next_free,
                prev_free: (*block).prev_free,
                owner: (*block).owner,
                alloc_size: 0,
            });
            (*block).size = total;

            let prev = (*remainder).prev_free;
            let next = (*remainder).next_free;
            if prev.is_null() {
                self.free_head = remainder;
            } else {
                (*prev).next_free = remainder;
            }
            if !next.is_null() {
                (*next).prev_free = remainder;
            }
        }
    }

    /// Merge `block` with contiguous same-page neighbours. Blocks never
    /// merge across pages. Returns the surviving block.
    ///
    /// # Safety
    ///
    /// `block` must be on the free list.
    unsafe fn coalesce(&mut self, mut block: *mut BlockHeader) -> *mut BlockHeader {
        // SAFETY: address order makes the list neighbours the only
        // possible contiguous blocks
        unsafe {
            let next = (*block).next_free;
            if !next.is_null()
                && block.cast::<u8>().add((*block).size) == next.cast::<u8>()
                && (*block).owner == (*next).owner
            {
                (*block).size += (*next).size;
                self.unlink(next);
            }

            let prev = (*block).prev_free;
            if !prev.is_null()
                && prev.cast::<u8>().add((*prev).size) == block.cast::<u8>()
                && (*prev).owner == (*block).owner
            {
                (*prev).size += (*block).size;
                self.unlink(block);
                block = prev;
            }
        }
        block
    }

    /// Release `block`'s page to the backing allocator if the block grew
    /// back into the whole page and the pool is above its page floor.
    ///
    /// # Safety
    ///
    /// `block` must be on the free list.
    unsafe fn maybe_release_page(&mut self, block: *mut BlockHeader) {
        if self.pages.len() <= self.min_pages {
            return;
        }
        // SAFETY: block is a live header
        let covers_page = unsafe {
            block.cast::<u8>().cast_const() == (*block).owner && (*block).size == PAGE_SIZE
        };
        if !covers_page {
            return;
        }

        // SAFETY: a whole-page block has no live allocations in its page
        unsafe {
            let owner = (*block).owner;
            self.unlink(block);
            if let Some(idx) = self.pages.iter().position(|p| p.data().as_ptr().cast_const() == owner) {
                let page = self.pages.remove(idx);
                self.total_bytes -= page.capacity();
            }
        }
    }
}

// Disposal is Drop: the pages release their regions through the hook
// table, and the free list lives inside them.

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("tag", &self.tag)
            .field("pages", &self.pages.len())
            .field("total_bytes", &self.total_bytes)
            .field("used_bytes", &self.used_bytes)
            .finish()
    }
}
