//! Hierarchical memory management: a free-list pool, bump-allocated arenas
//! with nested frames, and scope ownership tracking, all built on the same
//! slot-array tracking primitive.
//!
//! The `std` feature (on by default) adds the process-wide heap façade and
//! the replaceable backing-allocator hooks.

#![no_std]

extern crate alloc as rust_alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod arena;
pub mod hooks;
pub mod page;
pub mod pool;
pub mod scope;
pub mod slots;
pub mod tag;

#[cfg(feature = "std")]
pub mod heap;

#[cfg(feature = "allocator_api")]
pub mod allocator;

pub use arena::{Arena, ArenaError, ArenaRef, Frame};
pub use page::{PAGE_SIZE, Page, PageError};
pub use pool::{Pool, PoolError};
pub use scope::{Scope, ScopeError};
pub use slots::{SlotArray, SlotError};
pub use tag::{HandleTag, ScopeKind};

#[cfg(feature = "std")]
pub use heap::Memory;
