//! `Scope`: the uniform view over "arena or frame", and the protocol for
//! moving ownership of a live object between scopes.
//!
//! A transfer only moves the tracking record; the object's bytes stay
//! where they are. Pools deliberately cannot be named as a transfer scope
//! (mixing free-list blocks into bump-page tracking has no model here),
//! so the sum type simply has no pool variant, and the tag bytes of the
//! records passed in are still checked defensively.

use rust_alloc::boxed::Box;

use core::ptr::NonNull;

use crate::arena::{Arena, Frame};
use crate::tag::ScopeKind;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// Corrupt tag bytes, or a frame that has already ended.
    InvalidScope,
    /// The source scope does not own the object.
    NotTracked,
    /// The scope could not allocate or record the object.
    OutOfMemory,
}

/// Anything ownership can be moved between: an arena, or a frame within
/// one.
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    Arena(&'a Arena),
    Frame(&'a Frame<'a>),
}

impl<'a> Scope<'a> {
    /// The arena tracking records are kept in: the arena itself, or the
    /// frame's owning arena.
    pub fn arena(&self) -> &'a Arena {
        match self {
            Self::Arena(arena) => arena,
            Self::Frame(frame) => frame.arena(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Arena(_) => ScopeKind::Arena,
            Self::Frame(_) => ScopeKind::Frame,
        }
    }

    /// Defensive validation: the record's tag bytes must classify to this
    /// variant's kind, and a frame must still be open.
    pub fn validate(&self) -> Result<(), ScopeError> {
        let tag = match self {
            Self::Arena(arena) => arena.tag(),
            Self::Frame(frame) => frame.tag(),
        };
        if tag.kind() != Some(self.kind()) {
            return Err(ScopeError::InvalidScope);
        }
        if let Self::Frame(frame) = self
            && !frame.is_valid()
        {
            return Err(ScopeError::InvalidScope);
        }
        Ok(())
    }

    pub fn is_tracking(&self, ptr: *const u8) -> bool {
        self.arena().is_tracking(ptr)
    }

    /// Allocate `size` bytes in this scope.
    pub fn alloc(&self, size: usize, zero: bool) -> Option<NonNull<u8>> {
        self.arena().alloc(size, zero)
    }
}

impl<'a> From<&'a Arena> for Scope<'a> {
    fn from(arena: &'a Arena) -> Self {
        Self::Arena(arena)
    }
}

impl<'a> From<&'a Frame<'a>> for Scope<'a> {
    fn from(frame: &'a Frame<'a>) -> Self {
        Self::Frame(frame)
    }
}

impl core::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Arena(_) => f.write_str("Scope::Arena"),
            Self::Frame(frame) => write!(f, "Scope::Frame({:?})", frame),
        }
    }
}

/// Move ownership of `obj` from one scope to another.
///
/// On success the destination tracks `obj` and the source no longer does;
/// the bytes at `obj` are untouched. On any failure nothing changes: an
/// object the source does not track is refused, and a destination-side
/// failure re-tracks the object in the source.
pub fn transfer(from: Scope<'_>, to: Scope<'_>, obj: NonNull<u8>) -> Result<(), ScopeError> {
    from.validate()?;
    to.validate()?;

    let source = from.arena();
    if !source.untrack(obj.as_ptr()) {
        return Err(ScopeError::NotTracked);
    }

    if !to.arena().track(obj) {
        // destination refused the record: put it back where it was
        source.track(obj);
        return Err(ScopeError::OutOfMemory);
    }
    Ok(())
}

/// Copy `data` into freshly allocated bytes of `scope`.
pub fn import(scope: Scope<'_>, data: &[u8]) -> Result<NonNull<u8>, ScopeError> {
    scope.validate()?;
    let dst = scope
        .alloc(data.len(), false)
        .ok_or(ScopeError::OutOfMemory)?;
    // SAFETY: dst is a fresh allocation of data.len() bytes, disjoint
    // from data
    unsafe {
        core::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr(), data.len());
    }
    Ok(dst)
}

/// Copy `size` bytes at `data` out of `scope` into a caller-owned buffer
/// on the system heap.
///
/// # Safety
///
/// `data` must be valid for reads of `size` bytes.
pub unsafe fn export(
    scope: Scope<'_>,
    data: NonNull<u8>,
    size: usize,
) -> Result<Box<[u8]>, ScopeError> {
    scope.validate()?;
    // SAFETY: caller guarantees data is readable for size bytes
    let bytes = unsafe { core::slice::from_raw_parts(data.as_ptr(), size) };
    Ok(Box::from(bytes))
}
