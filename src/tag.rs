//! Handle tags identifying scope-capable records.
//!
//! Every record that can participate in the scope API starts with a 4-byte
//! ASCII tag (trailing NUL). The [`Scope`](crate::scope::Scope) sum type is
//! what dispatch actually runs on; the tag bytes are kept as a defensive
//! invariant for raw byte-views of a record and are validated on every
//! scope operation.

use core::fmt;

/// Four tag bytes at offset zero of a `#[repr(C)]` scope-capable record.
///
/// Set at construction, immutable thereafter. Consumers of raw views depend
/// on these bytes being stable; treat them as a wire-format constant.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct HandleTag([u8; 4]);

impl HandleTag {
    pub const POOL: Self = Self(*b"POL\0");
    pub const ARENA: Self = Self(*b"ARN\0");
    pub const FRAME: Self = Self(*b"FRM\0");

    pub const fn as_bytes(self) -> [u8; 4] {
        self.0
    }

    /// Classify the tag, or `None` for corrupt/unknown bytes.
    pub fn kind(self) -> Option<ScopeKind> {
        match self {
            Self::POOL => Some(ScopeKind::Pool),
            Self::ARENA => Some(ScopeKind::Arena),
            Self::FRAME => Some(ScopeKind::Frame),
            _ => None,
        }
    }
}

impl fmt::Debug for HandleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print "ARN" rather than the raw byte array
        let text = core::str::from_utf8(&self.0[..3]).unwrap_or("???");
        write!(f, "HandleTag({text})")
    }
}

/// The kinds of record a [`HandleTag`] can name.
///
/// `Pool` exists so corrupt tags and pool records can be told apart, but a
/// pool is deliberately not a transfer scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Pool,
    Arena,
    Frame,
}

impl ScopeKind {
    pub const fn tag(self) -> HandleTag {
        match self {
            Self::Pool => HandleTag::POOL,
            Self::Arena => HandleTag::ARENA,
            Self::Frame => HandleTag::FRAME,
        }
    }
}
