use std::fmt;

use bytemuck::{Pod, Zeroable};

/// A host-side object identifier exchanged in place of a native pointer.
/// Opaque to the guest -- the daemon assigns these.
///
/// Zero is reserved as invalid/unset and is never issued. Handles are only
/// meaningful within one daemon process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Handle(pub u64);

impl Handle {
    /// The reserved invalid handle.
    pub const NULL: Handle = Handle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
