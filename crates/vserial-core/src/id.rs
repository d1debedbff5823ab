//! Descriptor identifier type

use core::fmt;

/// Identifier of a descriptor known to a registry
///
/// Wraps the raw OS descriptor number. Negative values are never handed out
/// by the OS; `-1` is reserved as the sentinel for "peer has been closed".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DescriptorId(i32);

impl DescriptorId {
    /// Sentinel stored as a peer link once the peer has closed
    pub const CLOSED: DescriptorId = DescriptorId(-1);

    /// Create a new DescriptorId from a raw descriptor number
    #[inline]
    pub const fn new(raw: i32) -> Self {
        DescriptorId(raw)
    }

    /// Get the raw descriptor number
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Index into a registry table, `None` for the sentinel
    #[inline]
    pub const fn index(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }

    #[inline]
    pub const fn is_closed(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_open(self) -> bool {
        self.0 >= 0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<DescriptorId> {
        if self.is_closed() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<i32> for DescriptorId {
    #[inline]
    fn from(raw: i32) -> Self {
        DescriptorId(raw)
    }
}

impl From<DescriptorId> for i32 {
    #[inline]
    fn from(id: DescriptorId) -> Self {
        id.0
    }
}

impl fmt::Debug for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            write!(f, "DescriptorId(CLOSED)")
        } else {
            write!(f, "DescriptorId({})", self.0)
        }
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            write!(f, "closed")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
