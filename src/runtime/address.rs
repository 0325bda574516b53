//! Addresses in the modeled code address space.

use std::fmt;

/// A handle to a location inside the code arena's virtual address space.
///
/// Every materialized callable (a prepared function, a preserved original, a generated
/// dispatcher) lives at exactly one `CodeAddress`. The address is the base of the
/// callable's resident code region; control transfers encoded into entry bytes carry
/// these values as their jump destinations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeAddress(pub u64);

impl CodeAddress {
    /// Creates a new address from a raw 64-bit value
    #[must_use]
    pub fn new(value: u64) -> Self {
        CodeAddress(value)
    }

    /// Returns the raw address value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the null address (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns the address advanced by `bytes`
    #[must_use]
    pub fn offset(&self, bytes: u64) -> Self {
        CodeAddress(self.0.wrapping_add(bytes))
    }
}

impl From<u64> for CodeAddress {
    fn from(value: u64) -> Self {
        CodeAddress(value)
    }
}

impl From<CodeAddress> for u64 {
    fn from(address: CodeAddress) -> Self {
        address.0
    }
}

impl fmt::Debug for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeAddress(0x{:08x})", self.0)
    }
}

impl fmt::Display for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
