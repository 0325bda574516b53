//! Resident code region model.
//!
//! A [`CodeRegion`] abstracts the already-compiled instruction bytes of one callable:
//! where they live inside the arena's backing map, how large they are, whether they
//! may be overwritten, and which body executes when control reaches them. Detour
//! installation is an overwrite of a region's leading bytes; everything the patch
//! engine does to resident code goes through this model.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::runtime::address::CodeAddress;
use crate::runtime::arena::BodyFn;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Protection flags of a code region
    pub struct RegionFlags: u8 {
        /// Region bytes may be read
        const READ = 0x1;
        /// Region bytes may be overwritten
        const WRITE = 0x2;
        /// Region may be executed
        const EXEC = 0x4;
    }
}

impl RegionFlags {
    /// The protection freshly defined regions receive
    #[must_use]
    pub fn resident() -> Self {
        RegionFlags::READ | RegionFlags::WRITE | RegionFlags::EXEC
    }
}

/// The resident, already-compiled code of one callable.
///
/// Regions are immutable in placement (address, span, bound body); only their byte
/// contents (through the arena) and protection flags can change after definition.
pub struct CodeRegion {
    address: CodeAddress,
    offset: usize,
    len: usize,
    flags: AtomicU8,
    name: Arc<str>,
    body: BodyFn,
}

impl CodeRegion {
    /// Creates a region descriptor over `len` bytes at `offset` inside the arena map
    #[must_use]
    pub(crate) fn new(
        address: CodeAddress,
        offset: usize,
        len: usize,
        flags: RegionFlags,
        name: &str,
        body: BodyFn,
    ) -> Self {
        CodeRegion {
            address,
            offset,
            len,
            flags: AtomicU8::new(flags.bits()),
            name: Arc::from(name),
            body,
        }
    }

    /// Base address of the region
    #[must_use]
    pub fn address(&self) -> CodeAddress {
        self.address
    }

    /// Offset of the region's first byte inside the arena's backing map
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the region in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region spans zero bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Diagnostic name of the callable bound to this region
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current protection flags
    #[must_use]
    pub fn flags(&self) -> RegionFlags {
        RegionFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Replaces the protection flags
    pub fn set_flags(&self, flags: RegionFlags) {
        self.flags.store(flags.bits(), Ordering::Release);
    }

    /// Returns true if the region's bytes may be overwritten
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags().contains(RegionFlags::WRITE)
    }

    /// The executable body bound to this region
    pub(crate) fn body(&self) -> &BodyFn {
        &self.body
    }
}

impl std::fmt::Debug for CodeRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRegion")
            .field("address", &self.address)
            .field("len", &self.len)
            .field("flags", &self.flags())
            .field("name", &self.name)
            .finish()
    }
}
