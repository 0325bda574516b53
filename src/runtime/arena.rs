//! Code arena: the in-process code generation facility and invoker.
//!
//! The arena owns an anonymous memory mapping that stands in for a process's resident
//! code. Defining a callable allocates a [`CodeRegion`] inside the mapping, writes a
//! width-appropriate prologue into its entry bytes, and binds a [`BodyFn`] that executes
//! when control reaches the region. Calls are dispatched by address: the invoker reads
//! the entry bytes, follows any unconditional control transfer found there (this is how
//! installed detours take effect), and runs the body of the region it lands on.
//!
//! # Key Components
//!
//! - [`CodeBackend`] - the capability trait the patch engine consumes
//! - [`CodeArena`] - the bundled backend implementation
//! - [`ArenaConfig`] - pointer width, region sizing, capacity and hop limits
//! - [`BodyFn`] - the callable shape bound to every region
//!
//! # Thread Safety
//!
//! Region placement is append-only (`SkipMap` keyed by base address, atomic cursor);
//! byte contents are guarded by an `RwLock` around the backing map. Calls take the
//! read path only, so concurrent invocations do not contend with each other.
//!
//! # Examples
//!
//! ```rust
//! use repatch::runtime::arena::{BodyFn, CodeArena, CodeBackend};
//! use repatch::runtime::value::Value;
//! use std::sync::Arc;
//!
//! let arena = CodeArena::new()?;
//! let body: BodyFn = Arc::new(|_, args| Ok(Value::I32(args[0].as_i32()? * 2)));
//! let address = arena.define("double", body)?;
//! assert_eq!(arena.call(address, &[Value::I32(21)])?, Value::I32(42));
//! # Ok::<(), repatch::Error>(())
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam_skiplist::SkipMap;
use memmap2::MmapMut;

use crate::patch::detour::decode_transfer;
use crate::runtime::address::CodeAddress;
use crate::runtime::region::{CodeRegion, RegionFlags};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// The base address regions are allocated from, kept away from zero so the null
/// address never names a region.
pub const ARENA_BASE: u64 = 0x0001_0000;

/// Pointer width of the modeled address space; selects the control-transfer encoding
/// detours use.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum PointerWidth {
    /// Narrow, 4-byte pointers; near relative jumps
    #[strum(serialize = "32-bit")]
    U32,
    /// Wide, 8-byte pointers; absolute far jumps
    #[strum(serialize = "64-bit")]
    U64,
}

impl PointerWidth {
    /// Size of a pointer in bytes
    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            PointerWidth::U32 => 4,
            PointerWidth::U64 => 8,
        }
    }
}

/// The callable shape bound to every arena region.
///
/// Bodies receive the backend so generated callables (dispatchers in particular) can
/// call other resident addresses, and a mutable frame holding the receiver (if any)
/// followed by the parameters. Whether writes to the frame outlive the call depends
/// on the entry point: [`CodeBackend::call_frame`] shares the caller's slots,
/// [`CodeBackend::call`] copies them.
pub type BodyFn =
    Arc<dyn Fn(&dyn CodeBackend, &mut [Value]) -> Result<Value> + Send + Sync>;

/// Configuration of a [`CodeArena`].
#[derive(Clone, Copy, Debug)]
pub struct ArenaConfig {
    /// Pointer width of the modeled address space
    pub pointer_width: PointerWidth,
    /// Bytes reserved for each region's entry area; must hold the prologue and any
    /// jump pattern a detour may write
    pub entry_size: usize,
    /// Total bytes of backing memory available for regions
    pub capacity: usize,
    /// Maximum number of control transfers followed per call before giving up
    pub max_hops: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            pointer_width: PointerWidth::U64,
            entry_size: 16,
            capacity: 1 << 20,
            max_hops: 16,
        }
    }
}

/// The capability contract for defining, duplicating, patching and calling resident
/// callables.
///
/// The patch engine never talks to a concrete backend type: the original preserver,
/// dispatcher builder and detour installer all operate through this trait, so any
/// backend able to host callables and expose overwritable entry bytes can carry the
/// engine. [`CodeArena`] is the bundled implementation.
pub trait CodeBackend: Send + Sync {
    /// Pointer width of the backend's address space
    fn pointer_width(&self) -> PointerWidth;

    /// Defines a new callable: allocates a resident region, writes its prologue and
    /// binds `body` to it.
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the backing memory is exhausted, or
    /// [`Error::LockError`] if the backing map lock is poisoned.
    fn define(&self, name: &str, body: BodyFn) -> Result<CodeAddress>;

    /// Clones the region at `at` (current entry bytes and bound body) into a new,
    /// standalone region.
    ///
    /// # Errors
    /// Returns [`Error::CloneFailure`] if no region is resident at `at`.
    fn duplicate(&self, at: CodeAddress, name: &str) -> Result<CodeAddress>;

    /// Size in bytes of the region at `at`
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if no region is resident at `at`.
    fn region_size(&self, at: CodeAddress) -> Result<usize>;

    /// Reads the entry bytes of the region at `at`
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if no region is resident at `at`, or
    /// [`Error::LockError`] if the backing map lock is poisoned.
    fn entry_bytes(&self, at: CodeAddress) -> Result<Vec<u8>>;

    /// Overwrites the leading entry bytes of the region at `at`.
    ///
    /// # Errors
    /// Returns [`Error::DetourInstall`] if the region is missing, not writable, or
    /// smaller than `bytes`.
    fn patch_entry(&self, at: CodeAddress, bytes: &[u8]) -> Result<()>;

    /// Replaces the protection flags of the region at `at`
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if no region is resident at `at`.
    fn protect(&self, at: CodeAddress, flags: RegionFlags) -> Result<()>;

    /// Calls the callable resident at `at`, executing its body directly over the
    /// caller's `args` slots. Parameter writes the body makes persist in those
    /// slots; this is the entry point for callers whose slots are shared
    /// by-reference storage.
    ///
    /// Control transfers installed in entry bytes are followed first, so a patched
    /// address executes whatever its detour points at.
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] for unknown addresses, non-executable regions
    /// and transfer chains longer than the configured hop limit, or whatever error
    /// the executed body produces.
    fn call_frame(&self, at: CodeAddress, args: &mut [Value]) -> Result<Value>;

    /// Calls the callable resident at `at` with `args` passed by value.
    ///
    /// The body runs over a private copy of `args`, so parameter writes stay
    /// inside the call. This is the outward-facing call shape.
    ///
    /// # Errors
    /// Same failure modes as [`CodeBackend::call_frame`].
    fn call(&self, at: CodeAddress, args: &[Value]) -> Result<Value> {
        let mut frame = args.to_vec();
        self.call_frame(at, &mut frame)
    }
}

/// The bundled [`CodeBackend`]: an anonymous-mapping-backed model of resident code.
pub struct CodeArena {
    config: ArenaConfig,
    map: RwLock<MmapMut>,
    regions: SkipMap<u64, Arc<CodeRegion>>,
    cursor: AtomicUsize,
}

impl CodeArena {
    /// Creates an arena with the default configuration
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the anonymous backing map cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_config(ArenaConfig::default())
    }

    /// Creates an arena with an explicit configuration
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the anonymous backing map cannot be created.
    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        let map = MmapMut::map_anon(config.capacity)?;
        Ok(CodeArena {
            config,
            map: RwLock::new(map),
            regions: SkipMap::new(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// The arena's configuration
    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Number of regions currently resident
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Looks up the region based at `at`
    #[must_use]
    pub fn region(&self, at: CodeAddress) -> Option<Arc<CodeRegion>> {
        self.regions.get(&at.value()).map(|entry| entry.value().clone())
    }

    fn read_span(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let map = self.map.read().map_err(|_| Error::LockError)?;
        Ok(map[offset..offset + len].to_vec())
    }

    fn write_span(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut map = self.map.write().map_err(|_| Error::LockError)?;
        map[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Conventional frame-setup bytes for the configured width; what a freshly
    /// compiled entry looks like before any patching.
    fn prologue(&self) -> Vec<u8> {
        let mut bytes = match self.config.pointer_width {
            // push rbp; mov rbp, rsp
            PointerWidth::U64 => vec![0x55, 0x48, 0x89, 0xE5],
            // push ebp; mov ebp, esp
            PointerWidth::U32 => vec![0x55, 0x89, 0xE5],
        };
        bytes.resize(self.config.entry_size, 0x90);
        bytes
    }

    fn allocate(
        &self,
        name: &str,
        body: BodyFn,
        flags: RegionFlags,
        contents: &[u8],
    ) -> Result<Arc<CodeRegion>> {
        let len = self.config.entry_size.max(contents.len());
        let reserved = (len + 15) & !15;
        let offset = self.cursor.fetch_add(reserved, Ordering::SeqCst);
        if offset + len > self.config.capacity {
            return Err(Error::Invocation(format!(
                "code arena exhausted while defining '{name}' ({} bytes in use)",
                self.config.capacity
            )));
        }

        self.write_span(offset, contents)?;

        let address = CodeAddress::new(ARENA_BASE + offset as u64);
        let region = Arc::new(CodeRegion::new(address, offset, len, flags, name, body));
        let _ = self.regions.insert(address.value(), region.clone());
        Ok(region)
    }
}

impl CodeBackend for CodeArena {
    fn pointer_width(&self) -> PointerWidth {
        self.config.pointer_width
    }

    fn define(&self, name: &str, body: BodyFn) -> Result<CodeAddress> {
        let prologue = self.prologue();
        let region = self.allocate(name, body, RegionFlags::resident(), &prologue)?;
        Ok(region.address())
    }

    fn duplicate(&self, at: CodeAddress, name: &str) -> Result<CodeAddress> {
        let source = self.region(at).ok_or_else(|| Error::CloneFailure {
            target: at.to_string(),
            reason: "no code region resident at that address".to_string(),
        })?;

        let bytes = self.read_span(source.offset(), source.len())?;
        let clone = self.allocate(name, source.body().clone(), source.flags(), &bytes)?;
        Ok(clone.address())
    }

    fn region_size(&self, at: CodeAddress) -> Result<usize> {
        self.region(at)
            .map(|region| region.len())
            .ok_or_else(|| Error::Invocation(format!("no code region at {at}")))
    }

    fn entry_bytes(&self, at: CodeAddress) -> Result<Vec<u8>> {
        let region = self
            .region(at)
            .ok_or_else(|| Error::Invocation(format!("no code region at {at}")))?;
        self.read_span(region.offset(), region.len())
    }

    fn patch_entry(&self, at: CodeAddress, bytes: &[u8]) -> Result<()> {
        let region = self.region(at).ok_or_else(|| Error::DetourInstall {
            reason: format!("no code region at {at}"),
        })?;

        if !region.is_writable() {
            return Err(Error::DetourInstall {
                reason: format!("code region at {at} is not writable"),
            });
        }
        if bytes.len() > region.len() {
            return Err(Error::DetourInstall {
                reason: format!(
                    "code region at {at} spans {} bytes, patch needs {}",
                    region.len(),
                    bytes.len()
                ),
            });
        }

        self.write_span(region.offset(), bytes)
    }

    fn protect(&self, at: CodeAddress, flags: RegionFlags) -> Result<()> {
        let region = self
            .region(at)
            .ok_or_else(|| Error::Invocation(format!("no code region at {at}")))?;
        region.set_flags(flags);
        Ok(())
    }

    fn call_frame(&self, at: CodeAddress, args: &mut [Value]) -> Result<Value> {
        let mut current = at;
        for _ in 0..=self.config.max_hops {
            let region = self
                .region(current)
                .ok_or_else(|| Error::Invocation(format!("no code region at {current}")))?;

            if !region.flags().contains(RegionFlags::EXEC) {
                return Err(Error::Invocation(format!(
                    "code region at {current} is not executable"
                )));
            }

            let entry = self.read_span(region.offset(), region.len())?;
            if let Some(destination) = decode_transfer(current, &entry) {
                current = destination;
                continue;
            }

            return (region.body())(self, args);
        }

        Err(Error::Invocation(format!(
            "control transfer chain starting at {at} exceeded {} hops",
            self.config.max_hops
        )))
    }
}

impl std::fmt::Debug for CodeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeArena")
            .field("config", &self.config)
            .field("regions", &self.regions.len())
            .field("bytes_used", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}
