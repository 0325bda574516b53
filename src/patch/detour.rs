//! Detour installation: trampoline writers and the installer that redirects a
//! target's resident code into a dispatcher.
//!
//! A detour is an unconditional transfer of control written over a target's entry
//! bytes. The encoding depends on the modeled pointer width:
//!
//! - **Wide (64-bit)**: an absolute far jump, `48 B8 <imm64> FF E0`
//!   (`mov rax, imm64; jmp rax`), 12 bytes.
//! - **Narrow (32-bit)**: a near relative jump, `E9 <rel32>` with
//!   `rel32 = destination - (source + 5)`, 5 bytes.
//!
//! [`TrampolineWriter`] is the capability seam: one implementation per transfer
//! convention, each writing the minimal correct sequence for its word size.
//! [`decode_transfer`] is the inverse the invoker uses to follow installed detours.

use crate::runtime::address::CodeAddress;
use crate::runtime::arena::{CodeBackend, PointerWidth};
use crate::{Error, Result};

/// Length of the wide absolute-jump pattern
pub const FAR_JUMP_LEN: usize = 12;
/// Length of the narrow relative-jump pattern
pub const NEAR_JUMP_LEN: usize = 5;

/// A writer for one architecture's unconditional-transfer convention.
pub trait TrampolineWriter: Send + Sync {
    /// Number of entry bytes the pattern occupies
    fn patch_len(&self) -> usize;

    /// Encodes a transfer from `from` to `to`
    ///
    /// # Errors
    /// Returns [`Error::DetourInstall`] if the displacement cannot be encoded.
    fn encode(&self, from: CodeAddress, to: CodeAddress) -> Result<Vec<u8>>;

    /// Decodes the transfer destination out of entry bytes written by this writer,
    /// `None` if the bytes are not this writer's pattern.
    fn decode(&self, from: CodeAddress, bytes: &[u8]) -> Option<CodeAddress>;
}

/// Absolute far jump for wide-pointer address spaces.
#[derive(Clone, Copy, Debug, Default)]
pub struct FarJumpWriter;

impl TrampolineWriter for FarJumpWriter {
    fn patch_len(&self) -> usize {
        FAR_JUMP_LEN
    }

    fn encode(&self, _from: CodeAddress, to: CodeAddress) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(FAR_JUMP_LEN);
        bytes.extend_from_slice(&[0x48, 0xB8]);
        bytes.extend_from_slice(&to.value().to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xE0]);
        Ok(bytes)
    }

    fn decode(&self, _from: CodeAddress, bytes: &[u8]) -> Option<CodeAddress> {
        if bytes.len() < FAR_JUMP_LEN {
            return None;
        }
        if bytes[0] != 0x48 || bytes[1] != 0xB8 || bytes[10] != 0xFF || bytes[11] != 0xE0 {
            return None;
        }

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[2..10]);
        Some(CodeAddress::new(u64::from_le_bytes(raw)))
    }
}

/// Near relative jump for narrow-pointer address spaces.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearJumpWriter;

impl TrampolineWriter for NearJumpWriter {
    fn patch_len(&self) -> usize {
        NEAR_JUMP_LEN
    }

    fn encode(&self, from: CodeAddress, to: CodeAddress) -> Result<Vec<u8>> {
        let displacement =
            i128::from(to.value()) - i128::from(from.value()) - NEAR_JUMP_LEN as i128;
        let Ok(rel32) = i32::try_from(displacement) else {
            return Err(Error::DetourInstall {
                reason: format!(
                    "near branch from {from} to {to} is out of range for a rel32 encoding"
                ),
            });
        };

        let mut bytes = Vec::with_capacity(NEAR_JUMP_LEN);
        bytes.push(0xE9);
        bytes.extend_from_slice(&rel32.to_le_bytes());
        Ok(bytes)
    }

    fn decode(&self, from: CodeAddress, bytes: &[u8]) -> Option<CodeAddress> {
        if bytes.len() < NEAR_JUMP_LEN || bytes[0] != 0xE9 {
            return None;
        }

        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[1..5]);
        let rel32 = i32::from_le_bytes(raw);
        let base = from.value().wrapping_add(NEAR_JUMP_LEN as u64);
        Some(CodeAddress::new(base.wrapping_add(rel32 as i64 as u64)))
    }
}

/// The writer matching an address space's pointer width.
#[must_use]
pub fn writer_for(width: PointerWidth) -> Box<dyn TrampolineWriter> {
    match width {
        PointerWidth::U64 => Box::new(FarJumpWriter),
        PointerWidth::U32 => Box::new(NearJumpWriter),
    }
}

/// Decodes the destination of any installed transfer at `from`, trying each known
/// pattern. `None` means the entry bytes hold no transfer and the resident body is
/// intact.
#[must_use]
pub fn decode_transfer(from: CodeAddress, bytes: &[u8]) -> Option<CodeAddress> {
    FarJumpWriter
        .decode(from, bytes)
        .or_else(|| NearJumpWriter.decode(from, bytes))
}

/// Installs detours by overwriting target entry bytes through a [`CodeBackend`].
///
/// Not safe to run concurrently against the same target without external
/// serialization; the registry holds its gate across install calls.
pub struct DetourInstaller {
    writer: Box<dyn TrampolineWriter>,
}

impl DetourInstaller {
    /// Creates an installer using the conventional writer for `width`
    #[must_use]
    pub fn new(width: PointerWidth) -> Self {
        DetourInstaller {
            writer: writer_for(width),
        }
    }

    /// Creates an installer with an explicit writer
    #[must_use]
    pub fn with_writer(writer: Box<dyn TrampolineWriter>) -> Self {
        DetourInstaller { writer }
    }

    /// Entry bytes the installed pattern occupies
    #[must_use]
    pub fn patch_len(&self) -> usize {
        self.writer.patch_len()
    }

    /// Redirects the region at `target` to `dispatcher`.
    ///
    /// After this returns, every call through `target` observes the dispatcher's
    /// behavior. A failed write leaves whatever bytes the last successful write
    /// produced; there is no rollback.
    ///
    /// # Errors
    /// Returns [`Error::DetourInstall`] if the transfer cannot be encoded or the
    /// target region is missing, unwritable or smaller than the pattern.
    pub fn install(
        &self,
        backend: &dyn CodeBackend,
        target: CodeAddress,
        dispatcher: CodeAddress,
    ) -> Result<()> {
        let bytes = self.writer.encode(target, dispatcher)?;
        backend.patch_entry(target, &bytes)
    }
}

impl std::fmt::Debug for DetourInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetourInstaller")
            .field("patch_len", &self.writer.patch_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::arena::{ArenaConfig, BodyFn, CodeArena};
    use crate::runtime::region::RegionFlags;
    use crate::runtime::value::Value;
    use std::sync::Arc;

    fn constant(value: i32) -> BodyFn {
        Arc::new(move |_, _| Ok(Value::I32(value)))
    }

    #[test]
    fn test_far_jump_minimal_sequence() {
        let bytes = FarJumpWriter
            .encode(CodeAddress::new(0x1000), CodeAddress::new(0x0002_0040))
            .unwrap();

        assert_eq!(bytes.len(), FAR_JUMP_LEN);
        assert_eq!(&bytes[..2], &[0x48, 0xB8]);
        assert_eq!(&bytes[2..10], &0x0002_0040u64.to_le_bytes());
        assert_eq!(&bytes[10..], &[0xFF, 0xE0]);
    }

    #[test]
    fn test_near_jump_minimal_sequence() {
        let from = CodeAddress::new(0x1000);
        let to = CodeAddress::new(0x1040);
        let bytes = NearJumpWriter.encode(from, to).unwrap();

        assert_eq!(bytes.len(), NEAR_JUMP_LEN);
        assert_eq!(bytes[0], 0xE9);
        // 0x1040 - (0x1000 + 5) = 0x3B
        assert_eq!(&bytes[1..], &0x3Bi32.to_le_bytes());
    }

    #[test]
    fn test_near_jump_backwards() {
        let from = CodeAddress::new(0x2000);
        let to = CodeAddress::new(0x1000);
        let bytes = NearJumpWriter.encode(from, to).unwrap();
        assert_eq!(NearJumpWriter.decode(from, &bytes), Some(to));
    }

    #[test]
    fn test_near_jump_out_of_range() {
        let from = CodeAddress::new(0x1000);
        let to = CodeAddress::new(0x1_0000_0000);
        assert!(matches!(
            NearJumpWriter.encode(from, to),
            Err(Error::DetourInstall { .. })
        ));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let from = CodeAddress::new(0x7000);
        let to = CodeAddress::new(0x9abc);

        let far = FarJumpWriter.encode(from, to).unwrap();
        assert_eq!(decode_transfer(from, &far), Some(to));

        let near = NearJumpWriter.encode(from, to).unwrap();
        assert_eq!(decode_transfer(from, &near), Some(to));
    }

    #[test]
    fn test_decode_rejects_plain_code() {
        // A freshly compiled prologue is not a transfer
        let prologue = [0x55, 0x48, 0x89, 0xE5, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90];
        assert_eq!(decode_transfer(CodeAddress::new(0x1000), &prologue), None);
        assert_eq!(decode_transfer(CodeAddress::new(0x1000), &[]), None);
    }

    #[test]
    fn test_writer_selection() {
        assert_eq!(writer_for(PointerWidth::U64).patch_len(), FAR_JUMP_LEN);
        assert_eq!(writer_for(PointerWidth::U32).patch_len(), NEAR_JUMP_LEN);
    }

    #[test]
    fn test_install_redirects_calls() {
        let arena = CodeArena::new().unwrap();
        let target = arena.define("target", constant(1)).unwrap();
        let replacement = arena.define("replacement", constant(2)).unwrap();

        let installer = DetourInstaller::new(arena.pointer_width());
        installer.install(&arena, target, replacement).unwrap();

        assert_eq!(arena.call(target, &[]).unwrap(), Value::I32(2));
    }

    #[test]
    fn test_install_narrow_width() {
        let arena = CodeArena::with_config(ArenaConfig {
            pointer_width: PointerWidth::U32,
            ..ArenaConfig::default()
        })
        .unwrap();
        let target = arena.define("target", constant(1)).unwrap();
        let replacement = arena.define("replacement", constant(2)).unwrap();

        let installer = DetourInstaller::new(arena.pointer_width());
        installer.install(&arena, target, replacement).unwrap();
        assert_eq!(arena.call(target, &[]).unwrap(), Value::I32(2));
    }

    #[test]
    fn test_install_on_unwritable_region() {
        let arena = CodeArena::new().unwrap();
        let target = arena.define("target", constant(1)).unwrap();
        let replacement = arena.define("replacement", constant(2)).unwrap();
        arena
            .protect(target, RegionFlags::READ | RegionFlags::EXEC)
            .unwrap();

        let installer = DetourInstaller::new(arena.pointer_width());
        let result = installer.install(&arena, target, replacement);
        assert!(matches!(result, Err(Error::DetourInstall { .. })));

        // The region was left untouched and still runs the original body
        arena
            .protect(target, RegionFlags::resident())
            .unwrap();
        assert_eq!(arena.call(target, &[]).unwrap(), Value::I32(1));
    }

    #[test]
    fn test_install_on_undersized_region() {
        let arena = CodeArena::with_config(ArenaConfig {
            entry_size: 8,
            ..ArenaConfig::default()
        })
        .unwrap();
        let target = arena.define("target", constant(1)).unwrap();
        let replacement = arena.define("replacement", constant(2)).unwrap();

        let installer = DetourInstaller::new(arena.pointer_width());
        let result = installer.install(&arena, target, replacement);
        assert!(matches!(result, Err(Error::DetourInstall { .. })));
    }
}
