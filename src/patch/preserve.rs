//! Original preserver: clones a target's pre-patch logic before its entry bytes are
//! overwritten.
//!
//! Installing a detour destroys the ability to reach the original through its own
//! address, so the original must be duplicated into a standalone callable first.
//! Preservation happens at most once per target; every dispatcher rebuild reuses the
//! same clone.

use dashmap::DashMap;

use crate::runtime::address::CodeAddress;
use crate::runtime::arena::CodeBackend;
use crate::runtime::function::{Function, FunctionId};
use crate::{Error, Result};

/// Keeps the one preserved original per target.
#[derive(Default)]
pub struct OriginalPreserver {
    clones: DashMap<FunctionId, CodeAddress>,
}

impl OriginalPreserver {
    /// Creates an empty preserver
    #[must_use]
    pub fn new() -> Self {
        OriginalPreserver {
            clones: DashMap::new(),
        }
    }

    /// Clones `target`'s resident region into a standalone callable, or returns the
    /// existing clone if the target was already preserved.
    ///
    /// Must run before any detour touches the target's entry bytes; the registry
    /// guarantees that ordering.
    ///
    /// # Errors
    /// Returns [`Error::CloneFailure`] if the target was never forced into a
    /// compiled, resident state, or if its region cannot be duplicated.
    pub fn preserve(
        &self,
        backend: &dyn CodeBackend,
        target: &Function,
    ) -> Result<CodeAddress> {
        if let Some(existing) = self.clones.get(target.id()) {
            return Ok(*existing.value());
        }

        let address = target.address().ok_or_else(|| Error::CloneFailure {
            target: target.id().to_string(),
            reason: "target has no resident code region (it was never prepared)".to_string(),
        })?;

        let clone = backend.duplicate(address, &format!("{}_original", target.name()))?;
        let _ = self.clones.insert(target.id().clone(), clone);
        Ok(clone)
    }

    /// The preserved original of `id`, if any
    #[must_use]
    pub fn get(&self, id: &FunctionId) -> Option<CodeAddress> {
        self.clones.get(id).map(|entry| *entry.value())
    }

    /// Number of preserved originals
    #[must_use]
    pub fn len(&self) -> usize {
        self.clones.len()
    }

    /// Returns true if nothing has been preserved yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }
}

impl std::fmt::Debug for OriginalPreserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginalPreserver")
            .field("clones", &self.clones.len())
            .finish()
    }
}
