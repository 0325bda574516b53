//! Patch registry: the coordination point for interceptor registration.
//!
//! One registration is a transaction over several moving parts, in a fixed order:
//! resolve the target, resolve the source's candidates against it (all validation
//! happens before anything is mutated), force the target resident, preserve the
//! original, build a fresh dispatcher over the grown interceptor chains, redirect
//! the target's entry bytes at it, and only then publish the grown patch set for
//! introspection. The registry serializes
//! registrations behind an internal gate, so the preserve-before-overwrite ordering
//! holds even under concurrent registration and the preserved original never
//! contains detour bytes.
//!
//! Calls through patched targets take no lock at all; they go through the backend's
//! transfer-following invoker and observe whichever dispatcher was installed last.
//!
//! # Examples
//!
//! ```rust
//! use repatch::patch::interceptor::{CandidateSet, InterceptorCandidate, InterceptorKind};
//! use repatch::runtime::arena::CodeArena;
//! use repatch::runtime::function::{FunctionFlags, FunctionTable, ParameterDescriptor};
//! use repatch::runtime::value::{TypeDesc, Value};
//! use repatch::PatchRegistry;
//! use std::sync::Arc;
//!
//! let functions = Arc::new(FunctionTable::new());
//! let target = functions.define(
//!     "Calculator",
//!     "add",
//!     FunctionFlags::STATIC,
//!     vec![
//!         ParameterDescriptor::new("a", TypeDesc::I32),
//!         ParameterDescriptor::new("b", TypeDesc::I32),
//!     ],
//!     TypeDesc::I32,
//!     Arc::new(|_, args| Ok(Value::I32(args[0].as_i32()? + args[1].as_i32()?))),
//! );
//!
//! let registry = PatchRegistry::new(Arc::new(CodeArena::new()?), functions);
//!
//! let mut source = CandidateSet::new();
//! source.push(
//!     InterceptorCandidate::new(
//!         "short_circuit",
//!         vec![],
//!         TypeDesc::Bool,
//!         Arc::new(|frame| {
//!             frame[0] = Value::I32(99);
//!             Value::Bool(false)
//!         }),
//!     )
//!     .tagged(InterceptorKind::Prefix),
//! );
//! registry.register(target.id(), &source)?;
//!
//! let result = registry.call(target.id(), &[Value::I32(2), Value::I32(3)])?;
//! assert_eq!(result, Value::I32(99));
//! # Ok::<(), repatch::Error>(())
//! ```

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::patch::detour::DetourInstaller;
use crate::patch::dispatcher;
use crate::patch::interceptor::{InterceptorSource, PatchSet};
use crate::patch::preserve::OriginalPreserver;
use crate::patch::resolver;
use crate::runtime::address::CodeAddress;
use crate::runtime::arena::CodeBackend;
use crate::runtime::function::{FunctionId, FunctionTable};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// The engine's top-level coordinator: owns the patch bookkeeping for one backend
/// and one function table.
pub struct PatchRegistry {
    backend: Arc<dyn CodeBackend>,
    functions: Arc<FunctionTable>,
    preserver: OriginalPreserver,
    installer: DetourInstaller,
    patches: DashMap<FunctionId, Arc<PatchSet>>,
    dispatchers: DashMap<FunctionId, CodeAddress>,
    gate: Mutex<()>,
}

impl PatchRegistry {
    /// Creates a registry over `backend` and `functions`; the detour encoding follows
    /// the backend's pointer width.
    #[must_use]
    pub fn new(backend: Arc<dyn CodeBackend>, functions: Arc<FunctionTable>) -> Self {
        let installer = DetourInstaller::new(backend.pointer_width());
        PatchRegistry {
            backend,
            functions,
            preserver: OriginalPreserver::new(),
            installer,
            patches: DashMap::new(),
            dispatchers: DashMap::new(),
            gate: Mutex::new(()),
        }
    }

    /// The function table this registry resolves targets against
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// The backend this registry installs patches into
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CodeBackend> {
        &self.backend
    }

    /// Registers a source's interceptors against `target`.
    ///
    /// Resolution and validation complete before any state changes, and the shared
    /// patch set is published only after the new dispatcher is built and installed,
    /// so a failed registration never leaves the introspection accessors reporting
    /// interceptors the live entry bytes do not run. On success the target's patch
    /// set has grown, a dispatcher over the grown set is resident, and the target's
    /// entry bytes transfer into it; the previous dispatcher (if any) is superseded
    /// but remains resident.
    ///
    /// Registration never deduplicates: registering the same source twice appends
    /// its interceptors twice, and they run twice per call.
    ///
    /// # Errors
    /// - [`Error::MissingTarget`] if `target` names no known function
    /// - [`Error::NoInterceptorMatch`] if the source offers nothing that resolves
    /// - [`Error::InvalidPrefixSignature`] / [`Error::InvalidPostfixSignature`] if a
    ///   resolved candidate violates its role's return contract
    /// - [`Error::CloneFailure`] / [`Error::DetourInstall`] if preservation or
    ///   installation fails
    /// - [`Error::LockError`] if the registration gate is poisoned
    pub fn register(&self, target: &FunctionId, source: &dyn InterceptorSource) -> Result<()> {
        let _guard = self.gate.lock().map_err(|_| Error::LockError)?;

        let function = self.functions.resolve(target)?;
        let resolved = resolver::resolve(&function, source)?;

        let entry = function.prepare(self.backend.as_ref())?;
        let original = self.preserver.preserve(self.backend.as_ref(), &function)?;

        // The grown chains are staged; the shared set is published only once the
        // dispatcher over them is resident and installed, so the introspection
        // accessors never run ahead of the live entry bytes.
        let current = self.patches.get(target).map(|held| held.value().clone());
        let staged = PatchSet::new();
        if let Some(set) = &current {
            for prefix in set.snapshot_prefixes() {
                staged.push_prefix(prefix);
            }
            for postfix in set.snapshot_postfixes() {
                staged.push_postfix(postfix);
            }
        }
        if let Some(prefix) = &resolved.prefix {
            staged.push_prefix(prefix.clone());
        }
        if let Some(postfix) = &resolved.postfix {
            staged.push_postfix(postfix.clone());
        }

        let dispatcher = dispatcher::build(self.backend.as_ref(), &function, original, &staged)?;
        self.installer
            .install(self.backend.as_ref(), entry, dispatcher)?;

        let set = current.unwrap_or_else(|| {
            self.patches
                .entry(target.clone())
                .or_default()
                .value()
                .clone()
        });
        if let Some(prefix) = resolved.prefix {
            set.push_prefix(prefix);
        }
        if let Some(postfix) = resolved.postfix {
            set.push_postfix(postfix);
        }
        let _ = self.dispatchers.insert(target.clone(), dispatcher);

        Ok(())
    }

    /// Calls `target` through the backend, observing any installed patches.
    ///
    /// An unpatched target is prepared on first call and runs its own logic
    /// unchanged.
    ///
    /// # Errors
    /// Returns [`Error::MissingTarget`] for unknown targets, or whatever the executed
    /// chain produces.
    pub fn call(&self, target: &FunctionId, args: &[Value]) -> Result<Value> {
        let function = self.functions.resolve(target)?;
        let entry = function.prepare(self.backend.as_ref())?;
        self.backend.call(entry, args)
    }

    /// True if at least one registration against `target` has succeeded
    #[must_use]
    pub fn is_patched(&self, target: &FunctionId) -> bool {
        self.dispatchers.contains_key(target)
    }

    /// The target's patch set, if any registration has created one
    #[must_use]
    pub fn patch_set(&self, target: &FunctionId) -> Option<Arc<PatchSet>> {
        self.patches.get(target).map(|entry| entry.value().clone())
    }

    /// The currently installed dispatcher of `target`, if any
    #[must_use]
    pub fn dispatcher(&self, target: &FunctionId) -> Option<CodeAddress> {
        self.dispatchers.get(target).map(|entry| *entry.value())
    }

    /// The preserved pre-patch original of `target`, if any
    #[must_use]
    pub fn original(&self, target: &FunctionId) -> Option<CodeAddress> {
        self.preserver.get(target)
    }

    /// Number of targets with at least one installed patch
    #[must_use]
    pub fn patched_count(&self) -> usize {
        self.dispatchers.len()
    }
}

impl std::fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRegistry")
            .field("functions", &self.functions.len())
            .field("patched", &self.dispatchers.len())
            .finish()
    }
}
