use thiserror::Error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The first six variants map one-to-one onto the failure modes of the patching pipeline:
/// target lookup, interceptor resolution, signature validation, original preservation, and
/// detour installation. The remaining variants cover ambient runtime concerns (locking,
/// invocation failures, memory mapping).
///
/// # Error Categories
///
/// ## Registration Errors
/// - [`Error::MissingTarget`] - No function matches the requested owner/name/parameter list
/// - [`Error::NoInterceptorMatch`] - Neither a prefix nor a postfix candidate resolved
/// - [`Error::InvalidPrefixSignature`] - A resolved prefix does not return `bool`
/// - [`Error::InvalidPostfixSignature`] - A resolved postfix returns a value
///
/// ## Patching Errors
/// - [`Error::CloneFailure`] - The target's original logic could not be preserved
/// - [`Error::DetourInstall`] - The target's code region is unwritable or undersized
///
/// ## Runtime Errors
/// - [`Error::LockError`] - Thread synchronization failure
/// - [`Error::Invocation`] - A call through the code arena failed
/// - [`Error::Io`] - Backing memory for the code arena could not be mapped
///
/// # Examples
///
/// ```rust
/// use repatch::{Error, runtime::function::{FunctionId, FunctionTable}};
/// use repatch::runtime::value::TypeDesc;
///
/// let table = FunctionTable::new();
/// let missing = FunctionId::new("Calculator", "add", vec![TypeDesc::I32, TypeDesc::I32]);
/// match table.resolve(&missing) {
///     Err(Error::MissingTarget { target }) => {
///         assert_eq!(target, "Calculator.add(i32, i32)");
///     }
///     _ => panic!("expected a missing target"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// No function matches the requested owner, name and ordered parameter-type list.
    ///
    /// Surfaces from [`crate::runtime::function::FunctionTable::resolve`] at the very
    /// start of a registration, before anything else has happened.
    #[error("No function found for {target}")]
    MissingTarget {
        /// The rendered `Owner.name(types)` shape that was requested
        target: String,
    },

    /// Neither a prefix nor a postfix candidate resolved during registration.
    ///
    /// The expected signatures are rendered into the message so a caller can see
    /// exactly what shape the engine computed for each role.
    #[error(
        "No prefix/postfix interceptor for {target} found that matches prefix{prefix_shape} or postfix{postfix_shape}"
    )]
    NoInterceptorMatch {
        /// The rendered target function shape
        target: String,
        /// The computed prefix slot list, e.g. `(&mut i32, &mut i32, &mut i32)`
        prefix_shape: String,
        /// The computed postfix slot list
        postfix_shape: String,
    },

    /// A resolved prefix candidate does not declare a `bool` return.
    ///
    /// A prefix's boolean verdict is what gates the original call, so a prefix with
    /// any other return type cannot participate in the chain.
    #[error("Prefix '{name}' must return bool (return true to execute the original) - found {found}")]
    InvalidPrefixSignature {
        /// Name of the offending candidate
        name: String,
        /// The return type the candidate declared
        found: String,
    },

    /// A resolved postfix candidate declares a non-void return.
    ///
    /// Postfixes observe and mutate through their by-reference slots only; a return
    /// value would have nowhere to go.
    #[error("Postfix '{name}' must not return anything - found {found}")]
    InvalidPostfixSignature {
        /// Name of the offending candidate
        name: String,
        /// The return type the candidate declared
        found: String,
    },

    /// The target's original logic could not be preserved.
    ///
    /// Preservation duplicates the target's resident code region; a target that was
    /// never forced into a compiled, resident state has no region to duplicate.
    #[error("Failed to preserve original of {target} - {reason}")]
    CloneFailure {
        /// The rendered target function shape
        target: String,
        /// Why the duplication failed
        reason: String,
    },

    /// A detour could not be installed into the target's code region.
    ///
    /// Raised when the region is unwritable, smaller than the jump pattern, or a
    /// near branch displacement does not fit its encoding. A failed multi-byte write
    /// leaves the region in whatever state the last successful write produced.
    #[error("Failed to install detour - {reason}")]
    DetourInstall {
        /// Why the installation failed
        reason: String,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when a mutex
    /// or rwlock guarding shared engine state has been poisoned.
    #[error("Failed to lock target")]
    LockError,

    /// A call dispatched through the code arena failed.
    ///
    /// Covers unknown code addresses, frame arity mismatches, value/type mismatches
    /// inside a call, exhausted arena capacity, and control-transfer chains that
    /// exceed the configured hop limit.
    #[error("{0}")]
    Invocation(String),

    /// Backing memory error.
    ///
    /// Wraps I/O errors raised while mapping the anonymous memory that backs the
    /// code arena's resident bytes.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
