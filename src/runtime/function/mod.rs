//! Function model: descriptors, identities, flags and the lookup table.
//!
//! This module is the engine's view of "a compiled function": the immutable
//! [`Function`] descriptor with its ordered [`ParameterDescriptor`]s, the
//! [`FunctionId`] identity used for lookup and patch bookkeeping, and the
//! [`FunctionTable`] that resolves identities to descriptors. Preparing a function
//! materializes its resident code region in the backend; everything the patch
//! engine overwrites or preserves hangs off that region.

mod descriptor;
mod table;
mod types;

pub use descriptor::{Function, FunctionId, FunctionRc, ParameterDescriptor};
pub use table::FunctionTable;
pub use types::{FunctionFlags, ParamAttributes};
