//! # repatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and
//! traits from the repatch library. Import this module to get quick access to the
//! essential types for function interception.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all repatch operations
pub use crate::Error;

/// The result type used throughout repatch
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The coordinating registry for interceptor registration and patched calls
pub use crate::PatchRegistry;

/// The bundled code backend and its configuration
pub use crate::runtime::arena::{ArenaConfig, BodyFn, CodeArena, CodeBackend, PointerWidth};

// ================================================================================================
// Function Model
// ================================================================================================

/// Function definition, identity and lookup
pub use crate::runtime::function::{
    Function, FunctionFlags, FunctionId, FunctionRc, FunctionTable, ParamAttributes,
    ParameterDescriptor,
};

/// Addresses of resident code regions
pub use crate::runtime::address::CodeAddress;

/// Region protection flags
pub use crate::runtime::region::RegionFlags;

// ================================================================================================
// Values and Signatures
// ================================================================================================

/// Dynamic values, types and signature slots
pub use crate::runtime::value::{ObjectData, ObjectRef, SlotDesc, TypeDesc, Value};

// ================================================================================================
// Interceptors
// ================================================================================================

/// Interceptor declaration and discovery
pub use crate::patch::interceptor::{
    CandidateSet, InterceptorCandidate, InterceptorFn, InterceptorKind, InterceptorSource,
    PatchSet,
};

/// Slot-shape computation for interceptor signatures
pub use crate::patch::resolver::{postfix_shape, prefix_shape};
