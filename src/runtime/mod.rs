//! The in-process function runtime the patch engine operates on.
//!
//! Rust cannot safely introspect or rewrite its own compiled functions, so the engine
//! works against an explicit model of resident code: [`arena::CodeArena`] owns the
//! bytes and the bound callables, [`function::FunctionTable`] supplies descriptors,
//! and [`region::CodeRegion`] is the unit the detour machinery overwrites. The
//! [`arena::CodeBackend`] trait is the seam between this runtime and the patch
//! engine; any host able to satisfy it can carry the engine.

pub mod address;
pub mod arena;
pub mod function;
pub mod region;
pub mod value;
