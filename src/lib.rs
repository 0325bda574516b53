// Copyright 2026 The repatch authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # repatch
//!
//! A runtime function-interception engine built in pure Rust: register prefix and
//! postfix interceptors against functions of an in-process runtime and have every
//! call observe them, while the original logic stays reachable through a preserved
//! clone.
//!
//! ## Features
//!
//! - **Prefix/postfix chains** - Interceptors run around the original in strict
//!   registration order; a prefix's `false` verdict suppresses the original
//! - **Original preservation** - The pre-patch logic is cloned before the first
//!   byte is overwritten and stays callable forever
//! - **Real detour mechanics** - Targets are redirected by writing architecture
//!   jump encodings (absolute far jumps, near relative jumps) into their entry bytes
//! - **Signature resolution** - Candidates resolve against computed slot shapes,
//!   with by-reference access to receiver, result and parameters
//! - **Thread safe** - Registration is serialized internally; patched calls are
//!   lock-free and always observe the latest installed dispatcher
//!
//! ## Quick Start
//!
//! Add `repatch` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! repatch = "0.1"
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust
//! use repatch::prelude::*;
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
//! // A postfix that doubles whatever the original returned
//! let mut source = CandidateSet::new();
//! source.push(
//!     InterceptorCandidate::new(
//!         "double",
//!         vec![],
//!         TypeDesc::Void,
//!         Arc::new(|frame| {
//!             if let Value::I32(r) = frame[0] {
//!                 frame[0] = Value::I32(r * 2);
//!             }
//!             Value::Unit
//!         }),
//!     )
//!     .tagged(InterceptorKind::Postfix),
//! );
//! registry.register(target.id(), &source)?;
//!
//! assert_eq!(
//!     registry.call(target.id(), &[Value::I32(2), Value::I32(3)])?,
//!     Value::I32(10)
//! );
//! # Ok::<(), repatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `repatch` is organized into two layers:
//!
//! - [`runtime`] - The in-process function model the engine operates on: the code
//!   arena holding resident callables, the function table, dynamic values
//! - [`patch`] - The interception engine: resolution, preservation, dispatcher
//!   generation, detour installation, and the coordinating registry
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### The Interception Pipeline
//!
//! [`PatchRegistry::register`] validates first and mutates second: the target is
//! resolved, the source's candidates are matched against computed slot shapes, and
//! only then is the target forced resident, its original cloned, a dispatcher
//! generated over the grown interceptor lists, and a jump written over the target's
//! entry bytes. Calls through the target from then on land in the dispatcher, which
//! runs prefixes, the preserved original (unless vetoed) and postfixes in order.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result) with detailed failure
//! information:
//!
//! ```rust
//! use repatch::{Error, runtime::function::{FunctionId, FunctionTable}};
//!
//! let table = FunctionTable::new();
//! let missing = FunctionId::new("Ghost", "walk", vec![]);
//! match table.resolve(&missing) {
//!     Err(Error::MissingTarget { target }) => assert_eq!(target, "Ghost.walk()"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! # Install fuzzing tools
//! cargo install cargo-fuzz
//!
//! # Fuzz the control-transfer decoder
//! cargo +nightly fuzz run transfer --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench  # Dispatch overhead benchmarks
//! ```

pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the repatch library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust
/// use repatch::prelude::*;
/// use std::sync::Arc;
///
/// let arena = CodeArena::new()?;
/// let address = arena.define("answer", Arc::new(|_, _| Ok(Value::I32(42))))?;
/// assert_eq!(arena.call(address, &[])?, Value::I32(42));
/// # Ok::<(), repatch::Error>(())
/// ```
pub mod prelude;

/// The in-process function runtime: resident code, function descriptors, values.
///
/// # Key Components
///
/// - [`runtime::arena::CodeArena`] - The code model holding resident callables
/// - [`runtime::arena::CodeBackend`] - The capability trait the engine consumes
/// - [`runtime::function::FunctionTable`] - Definition and lookup of targets
/// - [`runtime::value::Value`] - Dynamic values flowing through calls
///
/// # Examples
///
/// ```rust
/// use repatch::runtime::arena::{CodeArena, CodeBackend};
/// use repatch::runtime::value::Value;
/// use std::sync::Arc;
///
/// let arena = CodeArena::new()?;
/// let double = arena.define("double", Arc::new(|_, args: &mut [Value]| {
///     Ok(Value::I32(args[0].as_i32()? * 2))
/// }))?;
/// assert_eq!(arena.call(double, &[Value::I32(21)])?, Value::I32(42));
/// # Ok::<(), repatch::Error>(())
/// ```
pub mod runtime;

/// The interception engine: resolution, preservation, dispatch and installation.
///
/// # Key Components
///
/// - [`patch::registry::PatchRegistry`] - The coordinating entry point
/// - [`patch::interceptor`] - Candidates, sources and per-target patch sets
/// - [`patch::resolver`] - Slot-shape computation and candidate matching
/// - [`patch::preserve::OriginalPreserver`] - Pre-patch clones of target logic
/// - [`patch::detour`] - Jump encodings and entry-byte installation
///
/// See [`PatchRegistry::register`] for the full registration pipeline.
pub mod patch;

/// `repatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always
/// [`Error`]. This is used consistently throughout the crate for all fallible
/// operations.
///
/// # Examples
///
/// ```rust
/// use repatch::{Result, runtime::arena::CodeArena};
///
/// fn fresh_arena() -> Result<CodeArena> {
///     CodeArena::new()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `repatch` Error type
///
/// The main error type for all operations in this crate. Provides detailed error
/// information for target lookup, interceptor resolution, original preservation,
/// detour installation and call dispatch.
pub use error::Error;

/// Main entry point for patching functions.
///
/// See [`patch::registry::PatchRegistry`] for the registration pipeline and call
/// accessors.
pub use patch::registry::PatchRegistry;

/// The bundled code backend: an anonymous-mapping-backed model of resident code.
///
/// See [`runtime::arena::CodeArena`] and the [`runtime::arena::CodeBackend`] trait
/// it implements.
pub use runtime::arena::CodeArena;

/// Definition and lookup of the functions the engine can patch.
///
/// See [`runtime::function::FunctionTable`].
pub use runtime::function::FunctionTable;
