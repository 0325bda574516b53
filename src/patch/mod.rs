//! The interception engine: everything between a registration request and a patched
//! call.
//!
//! # Pipeline
//!
//! [`registry::PatchRegistry::register`] drives the pieces in order:
//!
//! 1. [`resolver`] matches a source's candidates against the slot shapes computed for
//!    the target and enforces the role return contracts.
//! 2. [`preserve::OriginalPreserver`] clones the target's resident logic before any
//!    byte is overwritten.
//! 3. [`dispatcher`] generates the callable running prefix chain, original and
//!    postfix chain per the call protocol.
//! 4. [`detour`] redirects the target's entry bytes into the dispatcher.
//!
//! [`interceptor`] holds the shared vocabulary: candidates, sources, resolved
//! interceptors and per-target patch sets.

pub mod detour;
pub mod dispatcher;
pub mod interceptor;
pub mod preserve;
pub mod registry;
pub mod resolver;
