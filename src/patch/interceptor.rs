//! Interceptor model: candidates, resolved interceptors, and per-target patch sets.
//!
//! # Key Types
//! - [`InterceptorCandidate`] - what a declaring source offers for registration
//! - [`InterceptorSource`] - the discovery contract the registry consumes
//! - [`Interceptor`] - a candidate after resolution against a concrete target
//! - [`PatchSet`] - the two ordered interceptor lists of one target
//!
//! # Ordering
//!
//! Patch sets are append-only and never deduplicate: registration order is execution
//! order, and registering the same interceptor twice makes it run twice per call.

use std::fmt;
use std::sync::Arc;

use crate::runtime::value::{SlotDesc, TypeDesc, Value};

/// The role an interceptor plays around the original call.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum InterceptorKind {
    /// Runs before the original; its boolean verdict gates further processing
    Prefix,
    /// Runs after the (possibly suppressed) original; always executes
    Postfix,
}

/// Interceptor code: operates on a frame of by-reference slots and produces its
/// verdict (prefixes) or nothing meaningful (postfixes).
pub type InterceptorFn = Arc<dyn Fn(&mut [Value]) -> Value + Send + Sync>;

/// A function a declaring source offers as a prefix or postfix candidate.
///
/// Candidates are matched by an explicit role tag when present, otherwise by the
/// conventional names `prefix` / `postfix` together with an exact parameter-list
/// match against the shape computed for the target.
#[derive(Clone)]
pub struct InterceptorCandidate {
    /// Candidate name; conventional names participate in untagged resolution
    pub name: String,
    /// Explicit role tag, preferred over name matching when present
    pub tag: Option<InterceptorKind>,
    /// Declared parameter slots
    pub params: Vec<SlotDesc>,
    /// Declared return type
    pub returns: TypeDesc,
    /// The candidate's code
    pub code: InterceptorFn,
}

impl InterceptorCandidate {
    /// Creates an untagged candidate that resolves by name and parameter list
    #[must_use]
    pub fn new(
        name: &str,
        params: Vec<SlotDesc>,
        returns: TypeDesc,
        code: InterceptorFn,
    ) -> Self {
        InterceptorCandidate {
            name: name.to_string(),
            tag: None,
            params,
            returns,
            code,
        }
    }

    /// Tags the candidate with an explicit role
    #[must_use]
    pub fn tagged(mut self, kind: InterceptorKind) -> Self {
        self.tag = Some(kind);
        self
    }
}

impl fmt::Debug for InterceptorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorCandidate")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish()
    }
}

/// The discovery contract: a declaring source enumerates its interceptor candidates.
///
/// How candidates come to exist (attribute scanning, naming conventions, manual
/// construction) is the source's business; the engine only consumes the enumeration.
pub trait InterceptorSource {
    /// The candidates this source declares, in declaration order
    fn candidates(&self) -> Vec<InterceptorCandidate>;
}

/// The trivial [`InterceptorSource`]: an explicit, ordered list of candidates.
#[derive(Default)]
pub struct CandidateSet {
    items: Vec<InterceptorCandidate>,
}

impl CandidateSet {
    /// Creates an empty set
    #[must_use]
    pub fn new() -> Self {
        CandidateSet { items: Vec::new() }
    }

    /// Appends a candidate
    pub fn push(&mut self, candidate: InterceptorCandidate) {
        self.items.push(candidate);
    }
}

impl From<Vec<InterceptorCandidate>> for CandidateSet {
    fn from(items: Vec<InterceptorCandidate>) -> Self {
        CandidateSet { items }
    }
}

impl InterceptorSource for CandidateSet {
    fn candidates(&self) -> Vec<InterceptorCandidate> {
        self.items.clone()
    }
}

/// A candidate resolved against a concrete target: role, the slot shape the engine
/// will pass, and the code to run.
pub struct Interceptor {
    kind: InterceptorKind,
    name: Arc<str>,
    shape: Vec<SlotDesc>,
    code: InterceptorFn,
}

/// Shared handle to a resolved [`Interceptor`]
pub type InterceptorRc = Arc<Interceptor>;

impl Interceptor {
    /// Builds a resolved interceptor
    #[must_use]
    pub(crate) fn new(
        kind: InterceptorKind,
        name: &str,
        shape: Vec<SlotDesc>,
        code: InterceptorFn,
    ) -> InterceptorRc {
        Arc::new(Interceptor {
            kind,
            name: Arc::from(name),
            shape,
            code,
        })
    }

    /// The interceptor's role
    #[must_use]
    pub fn kind(&self) -> InterceptorKind {
        self.kind
    }

    /// The interceptor's name, for diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot shape the dispatcher passes to this interceptor
    #[must_use]
    pub fn shape(&self) -> &[SlotDesc] {
        &self.shape
    }

    /// Runs the interceptor over a frame of by-reference slots
    pub(crate) fn invoke(&self, frame: &mut [Value]) -> Value {
        (self.code)(frame)
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("kind", &self.kind.to_string())
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// The ordered interceptor lists of one target.
///
/// Both lists are append-only (`boxcar::Vec`), so readers never block appenders and
/// insertion order is preserved exactly.
#[derive(Default)]
pub struct PatchSet {
    prefixes: boxcar::Vec<InterceptorRc>,
    postfixes: boxcar::Vec<InterceptorRc>,
}

impl PatchSet {
    /// Creates an empty patch set
    #[must_use]
    pub fn new() -> Self {
        PatchSet::default()
    }

    /// Appends a prefix; never deduplicates
    pub fn push_prefix(&self, interceptor: InterceptorRc) {
        let _ = self.prefixes.push(interceptor);
    }

    /// Appends a postfix; never deduplicates
    pub fn push_postfix(&self, interceptor: InterceptorRc) {
        let _ = self.postfixes.push(interceptor);
    }

    /// Number of registered prefixes
    #[must_use]
    pub fn prefix_count(&self) -> usize {
        self.prefixes.count()
    }

    /// Number of registered postfixes
    #[must_use]
    pub fn postfix_count(&self) -> usize {
        self.postfixes.count()
    }

    /// The prefixes at this instant, in registration order
    #[must_use]
    pub fn snapshot_prefixes(&self) -> Vec<InterceptorRc> {
        self.prefixes.iter().map(|(_, item)| item.clone()).collect()
    }

    /// The postfixes at this instant, in registration order
    #[must_use]
    pub fn snapshot_postfixes(&self) -> Vec<InterceptorRc> {
        self.postfixes.iter().map(|(_, item)| item.clone()).collect()
    }
}

impl fmt::Debug for PatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchSet")
            .field("prefixes", &self.prefix_count())
            .field("postfixes", &self.postfix_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> InterceptorFn {
        Arc::new(|_| Value::Unit)
    }

    #[test]
    fn test_patch_set_preserves_order() {
        let set = PatchSet::new();
        set.push_prefix(Interceptor::new(
            InterceptorKind::Prefix,
            "first",
            vec![],
            noop(),
        ));
        set.push_prefix(Interceptor::new(
            InterceptorKind::Prefix,
            "second",
            vec![],
            noop(),
        ));

        let names: Vec<_> = set
            .snapshot_prefixes()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_patch_set_keeps_duplicates() {
        let set = PatchSet::new();
        let same = Interceptor::new(InterceptorKind::Postfix, "audit", vec![], noop());
        set.push_postfix(same.clone());
        set.push_postfix(same);

        assert_eq!(set.postfix_count(), 2);
    }

    #[test]
    fn test_candidate_tagging() {
        let candidate = InterceptorCandidate::new("watch", vec![], TypeDesc::Void, noop())
            .tagged(InterceptorKind::Postfix);
        assert_eq!(candidate.tag, Some(InterceptorKind::Postfix));
    }

    #[test]
    fn test_candidate_set_order() {
        let mut source = CandidateSet::new();
        source.push(InterceptorCandidate::new("a", vec![], TypeDesc::Bool, noop()));
        source.push(InterceptorCandidate::new("b", vec![], TypeDesc::Void, noop()));

        let names: Vec<_> = source
            .candidates()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
