//! Signature resolver: computes the slot shapes interceptors must take for a given
//! target and resolves candidates against them.
//!
//! # Expected shapes
//!
//! For a target `Ret Owner.name(p1, .., pn)`:
//!
//! - **Prefix**: `&mut Owner` (instance-bound targets only), then `&mut Ret` (non-void
//!   targets only), then `&mut pi` for every parameter that is *not* output-only, in
//!   declaration order. Prefixes declare a `bool` return; `true` means continue,
//!   `false` suppresses the original call.
//! - **Postfix**: the same leading slots, then `&mut pi` for *every* parameter,
//!   including output-only ones. Postfixes declare no return.
//!
//! # Resolution
//!
//! An explicitly tagged candidate is preferred for its role; without one, the
//! conventional names `prefix` / `postfix` are matched together with an exact
//! parameter-list comparison. Return-type contracts are enforced for whichever
//! candidate resolves.

use crate::patch::interceptor::{
    Interceptor, InterceptorCandidate, InterceptorKind, InterceptorRc, InterceptorSource,
};
use crate::runtime::function::Function;
use crate::runtime::value::{SlotDesc, TypeDesc};
use crate::{Error, Result};

/// The outcome of resolving a source against a target: at least one of the two roles
/// is populated.
#[derive(Debug)]
pub struct ResolvedPatch {
    /// The resolved prefix, if the source offered one
    pub prefix: Option<InterceptorRc>,
    /// The resolved postfix, if the source offered one
    pub postfix: Option<InterceptorRc>,
}

/// Computes the slot shape a prefix for `target` must take.
#[must_use]
pub fn prefix_shape(target: &Function) -> Vec<SlotDesc> {
    role_shape(target, true)
}

/// Computes the slot shape a postfix for `target` must take.
#[must_use]
pub fn postfix_shape(target: &Function) -> Vec<SlotDesc> {
    role_shape(target, false)
}

fn role_shape(target: &Function, skip_output_only: bool) -> Vec<SlotDesc> {
    let mut shape = Vec::with_capacity(target.params().len() + 2);

    if target.is_instance_bound() {
        shape.push(SlotDesc::by_ref(TypeDesc::class(target.owner())));
    }
    if !target.returns().is_void() {
        shape.push(SlotDesc::by_ref(target.returns().clone()));
    }
    for param in target.params() {
        if skip_output_only && param.is_output_only() {
            continue;
        }
        shape.push(SlotDesc::by_ref(param.ty.clone()));
    }

    shape
}

fn render_shape(shape: &[SlotDesc]) -> String {
    let slots: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("({})", slots.join(", "))
}

fn conventional_name(kind: InterceptorKind) -> &'static str {
    match kind {
        InterceptorKind::Prefix => "prefix",
        InterceptorKind::Postfix => "postfix",
    }
}

/// Finds the candidate for one role: an explicit tag wins; otherwise the conventional
/// name with an exactly matching parameter list.
fn find_candidate<'a>(
    candidates: &'a [InterceptorCandidate],
    kind: InterceptorKind,
    expected: &[SlotDesc],
) -> Option<&'a InterceptorCandidate> {
    candidates
        .iter()
        .find(|candidate| candidate.tag == Some(kind))
        .or_else(|| {
            candidates.iter().find(|candidate| {
                candidate.tag.is_none()
                    && candidate.name == conventional_name(kind)
                    && candidate.params == expected
            })
        })
}

fn resolve_role(
    candidates: &[InterceptorCandidate],
    kind: InterceptorKind,
    expected: &[SlotDesc],
) -> Result<Option<InterceptorRc>> {
    let Some(candidate) = find_candidate(candidates, kind, expected) else {
        return Ok(None);
    };

    match kind {
        InterceptorKind::Prefix => {
            if candidate.returns != TypeDesc::Bool {
                return Err(Error::InvalidPrefixSignature {
                    name: candidate.name.clone(),
                    found: candidate.returns.to_string(),
                });
            }
        }
        InterceptorKind::Postfix => {
            if !candidate.returns.is_void() {
                return Err(Error::InvalidPostfixSignature {
                    name: candidate.name.clone(),
                    found: candidate.returns.to_string(),
                });
            }
        }
    }

    Ok(Some(Interceptor::new(
        kind,
        &candidate.name,
        expected.to_vec(),
        candidate.code.clone(),
    )))
}

/// Resolves a declaring source against a target.
///
/// # Errors
/// Returns [`Error::NoInterceptorMatch`] if neither role resolves, or the relevant
/// signature error if a resolved candidate violates its role's return contract.
pub fn resolve(target: &Function, source: &dyn InterceptorSource) -> Result<ResolvedPatch> {
    let candidates = source.candidates();
    let prefix_expected = prefix_shape(target);
    let postfix_expected = postfix_shape(target);

    let prefix = resolve_role(&candidates, InterceptorKind::Prefix, &prefix_expected)?;
    let postfix = resolve_role(&candidates, InterceptorKind::Postfix, &postfix_expected)?;

    if prefix.is_none() && postfix.is_none() {
        return Err(Error::NoInterceptorMatch {
            target: target.id().to_string(),
            prefix_shape: render_shape(&prefix_expected),
            postfix_shape: render_shape(&postfix_expected),
        });
    }

    Ok(ResolvedPatch { prefix, postfix })
}
