//! Dispatcher builder: generates the callable that runs a target's interceptor
//! chains around its preserved original.
//!
//! # Call Protocol
//!
//! One dispatcher invocation proceeds in three phases:
//!
//! 1. Every prefix runs in registration order while the run flag holds. A prefix sees
//!    the receiver slot (instance-bound targets), the result slot (non-void targets)
//!    and every non-output-only parameter, all by reference; its `false` verdict
//!    clears the run flag and suppresses the original.
//! 2. The preserved original runs if the flag still holds, directly over the live
//!    slots; a non-void return value lands in the result slot and its parameter
//!    writes (output-only results included) stay visible to the postfix chain.
//! 3. Every postfix runs unconditionally, in registration order, over the same
//!    leading slots plus *all* parameters including output-only ones.
//!
//! The dispatcher returns the final content of the result slot, so a prefix that
//! writes the slot and vetoes the original substitutes its own return value.
//!
//! By-reference slots are realized as copy-in/copy-out frames: slot values are copied
//! into the interceptor's frame and copied back after it returns. Interceptors in one
//! chain run serially, so the frames observe each other's writes exactly as shared
//! slots would. Object values alias through their shared handle either way.

use std::sync::Arc;

use crate::patch::interceptor::PatchSet;
use crate::runtime::address::CodeAddress;
use crate::runtime::arena::{BodyFn, CodeBackend};
use crate::runtime::function::FunctionRc;
use crate::runtime::value::Value;
use crate::{Error, Result};

/// Defines a fresh dispatcher for `target` over the interceptors currently in
/// `patches`, wired to call `original` when no prefix vetoes.
///
/// The dispatcher is bound to a snapshot of the patch set: registrations after this
/// call do not affect it. The registry rebuilds and re-targets the detour on every
/// registration, superseding earlier dispatchers.
///
/// # Errors
/// Propagates backend definition failures.
pub fn build(
    backend: &dyn CodeBackend,
    target: &FunctionRc,
    original: CodeAddress,
    patches: &PatchSet,
) -> Result<CodeAddress> {
    let prefixes = patches.snapshot_prefixes();
    let postfixes = patches.snapshot_postfixes();

    let id = target.id().to_string();
    let has_receiver = target.is_instance_bound();
    let returns = target.returns().clone();
    let out_flags: Vec<bool> = target.params().iter().map(|p| p.is_output_only()).collect();
    let arg_count = target.arg_count();

    let body: BodyFn = Arc::new(move |backend, args| {
        if args.len() != arg_count {
            return Err(Error::Invocation(format!(
                "call to '{id}' passed {} arguments, expected {arg_count}",
                args.len()
            )));
        }

        let has_result = !returns.is_void();
        let mut result = returns.default_value();
        let mut run = true;

        for prefix in &prefixes {
            if !run {
                break;
            }

            let mut frame = leading_slots(args, has_receiver, has_result, &result);
            for (index, skip) in out_flags.iter().enumerate() {
                if !skip {
                    frame.push(args[param_slot(index, has_receiver)].clone());
                }
            }

            let verdict = prefix.invoke(&mut frame);

            let mut cursor = write_leading(args, &frame, has_receiver, has_result, &mut result);
            for (index, skip) in out_flags.iter().enumerate() {
                if !skip {
                    args[param_slot(index, has_receiver)] = frame[cursor].clone();
                    cursor += 1;
                }
            }

            match verdict {
                Value::Bool(keep_going) => run = keep_going,
                other => {
                    return Err(Error::Invocation(format!(
                        "prefix '{}' produced {} instead of a bool verdict",
                        prefix.name(),
                        other.type_desc()
                    )));
                }
            }
        }

        if run {
            let returned = backend.call_frame(original, args)?;
            if has_result {
                result = returned;
            }
        }

        for postfix in &postfixes {
            let mut frame = leading_slots(args, has_receiver, has_result, &result);
            for index in 0..out_flags.len() {
                frame.push(args[param_slot(index, has_receiver)].clone());
            }

            let _ = postfix.invoke(&mut frame);

            let mut cursor = write_leading(args, &frame, has_receiver, has_result, &mut result);
            for index in 0..out_flags.len() {
                args[param_slot(index, has_receiver)] = frame[cursor].clone();
                cursor += 1;
            }
        }

        Ok(if has_result { result } else { Value::Unit })
    });

    backend.define(&format!("{}_dispatcher", target.name()), body)
}

fn param_slot(index: usize, has_receiver: bool) -> usize {
    index + usize::from(has_receiver)
}

fn leading_slots(
    args: &[Value],
    has_receiver: bool,
    has_result: bool,
    result: &Value,
) -> Vec<Value> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    if has_receiver {
        frame.push(args[0].clone());
    }
    if has_result {
        frame.push(result.clone());
    }
    frame
}

/// Copies the receiver and result slots back out of `frame`; returns the index of
/// the first parameter slot.
fn write_leading(
    args: &mut [Value],
    frame: &[Value],
    has_receiver: bool,
    has_result: bool,
    result: &mut Value,
) -> usize {
    let mut cursor = 0;
    if has_receiver {
        args[0] = frame[cursor].clone();
        cursor += 1;
    }
    if has_result {
        *result = frame[cursor].clone();
        cursor += 1;
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::interceptor::{Interceptor, InterceptorFn, InterceptorKind};
    use crate::runtime::arena::CodeArena;
    use crate::runtime::function::{Function, FunctionFlags, ParameterDescriptor};
    use crate::runtime::value::{ObjectData, TypeDesc};

    fn add_target() -> FunctionRc {
        Function::new(
            "Calculator",
            "add",
            FunctionFlags::STATIC,
            vec![
                ParameterDescriptor::new("a", TypeDesc::I32),
                ParameterDescriptor::new("b", TypeDesc::I32),
            ],
            TypeDesc::I32,
            Arc::new(|_, args| Ok(Value::I32(args[0].as_i32()? + args[1].as_i32()?))),
        )
    }

    fn prefix(name: &str, code: InterceptorFn) -> crate::patch::interceptor::InterceptorRc {
        Interceptor::new(InterceptorKind::Prefix, name, vec![], code)
    }

    fn postfix(name: &str, code: InterceptorFn) -> crate::patch::interceptor::InterceptorRc {
        Interceptor::new(InterceptorKind::Postfix, name, vec![], code)
    }

    fn prepared(arena: &CodeArena, target: &FunctionRc) -> CodeAddress {
        target.prepare(arena).unwrap()
    }

    #[test]
    fn test_empty_patch_set_passes_through() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let dispatcher = build(&arena, &target, original, &PatchSet::new()).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(5));
    }

    #[test]
    fn test_prefix_veto_substitutes_result() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_prefix(prefix(
            "gate",
            Arc::new(|frame| {
                frame[0] = Value::I32(99);
                Value::Bool(false)
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(99));
    }

    #[test]
    fn test_prefix_can_rewrite_arguments() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        // Frame layout for this target: [result, a, b]
        set.push_prefix(prefix(
            "double_a",
            Arc::new(|frame| {
                if let Value::I32(a) = frame[1] {
                    frame[1] = Value::I32(a * 2);
                }
                Value::Bool(true)
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(7));
    }

    #[test]
    fn test_postfix_transforms_result() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_postfix(postfix(
            "double_result",
            Arc::new(|frame| {
                if let Value::I32(r) = frame[0] {
                    frame[0] = Value::I32(r * 2);
                }
                Value::Unit
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(10));
    }

    #[test]
    fn test_postfix_runs_after_veto() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_prefix(prefix("gate", Arc::new(|_| Value::Bool(false))));
        set.push_postfix(postfix(
            "floor",
            Arc::new(|frame| {
                frame[0] = Value::I32(-1);
                Value::Unit
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(-1));
    }

    #[test]
    fn test_veto_skips_later_prefixes() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_prefix(prefix("gate", Arc::new(|_| Value::Bool(false))));
        set.push_prefix(prefix(
            "never",
            Arc::new(|frame| {
                frame[0] = Value::I32(1234);
                Value::Bool(true)
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(value, Value::I32(0));
    }

    #[test]
    fn test_non_bool_verdict_is_an_error() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_prefix(prefix("broken", Arc::new(|_| Value::I32(1))));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let result = arena.call(dispatcher, &[Value::I32(2), Value::I32(3)]);
        assert!(matches!(result, Err(Error::Invocation(_))));
    }

    #[test]
    fn test_arity_mismatch() {
        let arena = CodeArena::new().unwrap();
        let target = add_target();
        let original = prepared(&arena, &target);

        let dispatcher = build(&arena, &target, original, &PatchSet::new()).unwrap();
        let result = arena.call(dispatcher, &[Value::I32(2)]);
        assert!(matches!(result, Err(Error::Invocation(_))));
    }

    #[test]
    fn test_receiver_slot_replacement_reaches_original() {
        let arena = CodeArena::new().unwrap();
        let target = Function::new(
            "Widget",
            "describe",
            FunctionFlags::empty(),
            vec![],
            TypeDesc::Str,
            Arc::new(|_, args| {
                let receiver = args[0].as_object()?;
                Ok(Value::str(receiver.class()))
            }),
        );
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        set.push_prefix(prefix(
            "swap_receiver",
            Arc::new(|frame| {
                frame[0] = Value::Object(ObjectData::new("Gadget"));
                Value::Bool(true)
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::Object(ObjectData::new("Widget"))])
            .unwrap();
        assert_eq!(value, Value::str("Gadget"));
    }

    #[test]
    fn test_output_only_parameter_flow() {
        let arena = CodeArena::new().unwrap();
        // bool Parser.try_read(str input, out i32 value)
        let target = Function::new(
            "Parser",
            "try_read",
            FunctionFlags::STATIC,
            vec![
                ParameterDescriptor::new("input", TypeDesc::Str),
                ParameterDescriptor::output("value", TypeDesc::I32),
            ],
            TypeDesc::Bool,
            Arc::new(|_, args| {
                let text = args[0].as_str()?.to_string();
                match text.parse::<i32>() {
                    Ok(parsed) => {
                        args[1] = Value::I32(parsed);
                        Ok(Value::Bool(true))
                    }
                    Err(_) => Ok(Value::Bool(false)),
                }
            }),
        );
        let original = prepared(&arena, &target);

        let shapes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let out_seen: Arc<std::sync::Mutex<Option<Value>>> = Arc::default();
        let set = PatchSet::new();
        // Prefix frame: [result, input] (no output-only slot)
        let log = shapes.clone();
        set.push_prefix(prefix(
            "check_shape",
            Arc::new(move |frame| {
                log.lock().unwrap().push(frame.len());
                Value::Bool(true)
            }),
        ));
        // Postfix frame: [result, input, value], holding what the original stored
        let log = shapes.clone();
        let observed = out_seen.clone();
        set.push_postfix(postfix(
            "observe_out",
            Arc::new(move |frame| {
                log.lock().unwrap().push(frame.len());
                *observed.lock().unwrap() = Some(frame[2].clone());
                Value::Unit
            }),
        ));

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        let value = arena
            .call(dispatcher, &[Value::str("41"), Value::I32(0)])
            .unwrap();
        assert_eq!(value, Value::Bool(true));
        assert_eq!(*shapes.lock().unwrap(), vec![2, 3]);
        assert_eq!(*out_seen.lock().unwrap(), Some(Value::I32(41)));
    }

    #[test]
    fn test_ordering_across_phases() {
        let arena = CodeArena::new().unwrap();
        let trace: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::default();

        let log = trace.clone();
        let target = Function::new(
            "Probe",
            "fire",
            FunctionFlags::STATIC,
            vec![],
            TypeDesc::Void,
            Arc::new(move |_, _| {
                log.lock().unwrap().push("original");
                Ok(Value::Unit)
            }),
        );
        let original = prepared(&arena, &target);

        let set = PatchSet::new();
        for name in ["p1", "p2"] {
            let log = trace.clone();
            set.push_prefix(prefix(
                name,
                Arc::new(move |_| {
                    log.lock().unwrap().push(name);
                    Value::Bool(true)
                }),
            ));
        }
        for name in ["s1", "s2"] {
            let log = trace.clone();
            set.push_postfix(postfix(
                name,
                Arc::new(move |_| {
                    log.lock().unwrap().push(name);
                    Value::Unit
                }),
            ));
        }

        let dispatcher = build(&arena, &target, original, &set).unwrap();
        assert_eq!(arena.call(dispatcher, &[]).unwrap(), Value::Unit);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["p1", "p2", "original", "s1", "s2"]
        );
    }
}
