//! The failure taxonomy of registration and installation, through the public API.

use repatch::prelude::*;
use std::sync::Arc;

fn noop_prefix() -> InterceptorFn {
    Arc::new(|_| Value::Bool(true))
}

fn define_add(functions: &FunctionTable) -> FunctionRc {
    functions.define(
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

fn fresh_registry() -> (PatchRegistry, FunctionId) {
    let functions = Arc::new(FunctionTable::new());
    let target = define_add(&functions);
    let id = target.id().clone();
    (
        PatchRegistry::new(Arc::new(CodeArena::new().unwrap()), functions),
        id,
    )
}

#[test]
fn missing_target_names_the_requested_shape() {
    let (registry, _) = fresh_registry();
    let ghost = FunctionId::new("Calculator", "subtract", vec![TypeDesc::I32, TypeDesc::I32]);
    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::Bool, noop_prefix())
            .tagged(InterceptorKind::Prefix),
    ]);

    match registry.register(&ghost, &source) {
        Err(Error::MissingTarget { target }) => {
            assert_eq!(target, "Calculator.subtract(i32, i32)");
        }
        other => panic!("expected MissingTarget, got {other:?}"),
    }
}

#[test]
fn missing_target_message_rendering() {
    let (registry, _) = fresh_registry();
    let ghost = FunctionId::new("Ghost", "walk", vec![]);
    let source = CandidateSet::new();

    let message = registry.register(&ghost, &source).unwrap_err().to_string();
    assert_eq!(message, "No function found for Ghost.walk()");
}

#[test]
fn no_interceptor_match_reports_both_expected_shapes() {
    let (registry, id) = fresh_registry();

    // A name that matches neither convention nor carries a tag
    let source = CandidateSet::from(vec![InterceptorCandidate::new(
        "observer",
        vec![],
        TypeDesc::Void,
        Arc::new(|_| Value::Unit),
    )]);

    match registry.register(&id, &source) {
        Err(Error::NoInterceptorMatch {
            target,
            prefix_shape,
            postfix_shape,
        }) => {
            assert_eq!(target, "Calculator.add(i32, i32)");
            assert_eq!(prefix_shape, "(&mut i32, &mut i32, &mut i32)");
            assert_eq!(postfix_shape, "(&mut i32, &mut i32, &mut i32)");
        }
        other => panic!("expected NoInterceptorMatch, got {other:?}"),
    }
}

#[test]
fn conventional_name_with_wrong_shape_does_not_resolve() {
    let (registry, id) = fresh_registry();

    // Right name, one slot short
    let source = CandidateSet::from(vec![InterceptorCandidate::new(
        "prefix",
        vec![SlotDesc::by_ref(TypeDesc::I32)],
        TypeDesc::Bool,
        noop_prefix(),
    )]);

    assert!(matches!(
        registry.register(&id, &source),
        Err(Error::NoInterceptorMatch { .. })
    ));
}

#[test]
fn prefix_with_non_bool_return_is_rejected() {
    let (registry, id) = fresh_registry();
    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::I32, Arc::new(|_| Value::I32(0)))
            .tagged(InterceptorKind::Prefix),
    ]);

    let error = registry.register(&id, &source).unwrap_err();
    assert_eq!(
        error.to_string(),
        "Prefix 'gate' must return bool (return true to execute the original) - found i32"
    );
    assert!(!registry.is_patched(&id));
}

#[test]
fn postfix_with_return_value_is_rejected() {
    let (registry, id) = fresh_registry();
    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("audit", vec![], TypeDesc::Bool, Arc::new(|_| Value::Unit))
            .tagged(InterceptorKind::Postfix),
    ]);

    let error = registry.register(&id, &source).unwrap_err();
    assert_eq!(
        error.to_string(),
        "Postfix 'audit' must not return anything - found bool"
    );
}

#[test]
fn failed_registration_is_free_of_side_effects() {
    let (registry, id) = fresh_registry();
    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::I32, Arc::new(|_| Value::I32(0)))
            .tagged(InterceptorKind::Prefix),
    ]);

    let _ = registry.register(&id, &source);
    assert!(!registry.is_patched(&id));
    assert!(registry.original(&id).is_none());
    assert!(registry.dispatcher(&id).is_none());
    assert!(registry.patch_set(&id).is_none());

    // The target still runs its own logic
    let value = registry.call(&id, &[Value::I32(2), Value::I32(3)]).unwrap();
    assert_eq!(value, Value::I32(5));
}

#[test]
fn detour_install_fails_on_undersized_regions() {
    // Entry areas too small for the wide jump pattern
    let config = ArenaConfig {
        entry_size: 8,
        ..ArenaConfig::default()
    };
    let functions = Arc::new(FunctionTable::new());
    let target = define_add(&functions);
    let registry = PatchRegistry::new(
        Arc::new(CodeArena::with_config(config).unwrap()),
        functions,
    );

    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::Bool, noop_prefix())
            .tagged(InterceptorKind::Prefix),
    ]);

    assert!(matches!(
        registry.register(target.id(), &source),
        Err(Error::DetourInstall { .. })
    ));
}

#[test]
fn detour_install_fails_on_write_protected_regions() {
    let functions = Arc::new(FunctionTable::new());
    let target = define_add(&functions);
    let arena = Arc::new(CodeArena::new().unwrap());
    let registry = PatchRegistry::new(arena.clone(), functions);

    // Force the target resident, then lock its region down
    let entry = target.prepare(arena.as_ref()).unwrap();
    arena
        .protect(entry, RegionFlags::READ | RegionFlags::EXEC)
        .unwrap();

    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::Bool, noop_prefix())
            .tagged(InterceptorKind::Prefix),
    ]);

    let error = registry.register(target.id(), &source).unwrap_err();
    assert!(matches!(error, Error::DetourInstall { .. }));
    assert!(error.to_string().starts_with("Failed to install detour"));

    // A failed install publishes nothing
    assert!(!registry.is_patched(target.id()));
    assert!(registry.patch_set(target.id()).is_none());
    assert!(registry.dispatcher(target.id()).is_none());
}

#[test]
fn exhausted_arena_fails_preparation() {
    let config = ArenaConfig {
        capacity: 16,
        ..ArenaConfig::default()
    };
    let functions = Arc::new(FunctionTable::new());
    let target = define_add(&functions);
    let registry = PatchRegistry::new(
        Arc::new(CodeArena::with_config(config).unwrap()),
        functions,
    );

    // The single 16-byte slot is taken by the target itself; preserving the
    // original has nowhere to go.
    let source = CandidateSet::from(vec![
        InterceptorCandidate::new("gate", vec![], TypeDesc::Bool, noop_prefix())
            .tagged(InterceptorKind::Prefix),
    ]);

    assert!(registry.register(target.id(), &source).is_err());
}

#[test]
fn clone_failure_reports_target_and_reason() {
    let arena = CodeArena::new().unwrap();

    // Duplicating an address nothing lives at is the preserver's failure mode
    let error = arena
        .duplicate(CodeAddress::new(0xDEAD_BEEF), "add_original")
        .unwrap_err();
    match error {
        Error::CloneFailure { target: at, reason } => {
            assert_eq!(at, "0xdeadbeef");
            assert!(reason.contains("no code region"));
        }
        other => panic!("expected CloneFailure, got {other:?}"),
    }
}
