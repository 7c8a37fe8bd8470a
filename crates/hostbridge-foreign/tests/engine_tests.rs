//! Integration tests for the foreign engine through its public surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hostbridge_foreign::{ForeignError, ForeignState, ForeignValue, Status, WeakMode};

fn add(state: &ForeignState) -> Result<usize, ForeignError> {
    let a = state.get(1).as_number().unwrap_or_default();
    let b = state.get(2).as_number().unwrap_or_default();
    state.push(a + b);
    Ok(1)
}

#[test]
fn protected_calls_return_results_or_the_error_value() {
    let state = ForeignState::new();
    let function = state.new_function(add);
    let results = state
        .pcall_value(&function, &[1.0.into(), 2.0.into()], None)
        .expect("call");
    assert_eq!(results, vec![ForeignValue::number(3.0)]);

    let failing = state.new_function(|_| Err(ForeignError::message("boom")));
    let failure = state.pcall_value(&failing, &[], None).expect_err("raised");
    assert_eq!(failure.status, Status::RuntimeError);
    assert_eq!(failure.value, ForeignValue::from("boom"));
    assert_eq!(state.top(), 0);
}

#[test]
fn weak_valued_tables_drop_unreachable_values() {
    let state = ForeignState::new();
    let weak = state.new_table_with_mode(WeakMode::Values);
    let key = state.reference(weak.clone());

    let kept = state.new_table();
    state.set_global("kept", kept.clone());
    state.raw_set(&weak, 1.0.into(), kept.clone()).expect("set");
    state.raw_set(&weak, 2.0.into(), state.new_table()).expect("set");

    state.collect_garbage();
    assert_eq!(state.raw_get(&weak, &1.0.into()).expect("get"), kept);
    assert!(state.raw_get(&weak, &2.0.into()).expect("get").is_nil());
    assert!(state.unreference(key));
}

#[test]
fn finalizers_run_once_per_unreachable_userdata() {
    let state = ForeignState::new();
    let finalized = Arc::new(AtomicUsize::new(0));
    let (metatable, created) = state.new_metatable("Counted");
    assert!(created);

    let seen = Arc::clone(&finalized);
    let finalizer = state.new_function(move |state| {
        assert_eq!(state.userdata_id(&state.get(1)), Some(7));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    });
    state.raw_set(&metatable, "__gc".into(), finalizer).expect("set");

    let userdata = state.new_userdata(7, Some(&metatable));
    state.set_global("live", userdata);
    state.collect_garbage();
    assert_eq!(finalized.load(Ordering::SeqCst), 0);

    state.set_global("live", ForeignValue::Nil);
    state.collect_garbage();
    state.collect_garbage();
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}

#[test]
fn referenced_values_survive_collection() {
    let state = ForeignState::new();
    let table = state.new_table();
    let key = state.reference(table.clone());
    let before = state.reference_count();

    state.collect_garbage();
    assert_eq!(state.dereference(key), table);

    assert!(state.unreference(key));
    assert!(!state.unreference(key));
    assert_eq!(state.reference_count(), before - 1);
}

#[test]
fn threads_share_globals_and_keep_their_own_stack() {
    let state = ForeignState::new();
    state.set_global("shared", "yes");
    state.push(1.0);
    let thread = state.new_thread();

    let (seen, depth) = state
        .with_thread(&thread, |inner| (inner.get_global("shared"), inner.top()))
        .expect("thread");
    assert_eq!(seen, ForeignValue::from("yes"));
    assert_eq!(depth, 0);
    assert_eq!(state.top(), 1);

    assert!(state.with_thread(&ForeignValue::Nil, |_| ()).is_err());
}
