//! Integration tests for overload binding through the public binder API.

use std::sync::Arc;

use hostbridge_binder::{BindFailure, Binder, ParamHint, SignatureBindingHints};
use hostbridge_core::{ArrayData, BridgeError, CallContext, HostObject, HostType, HostValue, MethodEntry, ParamEntry};
use hostbridge_registry::TypeRegistry;

fn labelled(params: &[HostType], label: &'static str) -> Arc<MethodEntry> {
    Arc::new(
        MethodEntry::new("F", move |ctx: &mut CallContext| {
            ctx.set_return(label);
            Ok(())
        })
        .with_params(params.iter().map(|ty| ParamEntry::new("p", ty.clone())))
        .returns(HostType::STRING)
        .as_static(),
    )
}

fn overloads() -> Vec<Arc<MethodEntry>> {
    vec![
        labelled(&[HostType::INT32], "int"),
        labelled(&[HostType::INT32, HostType::DOUBLE], "int,double"),
        labelled(&[HostType::DOUBLE, HostType::INT32], "double,int"),
    ]
}

fn call(registry: &TypeRegistry, methods: &[Arc<MethodEntry>], args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    Binder::without_callbacks(registry).call_method(&HostType::named("Demo.Calc"), "F", methods, None, args)
}

#[test]
fn host_typed_arguments_pick_the_exact_overload() {
    let registry = TypeRegistry::with_builtins();
    let methods = overloads();

    let results = call(&registry, &methods, &[HostValue::I32(1), HostValue::F64(2.0)]).unwrap();
    assert_eq!(results, vec![HostValue::from("int,double")]);

    let results = call(&registry, &methods, &[HostValue::F64(1.0)]).unwrap();
    assert_eq!(results, vec![HostValue::from("int")]);
}

#[test]
fn foreign_numbers_are_ambiguous_between_mirrored_overloads() {
    let registry = TypeRegistry::with_builtins();
    let methods = overloads();
    let args = [HostValue::F64(1.0), HostValue::F64(2.0)];

    let binder = Binder::without_callbacks(&registry);
    assert!(matches!(binder.bind_to_method(&methods, &args), Err(BindFailure::Ambiguous)));
    assert!(matches!(call(&registry, &methods, &args), Err(BridgeError::AmbiguousMatch(_))));

    let hints = SignatureBindingHints::new(
        vec![ParamHint::Name("Double".to_string()), ParamHint::Type(HostType::INT32)],
        None,
    );
    let selected = hints.select(&registry, &methods);
    assert_eq!(selected.len(), 1);
    assert_eq!(call(&registry, &selected, &args).unwrap(), vec![HostValue::from("double,int")]);
}

#[test]
fn no_applicable_overload_names_the_call() {
    let registry = TypeRegistry::with_builtins();
    let methods = overloads();

    let error = call(&registry, &methods, &[HostValue::from("text")]).unwrap_err();
    let BridgeError::MissingMethod(message) = &error else {
        panic!("expected MissingMethod, got {error:?}");
    };
    assert!(message.starts_with("'F("), "{message}");
    assert!(message.contains("is not a member of type"), "{message}");
}

#[test]
fn param_arrays_pack_excess_arguments() {
    let registry = TypeRegistry::with_builtins();
    let sum = Arc::new(
        MethodEntry::new("Sum", |ctx: &mut CallContext| {
            let values: HostObject = ctx.arg(0)?;
            let total = values
                .with(|array: &ArrayData| array.elements().iter().filter_map(HostValue::as_f64).sum::<f64>())
                .unwrap_or_default();
            ctx.set_return(total as i32);
            Ok(())
        })
        .with_param(ParamEntry::params("values", HostType::INT32))
        .returns(HostType::INT32)
        .as_static(),
    );
    let binder = Binder::without_callbacks(&registry);

    let bound = binder
        .bind_to_method(&[Arc::clone(&sum)], &[HostValue::F64(1.0), HostValue::F64(2.0), HostValue::F64(3.0)])
        .unwrap();
    assert_eq!(bound.args.len(), 1);
    assert_eq!(binder.invoke(bound, None).unwrap(), vec![HostValue::I32(6)]);

    let bound = binder.bind_to_method(&[sum], &[]).unwrap();
    assert_eq!(binder.invoke(bound, None).unwrap(), vec![HostValue::I32(0)]);
}

#[test]
fn optional_parameters_take_their_defaults() {
    let registry = TypeRegistry::with_builtins();
    let pad = Arc::new(
        MethodEntry::new("Pad", |ctx: &mut CallContext| {
            let text: String = ctx.arg(0)?;
            let width: i32 = ctx.arg(1)?;
            let width = usize::try_from(width).unwrap_or_default();
            ctx.set_return(format!("{text:>width$}"));
            Ok(())
        })
        .with_param(ParamEntry::new("text", HostType::STRING))
        .with_param(ParamEntry::new("width", HostType::INT32).optional(4i32))
        .returns(HostType::STRING)
        .as_static(),
    );
    let binder = Binder::without_callbacks(&registry);

    let bound = binder.bind_to_method(&[Arc::clone(&pad)], &[HostValue::from("ab")]).unwrap();
    assert_eq!(bound.args[1], HostValue::I32(4));
    assert_eq!(binder.invoke(bound, None).unwrap(), vec![HostValue::from("  ab")]);

    let bound = binder
        .bind_to_method(&[pad], &[HostValue::from("ab"), HostValue::F64(3.0)])
        .unwrap();
    assert_eq!(binder.invoke(bound, None).unwrap(), vec![HostValue::from(" ab")]);
}
