//! The helper library table installed as a foreign global.
//!
//! ```text
//! clr.Type('Demo.Widget')              static context of a registered type
//! clr.NewDelegate(Handler, fn)         delegate from a function or method group
//! clr.AddHandler(obj.Changed, fn)      event subscription
//! clr.RemoveHandler(obj.Changed, fn)
//! clr.Is(value, T), clr.As(value, T)   instance checks
//! clr.Int64('9007199254740993')        exact 64-bit integers
//! clr.UInt64(n)
//! ```

use hostbridge_core::{BridgeError, HostType, HostValue};
use hostbridge_foreign::ForeignValue;

use crate::state::{LockedState, native_body};
use crate::targets::{StaticContext, Target};

type LibraryFn = fn(&LockedState<'_>, &[HostValue]) -> Result<Vec<HostValue>, BridgeError>;

const FUNCTIONS: [(&str, LibraryFn); 8] = [
    ("Type", type_of),
    ("NewDelegate", new_delegate),
    ("AddHandler", add_handler),
    ("RemoveHandler", remove_handler),
    ("Is", is),
    ("As", as_type),
    ("Int64", int64),
    ("UInt64", uint64),
];

const I64_END: f64 = 9_223_372_036_854_775_808.0;
const U64_END: f64 = 18_446_744_073_709_551_616.0;

impl LockedState<'_> {
    /// Create the library table and store it in the global `name`.
    pub(crate) fn install_library(&self, name: &str) -> Result<(), BridgeError> {
        let foreign = self.foreign();
        let table = foreign.new_table();
        for &(function_name, body) in &FUNCTIONS {
            let native = native_body(&self.weak(), move |state| {
                let args = state
                    .foreign()
                    .frame_values()
                    .iter()
                    .map(|value| state.to_host(value))
                    .collect::<Result<Vec<_>, _>>()?;
                let results = body(state, &args)?;
                state.foreign().set_top(0);
                state.push_results(&results)
            });
            let function = foreign.new_closure(Some(function_name), Vec::new(), native);
            foreign
                .raw_set(&table, ForeignValue::from(function_name), function)
                .map_err(|e| self.error_from_foreign(e))?;
        }
        foreign.set_global(name, table);
        tracing::debug!(name, functions = FUNCTIONS.len(), "installed helper library");
        Ok(())
    }
}

fn arg(args: &[HostValue], index: usize) -> &HostValue {
    const NULL: &HostValue = &HostValue::Null;
    args.get(index).unwrap_or(NULL)
}

/// A type argument: a static context (possibly hinted) or a type name.
fn type_arg(state: &LockedState<'_>, args: &[HostValue], index: usize) -> Result<HostType, BridgeError> {
    match arg(args, index) {
        HostValue::String(name) => lookup_type(state, name),
        value => Target::of(value)
            .filter(Target::is_static)
            .map(|target| target.ty)
            .ok_or_else(|| {
                BridgeError::Argument(format!(
                    "bad argument #{} (type expected, got {})",
                    index + 1,
                    state.registry().value_type_name(value)
                ))
            }),
    }
}

fn lookup_type(state: &LockedState<'_>, name: &str) -> Result<HostType, BridgeError> {
    state
        .registry()
        .get_by_name(name)
        .map(|entry| HostType::Named(entry.type_hash))
        .ok_or_else(|| BridgeError::Argument(format!("Type '{name}' is not registered")))
}

fn type_of(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let ty = type_arg(state, args, 0)?;
    Ok(vec![HostValue::Object(StaticContext::new(ty).into_object())])
}

fn new_delegate(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let ty = type_arg(state, args, 0)?;
    let delegate = state.new_delegate(&ty, arg(args, 1))?;
    Ok(vec![HostValue::Object(delegate)])
}

fn add_handler(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    state.add_handler(arg(args, 0), arg(args, 1))?;
    Ok(Vec::new())
}

fn remove_handler(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    state.remove_handler(arg(args, 0), arg(args, 1))?;
    Ok(Vec::new())
}

fn is(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let ty = type_arg(state, args, 1)?;
    Ok(vec![HostValue::Bool(state.registry().is_instance_of(arg(args, 0), &ty))])
}

fn as_type(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let ty = type_arg(state, args, 1)?;
    let value = arg(args, 0);
    Ok(vec![if state.registry().is_instance_of(value, &ty) {
        value.clone()
    } else {
        HostValue::Null
    }])
}

fn int64(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let value = arg(args, 0);
    let parsed = match value {
        HostValue::String(text) => text.trim().parse::<i64>().ok(),
        HostValue::I64(v) => Some(*v),
        HostValue::U64(v) => i64::try_from(*v).ok(),
        other => other
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (-I64_END..I64_END).contains(n))
            .map(|n| n as i64),
    };
    parsed
        .map(|v| vec![HostValue::I64(v)])
        .ok_or_else(|| not_representable(state, value, "Int64"))
}

fn uint64(state: &LockedState<'_>, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
    let value = arg(args, 0);
    let parsed = match value {
        HostValue::String(text) => text.trim().parse::<u64>().ok(),
        HostValue::U64(v) => Some(*v),
        HostValue::I64(v) => u64::try_from(*v).ok(),
        other => other
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (0.0..U64_END).contains(n))
            .map(|n| n as u64),
    };
    parsed
        .map(|v| vec![HostValue::U64(v)])
        .ok_or_else(|| not_representable(state, value, "UInt64"))
}

fn not_representable(state: &LockedState<'_>, value: &HostValue, type_name: &str) -> BridgeError {
    BridgeError::Argument(format!(
        "'{}' cannot be represented as {type_name}",
        state.describe(value)
    ))
}
