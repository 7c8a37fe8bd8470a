//! Delegates backed by foreign functions, and foreign functions backed by
//! host closures.
//!
//! A foreign function converted to a delegate type gets a thunk: a delegate
//! whose body marshals the `Invoke` arguments, calls the function in
//! protected mode and coerces the results back to the return type and
//! by-ref parameters. Thunks are cached per (function, delegate type) so
//! the same function always converts to the same delegate object, which is
//! what lets an event handler added from the foreign side be removed again.

use std::sync::{Arc, Weak};

use hostbridge_binder::{BindFailure, CallbackFactory};
use hostbridge_core::{
    BridgeError, CallContext, DelegateData, HostObject, HostType, HostValue, MethodEntry, NativeFn, WeakHostObject,
};
use hostbridge_foreign::{ForeignState, ForeignValue, GcRef};
use rustc_hash::FxHashMap;

use crate::foreign_ref::{ForeignFunction, ForeignRef};
use crate::state::{LockedState, Shared, disposed, native_body};
use crate::targets::PartialTarget;

/// Thunks by function identity and delegate type.
///
/// Entries do not keep their thunk alive; dead entries are pruned on
/// insertion.
#[derive(Default)]
pub(crate) struct CallbackCache {
    thunks: FxHashMap<GcRef, FxHashMap<HostType, WeakHostObject>>,
}

impl CallbackCache {
    pub(crate) fn get(&self, function: GcRef, delegate_type: &HostType) -> Option<HostObject> {
        self.thunks.get(&function)?.get(delegate_type)?.upgrade()
    }

    pub(crate) fn insert(&mut self, function: GcRef, delegate_type: HostType, thunk: &HostObject) {
        self.thunks.retain(|_, by_type| {
            by_type.retain(|_, weak| weak.is_alive());
            !by_type.is_empty()
        });
        self.thunks
            .entry(function)
            .or_default()
            .insert(delegate_type, thunk.downgrade());
    }

    pub(crate) fn len(&self) -> usize {
        self.thunks.values().map(FxHashMap::len).sum()
    }
}

impl CallbackFactory for LockedState<'_> {
    fn to_delegate(&self, function: &HostObject, delegate_type: &HostType) -> Result<HostObject, BridgeError> {
        let value = ForeignRef::value_in(function, self)?
            .ok_or_else(|| {
                BridgeError::InvalidCast(format!(
                    "Object of type '{}' is not a foreign function",
                    self.registry().type_name(function.ty())
                ))
            })?;
        let Some(key) = value.gc_ref() else {
            return Err(BridgeError::InvalidCast("Value is not a foreign function".to_string()));
        };

        if let Some(thunk) = self.state().callbacks.borrow().get(key, delegate_type) {
            return Ok(thunk);
        }

        let invoke = self.registry().delegate_invoke(delegate_type).ok_or_else(|| {
            BridgeError::InvalidCast(format!(
                "Type '{}' is not a delegate type",
                self.registry().type_name(delegate_type)
            ))
        })?;
        let thunk = DelegateData::new(thunk_body(function.clone(), self.weak(), invoke)).into_object(delegate_type.clone());
        self.state()
            .callbacks
            .borrow_mut()
            .insert(key, delegate_type.clone(), &thunk);
        tracing::debug!(delegate = %self.registry().type_name(delegate_type), "created callback thunk");
        Ok(thunk)
    }
}

/// Body of a delegate that forwards `Invoke` to a foreign function.
fn thunk_body(function: HostObject, this: Weak<Shared>, invoke: Arc<MethodEntry>) -> NativeFn {
    NativeFn::from_fn(move |ctx: &mut CallContext| {
        let shared = this.upgrade().ok_or_else(disposed)?;
        let state = shared.lock()?;
        let callee = ForeignRef::value_in(&function, &state)?.unwrap_or_default();

        let args: Vec<HostValue> = invoke
            .params
            .iter()
            .zip(ctx.args())
            .filter(|(param, _)| !param.is_out())
            .map(|(_, value)| value.clone())
            .collect();
        state.ensure_stack(args.len() + 1)?;
        let args = args
            .iter()
            .map(|value| state.to_foreign(value))
            .collect::<Result<Vec<_>, _>>()?;

        let handler = state.message_handler();
        let mut results = state
            .foreign()
            .pcall_value(&callee, &args, Some(handler))
            .map_err(|failure| state.error_from_value(&failure.value))?;

        let returns = usize::from(!invoke.returns_void());
        results.resize(returns + invoke.by_ref_count(), ForeignValue::Nil);
        let mut results = results.into_iter();

        if returns == 1 {
            let value = results.next().unwrap_or_default();
            ctx.set_return(state.to_host_as(&value, &invoke.return_type)?);
        }
        let by_ref: Vec<(usize, HostType)> = invoke
            .params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.is_by_ref())
            .map(|(index, param)| (index, param.data_type.clone()))
            .collect();
        for ((index, ty), value) in by_ref.into_iter().zip(results) {
            ctx.set_arg(index, state.to_host_as(&value, &ty)?)?;
        }
        Ok(())
    })
}

/// Message handler for protected calls made by the bridge.
///
/// String errors become runtime errors carrying a traceback of the raising
/// frame; bridge errors pass through untouched.
pub(crate) fn message_handler(foreign: &ForeignState, this: &Weak<Shared>) -> ForeignValue {
    let body = native_body(this, |state| {
        let error = state.foreign().get(1);
        let error = match &error {
            ForeignValue::String(bytes) => {
                let error = BridgeError::Runtime {
                    message: state.config().encoding.decode(bytes),
                    traceback: Some(state.foreign().traceback(None)),
                };
                state.to_foreign(&HostValue::Object(error.into_exception_object()))?
            }
            _ => error,
        };
        state.foreign().push(error);
        Ok(1)
    });
    foreign.new_closure(Some("message_handler"), Vec::new(), body)
}

impl LockedState<'_> {
    /// Create a delegate of `delegate_type` from a foreign function, a method
    /// group, or any value the binder can convert.
    pub fn new_delegate(&self, delegate_type: &HostType, source: &HostValue) -> Result<HostObject, BridgeError> {
        if !self.registry().is_delegate(delegate_type) {
            return Err(BridgeError::Argument(format!(
                "Type '{}' is not a delegate type",
                self.registry().type_name(delegate_type)
            )));
        }
        if let Some(function) = ForeignFunction::from_value(source) {
            return self.to_delegate(function.object(), delegate_type);
        }
        if let Some(partial) = PartialTarget::of(source) {
            return self.delegate_for_method_group(delegate_type, &partial);
        }
        match self.binder().change_type(source.clone(), delegate_type)? {
            HostValue::Object(object) => Ok(object),
            other => Err(BridgeError::InvalidCast(format!(
                "Value of type '{}' cannot be converted to delegate type '{}'",
                self.registry().value_type_name(&other),
                self.registry().type_name(delegate_type)
            ))),
        }
    }

    fn delegate_for_method_group(&self, delegate_type: &HostType, partial: &PartialTarget) -> Result<HostObject, BridgeError> {
        if !partial.is_method_group() {
            return Err(BridgeError::Argument("Must represent a method group".to_string()));
        }
        let registry = self.registry();
        let methods = partial.hinted(registry, partial.methods());
        let method = self
            .binder()
            .select_method_for_delegate(&methods, delegate_type)
            .map_err(|failure| {
                let (name, ty, delegate) = (
                    &partial.name,
                    registry.type_name(&partial.declaring),
                    registry.type_name(delegate_type),
                );
                match failure {
                    BindFailure::Ambiguous => BridgeError::AmbiguousMatch(format!(
                        "'{name}' designates ambiguous members of type '{ty}' that can be used to create a delegate of type '{delegate}'"
                    )),
                    BindFailure::Conversion(error) => error,
                    BindFailure::NoMatch => BridgeError::MissingMethod(format!(
                        "'{name}' is not a member of type '{ty}' that can be used to create a delegate of type '{delegate}'"
                    )),
                }
            })?;

        let this = partial.this.clone();
        let body = NativeFn::from_fn(move |ctx: &mut CallContext| {
            let receiver = if method.is_static() { None } else { this.as_ref() };
            let mut args = ctx.args().to_vec();
            let mut inner = CallContext::new(receiver, &mut args, &method.type_args, &method.declaring_type);
            method.implementation.call(&mut inner)?;
            let ret = inner.take_return();
            for (index, param) in method.params.iter().enumerate() {
                if param.is_by_ref()
                    && let Some(value) = args.get(index)
                {
                    ctx.set_arg(index, value.clone())?;
                }
            }
            ctx.set_return(ret);
            Ok(())
        });
        Ok(DelegateData::new(body).into_object(delegate_type.clone()))
    }

    /// Create a foreign function backed by a host closure.
    ///
    /// The closure receives the arguments as host values and returns the
    /// results. An error is raised into the foreign engine.
    pub fn new_function<F>(&self, body: F) -> Result<ForeignFunction, BridgeError>
    where
        F: Fn(&LockedState<'_>, Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> + Send + Sync + 'static,
    {
        let native = native_body(&self.weak(), move |state| {
            let args = state
                .foreign()
                .frame_values()
                .iter()
                .map(|value| state.to_host(value))
                .collect::<Result<Vec<_>, _>>()?;
            let results = body(state, args)?;
            state.foreign().set_top(0);
            state.push_results(&results)
        });
        let function = self.foreign().new_closure(None, Vec::new(), native);
        ForeignFunction::from_value(&self.foreign_ref(function, HostType::FOREIGN_FUNCTION))
            .ok_or_else(|| BridgeError::runtime("failed to reference new function"))
    }

    /// Number of live callback thunks.
    pub(crate) fn callback_count(&self) -> usize {
        self.state().callbacks.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use hostbridge_core::{ParamEntry, TypeEntry, invoke_delegate};
    use hostbridge_registry::TypeRegistry;

    use crate::{Bridge, BridgeConfig};

    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry
            .register_all([
                TypeEntry::delegate("Demo.Transform", [ParamEntry::new("value", HostType::INT32)], HostType::INT32),
                TypeEntry::delegate(
                    "Demo.TryParse",
                    [
                        ParamEntry::new("text", HostType::STRING),
                        ParamEntry::new("result", HostType::INT32).out(),
                    ],
                    HostType::BOOLEAN,
                ),
            ])
            .expect("register");
        registry
    }

    #[test]
    fn function_becomes_cached_thunk() {
        let bridge = Bridge::new(registry(), BridgeConfig::default());
        let state = bridge.lock().expect("lock");
        let double = state
            .new_function(|_, args| {
                let value = args.first().and_then(HostValue::as_f64).unwrap_or_default();
                Ok(vec![HostValue::F64(value * 2.0)])
            })
            .expect("function");

        let ty = HostType::named("Demo.Transform");
        let thunk = state.to_delegate(double.object(), &ty).expect("thunk");
        assert!(thunk.ptr_eq(&state.to_delegate(double.object(), &ty).expect("cached")));
        assert_eq!(state.callback_count(), 1);

        let result = invoke_delegate(&thunk, &mut [HostValue::I32(21)]).expect("invoke");
        assert_eq!(result, HostValue::I32(42));
    }

    #[test]
    fn thunk_writes_out_parameters() {
        let bridge = Bridge::new(registry(), BridgeConfig::default());
        let state = bridge.lock().expect("lock");
        let parse = state
            .new_function(|_, args| {
                let text = args.first().and_then(HostValue::as_str).unwrap_or_default().to_string();
                Ok(match text.parse::<i32>() {
                    Ok(value) => vec![HostValue::Bool(true), HostValue::F64(f64::from(value))],
                    Err(_) => vec![HostValue::Bool(false), HostValue::F64(0.0)],
                })
            })
            .expect("function");
        let thunk = state
            .to_delegate(parse.object(), &HostType::named("Demo.TryParse"))
            .expect("thunk");

        let mut args = [HostValue::from("17"), HostValue::I32(0)];
        assert_eq!(invoke_delegate(&thunk, &mut args).expect("invoke"), HostValue::Bool(true));
        assert_eq!(args[1], HostValue::I32(17));

        let mut args = [HostValue::from("x"), HostValue::I32(5)];
        assert_eq!(invoke_delegate(&thunk, &mut args).expect("invoke"), HostValue::Bool(false));
        assert_eq!(args[1], HostValue::I32(0));

        // missing results are nil, which an Int32 location cannot take
        let short = state.new_function(|_, _| Ok(vec![HostValue::Bool(true)])).expect("function");
        let thunk = state
            .to_delegate(short.object(), &HostType::named("Demo.TryParse"))
            .expect("thunk");
        let mut args = [HostValue::from("1"), HostValue::I32(0)];
        assert!(matches!(invoke_delegate(&thunk, &mut args), Err(BridgeError::InvalidCast(_))));
    }

    #[test]
    fn host_errors_cross_the_callback_unchanged() {
        let bridge = Bridge::new(registry(), BridgeConfig::default());
        let state = bridge.lock().expect("lock");
        let fails = state
            .new_function(|_, _| Err(BridgeError::Argument("bad input".to_string())))
            .expect("function");
        let thunk = state
            .to_delegate(fails.object(), &HostType::named("Demo.Transform"))
            .expect("thunk");
        let error = invoke_delegate(&thunk, &mut [HostValue::I32(1)]).expect_err("raised");
        assert_eq!(error, BridgeError::Argument("bad input".to_string()));
    }
}
