//! Overload resolution for dynamic call sites.
//!
//! ## Algorithm
//!
//! For each candidate method:
//!
//! 1. Filter by argument count, considering optional parameters and a
//!    trailing param array (expanded form consumes any excess arguments)
//! 2. Infer method type arguments for generic definitions
//! 3. Check that every argument can be changed to its parameter type; a
//!    single array argument in the param-array slot selects normal form
//! 4. Compare against the candidates accepted so far: a better existing
//!    candidate rejects the new one, a worse one is dropped
//!
//! Exactly one survivor binds. Its arguments are then coerced to the
//! declared parameter types, packing the param-array tail and filling
//! optional defaults.

mod inference;
mod ranking;

use std::cmp::Ordering;
use std::sync::Arc;

use hostbridge_core::{ArrayData, BridgeError, HostType, HostValue, MethodEntry};

use crate::{BindFailure, Binder};
use inference::infer_type_args;
use ranking::{MoreSpecific, better_function_member};

/// A method chosen for a call, with its arguments coerced.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub method: Arc<MethodEntry>,
    /// One value per declared parameter.
    pub args: Vec<HostValue>,
}

/// An applicable method under consideration.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// The method, constructed if it came from a generic definition.
    method: Arc<MethodEntry>,
    /// The method as declared, before construction.
    definition: Arc<MethodEntry>,
    /// Element type when the param array is used in expanded form.
    params_array: Option<HostType>,
}

impl Candidate {
    fn new(method: Arc<MethodEntry>) -> Self {
        Self {
            definition: Arc::clone(&method),
            method,
            params_array: None,
        }
    }

    /// Parameter type receiving argument `index`.
    fn expanded_param_type(&self, index: usize) -> Option<&HostType> {
        match &self.params_array {
            Some(element) if index + 1 >= self.method.params.len() => Some(element),
            _ => self.method.params.get(index).map(|param| &param.data_type),
        }
    }
}

impl Binder<'_> {
    /// Pick the one overload of `methods` applicable to `args` and coerce
    /// the arguments to its parameter types.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn bind_to_method(&self, methods: &[Arc<MethodEntry>], args: &[HostValue]) -> Result<BoundMethod, BindFailure> {
        let arg_types: Vec<Option<HostType>> = args.iter().map(HostValue::type_of).collect();

        let mut candidates = Vec::new();
        for method in methods {
            if let Some(candidate) = self.applicable_candidate(method, args, &arg_types) {
                self.accumulate(&mut candidates, candidate, &arg_types);
            }
        }

        let candidate = match candidates.len() {
            0 => return Err(BindFailure::NoMatch),
            1 => candidates.remove(0),
            count => {
                tracing::debug!(
                    method = %methods[0].name,
                    candidates = count,
                    "ambiguous overloads"
                );
                return Err(BindFailure::Ambiguous);
            }
        };

        tracing::debug!(
            method = %candidate.method.name,
            params = candidate.method.params.len(),
            expanded = candidate.params_array.is_some(),
            overloads = methods.len(),
            "bound overload"
        );

        let args = self.change_argument_types(&candidate, args)?;
        Ok(BoundMethod {
            method: candidate.method,
            args,
        })
    }

    /// Pick the overload of `methods` a delegate of `delegate_type` binds to.
    ///
    /// Arity must match exactly. By-ref parameters need the same modifier
    /// and type; by-value parameters need identity for value types and an
    /// implicit reference conversion otherwise; the return type likewise.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn select_method_for_delegate(
        &self,
        methods: &[Arc<MethodEntry>],
        delegate_type: &HostType,
    ) -> Result<Arc<MethodEntry>, BindFailure> {
        let invoke = self.registry.delegate_invoke(delegate_type).ok_or_else(|| {
            BindFailure::Conversion(BridgeError::Argument(format!(
                "'{}' is not a delegate type",
                self.registry.type_name(delegate_type)
            )))
        })?;
        let arg_types: Vec<Option<HostType>> = invoke.params.iter().map(|p| Some(p.data_type.clone())).collect();

        let mut candidates = Vec::new();
        for method in methods {
            if method.params.len() != invoke.params.len() {
                continue;
            }

            let mut candidate = Candidate::new(Arc::clone(method));
            if method.is_generic() {
                if let Some(constructed) =
                    infer_type_args(self.registry, method.generic_params.len(), &method.params, None, &arg_types)
                        .and_then(|type_args| method.instantiate(&type_args))
                {
                    candidate.method = Arc::new(constructed);
                }
            }
            if candidate.method.is_generic() || !self.matches_delegate_signature(&candidate.method, &invoke) {
                continue;
            }

            self.accumulate(&mut candidates, candidate, &arg_types);
        }

        match candidates.len() {
            0 => Err(BindFailure::NoMatch),
            1 => Ok(candidates.remove(0).method),
            _ => Err(BindFailure::Ambiguous),
        }
    }

    /// Describe a failed call of `name` on `declaring` with `args`.
    pub fn call_error(&self, failure: BindFailure, declaring: &HostType, name: &str, args: &[HostValue]) -> BridgeError {
        let type_name = self.registry.type_name(declaring);
        let arg_types = args
            .iter()
            .map(|arg| self.registry.value_type_name(arg))
            .collect::<Vec<_>>()
            .join(", ");
        match failure {
            BindFailure::NoMatch => {
                BridgeError::MissingMethod(format!("'{name}({arg_types})' is not a member of type '{type_name}'"))
            }
            BindFailure::Ambiguous => BridgeError::AmbiguousMatch(format!(
                "'{name}({arg_types})' designates ambiguous members of type '{type_name}'"
            )),
            BindFailure::Conversion(error) => error,
        }
    }

    fn applicable_candidate(
        &self,
        method: &Arc<MethodEntry>,
        args: &[HostValue],
        arg_types: &[Option<HostType>],
    ) -> Option<Candidate> {
        let params = &method.params;

        let Some(last) = params.last() else {
            // nullary: only zero arguments, and nothing to infer from
            return (args.is_empty() && !method.is_generic()).then(|| Candidate::new(Arc::clone(method)));
        };

        let mut params_array = None;
        if args.len() > params.len() {
            params_array = Some(last.params_element()?.clone());
        } else {
            let before_last = &params[..params.len() - 1];
            if before_last.iter().skip(args.len()).any(|param| !param.is_optional()) {
                return None;
            }
            if !last.is_optional() {
                match last.params_element() {
                    Some(element) => params_array = Some(element.clone()),
                    None if args.len() < params.len() => return None,
                    None => {}
                }
            }
        }

        let mut candidate = Candidate {
            method: Arc::clone(method),
            definition: Arc::clone(method),
            params_array,
        };

        if method.is_generic() {
            let constructed = infer_type_args(
                self.registry,
                method.generic_params.len(),
                params,
                candidate.params_array.as_ref(),
                arg_types,
            )
            .and_then(|type_args| method.instantiate(&type_args));
            if let Some(constructed) = constructed {
                candidate.method = Arc::new(constructed);
                if candidate.params_array.is_some() {
                    candidate.params_array = candidate.method.params_array_element().cloned();
                }
            }
        }
        if candidate.method.is_generic() {
            return None;
        }

        let count = candidate.method.params.len();
        for (index, arg) in args.iter().enumerate() {
            let param_type = candidate.expanded_param_type(index)?.clone();
            let normal_form = index + 1 == count
                && args.len() == count
                && candidate.params_array.is_some()
                && self.can_change_type(arg, &HostType::array_of(param_type.clone()));
            if normal_form {
                candidate.params_array = None;
            } else if !self.can_change_type(arg, &param_type) {
                return None;
            }
        }

        Some(candidate)
    }

    /// Add `candidate` unless an existing one is better; drop existing ones
    /// it beats.
    fn accumulate(&self, candidates: &mut Vec<Candidate>, candidate: Candidate, arg_types: &[Option<HostType>]) {
        let mut add = true;
        candidates.retain(
            |existing| match better_function_member(self.registry, existing, &candidate, arg_types) {
                MoreSpecific::Left => {
                    add = false;
                    true
                }
                MoreSpecific::Right => false,
                MoreSpecific::Neither => true,
            },
        );
        if add {
            candidates.push(candidate);
        }
    }

    fn matches_delegate_signature(&self, method: &MethodEntry, invoke: &MethodEntry) -> bool {
        let params_match = method.params.iter().zip(&invoke.params).all(|(param, expected)| {
            if param.is_by_ref() || expected.is_by_ref() {
                param.ref_modifier == expected.ref_modifier && param.data_type == expected.data_type
            } else if self.registry.is_value_type(&expected.data_type) {
                param.data_type == expected.data_type
            } else {
                self.registry.is_assignable_from(&param.data_type, &expected.data_type)
            }
        });

        let return_matches = if self.registry.is_value_type(&method.return_type) || method.returns_void() {
            method.return_type == invoke.return_type
        } else {
            self.registry.is_assignable_from(&invoke.return_type, &method.return_type)
        };

        params_match && return_matches
    }

    fn change_argument_types(&self, candidate: &Candidate, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
        let params = &candidate.method.params;
        let Some(last) = params.len().checked_sub(1) else {
            return Ok(Vec::new());
        };
        let convert = |index: usize| self.change_type(args[index].clone(), &params[index].data_type);

        let mut changed = Vec::with_capacity(params.len());
        match args.len().cmp(&params.len()) {
            Ordering::Equal => {
                for index in 0..last {
                    changed.push(convert(index)?);
                }
                changed.push(match &candidate.params_array {
                    None => convert(last)?,
                    Some(element) => self.pack_params(element, &args[last..])?,
                });
            }
            Ordering::Less => {
                for index in 0..args.len() {
                    changed.push(convert(index)?);
                }
                for param in &params[args.len()..last] {
                    changed.push(param.default.clone().unwrap_or_default());
                }
                changed.push(match &candidate.params_array {
                    None => params[last].default.clone().unwrap_or_default(),
                    Some(element) => self.pack_params(element, &[])?,
                });
            }
            Ordering::Greater => {
                for index in 0..last {
                    changed.push(convert(index)?);
                }
                let element = candidate.params_array.as_ref().ok_or_else(|| {
                    BridgeError::Argument(format!("too many arguments for '{}'", candidate.method.name))
                })?;
                changed.push(self.pack_params(element, &args[last..])?);
            }
        }
        Ok(changed)
    }

    fn pack_params(&self, element: &HostType, values: &[HostValue]) -> Result<HostValue, BridgeError> {
        let elements = values
            .iter()
            .map(|value| self.change_type(value.clone(), element))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HostValue::Object(ArrayData::from_vec(elements).into_object(element.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::{CallContext, ParamEntry, TypeEntry, Variance};
    use hostbridge_registry::TypeRegistry;

    fn noop(_: &mut CallContext) -> Result<(), BridgeError> {
        Ok(())
    }

    fn method(name: &str, params: &[HostType]) -> Arc<MethodEntry> {
        Arc::new(MethodEntry::new(name, noop).with_params(params.iter().map(|ty| ParamEntry::new("p", ty.clone()))))
    }

    fn numbers(values: &[f64]) -> Vec<HostValue> {
        values.iter().copied().map(HostValue::F64).collect()
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeEntry::class("Demo.Shape")).unwrap();
        registry
            .register(TypeEntry::class("Demo.Circle").with_base(HostType::named("Demo.Shape")))
            .unwrap();
        registry
            .register(TypeEntry::class("Demo.List").with_generic_param("T", Variance::Invariant))
            .unwrap();
        registry
            .register(TypeEntry::delegate(
                "Demo.Transform",
                vec![ParamEntry::new("shape", HostType::named("Demo.Circle"))],
                HostType::named("Demo.Shape"),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn picks_overload_by_argument_types() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let methods = [
            method("F", &[HostType::INT32]),
            method("F", &[HostType::INT32, HostType::DOUBLE]),
            method("F", &[HostType::DOUBLE, HostType::INT32]),
        ];

        let bound = binder.bind_to_method(&methods, &numbers(&[1.0, 2.5])).unwrap();
        assert!(Arc::ptr_eq(&bound.method, &methods[1]));
        assert_eq!(bound.args, vec![HostValue::I32(1), HostValue::F64(2.5)]);

        let bound = binder.bind_to_method(&methods, &numbers(&[1.0])).unwrap();
        assert!(Arc::ptr_eq(&bound.method, &methods[0]));

        assert_eq!(
            binder.bind_to_method(&methods, &numbers(&[1.0, 2.0])).unwrap_err(),
            BindFailure::Ambiguous
        );
        assert_eq!(
            binder.bind_to_method(&methods, &numbers(&[1.0, 2.0, 3.0])).unwrap_err(),
            BindFailure::NoMatch
        );
    }

    #[test]
    fn selection_is_stable_and_prefers_more_specific() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let shape = method("Draw", &[HostType::named("Demo.Shape")]);
        let circle = method("Draw", &[HostType::named("Demo.Circle")]);
        let arg = [HostValue::Object(hostbridge_core::HostObject::new(HostType::named("Demo.Circle"), ()))];

        let first = binder.bind_to_method(&[Arc::clone(&shape)], &arg).unwrap();
        assert!(Arc::ptr_eq(&first.method, &shape));

        for methods in [[Arc::clone(&shape), Arc::clone(&circle)], [Arc::clone(&circle), Arc::clone(&shape)]] {
            let bound = binder.bind_to_method(&methods, &arg).unwrap();
            assert!(Arc::ptr_eq(&bound.method, &circle));
        }
    }

    #[test]
    fn param_array_expanded_and_normal_forms() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let sum = Arc::new(MethodEntry::new("Sum", noop).with_param(ParamEntry::params("values", HostType::INT32)));

        let bound = binder.bind_to_method(&[Arc::clone(&sum)], &numbers(&[1.0, 2.0, 3.0])).unwrap();
        let packed = bound.args[0].as_object().unwrap();
        assert_eq!(packed.ty(), &HostType::array_of(HostType::INT32));
        assert_eq!(
            packed.with(|data: &ArrayData| data.elements().to_vec()).unwrap(),
            vec![HostValue::I32(1), HostValue::I32(2), HostValue::I32(3)]
        );

        let bound = binder.bind_to_method(&[Arc::clone(&sum)], &[]).unwrap();
        let empty = bound.args[0].as_object().unwrap();
        assert_eq!(empty.with(|data: &ArrayData| data.len()).unwrap(), 0);

        let array = HostValue::Object(ArrayData::from_vec(vec![HostValue::I32(4)]).into_object(HostType::INT32));
        let bound = binder.bind_to_method(&[sum], &[array.clone()]).unwrap();
        assert!(bound.args[0].as_object().unwrap().ptr_eq(array.as_object().unwrap()));
    }

    #[test]
    fn single_argument_in_expanded_form_is_wrapped() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let join = Arc::new(MethodEntry::new("Join", noop).with_param(ParamEntry::params("values", HostType::OBJECT)));

        let bound = binder.bind_to_method(&[join], &[HostValue::from("a")]).unwrap();
        let packed = bound.args[0].as_object().unwrap();
        assert_eq!(packed.with(|data: &ArrayData| data.len()).unwrap(), 1);
    }

    #[test]
    fn optional_parameters_take_defaults() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let pad = Arc::new(
            MethodEntry::new("Pad", noop)
                .with_param(ParamEntry::new("text", HostType::STRING))
                .with_param(ParamEntry::new("width", HostType::INT32).optional(8i32))
                .with_param(ParamEntry::new("fill", HostType::CHAR).optional(HostValue::Char(32))),
        );

        let bound = binder.bind_to_method(&[Arc::clone(&pad)], &[HostValue::from("x")]).unwrap();
        assert_eq!(bound.args, vec![HostValue::from("x"), HostValue::I32(8), HostValue::Char(32)]);

        let bound = binder
            .bind_to_method(&[pad], &[HostValue::from("x"), HostValue::F64(3.0)])
            .unwrap();
        assert_eq!(bound.args[1], HostValue::I32(3));
    }

    #[test]
    fn generic_methods_are_inferred_and_constructed() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let identity = Arc::new(
            MethodEntry::new("Identity", noop)
                .with_generic_params(["T"])
                .with_param(ParamEntry::new("value", HostType::MethodParam(0)))
                .returns(HostType::MethodParam(0)),
        );

        let bound = binder.bind_to_method(&[Arc::clone(&identity)], &[HostValue::from("s")]).unwrap();
        assert_eq!(bound.method.type_args, vec![HostType::STRING]);
        assert_eq!(bound.method.return_type, HostType::STRING);

        let bound = binder.bind_to_method(&[identity], &[HostValue::Null]).unwrap();
        assert_eq!(bound.method.type_args, vec![HostType::OBJECT]);
    }

    #[test]
    fn nullary_generic_cannot_be_inferred() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let create = Arc::new(MethodEntry::new("Create", noop).with_generic_params(["T"]));

        assert_eq!(binder.bind_to_method(&[create], &[]).unwrap_err(), BindFailure::NoMatch);
    }

    #[test]
    fn call_errors_name_the_argument_types() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let error = binder.call_error(
            BindFailure::NoMatch,
            &HostType::named("Demo.Shape"),
            "Draw",
            &[HostValue::F64(1.0), HostValue::Null],
        );

        assert_eq!(
            error,
            BridgeError::MissingMethod("'Draw(Double, null)' is not a member of type 'Demo.Shape'".to_string())
        );
    }

    #[test]
    fn delegate_selection_follows_variance_rules() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let transform = HostType::named("Demo.Transform");
        let shape = HostType::named("Demo.Shape");
        let circle = HostType::named("Demo.Circle");

        let widen = Arc::new(
            MethodEntry::new("Widen", noop)
                .with_param(ParamEntry::new("shape", shape.clone()))
                .returns(circle.clone()),
        );
        let selected = binder.select_method_for_delegate(&[Arc::clone(&widen)], &transform).unwrap();
        assert!(Arc::ptr_eq(&selected, &widen));

        let narrow = Arc::new(
            MethodEntry::new("Narrow", noop)
                .with_param(ParamEntry::new("circle", circle))
                .returns(HostType::STRING),
        );
        assert_eq!(
            binder.select_method_for_delegate(&[narrow], &transform).unwrap_err(),
            BindFailure::NoMatch
        );

        assert!(matches!(
            binder.select_method_for_delegate(&[widen], &shape),
            Err(BindFailure::Conversion(BridgeError::Argument(_)))
        ));
    }
}
