//! Method type argument inference.
//!
//! Each argument type is matched structurally against its parameter type.
//! Every method type parameter reached collects bounds:
//!
//! | position                                  | bound |
//! |-------------------------------------------|-------|
//! | by-value parameter                        | lower |
//! | `out` parameter                           | upper |
//! | `ref` parameter                           | exact |
//! | covariant argument of a generic type      | lower |
//! | contravariant argument of a generic type  | upper |
//! | invariant argument of a generic type      | exact |
//!
//! The bounds of each parameter are then reduced to one type; contradictory
//! or unrelated bounds make the candidate inapplicable.
//!
//! Null arguments carry no type. When at least one argument was null, any
//! type parameter left without bounds is fixed to `Object` so the call is
//! still inferable.

use hostbridge_core::{HostType, ParamEntry, RefModifier, Variance};
use hostbridge_registry::TypeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
    Exact,
}

type Bounds = Vec<Vec<(Bound, HostType)>>;

/// Infer `generic_count` method type arguments from argument types.
///
/// `params_array` is the element type when the trailing param array is
/// used in expanded form. `None` argument types stand for null arguments.
pub(crate) fn infer_type_args(
    registry: &TypeRegistry,
    generic_count: usize,
    params: &[ParamEntry],
    params_array: Option<&HostType>,
    arg_types: &[Option<HostType>],
) -> Option<Vec<HostType>> {
    let last_index = params.len().checked_sub(1)?;
    let mut bounds: Bounds = vec![Vec::new(); generic_count];
    let mut has_null_arg = false;

    for (index, arg_type) in arg_types.iter().enumerate() {
        let param = &params[index.min(last_index)];
        let Some(arg_type) = arg_type else {
            has_null_arg = true;
            continue;
        };

        let normal_form_array = arg_types.len() == params.len() && arg_type.is_array();
        let (param_type, bound) = match params_array {
            Some(element) if index >= last_index && !normal_form_array => (element, Bound::Lower),
            _ => {
                let bound = match param.ref_modifier {
                    RefModifier::None => Bound::Lower,
                    RefModifier::Out => Bound::Upper,
                    RefModifier::Ref => Bound::Exact,
                };
                (&param.data_type, bound)
            }
        };

        if !infer_bound(registry, bound, &mut bounds, param_type, arg_type) {
            return None;
        }
    }

    // Untyped nulls still have to bind unconstrained parameters somehow.
    if has_null_arg {
        for param_bounds in bounds.iter_mut().filter(|b| b.is_empty()) {
            param_bounds.push((Bound::Exact, HostType::OBJECT));
        }
    }

    bounds
        .iter()
        .map(|param_bounds| fix_type_arg(registry, param_bounds))
        .collect()
}

fn infer_bound(
    registry: &TypeRegistry,
    bound: Bound,
    bounds: &mut Bounds,
    param_type: &HostType,
    arg_type: &HostType,
) -> bool {
    match param_type {
        HostType::MethodParam(position) => {
            let Some(param_bounds) = bounds.get_mut(usize::from(*position)) else {
                return false;
            };
            let entry = (bound, arg_type.clone());
            if !param_bounds.contains(&entry) {
                param_bounds.push(entry);
            }
            true
        }
        HostType::Array { element, rank } => match arg_type {
            HostType::Array {
                element: arg_element,
                rank: arg_rank,
            } if arg_rank == rank => infer_bound(registry, bound, bounds, element, arg_element),
            _ => false,
        },
        HostType::Generic { definition, args } => {
            let HostType::Generic { args: arg_args, .. } = arg_type else {
                return false;
            };
            if args.len() != arg_args.len() {
                return false;
            }
            let variances: Vec<Variance> = registry
                .get(*definition)
                .map(|entry| entry.generic_params.iter().map(|p| p.variance).collect())
                .unwrap_or_default();
            args.iter().zip(arg_args).enumerate().all(|(i, (param_arg, arg_arg))| {
                let bound = match variances.get(i) {
                    Some(Variance::Covariant) => Bound::Lower,
                    Some(Variance::Contravariant) => Bound::Upper,
                    _ => Bound::Exact,
                };
                infer_bound(registry, bound, bounds, param_arg, arg_arg)
            })
        }
        HostType::Nullable(inner) => {
            let arg_inner = arg_type.nullable_inner().unwrap_or(arg_type);
            registry.is_value_type(arg_inner) && infer_bound(registry, Bound::Exact, bounds, inner, arg_inner)
        }
        HostType::Named(_) | HostType::TypeParam(_) => true,
    }
}

/// Reduce the bounds of one type parameter to a single type.
fn fix_type_arg(registry: &TypeRegistry, bounds: &[(Bound, HostType)]) -> Option<HostType> {
    let mut lower: Option<&HostType> = None;
    let mut upper: Option<&HostType> = None;

    for (bound, candidate) in bounds {
        match bound {
            Bound::Lower => {
                if upper.is_some_and(|upper| !registry.is_assignable_from(upper, candidate)) {
                    return None;
                }
                match lower {
                    Some(current)
                        if !registry.is_assignable_from(candidate, current)
                            && !registry.is_subclass_of(candidate, current) =>
                    {
                        return None;
                    }
                    Some(current) if !registry.is_assignable_from(candidate, current) => {}
                    _ => lower = Some(candidate),
                }
            }
            Bound::Upper => {
                if lower.is_some_and(|lower| !registry.is_assignable_from(candidate, lower)) {
                    return None;
                }
                match upper {
                    Some(current)
                        if !registry.is_assignable_from(current, candidate)
                            && !registry.is_subclass_of(current, candidate) =>
                    {
                        return None;
                    }
                    Some(current) if !registry.is_assignable_from(current, candidate) => {}
                    _ => upper = Some(candidate),
                }
            }
            Bound::Exact => {
                if upper.is_some_and(|upper| !registry.is_assignable_from(upper, candidate))
                    || lower.is_some_and(|lower| !registry.is_assignable_from(candidate, lower))
                {
                    return None;
                }
                upper = Some(candidate);
                lower = Some(candidate);
            }
        }
    }

    upper.or(lower).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::{TypeEntry, TypeHash};

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeEntry::class("Demo.Shape")).unwrap();
        registry
            .register(TypeEntry::class("Demo.Circle").with_base(HostType::named("Demo.Shape")))
            .unwrap();
        registry.register(TypeEntry::class("Demo.Widget")).unwrap();
        registry
            .register(TypeEntry::interface("Demo.IProducer").with_generic_param("T", Variance::Covariant))
            .unwrap();
        registry
            .register(TypeEntry::class("Demo.Box").with_generic_param("T", Variance::Invariant))
            .unwrap();
        registry
    }

    fn t() -> HostType {
        HostType::MethodParam(0)
    }

    fn params(types: &[HostType]) -> Vec<ParamEntry> {
        types.iter().map(|ty| ParamEntry::new("p", ty.clone())).collect()
    }

    #[test]
    fn same_type_in_two_positions() {
        let registry = registry();
        let params = params(&[t(), t()]);
        let args = [Some(HostType::DOUBLE), Some(HostType::DOUBLE)];

        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &args),
            Some(vec![HostType::DOUBLE])
        );
    }

    #[test]
    fn lower_bounds_pick_the_common_base() {
        let registry = registry();
        let params = params(&[t(), t()]);
        let shape = HostType::named("Demo.Shape");
        let args = [Some(HostType::named("Demo.Circle")), Some(shape.clone())];

        assert_eq!(infer_type_args(&registry, 1, &params, None, &args), Some(vec![shape]));
    }

    #[test]
    fn unrelated_lower_bounds_fail() {
        let registry = registry();
        let params = params(&[t(), t()]);
        let args = [Some(HostType::DOUBLE), Some(HostType::named("Demo.Widget"))];

        assert_eq!(infer_type_args(&registry, 1, &params, None, &args), None);
    }

    #[test]
    fn exact_bound_must_accept_lower_bounds() {
        let registry = registry();
        let shape = HostType::named("Demo.Shape");
        let circle = HostType::named("Demo.Circle");
        let params = vec![ParamEntry::new("a", t()).by_ref(), ParamEntry::new("b", t())];

        let consistent = [Some(shape.clone()), Some(circle.clone())];
        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &consistent),
            Some(vec![shape.clone()])
        );

        let contradictory = [Some(circle), Some(shape)];
        assert_eq!(infer_type_args(&registry, 1, &params, None, &contradictory), None);
    }

    #[test]
    fn numeric_subtypes_do_not_widen_during_inference() {
        let registry = registry();

        // Int64 is not assignable from Int32, so the exact bound rejects the lower one
        let by_ref = vec![ParamEntry::new("a", t()).by_ref(), ParamEntry::new("b", t())];
        let args = [Some(HostType::INT64), Some(HostType::INT32)];
        assert_eq!(infer_type_args(&registry, 1, &by_ref, None, &args), None);

        let args = [Some(HostType::INT32), Some(HostType::INT32)];
        assert_eq!(
            infer_type_args(&registry, 1, &by_ref, None, &args),
            Some(vec![HostType::INT32])
        );

        let by_value = params(&[t(), t()]);
        let args = [Some(HostType::INT32), Some(HostType::INT64)];
        assert_eq!(infer_type_args(&registry, 1, &by_value, None, &args), None);

        let args = [Some(HostType::INT32), Some(HostType::OBJECT)];
        assert_eq!(
            infer_type_args(&registry, 1, &by_value, None, &args),
            Some(vec![HostType::OBJECT])
        );
    }

    #[test]
    fn infers_through_arrays_and_generics() {
        let registry = registry();
        let producer = TypeHash::from_name("Demo.IProducer");
        let boxed = TypeHash::from_name("Demo.Box");

        let params = params(&[HostType::array_of(t())]);
        let args = [Some(HostType::array_of(HostType::STRING))];
        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &args),
            Some(vec![HostType::STRING])
        );

        let params = params_of_generic(producer);
        let args = [Some(HostType::generic(producer, vec![HostType::STRING]))];
        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &args),
            Some(vec![HostType::STRING])
        );

        let params = params_of_generic(boxed);
        let args = [Some(HostType::array_with_rank(HostType::STRING, 2))];
        assert_eq!(infer_type_args(&registry, 1, &params, None, &args), None);
    }

    fn params_of_generic(definition: TypeHash) -> Vec<ParamEntry> {
        params(&[HostType::generic(definition, vec![t()])])
    }

    #[test]
    fn param_array_elements_bind_in_expanded_form() {
        let registry = registry();
        let params = vec![ParamEntry::params("items", t())];
        let args = [Some(HostType::STRING), Some(HostType::STRING)];

        assert_eq!(
            infer_type_args(&registry, 1, &params, Some(&t()), &args),
            Some(vec![HostType::STRING])
        );
    }

    #[test]
    fn null_argument_defaults_unbound_parameter_to_object() {
        let registry = registry();
        let params = params(&[t()]);

        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &[None]),
            Some(vec![HostType::OBJECT])
        );

        // a typed argument elsewhere wins over the fallback
        let params = vec![ParamEntry::new("a", t()), ParamEntry::new("b", t())];
        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &[None, Some(HostType::STRING)]),
            Some(vec![HostType::STRING])
        );
    }

    #[test]
    fn unbound_parameter_fails_without_null() {
        let registry = registry();
        let params = params(&[HostType::INT32]);

        assert_eq!(
            infer_type_args(&registry, 1, &params, None, &[Some(HostType::DOUBLE)]),
            None
        );
    }
}
