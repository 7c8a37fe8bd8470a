//! Pairwise ranking of applicable candidates.
//!
//! Candidates are compared two at a time. Rules, in order:
//!
//! 1. Identical signatures: the more-derived declaring type wins
//!    (overriding and hiding by signature)
//! 2. Better conversion from each argument type: one side must be better
//!    for some argument and worse for none
//!
//! When the expanded parameter types are identical, tie-breakers follow:
//!
//! 3. Non-generic over constructed generic
//! 4. Normal form over expanded param-array form
//! 5. Exact arity over optional-filled
//! 6. Among two expanded forms, more declared parameters
//! 7. More specific parameter types in the generic definitions, where a
//!    concrete type beats a generic parameter, recursively

use hostbridge_core::HostType;
use hostbridge_registry::TypeRegistry;

use super::Candidate;
use crate::conversion::has_implicit_conversion;

/// Result of comparing two candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoreSpecific {
    Left,
    Right,
    Neither,
}

/// Combine per-position verdicts: a side wins only if it wins at least
/// once and never loses.
fn dominance(verdicts: impl IntoIterator<Item = MoreSpecific>) -> MoreSpecific {
    let mut winner = MoreSpecific::Neither;
    for verdict in verdicts {
        if verdict == MoreSpecific::Neither || verdict == winner {
            continue;
        }
        if winner != MoreSpecific::Neither {
            return MoreSpecific::Neither;
        }
        winner = verdict;
    }
    winner
}

/// Compare two applicable candidates for the given argument types.
pub(crate) fn better_function_member(
    registry: &TypeRegistry,
    left: &Candidate,
    right: &Candidate,
    arg_types: &[Option<HostType>],
) -> MoreSpecific {
    let left_count = left.method.params.len();
    let right_count = right.method.params.len();

    if left_count == right_count && left.params_array == right.params_array && have_equal_types(left, right) {
        let left_declaring = &left.method.declaring_type;
        let right_declaring = &right.method.declaring_type;
        if registry.is_subclass_of(left_declaring, right_declaring) {
            return MoreSpecific::Left;
        }
        if registry.is_subclass_of(right_declaring, left_declaring) {
            return MoreSpecific::Right;
        }
    }

    let mut identical_expanded = true;
    let verdicts: Vec<MoreSpecific> = arg_types
        .iter()
        .enumerate()
        .map(|(index, arg_type)| {
            let left_type = left.expanded_param_type(index);
            let right_type = right.expanded_param_type(index);
            identical_expanded &= left_type == right_type;
            match (left_type, right_type) {
                (Some(l), Some(r)) => better_conversion_from_type(registry, arg_type.as_ref(), l, r),
                _ => MoreSpecific::Neither,
            }
        })
        .collect();

    let better = dominance(verdicts);
    if better != MoreSpecific::Neither {
        return better;
    }

    if !identical_expanded {
        return MoreSpecific::Neither;
    }

    let left_generic = left.method.is_constructed_generic();
    let right_generic = right.method.is_constructed_generic();
    if left_generic != right_generic {
        return if left_generic {
            MoreSpecific::Right
        } else {
            MoreSpecific::Left
        };
    }

    match (&left.params_array, &right.params_array) {
        (None, Some(_)) => return MoreSpecific::Left,
        (Some(_), None) => return MoreSpecific::Right,
        (None, None) => {
            if left_count != right_count {
                if left_count == arg_types.len() {
                    return MoreSpecific::Left;
                }
                if right_count == arg_types.len() {
                    return MoreSpecific::Right;
                }
            }
        }
        (Some(_), Some(_)) => {
            if left_count > right_count {
                return MoreSpecific::Left;
            }
            if right_count > left_count {
                return MoreSpecific::Right;
            }
        }
    }

    if left_count == right_count {
        let verdicts = left
            .method
            .params
            .iter()
            .zip(&left.definition.params)
            .zip(&right.definition.params)
            .map(|((param, left_generic), right_generic)| {
                more_specific_parameter_type(
                    &param.data_type,
                    &left_generic.data_type,
                    &right_generic.data_type,
                )
            });
        return dominance(verdicts);
    }

    MoreSpecific::Neither
}

fn have_equal_types(left: &Candidate, right: &Candidate) -> bool {
    left.method
        .params
        .iter()
        .zip(&right.method.params)
        .all(|(l, r)| l.data_type == r.data_type && l.is_by_ref() == r.is_by_ref())
}

/// Which of two parameter types is structurally more specific, judged on
/// the generic definitions the constructed `ty` came from.
fn more_specific_parameter_type(ty: &HostType, generic_left: &HostType, generic_right: &HostType) -> MoreSpecific {
    let left_param = generic_left.is_generic_param();
    let right_param = generic_right.is_generic_param();
    if left_param != right_param {
        return if left_param {
            MoreSpecific::Right
        } else {
            MoreSpecific::Left
        };
    }

    match (ty, generic_left, generic_right) {
        (
            HostType::Array { element, .. },
            HostType::Array { element: left, .. },
            HostType::Array { element: right, .. },
        )
        | (HostType::Nullable(element), HostType::Nullable(left), HostType::Nullable(right)) => {
            more_specific_parameter_type(element, left, right)
        }
        (
            HostType::Generic { args, .. },
            HostType::Generic { args: left_args, .. },
            HostType::Generic { args: right_args, .. },
        ) => dominance(
            args.iter()
                .zip(left_args)
                .zip(right_args)
                .map(|((arg, left), right)| more_specific_parameter_type(arg, left, right)),
        ),
        _ => MoreSpecific::Neither,
    }
}

/// Better conversion from an argument type to one of two parameter types.
///
/// `arg_type` is `None` for a null argument.
fn better_conversion_from_type(
    registry: &TypeRegistry,
    arg_type: Option<&HostType>,
    left: &HostType,
    right: &HostType,
) -> MoreSpecific {
    if left == right {
        return MoreSpecific::Neither;
    }

    if arg_type == Some(left) {
        return MoreSpecific::Left;
    }
    if arg_type == Some(right) {
        return MoreSpecific::Right;
    }

    if let (Some(l), Some(r)) = (left.primitive_kind(), right.primitive_kind()) {
        if l.is_better_integer_target(r) {
            return MoreSpecific::Left;
        }
        if r.is_better_integer_target(l) {
            return MoreSpecific::Right;
        }
    }

    let left_to_right = has_implicit_conversion(registry, left, right);
    let right_to_left = has_implicit_conversion(registry, right, left);
    match (left_to_right, right_to_left) {
        (true, false) => MoreSpecific::Left,
        (false, true) => MoreSpecific::Right,
        _ => MoreSpecific::Neither,
    }
}
