//! Implicit conversions between types.
//!
//! Used by tie-breaking, which compares parameter types rather than
//! values: of two targets, the one that implicitly converts to the other
//! is the better match.

use hostbridge_core::HostType;
use hostbridge_registry::TypeRegistry;

/// Whether `source` converts implicitly to `target`.
///
/// Identity, numeric widening, lifting into a nullable, boxing to
/// `Object` and reference conversions along the type hierarchy.
pub(crate) fn has_implicit_conversion(registry: &TypeRegistry, source: &HostType, target: &HostType) -> bool {
    if source == target {
        return true;
    }

    if let (Some(from), Some(to)) = (source.primitive_kind(), target.primitive_kind()) {
        if from.widens_to(to) {
            return true;
        }
    }

    if let Some(target_inner) = target.nullable_inner() {
        if has_implicit_conversion(registry, source, target_inner) {
            return true;
        }
        if let Some(source_inner) = source.nullable_inner() {
            if has_implicit_conversion(registry, source_inner, target_inner) {
                return true;
            }
        }
    }

    *target == HostType::OBJECT || registry.is_assignable_from(target, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::TypeEntry;

    #[test]
    fn widening_and_lifting() {
        let registry = TypeRegistry::with_builtins();

        assert!(has_implicit_conversion(&registry, &HostType::INT32, &HostType::INT64));
        assert!(has_implicit_conversion(&registry, &HostType::INT32, &HostType::DOUBLE));
        assert!(!has_implicit_conversion(&registry, &HostType::INT64, &HostType::INT32));
        assert!(!has_implicit_conversion(&registry, &HostType::INT32, &HostType::UINT32));
        assert!(has_implicit_conversion(
            &registry,
            &HostType::INT16,
            &HostType::nullable(HostType::INT32)
        ));
        assert!(has_implicit_conversion(
            &registry,
            &HostType::nullable(HostType::INT16),
            &HostType::nullable(HostType::INT32)
        ));
        assert!(has_implicit_conversion(&registry, &HostType::DOUBLE, &HostType::OBJECT));
    }

    #[test]
    fn reference_conversions() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeEntry::class("Demo.Shape")).unwrap();
        registry
            .register(TypeEntry::class("Demo.Circle").with_base(HostType::named("Demo.Shape")))
            .unwrap();
        let shape = HostType::named("Demo.Shape");
        let circle = HostType::named("Demo.Circle");

        assert!(has_implicit_conversion(&registry, &circle, &shape));
        assert!(!has_implicit_conversion(&registry, &shape, &circle));
        assert!(has_implicit_conversion(
            &registry,
            &HostType::array_of(circle.clone()),
            &HostType::array_of(shape)
        ));
    }
}
