//! Value coercion.
//!
//! A foreign value enters a host location through one of these paths,
//! checked in order:
//!
//! 1. Null into any reference type or nullable
//! 2. Identity, base class, interface or boxing (`is_assignable_from`)
//! 3. A number into any numeric or char primitive (or a nullable of one)
//!    when the value fits: integral and in range for integral targets,
//!    within `f32` magnitude for `Single`
//! 4. A foreign function into any delegate type, through the
//!    [`CallbackFactory`]
//!
//! Host primitives other than `Double` also follow implicit numeric
//! widening, so host-side callers can pass `Int32` where `Int64` is
//! declared.

mod implicit;

pub(crate) use implicit::has_implicit_conversion;

use hostbridge_core::{BridgeError, HostObject, HostType, HostValue, PrimitiveKind};

use crate::Binder;

/// Converts foreign functions into host delegates.
pub trait CallbackFactory {
    /// Build (or reuse) a delegate of `delegate_type` that calls `function`.
    ///
    /// `function` is a host object of type `ForeignFunction`.
    fn to_delegate(&self, function: &HostObject, delegate_type: &HostType) -> Result<HostObject, BridgeError>;

    /// Whether [`to_delegate`](Self::to_delegate) can succeed at all.
    fn supports_delegates(&self) -> bool {
        true
    }
}

/// A [`CallbackFactory`] that rejects every conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl CallbackFactory for NoCallbacks {
    fn to_delegate(&self, _function: &HostObject, _delegate_type: &HostType) -> Result<HostObject, BridgeError> {
        Err(BridgeError::InvalidCast("No callback bridge available to create delegates".to_string()))
    }

    fn supports_delegates(&self) -> bool {
        false
    }
}

impl Binder<'_> {
    /// Whether `value` can be stored in a location of type `target`.
    pub fn can_change_type(&self, value: &HostValue, target: &HostType) -> bool {
        let Some(value_type) = value.type_of() else {
            return self.accepts_null(target);
        };

        if *target == HostType::OBJECT || self.registry.is_assignable_from(target, &value_type) {
            return true;
        }

        if let Some(kind) = numeric_target(target) {
            return match value {
                HostValue::F64(number) => kind.accepts_number(*number),
                _ => value_type
                    .primitive_kind()
                    .is_some_and(|source| source.widens_to(kind)),
            };
        }

        is_foreign_function(value) && self.registry.is_delegate(target)
    }

    /// Coerce `value` into type `target`.
    ///
    /// Fails with `InvalidCast` wherever [`can_change_type`](Self::can_change_type)
    /// says no.
    pub fn change_type(&self, value: HostValue, target: &HostType) -> Result<HostValue, BridgeError> {
        let Some(value_type) = value.type_of() else {
            return if self.accepts_null(target) {
                Ok(HostValue::Null)
            } else {
                Err(self.invalid_cast(&value, target))
            };
        };

        if *target == HostType::OBJECT || self.registry.is_assignable_from(target, &value_type) {
            return Ok(value);
        }

        if let Some(kind) = numeric_target(target) {
            let converted = match &value {
                HostValue::F64(number) if kind.accepts_number(*number) => HostValue::from_number(kind, *number),
                _ if value_type.primitive_kind().is_some_and(|source| source.widens_to(kind)) => {
                    value.as_f64().and_then(|number| HostValue::from_number(kind, number))
                }
                _ => None,
            };
            return converted.ok_or_else(|| self.invalid_cast(&value, target));
        }

        if let HostValue::Object(function) = &value {
            if is_foreign_function(&value) && self.registry.is_delegate(target) {
                if !self.callbacks.supports_delegates() {
                    return Err(BridgeError::InvalidCast(format!(
                        "No callback bridge available to create a delegate of type '{}'",
                        self.registry.type_name(target)
                    )));
                }
                tracing::trace!(delegate = %self.registry.type_name(target), "coercing foreign function");
                return self
                    .callbacks
                    .to_delegate(function, target)
                    .map(HostValue::Object);
            }
        }

        Err(self.invalid_cast(&value, target))
    }

    fn accepts_null(&self, target: &HostType) -> bool {
        !self.registry.is_value_type(target) || target.nullable_inner().is_some()
    }

    fn invalid_cast(&self, value: &HostValue, target: &HostType) -> BridgeError {
        BridgeError::InvalidCast(format!(
            "Value of type '{}' cannot be converted to type '{}'",
            self.registry.value_type_name(value),
            self.registry.type_name(target)
        ))
    }
}

/// Numeric or char primitive a number may be coerced into, looking
/// through `Nullable`.
fn numeric_target(target: &HostType) -> Option<PrimitiveKind> {
    let target = target.nullable_inner().unwrap_or(target);
    target
        .primitive_kind()
        .filter(|kind| *kind != PrimitiveKind::Boolean)
}

fn is_foreign_function(value: &HostValue) -> bool {
    value
        .as_object()
        .is_some_and(|object| *object.ty() == HostType::FOREIGN_FUNCTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::{DelegateData, NativeFn, ParamEntry, TypeEntry};
    use hostbridge_registry::TypeRegistry;

    struct EchoCallbacks;

    impl CallbackFactory for EchoCallbacks {
        fn to_delegate(&self, _function: &HostObject, delegate_type: &HostType) -> Result<HostObject, BridgeError> {
            Ok(DelegateData::new(NativeFn::from_fn(|_: &mut hostbridge_core::CallContext<'_>| Ok(()))).into_object(delegate_type.clone()))
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeEntry::class("Demo.Shape")).unwrap();
        registry
            .register(TypeEntry::class("Demo.Circle").with_base(HostType::named("Demo.Shape")))
            .unwrap();
        registry
            .register(TypeEntry::delegate(
                "Demo.Callback",
                vec![ParamEntry::new("value", HostType::INT32)],
                HostType::VOID,
            ))
            .unwrap();
        registry
    }

    #[test]
    fn null_goes_to_references_and_nullables() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);

        assert!(binder.can_change_type(&HostValue::Null, &HostType::STRING));
        assert!(binder.can_change_type(&HostValue::Null, &HostType::named("Demo.Shape")));
        assert!(binder.can_change_type(&HostValue::Null, &HostType::nullable(HostType::INT32)));
        assert!(!binder.can_change_type(&HostValue::Null, &HostType::INT32));
        assert!(matches!(
            binder.change_type(HostValue::Null, &HostType::DOUBLE),
            Err(BridgeError::InvalidCast(_))
        ));
    }

    #[test]
    fn integral_numbers_coerce_within_range() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);

        assert_eq!(binder.change_type(HostValue::F64(42.0), &HostType::INT32).unwrap(), HostValue::I32(42));
        assert_eq!(binder.change_type(HostValue::F64(65.0), &HostType::CHAR).unwrap(), HostValue::Char(65));
        assert_eq!(
            binder
                .change_type(HostValue::F64(7.0), &HostType::nullable(HostType::BYTE))
                .unwrap(),
            HostValue::U8(7)
        );
        assert!(!binder.can_change_type(&HostValue::F64(1.5), &HostType::INT32));
        assert!(!binder.can_change_type(&HostValue::F64(256.0), &HostType::BYTE));
        assert!(!binder.can_change_type(&HostValue::F64(-1.0), &HostType::UINT64));
        assert!(!binder.can_change_type(&HostValue::F64(1.0), &HostType::BOOLEAN));
    }

    #[test]
    fn single_accepts_magnitude_and_non_finite() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);

        assert!(binder.can_change_type(&HostValue::F64(1.5), &HostType::SINGLE));
        assert!(binder.can_change_type(&HostValue::F64(f64::INFINITY), &HostType::SINGLE));
        assert!(binder.can_change_type(&HostValue::F64(f64::NAN), &HostType::SINGLE));
        assert!(!binder.can_change_type(&HostValue::F64(1e300), &HostType::SINGLE));
    }

    #[test]
    fn host_primitives_widen() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);

        assert_eq!(binder.change_type(HostValue::I32(5), &HostType::INT64).unwrap(), HostValue::I64(5));
        assert_eq!(binder.change_type(HostValue::U8(5), &HostType::DOUBLE).unwrap(), HostValue::F64(5.0));
        assert!(!binder.can_change_type(&HostValue::I64(5), &HostType::INT32));
    }

    #[test]
    fn objects_follow_assignability() {
        let registry = registry();
        let binder = Binder::without_callbacks(&registry);
        let circle = HostValue::Object(HostObject::new(HostType::named("Demo.Circle"), ()));

        assert!(binder.can_change_type(&circle, &HostType::named("Demo.Shape")));
        assert!(binder.can_change_type(&circle, &HostType::OBJECT));
        assert!(!binder.can_change_type(&HostValue::from("text"), &HostType::named("Demo.Shape")));
        assert!(binder.can_change_type(&HostValue::F64(1.0), &HostType::VALUE_TYPE));
    }

    #[test]
    fn foreign_functions_become_delegates() {
        let registry = registry();
        let function = HostValue::Object(HostObject::new(HostType::FOREIGN_FUNCTION, ()));
        let callback = HostType::named("Demo.Callback");

        let binder = Binder::new(&registry, &EchoCallbacks);
        assert!(binder.can_change_type(&function, &callback));
        let converted = binder.change_type(function.clone(), &callback).unwrap();
        assert_eq!(converted.as_object().unwrap().ty(), &callback);

        let binder = Binder::without_callbacks(&registry);
        let error = binder.change_type(function, &callback).unwrap_err();
        assert_eq!(
            error.to_string(),
            BridgeError::InvalidCast(
                "No callback bridge available to create a delegate of type 'Demo.Callback'".to_string()
            )
            .to_string()
        );
    }
}
