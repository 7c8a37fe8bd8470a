//! Built-in host types.
//!
//! Every registry the bridge runs on starts from these: the root `Object`,
//! `ValueType`, the primitives, `String`, `Array`, `Delegate`, `Exception`,
//! the exact-width integer boxes and the internal wrapper types used for
//! static contexts, partial targets and foreign references.

use hostbridge_core::numeric::{self, ArithOp, Operand};
use hostbridge_core::{
    ArrayData, BridgeError, CallContext, HostException, HostType, HostValue, MemberFlags,
    MethodEntry, ParamEntry, PrimitiveKind, PropertyEntry, TypeEntry, TypeFlags, TypeKind,
};

use crate::{RegistrationError, TypeRegistry};

const ARITHMETIC_OPERATORS: [(&str, ArithOp); 5] = [
    ("op_Addition", ArithOp::Add),
    ("op_Subtraction", ArithOp::Sub),
    ("op_Multiply", ArithOp::Mul),
    ("op_Division", ArithOp::Div),
    ("op_Modulus", ArithOp::Rem),
];

const COMPARISON_OPERATORS: [(&str, fn(Operand, Operand) -> bool); 3] = [
    ("op_Equality", numeric::equals),
    ("op_LessThan", numeric::less_than),
    ("op_LessThanOrEqual", numeric::less_equal),
];

impl TypeRegistry {
    /// Create a registry holding the built-in types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in builtin_types() {
            if let Err(error) = registry.register(entry) {
                // builtin names are distinct; reaching this is a bug in the table above
                tracing::error!(%error, "failed to register builtin type");
            }
        }
        registry
    }

    /// Register a batch of entries, stopping at the first failure.
    pub fn register_all(&mut self, entries: impl IntoIterator<Item = TypeEntry>) -> Result<(), RegistrationError> {
        for entry in entries {
            self.register(entry)?;
        }
        Ok(())
    }
}

fn builtin_types() -> Vec<TypeEntry> {
    let mut types = vec![
        TypeEntry::new("Object", TypeKind::Class),
        TypeEntry::class("ValueType").with_flags(TypeFlags::ABSTRACT),
        TypeEntry::new("Void", TypeKind::Struct)
            .with_base(HostType::VALUE_TYPE)
            .sealed(),
        string_type(),
        array_type(),
        TypeEntry::class("Delegate").with_flags(TypeFlags::ABSTRACT),
        exception_type(),
        int64_box_type(),
        uint64_box_type(),
    ];

    types.extend(PrimitiveKind::ALL.into_iter().map(|kind| {
        TypeEntry::new(kind.name(), TypeKind::Primitive)
            .with_base(HostType::VALUE_TYPE)
            .sealed()
    }));

    types.extend(
        [
            "StaticContext",
            "PartialTarget",
            "HintedTarget",
            "ForeignTable",
            "ForeignFunction",
            "ForeignUserData",
            "ForeignThread",
        ]
        .into_iter()
        .map(|name| TypeEntry::class(name).sealed().hide_inherited_members()),
    );

    types
}

fn string_type() -> TypeEntry {
    TypeEntry::class("String").sealed().with_property(
        "Length",
        PropertyEntry::new(HostType::INT32).with_getter(|ctx| {
            let text = ctx
                .this_value()?
                .as_str()
                .ok_or_else(|| BridgeError::Target("receiver is not a string".to_string()))?;
            let length = text.encode_utf16().count();
            ctx.set_return(i32::try_from(length).unwrap_or(i32::MAX));
            Ok(())
        }),
    )
}

fn array_type() -> TypeEntry {
    TypeEntry::class("Array")
        .with_flags(TypeFlags::ABSTRACT)
        .with_property(
            "Length",
            PropertyEntry::new(HostType::INT32).with_getter(|ctx| {
                let length = ctx.with_this(|array: &ArrayData| array.len())?;
                ctx.set_return(i32::try_from(length).unwrap_or(i32::MAX));
                Ok(())
            }),
        )
        .with_property(
            "Rank",
            PropertyEntry::new(HostType::INT32).with_getter(|ctx| {
                let rank = ctx.with_this(|array: &ArrayData| array.rank())?;
                ctx.set_return(i32::try_from(rank).unwrap_or(i32::MAX));
                Ok(())
            }),
        )
        .with_method(
            MethodEntry::new("GetLength", |ctx| {
                let dimension: i32 = ctx.arg(0)?;
                let length = ctx.with_this(|array: &ArrayData| {
                    usize::try_from(dimension)
                        .ok()
                        .and_then(|d| array.lengths().get(d).copied())
                })?;
                let length = length.ok_or_else(|| {
                    BridgeError::Argument("Index was outside the bounds of the array.".to_string())
                })?;
                ctx.set_return(i32::try_from(length).unwrap_or(i32::MAX));
                Ok(())
            })
            .with_param(ParamEntry::new("dimension", HostType::INT32))
            .returns(HostType::INT32),
        )
}

fn exception_type() -> TypeEntry {
    TypeEntry::class("Exception")
        .with_constructor(
            MethodEntry::new("", |ctx| {
                let message: String = ctx.arg(0)?;
                let exception = HostException::new(HostType::EXCEPTION, message);
                ctx.set_return(exception.object().clone());
                Ok(())
            })
            .with_param(ParamEntry::new("message", HostType::STRING)),
        )
        .with_property(
            "Message",
            PropertyEntry::new(HostType::STRING).with_getter(|ctx| {
                let object = ctx.this_object()?.clone();
                ctx.set_return(BridgeError::from_exception_object(object).to_string());
                Ok(())
            }),
        )
}

// ============================================================================
// Exact-width integer boxes
// ============================================================================

fn int64_box_type() -> TypeEntry {
    let this = HostType::INT64_BOX;
    let signatures = vec![
        (this.clone(), this.clone()),
        (this.clone(), HostType::DOUBLE),
        (HostType::DOUBLE, this.clone()),
    ];
    box_type("Int64Box", this, signatures)
}

fn uint64_box_type() -> TypeEntry {
    let this = HostType::UINT64_BOX;
    let signed = HostType::INT64_BOX;
    // mixed signed/unsigned pairs live on the unsigned box only
    let signatures = vec![
        (this.clone(), this.clone()),
        (this.clone(), HostType::DOUBLE),
        (HostType::DOUBLE, this.clone()),
        (signed.clone(), this.clone()),
        (this.clone(), signed),
    ];
    box_type("UInt64Box", this, signatures)
}

fn box_type(name: &str, this: HostType, signatures: Vec<(HostType, HostType)>) -> TypeEntry {
    let mut entry = TypeEntry::structure(name)
        .sealed()
        .hide_inherited_members()
        .with_property(
            "Value",
            PropertyEntry::new(HostType::DOUBLE).with_getter(|ctx| {
                let value = this_operand(ctx)?;
                ctx.set_return(value.as_f64());
                Ok(())
            }),
        )
        .with_method(
            MethodEntry::new("ToString", |ctx| {
                let text = match this_operand(ctx)? {
                    Operand::Int64(v) => v.to_string(),
                    Operand::UInt64(v) => v.to_string(),
                    Operand::Double(v) => v.to_string(),
                };
                ctx.set_return(text);
                Ok(())
            })
            .returns(HostType::STRING),
        );

    for (operator, op) in ARITHMETIC_OPERATORS {
        for (lhs, rhs) in &signatures {
            entry = entry.with_method(binary_operator(operator, lhs, rhs, HostType::OBJECT, move |a, b| {
                numeric::arith(op, a, b)
            }));
        }
    }

    for (operator, compare) in COMPARISON_OPERATORS {
        for (lhs, rhs) in &signatures {
            entry = entry.with_method(binary_operator(operator, lhs, rhs, HostType::BOOLEAN, move |a, b| {
                Ok(HostValue::Bool(compare(a, b)))
            }));
        }
    }

    entry.with_method(
        MethodEntry::new("op_UnaryNegation", |ctx| {
            let operand = operand(ctx, 0)?;
            ctx.set_return(numeric::negate(operand));
            Ok(())
        })
        .with_param(ParamEntry::new("operand", this))
        .returns(HostType::OBJECT)
        .as_static()
        .with_flags(MemberFlags::SPECIAL_NAME),
    )
}

fn binary_operator<F>(name: &str, lhs: &HostType, rhs: &HostType, returns: HostType, body: F) -> MethodEntry
where
    F: Fn(Operand, Operand) -> Result<HostValue, BridgeError> + Send + Sync + 'static,
{
    MethodEntry::new(name, move |ctx| {
        let result = body(operand(ctx, 0)?, operand(ctx, 1)?)?;
        ctx.set_return(result);
        Ok(())
    })
    .with_param(ParamEntry::new("lhs", lhs.clone()))
    .with_param(ParamEntry::new("rhs", rhs.clone()))
    .returns(returns)
    .as_static()
    .with_flags(MemberFlags::SPECIAL_NAME)
}

fn operand(ctx: &CallContext, index: usize) -> Result<Operand, BridgeError> {
    Operand::from_value(ctx.arg_value(index)?)
        .ok_or_else(|| BridgeError::InvalidCast(format!("argument {index} is not a numeric operand")))
}

fn this_operand(ctx: &CallContext) -> Result<Operand, BridgeError> {
    Operand::from_value(ctx.this_value()?)
        .ok_or_else(|| BridgeError::Target("receiver is not an integer box".to_string()))
}

#[cfg(test)]
mod tests {
    use hostbridge_core::{Int64Box, MemberKind, TypeHash, UInt64Box, primitives};

    use super::*;

    fn call_static(registry: &TypeRegistry, ty: TypeHash, name: &str, args: &mut [HostValue]) -> HostValue {
        let arg_types: Vec<HostType> = args.iter().map(|a| a.type_of().unwrap()).collect();
        let entry = registry.get(ty).unwrap();
        let method = entry
            .members_named(name)
            .filter_map(|m| m.as_method())
            .find(|m| {
                m.params
                    .iter()
                    .zip(&arg_types)
                    .all(|(p, t)| p.data_type == *t)
            })
            .expect("operator overload");
        let declaring = HostType::Named(ty);
        let mut ctx = CallContext::new(None, args, &[], &declaring);
        method.implementation.call(&mut ctx).unwrap();
        ctx.take_return()
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TypeRegistry::with_builtins();
        for hash in [
            primitives::OBJECT,
            primitives::VALUE_TYPE,
            primitives::STRING,
            primitives::INT32,
            primitives::DOUBLE,
            primitives::ARRAY,
            primitives::DELEGATE,
            primitives::EXCEPTION,
            primitives::INT64_BOX,
            primitives::UINT64_BOX,
            primitives::STATIC_CONTEXT,
            primitives::FOREIGN_TABLE,
        ] {
            assert!(registry.contains(hash), "{hash}");
        }
        assert!(registry.is_value_type(&HostType::INT32));
        assert!(registry.is_value_type(&HostType::INT64_BOX));
        assert!(registry.is_reference_type(&HostType::STRING));
    }

    #[test]
    fn box_operators_are_static_special_methods() {
        let registry = TypeRegistry::with_builtins();
        let entry = registry.get(primitives::INT64_BOX).unwrap();
        assert!(entry.hides_inherited_members());
        let additions: Vec<_> = entry.members_named("op_Addition").collect();
        assert_eq!(additions.len(), 3);
        assert!(additions.iter().all(|m| m.is_static() && m.is_special_name()));

        let unsigned = registry.get(primitives::UINT64_BOX).unwrap();
        assert_eq!(unsigned.members_named("op_Addition").count(), 5);
    }

    #[test]
    fn box_addition_stays_exact() {
        let registry = TypeRegistry::with_builtins();
        let mut args = [
            HostValue::Object(Int64Box(i64::MAX - 1).into_object()),
            HostValue::F64(1.0),
        ];
        let result = call_static(&registry, primitives::INT64_BOX, "op_Addition", &mut args);
        assert_eq!(result, HostValue::I64(i64::MAX));

        let mut args = [
            HostValue::Object(Int64Box(i64::MAX).into_object()),
            HostValue::Object(Int64Box(1).into_object()),
        ];
        let result = call_static(&registry, primitives::INT64_BOX, "op_Addition", &mut args);
        assert!(matches!(result, HostValue::F64(_)));
    }

    #[test]
    fn mixed_sign_comparison() {
        let registry = TypeRegistry::with_builtins();
        let mut args = [
            HostValue::Object(Int64Box(-1).into_object()),
            HostValue::Object(UInt64Box(0).into_object()),
        ];
        let result = call_static(&registry, primitives::UINT64_BOX, "op_LessThan", &mut args);
        assert_eq!(result, HostValue::Bool(true));
    }

    #[test]
    fn box_value_property() {
        let registry = TypeRegistry::with_builtins();
        let entry = registry.get(primitives::UINT64_BOX).unwrap();
        let value = entry.members_named("Value").next().unwrap();
        let MemberKind::Property(property) = &value.kind else {
            panic!("Value is a property");
        };
        let getter = property.getter.as_ref().unwrap();

        let this = HostValue::Object(UInt64Box(42).into_object());
        let mut args: [HostValue; 0] = [];
        let declaring = HostType::UINT64_BOX;
        let mut ctx = CallContext::new(Some(&this), &mut args, &[], &declaring);
        getter.implementation.call(&mut ctx).unwrap();
        assert_eq!(ctx.take_return(), HostValue::F64(42.0));
    }

    #[test]
    fn exception_message_reads_carried_errors() {
        let registry = TypeRegistry::with_builtins();
        let entry = registry.get(primitives::EXCEPTION).unwrap();
        let message = entry
            .members_named("get_Message")
            .find_map(|m| m.as_method())
            .unwrap();

        let object = BridgeError::MissingMember("gone".to_string()).into_exception_object();
        let this = HostValue::Object(object);
        let mut args: [HostValue; 0] = [];
        let declaring = HostType::EXCEPTION;
        let mut ctx = CallContext::new(Some(&this), &mut args, &[], &declaring);
        message.implementation.call(&mut ctx).unwrap();
        assert_eq!(ctx.take_return().as_str(), Some("gone"));
    }
}
