//! Structural host type references.

use crate::{PrimitiveKind, TypeHash, primitives};

/// A reference to a host type.
///
/// Registered types are named by their [`TypeHash`]. Arrays, constructed
/// generics and nullables are structural so the binder can walk into them
/// during inference and specificity checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostType {
    /// A registered type.
    Named(TypeHash),
    /// An array of `element` with `rank` dimensions.
    Array { element: Box<HostType>, rank: u8 },
    /// A generic type definition applied to type arguments.
    Generic {
        definition: TypeHash,
        args: Vec<HostType>,
    },
    /// `inner` or null. `inner` is always a non-nullable value type.
    Nullable(Box<HostType>),
    /// Type parameter of the declaring generic type, by position.
    TypeParam(u16),
    /// Type parameter of a generic method, by position.
    MethodParam(u16),
}

impl HostType {
    pub const OBJECT: HostType = HostType::Named(primitives::OBJECT);
    pub const VALUE_TYPE: HostType = HostType::Named(primitives::VALUE_TYPE);
    pub const VOID: HostType = HostType::Named(primitives::VOID);
    pub const STRING: HostType = HostType::Named(primitives::STRING);
    pub const BOOLEAN: HostType = HostType::Named(primitives::BOOLEAN);
    pub const CHAR: HostType = HostType::Named(primitives::CHAR);
    pub const SBYTE: HostType = HostType::Named(primitives::SBYTE);
    pub const BYTE: HostType = HostType::Named(primitives::BYTE);
    pub const INT16: HostType = HostType::Named(primitives::INT16);
    pub const UINT16: HostType = HostType::Named(primitives::UINT16);
    pub const INT32: HostType = HostType::Named(primitives::INT32);
    pub const UINT32: HostType = HostType::Named(primitives::UINT32);
    pub const INT64: HostType = HostType::Named(primitives::INT64);
    pub const UINT64: HostType = HostType::Named(primitives::UINT64);
    pub const SINGLE: HostType = HostType::Named(primitives::SINGLE);
    pub const DOUBLE: HostType = HostType::Named(primitives::DOUBLE);
    pub const ARRAY: HostType = HostType::Named(primitives::ARRAY);
    pub const DELEGATE: HostType = HostType::Named(primitives::DELEGATE);
    pub const EXCEPTION: HostType = HostType::Named(primitives::EXCEPTION);
    pub const INT64_BOX: HostType = HostType::Named(primitives::INT64_BOX);
    pub const UINT64_BOX: HostType = HostType::Named(primitives::UINT64_BOX);
    pub const STATIC_CONTEXT: HostType = HostType::Named(primitives::STATIC_CONTEXT);
    pub const PARTIAL_TARGET: HostType = HostType::Named(primitives::PARTIAL_TARGET);
    pub const HINTED_TARGET: HostType = HostType::Named(primitives::HINTED_TARGET);
    pub const FOREIGN_TABLE: HostType = HostType::Named(primitives::FOREIGN_TABLE);
    pub const FOREIGN_FUNCTION: HostType = HostType::Named(primitives::FOREIGN_FUNCTION);
    pub const FOREIGN_USERDATA: HostType = HostType::Named(primitives::FOREIGN_USERDATA);
    pub const FOREIGN_THREAD: HostType = HostType::Named(primitives::FOREIGN_THREAD);

    /// A type named by its full name.
    pub fn named(full_name: &str) -> Self {
        HostType::Named(TypeHash::from_name(full_name))
    }

    /// One-dimensional array of `element`.
    pub fn array_of(element: HostType) -> Self {
        HostType::Array {
            element: Box::new(element),
            rank: 1,
        }
    }

    /// Array of `element` with `rank` dimensions.
    pub fn array_with_rank(element: HostType, rank: u8) -> Self {
        HostType::Array {
            element: Box::new(element),
            rank,
        }
    }

    /// `definition` applied to `args`.
    pub fn generic(definition: TypeHash, args: Vec<HostType>) -> Self {
        HostType::Generic { definition, args }
    }

    /// Nullable form of the value type `inner`.
    pub fn nullable(inner: HostType) -> Self {
        HostType::Nullable(Box::new(inner))
    }

    /// The primitive type of `kind`.
    pub const fn primitive(kind: PrimitiveKind) -> Self {
        HostType::Named(kind.type_hash())
    }

    /// Primitive kind of this type, if it is a primitive.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            HostType::Named(hash) => PrimitiveKind::from_hash(*hash),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        *self == HostType::VOID
    }

    pub fn is_array(&self) -> bool {
        matches!(self, HostType::Array { .. })
    }

    /// Element type of an array.
    pub fn element_type(&self) -> Option<&HostType> {
        match self {
            HostType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Underlying value type of a nullable.
    pub fn nullable_inner(&self) -> Option<&HostType> {
        match self {
            HostType::Nullable(inner) => Some(inner),
            _ => None,
        }
    }

    /// A method-level generic parameter.
    pub fn is_method_param(&self) -> bool {
        matches!(self, HostType::MethodParam(_))
    }

    /// Any generic parameter, type-level or method-level.
    pub fn is_generic_param(&self) -> bool {
        matches!(self, HostType::MethodParam(_) | HostType::TypeParam(_))
    }

    /// Whether a method-level generic parameter occurs anywhere in this type.
    pub fn contains_method_params(&self) -> bool {
        match self {
            HostType::MethodParam(_) => true,
            HostType::Array { element, .. } => element.contains_method_params(),
            HostType::Nullable(inner) => inner.contains_method_params(),
            HostType::Generic { args, .. } => args.iter().any(HostType::contains_method_params),
            HostType::Named(_) | HostType::TypeParam(_) => false,
        }
    }

    /// Replace method-level generic parameters with `args`.
    ///
    /// Parameters without a corresponding argument are left in place.
    pub fn substitute_method_params(&self, args: &[HostType]) -> HostType {
        self.map_params(&|ty| match ty {
            HostType::MethodParam(i) => args.get(*i as usize).cloned(),
            _ => None,
        })
    }

    /// Replace type-level generic parameters with `args`.
    pub fn substitute_type_params(&self, args: &[HostType]) -> HostType {
        self.map_params(&|ty| match ty {
            HostType::TypeParam(i) => args.get(*i as usize).cloned(),
            _ => None,
        })
    }

    fn map_params(&self, replace: &dyn Fn(&HostType) -> Option<HostType>) -> HostType {
        if let Some(replaced) = replace(self) {
            return replaced;
        }
        match self {
            HostType::Array { element, rank } => HostType::Array {
                element: Box::new(element.map_params(replace)),
                rank: *rank,
            },
            HostType::Nullable(inner) => HostType::Nullable(Box::new(inner.map_params(replace))),
            HostType::Generic { definition, args } => HostType::Generic {
                definition: *definition,
                args: args.iter().map(|arg| arg.map_params(replace)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Structural hash, used for method identity.
    pub fn hash_key(&self) -> TypeHash {
        match self {
            HostType::Named(hash) => *hash,
            HostType::Array { element, rank } => TypeHash::from_generic_instance(
                primitives::ARRAY,
                &[element.hash_key(), TypeHash(u64::from(*rank))],
            ),
            HostType::Generic { definition, args } => {
                let args: Vec<TypeHash> = args.iter().map(HostType::hash_key).collect();
                TypeHash::from_generic_instance(*definition, &args)
            }
            HostType::Nullable(inner) => {
                TypeHash::from_generic_instance(primitives::VALUE_TYPE, &[inner.hash_key()])
            }
            HostType::TypeParam(i) => TypeHash(0x7470_0000_0000_0000 | u64::from(*i)),
            HostType::MethodParam(i) => TypeHash(0x6d70_0000_0000_0000 | u64::from(*i)),
        }
    }
}

impl From<PrimitiveKind> for HostType {
    fn from(kind: PrimitiveKind) -> Self {
        HostType::primitive(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_through_structure() {
        let list = TypeHash::from_name("Demo.List");
        let ty = HostType::array_of(HostType::generic(list, vec![HostType::MethodParam(0)]));
        let substituted = ty.substitute_method_params(&[HostType::INT32]);
        assert_eq!(
            substituted,
            HostType::array_of(HostType::generic(list, vec![HostType::INT32]))
        );
        assert!(ty.contains_method_params());
        assert!(!substituted.contains_method_params());
    }

    #[test]
    fn type_and_method_params_are_distinct() {
        let ty = HostType::generic(
            TypeHash::from_name("Demo.Pair"),
            vec![HostType::TypeParam(0), HostType::MethodParam(0)],
        );
        let only_type = ty.substitute_type_params(&[HostType::STRING]);
        assert_eq!(
            only_type,
            HostType::generic(
                TypeHash::from_name("Demo.Pair"),
                vec![HostType::STRING, HostType::MethodParam(0)]
            )
        );
    }

    #[test]
    fn hash_key_separates_rank() {
        let one = HostType::array_of(HostType::INT32);
        let two = HostType::array_with_rank(HostType::INT32, 2);
        assert_ne!(one.hash_key(), two.hash_key());
    }
}
