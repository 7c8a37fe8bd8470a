//! Member and type attribute flags.

use bitflags::bitflags;

bitflags! {
    /// Attributes of a member entry.
    ///
    /// `SPECIAL_NAME` marks compiler-generated members: property accessors
    /// (`get_X` / `set_X`), event accessors (`add_X` / `remove_X`) and
    /// operator methods (`op_Addition`, ...). They are hidden from lookup
    /// unless binding hints ask for them.
    ///
    /// ```rust
    /// use hostbridge_core::MemberFlags;
    ///
    /// let accessor = MemberFlags::STATIC | MemberFlags::SPECIAL_NAME;
    /// assert!(accessor.contains(MemberFlags::SPECIAL_NAME));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        /// Member belongs to the type, not to instances.
        const STATIC = 1 << 0;
        /// Compiler-generated accessor or operator.
        const SPECIAL_NAME = 1 << 1;
        /// Hides every inherited callable of the same name, regardless of signature.
        const HIDE_BY_NAME = 1 << 2;
        /// Field cannot be assigned.
        const READ_ONLY = 1 << 3;
    }
}

bitflags! {
    /// Attributes of a type entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        /// Lookup sees only the members this type declares itself.
        const HIDE_INHERITED_MEMBERS = 1 << 0;
        /// Cannot be derived from.
        const SEALED = 1 << 1;
        /// Cannot be constructed directly.
        const ABSTRACT = 1 << 2;
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefModifier {
    /// By value.
    #[default]
    None,
    /// By reference, read and written by the callee.
    Ref,
    /// By reference, written by the callee only.
    Out,
}

/// Variance of a generic type parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variance {
    #[default]
    Invariant,
    /// `out T`
    Covariant,
    /// `in T`
    Contravariant,
}

/// Kind of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Primitive,
    Delegate,
}

impl TypeKind {
    /// Value types are copied on assignment and never null.
    pub const fn is_value_type(self) -> bool {
        matches!(self, TypeKind::Struct | TypeKind::Primitive)
    }
}
