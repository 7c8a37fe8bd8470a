//! Primitive type kinds of the host object system.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::TypeHash;

/// Primitive host types.
///
/// Ordered by the widening lattice the binder walks: every kind converts
/// implicitly to some kinds listed after it, never to one listed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
}

impl PrimitiveKind {
    /// All kinds, in declaration order.
    pub const ALL: [PrimitiveKind; 12] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
    ];

    /// Get the TypeHash for this primitive type.
    pub const fn type_hash(self) -> TypeHash {
        use crate::primitives;
        match self {
            PrimitiveKind::Boolean => primitives::BOOLEAN,
            PrimitiveKind::Char => primitives::CHAR,
            PrimitiveKind::SByte => primitives::SBYTE,
            PrimitiveKind::Byte => primitives::BYTE,
            PrimitiveKind::Int16 => primitives::INT16,
            PrimitiveKind::UInt16 => primitives::UINT16,
            PrimitiveKind::Int32 => primitives::INT32,
            PrimitiveKind::UInt32 => primitives::UINT32,
            PrimitiveKind::Int64 => primitives::INT64,
            PrimitiveKind::UInt64 => primitives::UINT64,
            PrimitiveKind::Single => primitives::SINGLE,
            PrimitiveKind::Double => primitives::DOUBLE,
        }
    }

    /// Look up the primitive kind registered under `hash`.
    pub fn from_hash(hash: TypeHash) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_hash() == hash)
    }

    /// Get the name of this primitive type.
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
        }
    }

    /// Integral kinds, including `Char`.
    pub const fn is_integral(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Boolean | PrimitiveKind::Single | PrimitiveKind::Double
        )
    }

    /// Numeric kinds the foreign number may be coerced into (everything but `Boolean`).
    pub const fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean)
    }

    /// Integral range as `[start, end)`, for integral kinds.
    ///
    /// The end is exclusive so the 64-bit bounds stay exact in `f64`.
    pub const fn integral_range(self) -> Option<(f64, f64)> {
        match self {
            PrimitiveKind::Char => Some((0.0, 65_536.0)),
            PrimitiveKind::SByte => Some((-128.0, 128.0)),
            PrimitiveKind::Byte => Some((0.0, 256.0)),
            PrimitiveKind::Int16 => Some((-32_768.0, 32_768.0)),
            PrimitiveKind::UInt16 => Some((0.0, 65_536.0)),
            PrimitiveKind::Int32 => Some((-2_147_483_648.0, 2_147_483_648.0)),
            PrimitiveKind::UInt32 => Some((0.0, 4_294_967_296.0)),
            PrimitiveKind::Int64 => Some((-9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0)),
            PrimitiveKind::UInt64 => Some((0.0, 18_446_744_073_709_551_616.0)),
            _ => None,
        }
    }

    /// Whether the foreign number `value` can be coerced into this kind.
    ///
    /// Integral kinds need an integral value inside their range; `Single`
    /// accepts anything representable in magnitude plus infinities and NaN.
    pub fn accepts_number(self, value: f64) -> bool {
        match self {
            PrimitiveKind::Boolean => false,
            PrimitiveKind::Double => true,
            PrimitiveKind::Single => {
                value.abs() <= f32::MAX as f64 || value.is_infinite() || value.is_nan()
            }
            kind => match kind.integral_range() {
                Some((start, end)) => value >= start && value < end && value.fract() == 0.0,
                None => false,
            },
        }
    }

    /// Signed integral kind that is a better conversion target than `other`
    /// (same width or narrower than the unsigned `other`).
    pub fn is_better_integer_target(self, other: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        match self {
            SByte => matches!(other, Byte | UInt16 | UInt32 | UInt64),
            Int16 => matches!(other, UInt16 | UInt32 | UInt64),
            Int32 => matches!(other, UInt32 | UInt64),
            Int64 => matches!(other, UInt64),
            _ => false,
        }
    }

    /// Implicit numeric widening from `self` to `target` (identity excluded).
    pub fn widens_to(self, target: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        match self {
            SByte => matches!(target, Int16 | Int32 | Int64 | Single | Double),
            Byte => matches!(
                target,
                Int16 | UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double
            ),
            Int16 => matches!(target, Int32 | Int64 | Single | Double),
            UInt16 => matches!(target, Int32 | UInt32 | Int64 | UInt64 | Single | Double),
            Int32 => matches!(target, Int64 | Single | Double),
            UInt32 => matches!(target, Int64 | UInt64 | Single | Double),
            Int64 | UInt64 => matches!(target, Single | Double),
            Char => matches!(
                target,
                UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double
            ),
            Single => matches!(target, Double),
            Boolean | Double => false,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
