//! Host values and shared host objects.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{BridgeError, HostType, PrimitiveKind};

/// A value of the host object system.
///
/// Primitives are carried inline; everything else is a [`HostObject`]
/// compared by reference identity.
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    /// A UTF-16 code unit.
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(Arc<str>),
    Object(HostObject),
}

impl HostValue {
    /// Runtime type of the value, `None` for null.
    pub fn type_of(&self) -> Option<HostType> {
        let kind = match self {
            HostValue::Null => return None,
            HostValue::String(_) => return Some(HostType::STRING),
            HostValue::Object(object) => return Some(object.ty().clone()),
            HostValue::Bool(_) => PrimitiveKind::Boolean,
            HostValue::Char(_) => PrimitiveKind::Char,
            HostValue::I8(_) => PrimitiveKind::SByte,
            HostValue::U8(_) => PrimitiveKind::Byte,
            HostValue::I16(_) => PrimitiveKind::Int16,
            HostValue::U16(_) => PrimitiveKind::UInt16,
            HostValue::I32(_) => PrimitiveKind::Int32,
            HostValue::U32(_) => PrimitiveKind::UInt32,
            HostValue::I64(_) => PrimitiveKind::Int64,
            HostValue::U64(_) => PrimitiveKind::UInt64,
            HostValue::F32(_) => PrimitiveKind::Single,
            HostValue::F64(_) => PrimitiveKind::Double,
        };
        Some(HostType::primitive(kind))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value as `f64`, for any numeric primitive or char.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            HostValue::Char(v) => f64::from(v),
            HostValue::I8(v) => f64::from(v),
            HostValue::U8(v) => f64::from(v),
            HostValue::I16(v) => f64::from(v),
            HostValue::U16(v) => f64::from(v),
            HostValue::I32(v) => f64::from(v),
            HostValue::U32(v) => f64::from(v),
            HostValue::I64(v) => v as f64,
            HostValue::U64(v) => v as f64,
            HostValue::F32(v) => f64::from(v),
            HostValue::F64(v) => v,
            _ => return None,
        })
    }

    /// Build a primitive of `kind` from a number already known to fit.
    ///
    /// Returns `None` for `Boolean`. Out-of-range values saturate.
    pub fn from_number(kind: PrimitiveKind, value: f64) -> Option<Self> {
        Some(match kind {
            PrimitiveKind::Boolean => return None,
            PrimitiveKind::Char => HostValue::Char(value as u16),
            PrimitiveKind::SByte => HostValue::I8(value as i8),
            PrimitiveKind::Byte => HostValue::U8(value as u8),
            PrimitiveKind::Int16 => HostValue::I16(value as i16),
            PrimitiveKind::UInt16 => HostValue::U16(value as u16),
            PrimitiveKind::Int32 => HostValue::I32(value as i32),
            PrimitiveKind::UInt32 => HostValue::U32(value as u32),
            PrimitiveKind::Int64 => HostValue::I64(value as i64),
            PrimitiveKind::UInt64 => HostValue::U64(value as u64),
            PrimitiveKind::Single => HostValue::F32(value as f32),
            PrimitiveKind::Double => HostValue::F64(value),
        })
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Object(a), Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(value: $ty) -> Self {
                    HostValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    HostObject => Object,
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.into())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value.into())
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}

// ============================================================================
// Typed extraction
// ============================================================================

/// Extraction of a Rust value from a [`HostValue`].
///
/// Arguments reach natives already coerced to the declared parameter type,
/// so extraction matches the variant exactly.
pub trait FromHostValue: Sized {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError>;
}

fn mismatch(expected: &str, value: &HostValue) -> BridgeError {
    let found = value
        .type_of()
        .map_or_else(|| "null".to_string(), |ty| format!("{ty:?}"));
    BridgeError::InvalidCast(format!("expected a value of type '{expected}', found {found}"))
}

macro_rules! impl_from_host_value {
    ($($ty:ty => $variant:ident, $name:literal),* $(,)?) => {
        $(
            impl FromHostValue for $ty {
                fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
                    match value {
                        HostValue::$variant(v) => Ok(*v),
                        other => Err(mismatch($name, other)),
                    }
                }
            }
        )*
    };
}

impl_from_host_value! {
    bool => Bool, "Boolean",
    i8 => I8, "SByte",
    u8 => U8, "Byte",
    i16 => I16, "Int16",
    u16 => U16, "UInt16",
    i32 => I32, "Int32",
    u32 => U32, "UInt32",
    i64 => I64, "Int64",
    u64 => U64, "UInt64",
    f32 => F32, "Single",
}

impl FromHostValue for f64 {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        match value {
            HostValue::F64(v) => Ok(*v),
            HostValue::F32(v) => Ok(f64::from(*v)),
            other => Err(mismatch("Double", other)),
        }
    }
}

impl FromHostValue for Arc<str> {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        match value {
            HostValue::String(s) => Ok(Arc::clone(s)),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromHostValue for String {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        Arc::<str>::from_host_value(value).map(|s| s.to_string())
    }
}

impl FromHostValue for HostObject {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        match value {
            HostValue::Object(object) => Ok(object.clone()),
            other => Err(mismatch("Object", other)),
        }
    }
}

impl FromHostValue for HostValue {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        Ok(value.clone())
    }
}

impl<T: FromHostValue> FromHostValue for Option<T> {
    fn from_host_value(value: &HostValue) -> Result<Self, BridgeError> {
        match value {
            HostValue::Null => Ok(None),
            other => T::from_host_value(other).map(Some),
        }
    }
}

// ============================================================================
// Host objects
// ============================================================================

struct ObjectInner {
    ty: HostType,
    payload: RwLock<Box<dyn Any + Send + Sync>>,
}

/// A shared host object with a runtime type.
///
/// Cloning shares the object. Identity is the allocation: two handles are
/// the same object exactly when [`ptr_eq`](Self::ptr_eq) holds.
#[derive(Clone)]
pub struct HostObject(Arc<ObjectInner>);

impl HostObject {
    /// Create an object of type `ty` holding `payload`.
    pub fn new<T: Any + Send + Sync>(ty: HostType, payload: T) -> Self {
        HostObject(Arc::new(ObjectInner {
            ty,
            payload: RwLock::new(Box::new(payload)),
        }))
    }

    /// Runtime type of the object.
    pub fn ty(&self) -> &HostType {
        &self.0.ty
    }

    /// Whether the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.payload.read().is::<T>()
    }

    /// Borrow the payload as `T`.
    ///
    /// Returns `None` when the payload is of another type.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let payload = self.0.payload.read();
        payload.downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the payload as `T`.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut payload = self.0.payload.write();
        payload.downcast_mut::<T>().map(f)
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address-derived identity key, stable for the object's lifetime.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject(Arc::downgrade(&self.0))
    }

    /// Number of strong handles, for diagnostics and tests.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for HostObject {}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("ty", &self.0.ty)
            .field("id", &format_args!("{:#x}", self.id()))
            .finish_non_exhaustive()
    }
}

/// A non-owning handle to a [`HostObject`].
#[derive(Clone)]
pub struct WeakHostObject(Weak<ObjectInner>);

impl WeakHostObject {
    pub fn upgrade(&self) -> Option<HostObject> {
        self.0.upgrade().map(HostObject)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakHostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHostObject")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    #[test]
    fn object_identity() {
        let a = HostObject::new(HostType::named("Demo.Counter"), Counter(0));
        let b = a.clone();
        let c = HostObject::new(HostType::named("Demo.Counter"), Counter(0));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(HostValue::Object(a.clone()), HostValue::Object(b));
        assert_ne!(HostValue::Object(a), HostValue::Object(c));
    }

    #[test]
    fn payload_access() {
        let object = HostObject::new(HostType::named("Demo.Counter"), Counter(1));
        object.with_mut(|counter: &mut Counter| counter.0 += 1);
        assert_eq!(object.with(|counter: &Counter| counter.0), Some(2));
        assert_eq!(object.with(|s: &String| s.len()), None);
        assert!(object.is::<Counter>());
    }

    #[test]
    fn weak_handles_expire() {
        let object = HostObject::new(HostType::OBJECT, ());
        let weak = object.downgrade();
        assert!(weak.upgrade().is_some_and(|o| o.ptr_eq(&object)));
        drop(object);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn runtime_types() {
        assert_eq!(HostValue::I32(1).type_of(), Some(HostType::INT32));
        assert_eq!(HostValue::from("x").type_of(), Some(HostType::STRING));
        assert_eq!(HostValue::Null.type_of(), None);
    }

    #[test]
    fn typed_extraction_is_exact() {
        assert_eq!(i32::from_host_value(&HostValue::I32(7)).ok(), Some(7));
        assert!(i32::from_host_value(&HostValue::F64(7.0)).is_err());
        assert_eq!(
            Option::<i32>::from_host_value(&HostValue::Null).ok(),
            Some(None)
        );
    }
}
