//! Values of the foreign engine.

use std::fmt;
use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use ordered_float::OrderedFloat;

/// Handle to a collectable object in the engine heap.
///
/// The generation detects handles that outlived their object: a slot is
/// reused with a new generation once the collector frees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl GcRef {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Stable identity while the object is alive.
    pub fn id(&self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

/// Type tag of a [`ForeignValue`].
///
/// Numbered like the engine's public type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ValueKind {
    Nil = 0,
    Boolean = 1,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    UserData = 7,
    Thread = 8,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Table => "table",
            ValueKind::Function => "function",
            ValueKind::UserData => "userdata",
            ValueKind::Thread => "thread",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value on the engine's stack or in one of its tables.
///
/// Equality and hashing are raw engine identity: numbers by value, strings
/// by content, everything else by handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ForeignValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    /// Raw bytes; the engine attaches no encoding.
    String(Arc<[u8]>),
    Table(GcRef),
    Function(GcRef),
    Thread(GcRef),
    UserData(GcRef),
}

impl ForeignValue {
    pub fn number(value: f64) -> Self {
        ForeignValue::Number(OrderedFloat(value))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ForeignValue::Nil => ValueKind::Nil,
            ForeignValue::Boolean(_) => ValueKind::Boolean,
            ForeignValue::Number(_) => ValueKind::Number,
            ForeignValue::String(_) => ValueKind::String,
            ForeignValue::Table(_) => ValueKind::Table,
            ForeignValue::Function(_) => ValueKind::Function,
            ForeignValue::Thread(_) => ValueKind::Thread,
            ForeignValue::UserData(_) => ValueKind::UserData,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ForeignValue::Nil)
    }

    /// Everything except nil and false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, ForeignValue::Nil | ForeignValue::Boolean(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ForeignValue::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ForeignValue::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The string as UTF-8, if it is a valid UTF-8 string.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Heap handle of a collectable value.
    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            ForeignValue::Table(r)
            | ForeignValue::Function(r)
            | ForeignValue::Thread(r)
            | ForeignValue::UserData(r) => Some(*r),
            _ => None,
        }
    }

    /// Text of a value without consulting metamethods.
    pub fn display_raw(&self) -> String {
        match self {
            ForeignValue::Nil => "nil".to_string(),
            ForeignValue::Boolean(b) => b.to_string(),
            ForeignValue::Number(n) => format_number(n.0),
            ForeignValue::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => match other.gc_ref() {
                Some(r) => format!("{}: {:#010x}", other.type_name(), r.id()),
                None => other.type_name().to_string(),
            },
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        n.to_string()
    }
}

impl From<bool> for ForeignValue {
    fn from(value: bool) -> Self {
        ForeignValue::Boolean(value)
    }
}

impl From<f64> for ForeignValue {
    fn from(value: f64) -> Self {
        ForeignValue::number(value)
    }
}

impl From<&str> for ForeignValue {
    fn from(value: &str) -> Self {
        ForeignValue::String(Arc::from(value.as_bytes()))
    }
}

impl From<String> for ForeignValue {
    fn from(value: String) -> Self {
        ForeignValue::String(Arc::from(value.into_bytes()))
    }
}

impl From<Vec<u8>> for ForeignValue {
    fn from(value: Vec<u8>) -> Self {
        ForeignValue::String(Arc::from(value))
    }
}

impl From<&[u8]> for ForeignValue {
    fn from(value: &[u8]) -> Self {
        ForeignValue::String(Arc::from(value))
    }
}

/// Key into the engine's reference table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RefKey(pub(crate) u32);

impl RefKey {
    /// The key a nil value is referenced under. Never allocated.
    pub const NIL: RefKey = RefKey(u32::MAX);

    pub fn is_nil(&self) -> bool {
        *self == RefKey::NIL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_hash_by_value() {
        use rustc_hash::FxHashSet;

        let mut set = FxHashSet::default();
        set.insert(ForeignValue::number(1.0));
        set.insert(ForeignValue::number(0.0));
        assert!(set.contains(&ForeignValue::number(1.0)));
        assert!(set.contains(&ForeignValue::number(-0.0)));
        assert!(!set.contains(&ForeignValue::from("1")));
    }

    #[test]
    fn truthiness() {
        assert!(!ForeignValue::Nil.is_truthy());
        assert!(!ForeignValue::Boolean(false).is_truthy());
        assert!(ForeignValue::number(0.0).is_truthy());
        assert!(ForeignValue::from("").is_truthy());
    }

    #[test]
    fn kind_codes() {
        assert_eq!(u8::from(ValueKind::UserData), 7);
        assert!(matches!(ValueKind::try_from(4u8), Ok(ValueKind::String)));
        assert!(ValueKind::try_from(2u8).is_err());
    }

    #[test]
    fn raw_display() {
        assert_eq!(ForeignValue::number(3.0).display_raw(), "3");
        assert_eq!(ForeignValue::number(2.5).display_raw(), "2.5");
        assert_eq!(ForeignValue::Nil.display_raw(), "nil");
        assert_eq!(ForeignValue::from("abc").display_raw(), "abc");
    }
}
