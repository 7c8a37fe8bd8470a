//! Exact-width 64-bit integer arithmetic.
//!
//! The foreign engine has a single `f64` number type, so 64-bit integers
//! cross the boundary boxed as [`Int64Box`] / [`UInt64Box`]. Arithmetic on
//! boxes stays exact while the result fits and silently widens to `f64`
//! when it does not.
//!
//! | operands                | result                                   |
//! |-------------------------|------------------------------------------|
//! | box ⊕ box (same sign)   | checked integer op, `f64` on overflow    |
//! | box ⊕ integral `f64`    | as above when the `f64` is in range      |
//! | box ⊕ non-integral `f64`| `f64`                                    |
//! | `Int64` ⊕ `UInt64`      | `f64`                                    |
//!
//! Integer division or remainder by zero is [`BridgeError::DivideByZero`].

use std::fmt;

use crate::{BridgeError, HostObject, HostType, HostValue};

/// Payload of an `Int64Box` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Int64Box(pub i64);

/// Payload of a `UInt64Box` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UInt64Box(pub u64);

impl Int64Box {
    pub fn into_object(self) -> HostObject {
        HostObject::new(HostType::INT64_BOX, self)
    }
}

impl UInt64Box {
    pub fn into_object(self) -> HostObject {
        HostObject::new(HostType::UINT64_BOX, self)
    }
}

impl fmt::Display for Int64Box {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UInt64Box {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operand of box arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Int64(i64),
    UInt64(u64),
    Double(f64),
}

impl Operand {
    /// Read an operand from a host value: 64-bit integers, their boxes, or
    /// any other numeric primitive as `f64`.
    pub fn from_value(value: &HostValue) -> Option<Self> {
        match value {
            HostValue::I64(v) => Some(Operand::Int64(*v)),
            HostValue::U64(v) => Some(Operand::UInt64(*v)),
            HostValue::Object(object) => Self::from_box(object),
            other => other.as_f64().map(Operand::Double),
        }
    }

    /// Read the value of an `Int64Box` or `UInt64Box` object.
    pub fn from_box(object: &HostObject) -> Option<Self> {
        object
            .with(|b: &Int64Box| Operand::Int64(b.0))
            .or_else(|| object.with(|b: &UInt64Box| Operand::UInt64(b.0)))
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Operand::Int64(v) => v as f64,
            Operand::UInt64(v) => v as f64,
            Operand::Double(v) => v,
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn apply_f64(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
        }
    }

    fn apply_i64(self, a: i64, b: i64) -> Result<Option<i64>, BridgeError> {
        if matches!(self, ArithOp::Div | ArithOp::Rem) && b == 0 {
            return Err(BridgeError::DivideByZero);
        }
        Ok(match self {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div => a.checked_div(b),
            ArithOp::Rem => a.checked_rem(b),
        })
    }

    fn apply_u64(self, a: u64, b: u64) -> Result<Option<u64>, BridgeError> {
        if matches!(self, ArithOp::Div | ArithOp::Rem) && b == 0 {
            return Err(BridgeError::DivideByZero);
        }
        Ok(match self {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div => a.checked_div(b),
            ArithOp::Rem => a.checked_rem(b),
        })
    }
}

const I64_START: f64 = -9_223_372_036_854_775_808.0;
const I64_END: f64 = 9_223_372_036_854_775_808.0;
const U64_END: f64 = 18_446_744_073_709_551_616.0;

fn exact_i64(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && (I64_START..I64_END).contains(&value)).then_some(value as i64)
}

fn exact_u64(value: f64) -> Option<u64> {
    (value.fract() == 0.0 && (0.0..U64_END).contains(&value)).then_some(value as u64)
}

fn signed(op: ArithOp, a: i64, b: i64) -> Result<HostValue, BridgeError> {
    Ok(match op.apply_i64(a, b)? {
        Some(v) => HostValue::I64(v),
        None => HostValue::F64(op.apply_f64(a as f64, b as f64)),
    })
}

fn unsigned(op: ArithOp, a: u64, b: u64) -> Result<HostValue, BridgeError> {
    Ok(match op.apply_u64(a, b)? {
        Some(v) => HostValue::U64(v),
        None => HostValue::F64(op.apply_f64(a as f64, b as f64)),
    })
}

/// Apply `op` to two operands.
///
/// Exact results are `I64` / `U64`; widened results are `F64`.
pub fn arith(op: ArithOp, lhs: Operand, rhs: Operand) -> Result<HostValue, BridgeError> {
    use Operand::*;
    let float = || Ok(HostValue::F64(op.apply_f64(lhs.as_f64(), rhs.as_f64())));
    match (lhs, rhs) {
        (Int64(a), Int64(b)) => signed(op, a, b),
        (UInt64(a), UInt64(b)) => unsigned(op, a, b),
        (Int64(a), Double(d)) => match exact_i64(d) {
            Some(b) => signed(op, a, b),
            None => float(),
        },
        (Double(d), Int64(b)) => match exact_i64(d) {
            Some(a) => signed(op, a, b),
            None => float(),
        },
        (UInt64(a), Double(d)) => match exact_u64(d) {
            Some(b) => unsigned(op, a, b),
            None => float(),
        },
        (Double(d), UInt64(b)) => match exact_u64(d) {
            Some(a) => unsigned(op, a, b),
            None => float(),
        },
        _ => float(),
    }
}

/// Unary negation. `UInt64` always widens to `f64`.
pub fn negate(operand: Operand) -> HostValue {
    match operand {
        Operand::Int64(v) => v
            .checked_neg()
            .map_or(HostValue::F64(-(v as f64)), HostValue::I64),
        Operand::UInt64(v) => HostValue::F64(-(v as f64)),
        Operand::Double(v) => HostValue::F64(-v),
    }
}

/// Compare two operands exactly where both are integers.
///
/// A signed value compares below every unsigned value when negative.
fn compare(lhs: Operand, rhs: Operand) -> Option<std::cmp::Ordering> {
    use Operand::*;
    let float = || lhs.as_f64().partial_cmp(&rhs.as_f64());
    match (lhs, rhs) {
        (Int64(a), Int64(b)) => Some(a.cmp(&b)),
        (UInt64(a), UInt64(b)) => Some(a.cmp(&b)),
        (Int64(a), UInt64(b)) => Some(match u64::try_from(a) {
            Ok(a) => a.cmp(&b),
            Err(_) => std::cmp::Ordering::Less,
        }),
        (UInt64(a), Int64(b)) => Some(match u64::try_from(b) {
            Ok(b) => a.cmp(&b),
            Err(_) => std::cmp::Ordering::Greater,
        }),
        (Int64(a), Double(d)) => exact_i64(d).map_or_else(float, |b| Some(a.cmp(&b))),
        (Double(d), Int64(b)) => exact_i64(d).map_or_else(float, |a| Some(a.cmp(&b))),
        (UInt64(a), Double(d)) => exact_u64(d).map_or_else(float, |b| Some(a.cmp(&b))),
        (Double(d), UInt64(b)) => exact_u64(d).map_or_else(float, |a| Some(a.cmp(&b))),
        (Double(_), Double(_)) => float(),
    }
}

pub fn equals(lhs: Operand, rhs: Operand) -> bool {
    compare(lhs, rhs) == Some(std::cmp::Ordering::Equal)
}

pub fn less_than(lhs: Operand, rhs: Operand) -> bool {
    compare(lhs, rhs) == Some(std::cmp::Ordering::Less)
}

pub fn less_equal(lhs: Operand, rhs: Operand) -> bool {
    matches!(
        compare(lhs, rhs),
        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use Operand::*;

    #[test]
    fn exact_results_stay_integers() {
        let r = arith(ArithOp::Add, Int64(9_007_199_254_740_993), Int64(1)).unwrap();
        assert_eq!(r, HostValue::I64(9_007_199_254_740_994));
        let r = arith(ArithOp::Mul, UInt64(1 << 40), Double(4.0)).unwrap();
        assert_eq!(r, HostValue::U64(1 << 42));
    }

    #[test]
    fn overflow_widens_to_double() {
        let r = arith(ArithOp::Add, Int64(i64::MAX), Int64(1)).unwrap();
        assert_eq!(r, HostValue::F64(i64::MAX as f64 + 1.0));
        let r = arith(ArithOp::Sub, UInt64(0), UInt64(1)).unwrap();
        assert_eq!(r, HostValue::F64(-1.0));
    }

    #[test]
    fn non_integral_operand_is_double() {
        let r = arith(ArithOp::Add, Int64(1), Double(0.5)).unwrap();
        assert_eq!(r, HostValue::F64(1.5));
        let r = arith(ArithOp::Div, Double(7.0), Int64(2)).unwrap();
        assert_eq!(r, HostValue::I64(3));
    }

    #[test]
    fn mixed_signedness_is_double() {
        let r = arith(ArithOp::Add, Int64(1), UInt64(2)).unwrap();
        assert_eq!(r, HostValue::F64(3.0));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(
            arith(ArithOp::Div, Int64(1), Int64(0)),
            Err(BridgeError::DivideByZero)
        ));
        assert!(matches!(
            arith(ArithOp::Rem, UInt64(1), Double(0.0)),
            Err(BridgeError::DivideByZero)
        ));
        assert_eq!(
            arith(ArithOp::Div, Int64(1), Double(0.5)).unwrap(),
            HostValue::F64(2.0)
        );
    }

    #[test]
    fn negation() {
        assert_eq!(negate(Int64(5)), HostValue::I64(-5));
        assert_eq!(negate(Int64(i64::MIN)), HostValue::F64(9_223_372_036_854_775_808.0));
        assert_eq!(negate(UInt64(3)), HostValue::F64(-3.0));
    }

    #[test]
    fn comparisons_across_domains() {
        assert!(equals(Int64(5), UInt64(5)));
        assert!(!equals(Int64(-1), UInt64(u64::MAX)));
        assert!(equals(UInt64(u64::MAX), UInt64(u64::MAX)));
        assert!(!equals(Int64(9_007_199_254_740_993), Double(9_007_199_254_740_992.0)));
        assert!(less_than(Int64(-1), UInt64(0)));
        assert!(!less_than(UInt64(0), Int64(-1)));
        assert!(less_equal(Int64(3), Double(3.0)));
        assert!(less_than(Int64(3), Double(3.5)));
    }

    #[test]
    fn operands_from_boxes() {
        let boxed = Int64Box(-7).into_object();
        assert_eq!(Operand::from_value(&HostValue::Object(boxed)), Some(Int64(-7)));
        assert_eq!(Operand::from_value(&HostValue::I32(2)), Some(Double(2.0)));
        assert_eq!(Operand::from_value(&HostValue::from("x")), None);
    }
}
