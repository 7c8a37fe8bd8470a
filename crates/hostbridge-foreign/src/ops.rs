//! Operations that honor metamethods.

use std::cmp::Ordering;

use crate::state::check_key;
use crate::{ForeignError, ForeignState, ForeignValue};

/// Longest chain of `__index` / `__newindex` tables followed.
const MAX_META_CHAIN: usize = 100;

/// Arithmetic operators with a metamethod event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Unary minus; the operand is passed twice to the metamethod.
    Unm,
}

impl ArithOp {
    pub fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::Mod => "__mod",
            ArithOp::Unm => "__unm",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a - (a / b).floor() * b,
            ArithOp::Unm => -a,
        }
    }
}

impl ForeignState {
    /// `object[key]`, following `__index`.
    pub fn index(&self, object: &ForeignValue, key: &ForeignValue) -> Result<ForeignValue, ForeignError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = {
                let inner = self.inner();
                if matches!(current, ForeignValue::Table(_)) {
                    let raw = inner.table(&current)?.get(key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                }
                let handler = inner.heap.metamethod(&current, "__index");
                if handler.is_nil() {
                    return match current {
                        ForeignValue::Table(_) => Ok(ForeignValue::Nil),
                        other => Err(ForeignError::message(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        ))),
                    };
                }
                handler
            };

            if matches!(handler, ForeignValue::Function(_)) {
                return first(self.call_value(&handler, &[current, key.clone()])?);
            }
            current = handler;
        }
        Err(ForeignError::message("'__index' chain too long; possible loop"))
    }

    /// `object[key] = value`, following `__newindex`.
    pub fn new_index(&self, object: &ForeignValue, key: ForeignValue, value: ForeignValue) -> Result<(), ForeignError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = {
                let mut inner = self.inner_mut();
                let handler = inner.heap.metamethod(&current, "__newindex");
                if matches!(current, ForeignValue::Table(_)) {
                    let table = inner.table_mut(&current)?;
                    if handler.is_nil() || !table.get(&key).is_nil() {
                        check_key(&key)?;
                        table.set(key, value);
                        return Ok(());
                    }
                } else if handler.is_nil() {
                    return Err(ForeignError::message(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )));
                }
                handler
            };

            if matches!(handler, ForeignValue::Function(_)) {
                self.call_value(&handler, &[current, key, value])?;
                return Ok(());
            }
            current = handler;
        }
        Err(ForeignError::message("'__newindex' chain too long; possible loop"))
    }

    /// Arithmetic on numbers, or through the operand's metamethod.
    pub fn arith(&self, op: ArithOp, a: &ForeignValue, b: &ForeignValue) -> Result<ForeignValue, ForeignError> {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok(ForeignValue::number(op.apply(x, y)));
        }

        let handler = {
            let inner = self.inner();
            let handler = inner.heap.metamethod(a, op.event());
            if handler.is_nil() { inner.heap.metamethod(b, op.event()) } else { handler }
        };
        if handler.is_nil() {
            let culprit = if a.as_number().is_some() { b } else { a };
            return Err(ForeignError::message(format!(
                "attempt to perform arithmetic on a {} value",
                culprit.type_name()
            )));
        }
        first(self.call_value(&handler, &[a.clone(), b.clone()])?)
    }

    /// Equality, going through `__eq` for two tables or two userdata.
    pub fn equals(&self, a: &ForeignValue, b: &ForeignValue) -> Result<bool, ForeignError> {
        if a == b {
            return Ok(true);
        }
        let comparable = matches!(
            (a, b),
            (ForeignValue::Table(_), ForeignValue::Table(_)) | (ForeignValue::UserData(_), ForeignValue::UserData(_))
        );
        if !comparable {
            return Ok(false);
        }
        let handler = {
            let inner = self.inner();
            let handler = inner.heap.metamethod(a, "__eq");
            if handler.is_nil() { inner.heap.metamethod(b, "__eq") } else { handler }
        };
        if handler.is_nil() {
            return Ok(false);
        }
        Ok(first(self.call_value(&handler, &[a.clone(), b.clone()])?)?.is_truthy())
    }

    /// `a < b`.
    pub fn less_than(&self, a: &ForeignValue, b: &ForeignValue) -> Result<bool, ForeignError> {
        self.compare(a, b, "__lt", Ordering::is_lt)
    }

    /// `a <= b`.
    pub fn less_equal(&self, a: &ForeignValue, b: &ForeignValue) -> Result<bool, ForeignError> {
        self.compare(a, b, "__le", Ordering::is_le)
    }

    fn compare(
        &self,
        a: &ForeignValue,
        b: &ForeignValue,
        event: &str,
        test: fn(Ordering) -> bool,
    ) -> Result<bool, ForeignError> {
        match (a, b) {
            (ForeignValue::Number(x), ForeignValue::Number(y)) => {
                return Ok(x.0.partial_cmp(&y.0).is_some_and(test));
            }
            (ForeignValue::String(x), ForeignValue::String(y)) => return Ok(test(x.cmp(y))),
            _ => {}
        }

        let handler = {
            let inner = self.inner();
            let handler = inner.heap.metamethod(a, event);
            if handler.is_nil() { inner.heap.metamethod(b, event) } else { handler }
        };
        if handler.is_nil() {
            let message = if a.kind() == b.kind() {
                format!("attempt to compare two {} values", a.type_name())
            } else {
                format!("attempt to compare {} with {}", a.type_name(), b.type_name())
            };
            return Err(ForeignError::message(message));
        }
        Ok(first(self.call_value(&handler, &[a.clone(), b.clone()])?)?.is_truthy())
    }

    /// Text of a value, through `__tostring` when present.
    pub fn to_display(&self, value: &ForeignValue) -> Result<String, ForeignError> {
        let handler = self.inner().heap.metamethod(value, "__tostring");
        if handler.is_nil() {
            return Ok(value.display_raw());
        }
        match first(self.call_value(&handler, std::slice::from_ref(value))?)? {
            text @ ForeignValue::String(_) => Ok(text.display_raw()),
            _ => Err(ForeignError::message("'__tostring' must return a string")),
        }
    }

    /// Length of a string or the border of a table.
    pub fn length(&self, value: &ForeignValue) -> Result<usize, ForeignError> {
        match value {
            ForeignValue::String(bytes) => Ok(bytes.len()),
            ForeignValue::Table(_) => self.raw_len(value),
            other => Err(ForeignError::message(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        }
    }
}

fn first(results: Vec<ForeignValue>) -> Result<ForeignValue, ForeignError> {
    Ok(results.into_iter().next().unwrap_or_default())
}
