//! Engine errors and protected-call status.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::ForeignValue;

/// An error unwinding through the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForeignError {
    /// An error value raised by a function or by the engine itself.
    #[error("{}", describe(.0))]
    Raised(ForeignValue),

    /// An error that reached an unprotected call at the outermost level.
    /// The panic hook has already seen it.
    #[error("unprotected error: {}", describe(.0))]
    Unprotected(ForeignValue),
}

impl ForeignError {
    /// Raise a string error.
    pub fn message(text: impl Into<String>) -> Self {
        ForeignError::Raised(ForeignValue::from(text.into()))
    }

    /// The error value carried.
    pub fn value(&self) -> &ForeignValue {
        match self {
            ForeignError::Raised(value) | ForeignError::Unprotected(value) => value,
        }
    }

    pub fn into_value(self) -> ForeignValue {
        match self {
            ForeignError::Raised(value) | ForeignError::Unprotected(value) => value,
        }
    }
}

fn describe(value: &ForeignValue) -> String {
    match value {
        ForeignValue::String(_) | ForeignValue::Number(_) => value.display_raw(),
        other => format!("(error object is a {} value)", other.type_name()),
    }
}

/// Outcome of a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// The call raised an error; the error value is on the stack.
    RuntimeError = 2,
    /// The message handler itself failed.
    HandlerError = 5,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}
