//! Error types for the bridge.
//!
//! Every failure the bridge reports, whether it comes from member lookup,
//! overload binding, invocation or the foreign engine, is a [`BridgeError`].
//!
//! ## Crossing the foreign boundary
//!
//! ```text
//! host error ──into_exception_object()──► HostObject (Exception)
//!                                            │ pushed as userdata
//!                                            ▼
//!                                      foreign error value
//!                                            │ recrosses
//!                                            ▼
//! host error ◄──from_exception_object()── HostObject
//! ```
//!
//! The exception object is the same allocation on both ends, so a host
//! exception thrown inside a callback surfaces to the outer caller with its
//! identity intact.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::{HostObject, HostType};

// ============================================================================
// Bridge Errors
// ============================================================================

/// Errors raised while marshaling, resolving, binding or invoking members.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A name bound to no member.
    #[error("{0}")]
    MissingMember(String),

    /// No callable candidate was applicable to the arguments.
    #[error("{0}")]
    MissingMethod(String),

    /// More than one equally good candidate.
    #[error("{0}")]
    AmbiguousMatch(String),

    /// The member exists but the required accessor is not available.
    #[error("{0}")]
    MethodAccess(String),

    /// A value could not be coerced to the required type.
    #[error("{0}")]
    InvalidCast(String),

    /// The operation is not meaningful for the target value.
    #[error("{0}")]
    Target(String),

    /// An argument value is outside the accepted domain.
    #[error("{0}")]
    Argument(String),

    /// The bridge state has been closed.
    #[error("cannot access a disposed object: {0}")]
    ObjectDisposed(String),

    /// Binding hints were malformed or do not apply to the target.
    #[error("{0}")]
    BindingHints(String),

    /// Integer division or remainder by zero.
    #[error("attempted to divide by zero")]
    DivideByZero,

    /// The foreign engine rejected a chunk.
    #[error("{0}")]
    Compile(String),

    /// A foreign error raised during execution.
    #[error("{message}")]
    Runtime {
        message: String,
        traceback: Option<String>,
    },

    /// An unprotected foreign error reached the top of the engine.
    #[error("{0}")]
    Panic(String),

    /// A host exception object, preserved by identity.
    #[error(transparent)]
    Exception(HostException),
}

impl BridgeError {
    /// Create a runtime error without a traceback.
    pub fn runtime(message: impl Into<String>) -> Self {
        BridgeError::Runtime {
            message: message.into(),
            traceback: None,
        }
    }

    /// Create a missing-member error for `name` on the type named `type_name`.
    pub fn missing_member(name: &str, type_name: impl fmt::Display) -> Self {
        BridgeError::MissingMember(format!("'{name}' is not a member of type '{type_name}'"))
    }

    /// Create an ambiguous-match error for `name` on the type named `type_name`.
    pub fn ambiguous_member(name: &str, type_name: impl fmt::Display) -> Self {
        BridgeError::AmbiguousMatch(format!(
            "'{name}' designates ambiguous members of type '{type_name}'"
        ))
    }

    /// Wrap this error in a host object so it can travel through the
    /// foreign side as an error value.
    ///
    /// An [`BridgeError::Exception`] yields its own object; every other
    /// variant is carried by a fresh `Exception` object.
    pub fn into_exception_object(self) -> HostObject {
        match self {
            BridgeError::Exception(exception) => exception.object,
            other => HostObject::new(HostType::EXCEPTION, CarriedError(other)),
        }
    }

    /// Recover the error carried by an exception object.
    ///
    /// Objects minted by [`into_exception_object`](Self::into_exception_object)
    /// give back the original error; any other object becomes
    /// [`BridgeError::Exception`] around that same object.
    pub fn from_exception_object(object: HostObject) -> Self {
        if let Some(error) = object.with(|carried: &CarriedError| carried.0.clone()) {
            return error;
        }
        BridgeError::Exception(HostException::from_object(object))
    }
}

/// Payload of an exception object that carries a non-exception error.
#[derive(Debug)]
struct CarriedError(BridgeError);

// ============================================================================
// Host Exceptions
// ============================================================================

/// Payload of exception objects raised by host code.
#[derive(Debug, Clone)]
pub struct ExceptionData {
    pub message: String,
}

/// A host exception object.
///
/// Equality of two `HostException`s is identity of the underlying object.
#[derive(Debug, Clone)]
pub struct HostException {
    object: HostObject,
    message: Arc<str>,
}

impl HostException {
    /// Raise a new exception of type `ty` with `message`.
    pub fn new(ty: HostType, message: impl Into<String>) -> Self {
        let message: String = message.into();
        let object = HostObject::new(
            ty,
            ExceptionData {
                message: message.clone(),
            },
        );
        Self {
            object,
            message: message.into(),
        }
    }

    /// Wrap an existing exception object.
    pub fn from_object(object: HostObject) -> Self {
        let message = object
            .with(|data: &ExceptionData| data.message.clone())
            .unwrap_or_else(|| "exception of a host type was thrown".to_string());
        Self {
            object,
            message: message.into(),
        }
    }

    pub fn object(&self) -> &HostObject {
        &self.object
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq for HostException {
    fn eq(&self, other: &Self) -> bool {
        self.object.ptr_eq(&other.object)
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carried_error_round_trips() {
        let error = BridgeError::MissingMember("'x' is not a member of type 'T'".into());
        let object = error.into_exception_object();
        assert_eq!(object.ty(), &HostType::EXCEPTION);
        match BridgeError::from_exception_object(object) {
            BridgeError::MissingMember(message) => {
                assert_eq!(message, "'x' is not a member of type 'T'")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn host_exception_keeps_identity() {
        let exception = HostException::new(HostType::named("Demo.Failure"), "boom");
        let original = exception.object().clone();
        let object = BridgeError::Exception(exception).into_exception_object();
        assert!(object.ptr_eq(&original));

        match BridgeError::from_exception_object(object) {
            BridgeError::Exception(recovered) => {
                assert!(recovered.object().ptr_eq(&original));
                assert_eq!(recovered.message(), "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn messages() {
        let error = BridgeError::missing_member("Frob", "Demo.Widget");
        assert_eq!(error.to_string(), "'Frob' is not a member of type 'Demo.Widget'");
        assert_eq!(BridgeError::DivideByZero.to_string(), "attempted to divide by zero");
    }
}
