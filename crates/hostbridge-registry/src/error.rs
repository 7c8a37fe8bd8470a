//! Registration errors.

use thiserror::Error;

/// Errors raised while populating the type table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A referenced type was not found.
    #[error("type not found: {0}")]
    TypeNotFound(String),

    /// A type with this name already exists.
    #[error("duplicate type: {0}")]
    DuplicateType(String),

    /// A base type or interface reference does not fit the declaring type.
    #[error("invalid base for '{name}': {reason}")]
    InvalidBase {
        /// The type being registered.
        name: String,
        /// What is wrong with the base.
        reason: String,
    },
}
