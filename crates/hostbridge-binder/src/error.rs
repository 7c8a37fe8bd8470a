//! Binding failures.

use hostbridge_core::BridgeError;
use thiserror::Error;

/// Why a binding produced no single member.
///
/// Callers turn the first two into a [`BridgeError`] naming the member and
/// the observed argument types, see [`Binder::call_error`](crate::Binder::call_error).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindFailure {
    /// No candidate is applicable.
    #[error("no applicable member")]
    NoMatch,

    /// More than one candidate is applicable and none is better.
    #[error("more than one equally applicable member")]
    Ambiguous,

    /// A member was selected but an argument failed to convert.
    #[error(transparent)]
    Conversion(#[from] BridgeError),
}
