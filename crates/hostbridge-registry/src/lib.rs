//! Host type table for the bridge.
//!
//! The host object system has no live reflection, so every type the bridge
//! can expose is described ahead of time by a [`TypeEntry`] and registered
//! here. On top of the table this crate answers the questions dispatch and
//! binding ask about types:
//!
//! - [`TypeRegistry`]: storage, lookup by hash or name, members of
//!   constructed generic types
//! - relations: display names, base chains, assignability with array
//!   covariance and generic variance
//! - [`locator`]: member lookup by name with hiding rules and binding hints
//! - builtins: `Object`, primitives, `String`, `Array`, `Delegate`,
//!   `Exception` and the exact-width integer boxes with their operators
//!
//! [`TypeEntry`]: hostbridge_core::TypeEntry

mod builtins;
mod error;
pub mod locator;
mod registry;
mod relations;

pub use error::RegistrationError;
pub use locator::{Lookup, MemberAccess, MemberBindingHints, remove_hidden};
pub use registry::TypeRegistry;
