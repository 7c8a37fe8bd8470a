//! Type table entries.
//!
//! The host object system is described ahead of time as a table of
//! [`TypeEntry`] values, each owning its [`MemberEntry`] list. Entries are
//! immutable once registered and shared behind `Arc`.

mod member;
mod method;
mod type_entry;

pub use member::{EventEntry, FieldEntry, MemberEntry, MemberKind, PropertyEntry};
pub use method::{MethodEntry, ParamEntry};
pub use type_entry::{GenericParam, TypeEntry};
