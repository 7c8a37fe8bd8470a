//! Core types for the host/foreign bridge.
//!
//! This crate holds the vocabulary shared by every layer of the bridge:
//!
//! - [`TypeHash`] and [`HostType`]: identity and structure of host types
//! - [`TypeEntry`], [`MemberEntry`], [`MethodEntry`]: the static type table
//!   the host object system is described with
//! - [`HostValue`] and [`HostObject`]: host values, objects compared by identity
//! - [`NativeFn`] and [`CallContext`]: native member implementations
//! - [`BridgeError`]: the single error type of the bridge
//! - [`numeric`]: exact-width 64-bit arithmetic behind `Int64Box` / `UInt64Box`

pub mod array;
pub mod delegate;
pub mod entries;
pub mod error;
pub mod flags;
pub mod host_type;
pub mod numeric;
pub mod primitive_kind;
pub mod runtime;
pub mod type_hash;
pub mod value;

pub use array::ArrayData;
pub use delegate::{DelegateData, DelegateList, invoke_delegate};
pub use entries::{
    EventEntry, FieldEntry, GenericParam, MemberEntry, MemberKind, MethodEntry, ParamEntry,
    PropertyEntry, TypeEntry,
};
pub use error::{BridgeError, ExceptionData, HostException};
pub use flags::{MemberFlags, RefModifier, TypeFlags, TypeKind, Variance};
pub use host_type::HostType;
pub use numeric::{Int64Box, UInt64Box};
pub use primitive_kind::PrimitiveKind;
pub use runtime::{CallContext, NativeCallable, NativeFn};
pub use type_hash::{TypeHash, hash_constants, primitives};
pub use value::{FromHostValue, HostObject, HostValue, WeakHostObject};
