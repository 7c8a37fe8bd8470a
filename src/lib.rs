//! Bridge between a dynamically typed embedded engine and a registry of
//! statically typed host types.
//!
//! Host objects cross into the engine as userdata whose metatable
//! dispatches member access, calls, operators and finalization back into
//! the registry. Engine tables, functions and threads cross into the host
//! as reference-counted handles. Overloads are resolved by the binder,
//! optionally steered by binding hints given as tables.
//!
//! ```ignore
//! use hostbridge::prelude::*;
//!
//! let bridge = Bridge::with_defaults();
//! bridge.import_type("Int64Box")?;
//! let big = bridge.call_member(&bridge.global("clr")?, "Int64", vec!["9007199254740993".into()])?;
//! ```

mod bridge;
mod callback;
mod config;
mod dispatch;
mod foreign_ref;
mod hints;
mod identity;
mod library;
mod marshal;
mod state;
mod targets;

pub use bridge::Bridge;
pub use config::{BridgeConfig, Encoding};
pub use foreign_ref::{ForeignFunction, ForeignTable, ForeignThread, ForeignUserData};
pub use state::LockedState;
pub use targets::StaticContext;

pub use hostbridge_binder as binder;
pub use hostbridge_core as core;
pub use hostbridge_foreign as foreign;
pub use hostbridge_registry as registry;

pub mod prelude {
    pub use crate::{
        Bridge, BridgeConfig, Encoding, ForeignFunction, ForeignTable, ForeignThread, ForeignUserData, LockedState,
        StaticContext,
    };
    pub use hostbridge_binder::{ParamHint, SignatureBindingHints};
    pub use hostbridge_core::numeric::ArithOp;
    pub use hostbridge_core::{
        ArrayData, BridgeError, CallContext, DelegateData, EventEntry, FieldEntry, HostObject, HostType, HostValue,
        MemberFlags, MethodEntry, ParamEntry, PropertyEntry, TypeEntry, Variance,
    };
    pub use hostbridge_foreign::ForeignValue;
    pub use hostbridge_registry::{MemberAccess, MemberBindingHints, TypeRegistry};
}
