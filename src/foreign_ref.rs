//! Host-side references to foreign values.
//!
//! Tables, functions, threads and foreign userdata cross into the host as
//! objects holding a key into the engine's reference table. Dropping the
//! last clone releases the key, possibly from another thread, in which
//! case the release is deferred until the bridge lock is next taken.

use std::sync::{Arc, Weak};

use hostbridge_core::{BridgeError, HostObject, HostType, HostValue};
use hostbridge_foreign::{ForeignValue, RefKey};

use crate::state::{LockedState, Shared, disposed};

pub(crate) struct ForeignRef {
    shared: Weak<Shared>,
    key: RefKey,
}

impl Drop for ForeignRef {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(self.key);
        }
    }
}

impl ForeignRef {
    /// The referenced value, if `object` is a foreign reference.
    ///
    /// References are only meaningful to the bridge that created them.
    pub(crate) fn value_in(object: &HostObject, state: &LockedState<'_>) -> Result<Option<ForeignValue>, BridgeError> {
        let Some((owner, key)) = object.with(|r: &ForeignRef| (r.shared.clone(), r.key)) else {
            return Ok(None);
        };
        if !Weak::ptr_eq(&owner, &state.weak()) {
            return Err(BridgeError::Argument(
                "Foreign reference belongs to a different bridge".to_string(),
            ));
        }
        Ok(Some(state.foreign().dereference(key)))
    }
}

impl LockedState<'_> {
    /// Reference `value` from the host as an object of type `ty`.
    pub(crate) fn foreign_ref(&self, value: ForeignValue, ty: HostType) -> HostValue {
        let key = self.foreign().reference(value);
        let reference = ForeignRef {
            shared: self.weak(),
            key,
        };
        HostValue::Object(HostObject::new(ty, reference))
    }
}

/// Run `f` on the bridge owning `object`, with the value it references.
fn with_referenced<R>(
    object: &HostObject,
    f: impl FnOnce(&LockedState<'_>, ForeignValue) -> Result<R, BridgeError>,
) -> Result<R, BridgeError> {
    let (owner, key) = object
        .with(|r: &ForeignRef| (r.shared.clone(), r.key))
        .ok_or_else(|| BridgeError::Target("Object is not a foreign reference".to_string()))?;
    let shared: Arc<Shared> = owner.upgrade().ok_or_else(disposed)?;
    let state = shared.lock()?;
    let value = state.foreign().dereference(key);
    f(&state, value)
}

fn host_args(state: &LockedState<'_>, values: &[HostValue]) -> Result<Vec<ForeignValue>, BridgeError> {
    values.iter().map(|value| state.to_foreign(value)).collect()
}

macro_rules! foreign_handle {
    ($(#[$meta:meta])* $name:ident, $ty:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(HostObject);

        impl $name {
            /// View `value` as this kind of reference.
            pub fn from_value(value: &HostValue) -> Option<Self> {
                value
                    .as_object()
                    .filter(|object| *object.ty() == $ty && object.is::<ForeignRef>())
                    .map(|object| Self(object.clone()))
            }

            pub fn object(&self) -> &HostObject {
                &self.0
            }

            pub fn into_value(self) -> HostValue {
                HostValue::Object(self.0)
            }
        }

        impl From<$name> for HostValue {
            fn from(handle: $name) -> HostValue {
                handle.into_value()
            }
        }
    };
}

foreign_handle!(
    /// A foreign table.
    ForeignTable,
    HostType::FOREIGN_TABLE
);
foreign_handle!(
    /// A foreign function.
    ForeignFunction,
    HostType::FOREIGN_FUNCTION
);
foreign_handle!(
    /// A foreign userdata not owned by the bridge.
    ForeignUserData,
    HostType::FOREIGN_USERDATA
);
foreign_handle!(
    /// A foreign coroutine.
    ForeignThread,
    HostType::FOREIGN_THREAD
);

impl ForeignTable {
    /// `table[key]`, honouring `__index`.
    pub fn get(&self, key: impl Into<HostValue>) -> Result<HostValue, BridgeError> {
        let key = key.into();
        with_referenced(&self.0, |state, table| {
            let key = state.to_foreign(&key)?;
            let value = state.foreign().index(&table, &key).map_err(|e| state.error_from_foreign(e))?;
            state.to_host(&value)
        })
    }

    /// `table[key] = value`, honouring `__newindex`.
    pub fn set(&self, key: impl Into<HostValue>, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        let (key, value) = (key.into(), value.into());
        with_referenced(&self.0, |state, table| {
            let key = state.to_foreign(&key)?;
            let value = state.to_foreign(&value)?;
            state.foreign().new_index(&table, key, value).map_err(|e| state.error_from_foreign(e))
        })
    }

    pub fn raw_get(&self, key: impl Into<HostValue>) -> Result<HostValue, BridgeError> {
        let key = key.into();
        with_referenced(&self.0, |state, table| {
            let key = state.to_foreign(&key)?;
            let value = state.foreign().raw_get(&table, &key).map_err(|e| state.error_from_foreign(e))?;
            state.to_host(&value)
        })
    }

    pub fn raw_set(&self, key: impl Into<HostValue>, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        let (key, value) = (key.into(), value.into());
        with_referenced(&self.0, |state, table| {
            let key = state.to_foreign(&key)?;
            let value = state.to_foreign(&value)?;
            state.foreign().raw_set(&table, key, value).map_err(|e| state.error_from_foreign(e))
        })
    }

    /// Length of the sequence part, ignoring `__len`.
    pub fn len(&self) -> Result<usize, BridgeError> {
        with_referenced(&self.0, |state, table| {
            state.foreign().raw_len(&table).map_err(|e| state.error_from_foreign(e))
        })
    }

    pub fn is_empty(&self) -> Result<bool, BridgeError> {
        Ok(self.pairs()?.is_empty())
    }

    /// Every entry, in no particular order.
    pub fn pairs(&self) -> Result<Vec<(HostValue, HostValue)>, BridgeError> {
        with_referenced(&self.0, |state, table| {
            let pairs = state.foreign().pairs(&table).map_err(|e| state.error_from_foreign(e))?;
            pairs
                .iter()
                .map(|(key, value)| Ok((state.to_host(key)?, state.to_host(value)?)))
                .collect()
        })
    }
}

impl ForeignFunction {
    /// Call the function in protected mode.
    ///
    /// Foreign errors come back with a traceback; host errors raised inside
    /// come back unchanged.
    pub fn call(&self, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
        with_referenced(&self.0, |state, function| state.call_function(&function, args))
    }
}

impl ForeignUserData {
    /// `userdata[key]` through its metatable.
    pub fn get(&self, key: impl Into<HostValue>) -> Result<HostValue, BridgeError> {
        let key = key.into();
        with_referenced(&self.0, |state, userdata| {
            let key = state.to_foreign(&key)?;
            let value = state.foreign().index(&userdata, &key).map_err(|e| state.error_from_foreign(e))?;
            state.to_host(&value)
        })
    }
}

impl ForeignThread {
    /// Call `function` on this thread's stack.
    pub fn call(&self, function: &ForeignFunction, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
        with_referenced(&self.0, |state, thread| {
            let function = ForeignRef::value_in(function.object(), state)?.unwrap_or_default();
            let args = host_args(state, args)?;
            let results = state
                .foreign()
                .with_thread(&thread, |foreign| foreign.call_value(&function, &args))
                .map_err(|e| state.error_from_foreign(e))?
                .map_err(|e| state.error_from_foreign(e))?;
            results.iter().map(|value| state.to_host(value)).collect()
        })
    }
}

impl LockedState<'_> {
    /// Call a foreign function in protected mode with the bridge's message
    /// handler.
    pub(crate) fn call_function(&self, function: &ForeignValue, args: &[HostValue]) -> Result<Vec<HostValue>, BridgeError> {
        self.ensure_stack(args.len() + 1)?;
        let args = host_args(self, args)?;
        let handler = self.message_handler();
        match self.foreign().pcall_value(function, &args, Some(handler)) {
            Ok(results) => results.iter().map(|value| self.to_host(value)).collect(),
            Err(failure) => Err(self.error_from_value(&failure.value)),
        }
    }
}
