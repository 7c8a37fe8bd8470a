//! Identity of host objects on the foreign side.
//!
//! A host object reachable from the foreign engine is represented by a
//! userdata carrying a numeric handle. The registry maps handles to the
//! objects they keep alive, and objects to their current representation so
//! the same object always crosses as the same userdata.
//!
//! Representations are held in a weak-valued table: once the foreign side
//! drops every reference, the userdata is finalized, its `__gc` metamethod
//! unregisters the handle and the host object is released.
//!
//! Value types, integer boxes, static contexts and hinted targets have no
//! identity; each crossing mints a fresh handle.

use hostbridge_core::HostObject;
use hostbridge_foreign::{ForeignState, ForeignValue, RefKey, WeakMode};
use rustc_hash::FxHashMap;

pub(crate) struct IdentityRegistry {
    /// Handle to the object its userdata keeps alive.
    handles: FxHashMap<u64, HostObject>,
    /// Object identity to the handle of its current representation.
    slots: FxHashMap<usize, u64>,
    /// Weak-valued table from handle to userdata.
    representations: RefKey,
    next_handle: u64,
}

impl IdentityRegistry {
    pub(crate) fn new(foreign: &ForeignState) -> Self {
        let table = foreign.new_table_with_mode(WeakMode::Values);
        Self {
            handles: FxHashMap::default(),
            slots: FxHashMap::default(),
            representations: foreign.reference(table),
            next_handle: 1,
        }
    }

    pub(crate) fn target(&self, handle: u64) -> Option<&HostObject> {
        self.handles.get(&handle)
    }

    /// The live representation of `object`, if it has one.
    pub(crate) fn existing(&self, foreign: &ForeignState, object: &HostObject) -> Option<ForeignValue> {
        let handle = *self.slots.get(&object.id())?;
        let table = foreign.dereference(self.representations);
        let userdata = foreign.raw_get(&table, &handle_key(handle)).ok()?;
        (foreign.userdata_id(&userdata) == Some(handle)).then_some(userdata)
    }

    /// The representation of `object`, created on first crossing.
    pub(crate) fn register(
        &mut self,
        foreign: &ForeignState,
        object: &HostObject,
        metatable: &ForeignValue,
    ) -> ForeignValue {
        if let Some(userdata) = self.existing(foreign, object) {
            return userdata;
        }

        let (handle, userdata) = self.mint(foreign, object.clone(), metatable);
        let table = foreign.dereference(self.representations);
        if let Err(error) = foreign.raw_set(&table, handle_key(handle), userdata.clone()) {
            tracing::warn!(handle, %error, "failed to record representation");
        }
        // A previous representation may still await finalization; the slot
        // now names the new one.
        self.slots.insert(object.id(), handle);
        tracing::trace!(handle, "registered host object");
        userdata
    }

    /// A fresh representation of `object` that is not tracked by identity.
    pub(crate) fn mint(
        &mut self,
        foreign: &ForeignState,
        object: HostObject,
        metatable: &ForeignValue,
    ) -> (u64, ForeignValue) {
        let handle = self.next_handle;
        self.next_handle += 1;
        let userdata = foreign.new_userdata(handle, Some(metatable));
        self.handles.insert(handle, object);
        (handle, userdata)
    }

    /// Forget `handle` once its userdata is finalized.
    ///
    /// The object's identity slot is cleared only if it still names this
    /// handle. Returns the released object, to be dropped by the caller
    /// outside any borrow.
    pub(crate) fn unregister(&mut self, handle: u64) -> Option<HostObject> {
        let Some(object) = self.handles.remove(&handle) else {
            tracing::debug!(handle, "finalizer for unknown handle");
            return None;
        };
        if self.slots.get(&object.id()) == Some(&handle) {
            self.slots.remove(&object.id());
        }
        tracing::trace!(handle, "unregistered host object");
        Some(object)
    }

    /// Forget every handle, returning the objects they kept alive.
    pub(crate) fn clear(&mut self) -> Vec<HostObject> {
        self.slots.clear();
        self.handles.drain().map(|(_, object)| object).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

fn handle_key(handle: u64) -> ForeignValue {
    ForeignValue::number(handle as f64)
}
