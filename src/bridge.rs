//! The bridge handle.

use std::sync::Arc;

use hostbridge_core::{BridgeError, HostObject, HostType, HostValue};
use hostbridge_registry::TypeRegistry;

use crate::BridgeConfig;
use crate::foreign_ref::{ForeignFunction, ForeignRef, ForeignTable, ForeignThread};
use crate::state::{LockedState, Shared};
use crate::targets::StaticContext;

/// A foreign engine bridged to a registry of host types.
///
/// Cheap operations lock the bridge for their own duration. For a sequence
/// of operations, or to work with raw foreign values, take the lock once
/// with [`lock`](Self::lock).
///
/// Dropping the bridge closes it; see [`close`](Self::close).
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Create a bridge over `registry`.
    ///
    /// Installs the helper library unless the configuration disables it.
    pub fn new(registry: impl Into<Arc<TypeRegistry>>, config: BridgeConfig) -> Self {
        let shared = Shared::new(registry.into(), config);
        if let Some(name) = &shared.config().library_name {
            let installed = shared.lock().and_then(|state| state.install_library(name));
            if let Err(error) = installed {
                tracing::error!(name = %name, %error, "failed to install helper library");
            }
        }
        Self { shared }
    }

    /// A bridge over the built-in types with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TypeRegistry::with_builtins(), BridgeConfig::default())
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.shared.registry()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.shared.config()
    }

    /// Lock the bridge for the current thread.
    pub fn lock(&self) -> Result<LockedState<'_>, BridgeError> {
        self.shared.lock()
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// The foreign global `name`.
    pub fn global(&self, name: &str) -> Result<HostValue, BridgeError> {
        let state = self.lock()?;
        let value = state.foreign().get_global(name);
        state.to_host(&value)
    }

    pub fn set_global(&self, name: &str, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        let state = self.lock()?;
        let value = state.to_foreign(&value.into())?;
        state.foreign().set_global(name, value);
        Ok(())
    }

    /// A static context for `ty`, usable as a value on both sides.
    pub fn static_context(&self, ty: HostType) -> HostValue {
        HostValue::Object(StaticContext::new(ty).into_object())
    }

    /// Expose the registered type `name` as the foreign global `name`'s last
    /// segment, e.g. `Demo.Widget` as `Widget`.
    pub fn import_type(&self, name: &str) -> Result<HostValue, BridgeError> {
        let entry = self
            .registry()
            .get_by_name(name)
            .ok_or_else(|| BridgeError::Argument(format!("Type '{name}' is not registered")))?;
        let context = self.static_context(HostType::Named(entry.type_hash));
        self.set_global(&entry.name, context.clone())?;
        Ok(context)
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// `target.name`.
    pub fn get_member(&self, target: &HostValue, name: &str) -> Result<HostValue, BridgeError> {
        self.lock()?.index(target, &HostValue::from(name))
    }

    /// `target.name = value`.
    pub fn set_member(&self, target: &HostValue, name: &str, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        self.lock()?.new_index(target, &HostValue::from(name), value.into())
    }

    /// `target.name(args...)`.
    pub fn call_member(&self, target: &HostValue, name: &str, args: Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> {
        let state = self.lock()?;
        let member = state.index(target, &HostValue::from(name))?;
        state.call(&member, args)
    }

    /// `target(args...)`: a delegate, a constructor or a method group.
    pub fn call_value(&self, target: &HostValue, args: Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> {
        self.lock()?.call(target, args)
    }

    // ========================================================================
    // Delegates and events
    // ========================================================================

    pub fn new_delegate(&self, delegate_type: &HostType, source: &HostValue) -> Result<HostObject, BridgeError> {
        self.lock()?.new_delegate(delegate_type, source)
    }

    /// The cached delegate of `delegate_type` forwarding to `function`.
    pub fn to_delegate(&self, function: &ForeignFunction, delegate_type: &HostType) -> Result<HostObject, BridgeError> {
        self.new_delegate(delegate_type, &function.clone().into_value())
    }

    pub fn new_function<F>(&self, body: F) -> Result<ForeignFunction, BridgeError>
    where
        F: Fn(&LockedState<'_>, Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> + Send + Sync + 'static,
    {
        self.lock()?.new_function(body)
    }

    pub fn add_handler(&self, event: &HostValue, handler: &HostValue) -> Result<(), BridgeError> {
        self.lock()?.add_handler(event, handler)
    }

    pub fn remove_handler(&self, event: &HostValue, handler: &HostValue) -> Result<(), BridgeError> {
        self.lock()?.remove_handler(event, handler)
    }

    // ========================================================================
    // Foreign objects
    // ========================================================================

    pub fn new_table(&self) -> Result<ForeignTable, BridgeError> {
        let state = self.lock()?;
        let table = state.foreign().new_table();
        ForeignTable::from_value(&state.foreign_ref(table, HostType::FOREIGN_TABLE))
            .ok_or_else(|| BridgeError::runtime("failed to reference new table"))
    }

    pub fn new_thread(&self) -> Result<ForeignThread, BridgeError> {
        let state = self.lock()?;
        let thread = state.foreign().new_thread();
        ForeignThread::from_value(&state.foreign_ref(thread, HostType::FOREIGN_THREAD))
            .ok_or_else(|| BridgeError::runtime("failed to reference new thread"))
    }

    /// Run `f` with `thread`'s stack as the current one.
    pub fn with_thread<R>(
        &self,
        thread: &ForeignThread,
        f: impl FnOnce(&LockedState<'_>) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let state = self.lock()?;
        let value = ForeignRef::value_in(thread.object(), &state)?.unwrap_or_default();
        state
            .foreign()
            .with_thread(&value, |_| f(&state))
            .map_err(|e| state.error_from_foreign(e))?
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run a full collection of the foreign heap, finalizing unreachable
    /// userdata. Returns the number of objects freed.
    pub fn collect_garbage(&self) -> Result<usize, BridgeError> {
        Ok(self.lock()?.foreign().collect_garbage())
    }

    /// Number of host objects currently reachable from the foreign side.
    pub fn handle_count(&self) -> Result<usize, BridgeError> {
        Ok(self.lock()?.identity().len())
    }

    /// Foreign references dropped on other threads, awaiting release.
    pub fn pending_releases(&self) -> usize {
        self.shared.pending_releases()
    }

    /// Close the foreign engine.
    ///
    /// Pending finalizers run, every handle is released and later
    /// operations fail with [`BridgeError::ObjectDisposed`]. Closing twice
    /// is a no-op; closing from inside a foreign call is refused.
    pub fn close(&self) -> Result<(), BridgeError> {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Err(error) = self.shared.close() {
            tracing::warn!(%error, "bridge dropped while in use");
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("closed", &self.is_closed())
            .field("types", &self.registry().len())
            .finish_non_exhaustive()
    }
}
