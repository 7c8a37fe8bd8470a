//! Shared bridge state and its lock.
//!
//! Every operation that touches the foreign engine or the identity registry
//! runs under one re-entrant lock. Re-entrancy matters: host code called
//! from the foreign side calls back into it on the same thread.
//!
//! Foreign references can be dropped on any thread. When the lock is not
//! immediately available their keys are queued and released the next time
//! the lock is acquired or released.

use std::cell::{RefCell, RefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hostbridge_binder::Binder;
use hostbridge_core::BridgeError;
use hostbridge_foreign::{ForeignError, ForeignState, ForeignValue, RefKey};
use hostbridge_registry::TypeRegistry;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::BridgeConfig;
use crate::callback::{self, CallbackCache};
use crate::dispatch;
use crate::identity::IdentityRegistry;

pub(crate) const OBJECT_METATABLE: &str = "hostbridge.object";
pub(crate) const PARTIAL_METATABLE: &str = "hostbridge.partial";

pub(crate) struct Shared {
    state: ReentrantMutex<BridgeState>,
    deferred: Mutex<Vec<RefKey>>,
    closed: AtomicBool,
    registry: Arc<TypeRegistry>,
    config: BridgeConfig,
    this: Weak<Shared>,
}

pub(crate) struct BridgeState {
    pub(crate) foreign: ForeignState,
    pub(crate) identity: RefCell<IdentityRegistry>,
    pub(crate) callbacks: RefCell<CallbackCache>,
    pub(crate) object_metatable: ForeignValue,
    pub(crate) partial_metatable: ForeignValue,
    message_handler: RefKey,
}

impl BridgeState {
    fn new(config: &BridgeConfig, this: &Weak<Shared>) -> Self {
        let foreign = ForeignState::with_max_stack(config.max_stack);
        foreign.set_panic_hook(|error| {
            tracing::error!(error = %error.display_raw(), "unprotected error in foreign engine");
        });

        let identity = IdentityRegistry::new(&foreign);
        let object_metatable = dispatch::object_metatable(&foreign, this);
        let partial_metatable = dispatch::partial_metatable(&foreign, this);
        let handler = callback::message_handler(&foreign, this);
        let message_handler = foreign.reference(handler);

        Self {
            foreign,
            identity: RefCell::new(identity),
            callbacks: RefCell::new(CallbackCache::default()),
            object_metatable,
            partial_metatable,
            message_handler,
        }
    }
}

impl Shared {
    pub(crate) fn new(registry: Arc<TypeRegistry>, config: BridgeConfig) -> Arc<Shared> {
        let shared = Arc::new_cyclic(|this| Shared {
            state: ReentrantMutex::new(BridgeState::new(&config, this)),
            deferred: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            registry,
            config,
            this: this.clone(),
        });
        tracing::debug!(types = shared.registry.len(), "bridge created");
        shared
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Acquire the bridge lock, waiting for other threads.
    pub(crate) fn lock(&self) -> Result<LockedState<'_>, BridgeError> {
        if self.is_closed() {
            return Err(disposed());
        }
        let guard = self.state.lock();
        if self.is_closed() {
            return Err(disposed());
        }
        let state = LockedState { shared: self, guard };
        state.drain_deferred();
        Ok(state)
    }

    /// Release a foreign reference, deferring when the lock is busy.
    pub(crate) fn release(&self, key: RefKey) {
        if self.is_closed() {
            return;
        }
        if let Some(guard) = self.state.try_lock()
            && guard.foreign.try_unreference(key)
        {
            return;
        }
        tracing::trace!(?key, "deferred release of foreign reference");
        self.deferred.lock().push(key);
    }

    pub(crate) fn pending_releases(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Close the foreign engine, running pending finalizers.
    ///
    /// Fails while a foreign call is running on the calling thread.
    pub(crate) fn close(&self) -> Result<(), BridgeError> {
        let state = match self.lock() {
            Ok(state) => state,
            Err(_) => return Ok(()),
        };
        if state.foreign().call_depth() > 0 {
            return Err(BridgeError::Target(
                "The bridge cannot be closed from inside a foreign call".to_string(),
            ));
        }

        state.foreign().close();
        self.closed.store(true, Ordering::Release);

        let handles = state.guard.identity.borrow_mut().clear();
        let callbacks = std::mem::take(&mut *state.guard.callbacks.borrow_mut());
        self.deferred.lock().clear();
        drop(state);

        tracing::debug!(released = handles.len(), "bridge closed");
        drop(handles);
        drop(callbacks);
        Ok(())
    }
}

pub(crate) fn disposed() -> BridgeError {
    BridgeError::ObjectDisposed("Bridge".to_string())
}

/// The bridge, locked for the current thread.
///
/// Obtained from [`Bridge::lock`](crate::Bridge::lock) or handed to host
/// closures created with [`new_function`](LockedState::new_function).
/// Re-entrant: locking again on the same thread does not block.
pub struct LockedState<'a> {
    shared: &'a Shared,
    guard: ReentrantMutexGuard<'a, BridgeState>,
}

impl<'a> LockedState<'a> {
    pub fn foreign(&self) -> &ForeignState {
        &self.guard.foreign
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &'a BridgeConfig {
        &self.shared.config
    }

    pub(crate) fn state(&self) -> &BridgeState {
        &self.guard
    }

    pub(crate) fn shared(&self) -> &'a Shared {
        self.shared
    }

    pub(crate) fn weak(&self) -> Weak<Shared> {
        self.shared.this.clone()
    }

    pub(crate) fn identity(&self) -> RefMut<'_, IdentityRegistry> {
        self.guard.identity.borrow_mut()
    }

    pub(crate) fn binder(&self) -> Binder<'_> {
        Binder::new(self.registry(), self)
    }

    pub(crate) fn message_handler(&self) -> ForeignValue {
        self.foreign().dereference(self.guard.message_handler)
    }

    fn drain_deferred(&self) {
        if self.shared.is_closed() {
            self.shared.deferred.lock().clear();
            return;
        }
        let pending = std::mem::take(&mut *self.shared.deferred.lock());
        if pending.is_empty() {
            return;
        }

        let total = pending.len();
        let retained: Vec<RefKey> = pending
            .into_iter()
            .filter(|key| !self.foreign().try_unreference(*key))
            .collect();
        tracing::debug!(released = total - retained.len(), retained = retained.len(), "drained deferred releases");
        if !retained.is_empty() {
            self.shared.deferred.lock().extend(retained);
        }
    }
}

impl Drop for LockedState<'_> {
    fn drop(&mut self) {
        self.drain_deferred();
    }
}

impl std::fmt::Debug for LockedState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedState")
            .field("objects", &self.foreign().object_count())
            .field("handles", &self.guard.identity.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Wrap a bridge operation as a foreign function body.
///
/// The body runs under the bridge lock; host errors are raised into the
/// foreign engine as exception userdata.
pub(crate) fn native_body<F>(
    this: &Weak<Shared>,
    body: F,
) -> impl Fn(&ForeignState) -> Result<usize, ForeignError> + Send + Sync + 'static
where
    F: Fn(&LockedState<'_>) -> Result<usize, BridgeError> + Send + Sync + 'static,
{
    let this = this.clone();
    move |_| {
        let Some(shared) = this.upgrade() else {
            return Err(ForeignError::message("cannot access a disposed object: Bridge"));
        };
        let state = shared.lock().map_err(|error| ForeignError::message(error.to_string()))?;
        body(&state).map_err(|error| state.raise(error))
    }
}
