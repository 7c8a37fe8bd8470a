//! Native function storage and callable trait.

use std::fmt;
use std::sync::Arc;

use crate::{BridgeError, TypeHash};

use super::CallContext;

/// Type-erased native implementation of a host member.
///
/// Every method, constructor, accessor and delegate body in the type table
/// is a `NativeFn`. The callable is shared, so cloning is cheap and two
/// clones keep the same [`id`](Self::id).
pub struct NativeFn {
    /// Identity of the implementation, assigned when the owning member is
    /// registered.
    pub id: TypeHash,
    inner: Arc<dyn NativeCallable + Send + Sync>,
}

impl NativeFn {
    /// Create a new NativeFn from a callable with a specific ID.
    pub fn new<F>(id: TypeHash, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        Self {
            id,
            inner: Arc::new(f),
        }
    }

    /// Create a NativeFn whose ID is assigned later.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        Self::new(TypeHash::EMPTY, f)
    }

    /// Call this native function with the given context.
    pub fn call(&self, ctx: &mut CallContext) -> Result<(), BridgeError> {
        self.inner.call(ctx)
    }

    /// Same callable under another ID.
    pub fn with_id(&self, id: TypeHash) -> Self {
        Self {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Whether both handles share the same callable.
    pub fn same_callable(&self, other: &NativeFn) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Clone for NativeFn {
    fn clone(&self) -> Self {
        self.with_id(self.id)
    }
}

/// Trait for callable native functions.
///
/// The `call` method receives a [`CallContext`] with the receiver, the
/// coerced arguments and a return slot.
pub trait NativeCallable {
    fn call(&self, ctx: &mut CallContext) -> Result<(), BridgeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext) -> Result<(), BridgeError>,
{
    fn call(&self, ctx: &mut CallContext) -> Result<(), BridgeError> {
        (self)(ctx)
    }
}
