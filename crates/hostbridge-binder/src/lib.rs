//! Runtime overload resolution for the host/foreign bridge.
//!
//! The binder picks one host member for a dynamic call site from the
//! values observed at run time:
//!
//! - [`Binder::bind_to_method`]: applicability, generic inference,
//!   type checks and tie-breaking over a method group, followed by
//!   argument coercion
//! - [`Binder::bind_to_field_or_property`]: field and property selection
//!   for reads and writes
//! - [`Binder::select_method_for_delegate`]: the overload a method group
//!   contributes when converted to a delegate type
//! - [`Binder::can_change_type`] / [`Binder::change_type`]: the coercions
//!   a foreign value may undergo on its way into a host location
//!
//! Conversion of foreign functions into delegates is delegated to a
//! [`CallbackFactory`], implemented by the bridge.

mod conversion;
mod error;
mod hints;
mod member;
mod overload;

pub use conversion::{CallbackFactory, NoCallbacks};
pub use error::BindFailure;
pub use hints::{ParamHint, SignatureBindingHints};
pub use member::BoundMember;
pub use overload::BoundMethod;

use hostbridge_registry::TypeRegistry;

/// Overload binder over a type registry.
///
/// Cheap to construct; holds only borrows.
#[derive(Clone, Copy)]
pub struct Binder<'a> {
    registry: &'a TypeRegistry,
    callbacks: &'a dyn CallbackFactory,
}

impl<'a> Binder<'a> {
    /// Create a binder that converts foreign functions through `callbacks`.
    pub fn new(registry: &'a TypeRegistry, callbacks: &'a dyn CallbackFactory) -> Self {
        Self { registry, callbacks }
    }

    /// Create a binder that cannot convert foreign functions.
    pub fn without_callbacks(registry: &'a TypeRegistry) -> Self {
        Self::new(registry, &NoCallbacks)
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }
}

impl std::fmt::Debug for Binder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("types", &self.registry.len())
            .finish_non_exhaustive()
    }
}
