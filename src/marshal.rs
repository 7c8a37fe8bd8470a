//! Conversion of values between the host and the foreign engine.
//!
//! | Host | Foreign |
//! |------|---------|
//! | `Null` | nil |
//! | `Bool` | boolean |
//! | numeric primitives except 64-bit integers | number |
//! | `I64` / `U64` | `Int64Box` / `UInt64Box` userdata |
//! | `String` | string, encoded per [`Encoding`](crate::Encoding) |
//! | foreign references | the referenced value |
//! | other objects | userdata with the bridge metatable |
//!
//! Numbers always arrive on the host side as `F64`; the binder narrows
//! them when a parameter type asks for it.

use hostbridge_core::{BridgeError, HostObject, HostType, HostValue, Int64Box, UInt64Box};
use hostbridge_foreign::{ForeignError, ForeignValue};

use crate::foreign_ref::ForeignRef;
use crate::state::LockedState;
use crate::targets::PartialTarget;

impl LockedState<'_> {
    /// Convert a host value for the foreign side.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn to_foreign(&self, value: &HostValue) -> Result<ForeignValue, BridgeError> {
        Ok(match value {
            HostValue::Null => ForeignValue::Nil,
            HostValue::Bool(b) => ForeignValue::Boolean(*b),
            HostValue::I64(v) => self.mint(Int64Box(*v).into_object()),
            HostValue::U64(v) => self.mint(UInt64Box(*v).into_object()),
            HostValue::String(text) => ForeignValue::from(self.config().encoding.encode(text)),
            HostValue::Object(object) => self.object_to_foreign(object)?,
            number => ForeignValue::number(number.as_f64().unwrap_or_default()),
        })
    }

    fn object_to_foreign(&self, object: &HostObject) -> Result<ForeignValue, BridgeError> {
        if let Some(value) = ForeignRef::value_in(object, self)? {
            return Ok(value);
        }
        if object.is::<PartialTarget>() {
            let metatable = &self.state().partial_metatable;
            return Ok(self.identity().mint(self.foreign(), object.clone(), metatable).1);
        }
        if self.has_identity(object.ty()) {
            let metatable = &self.state().object_metatable;
            return Ok(self.identity().register(self.foreign(), object, metatable));
        }
        Ok(self.mint(object.clone()))
    }

    fn mint(&self, object: HostObject) -> ForeignValue {
        let metatable = &self.state().object_metatable;
        self.identity().mint(self.foreign(), object, metatable).1
    }

    fn has_identity(&self, ty: &HostType) -> bool {
        *ty != HostType::STATIC_CONTEXT && *ty != HostType::HINTED_TARGET && !self.registry().is_value_type(ty)
    }

    /// Convert a foreign value for the host side.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn to_host(&self, value: &ForeignValue) -> Result<HostValue, BridgeError> {
        Ok(match value {
            ForeignValue::Nil => HostValue::Null,
            ForeignValue::Boolean(b) => HostValue::Bool(*b),
            ForeignValue::Number(n) => HostValue::F64(n.into_inner()),
            ForeignValue::String(bytes) => HostValue::String(self.config().encoding.decode(bytes).into()),
            ForeignValue::UserData(_) => match self.host_object(value)? {
                Some(object) => unbox(object),
                None => self.foreign_ref(value.clone(), HostType::FOREIGN_USERDATA),
            },
            ForeignValue::Table(_) => self.foreign_ref(value.clone(), HostType::FOREIGN_TABLE),
            ForeignValue::Function(_) => self.foreign_ref(value.clone(), HostType::FOREIGN_FUNCTION),
            ForeignValue::Thread(_) => self.foreign_ref(value.clone(), HostType::FOREIGN_THREAD),
        })
    }

    /// Convert a foreign value and coerce it to `ty`.
    pub fn to_host_as(&self, value: &ForeignValue, ty: &HostType) -> Result<HostValue, BridgeError> {
        let value = self.to_host(value)?;
        self.binder().change_type(value, ty)
    }

    /// Pop the top of the foreign stack as a host value.
    pub fn pop_host(&self) -> Result<HostValue, BridgeError> {
        let value = self.foreign().pop();
        self.to_host(&value)
    }

    /// Push a host value onto the foreign stack.
    pub fn push_host(&self, value: &HostValue) -> Result<(), BridgeError> {
        self.ensure_stack(1)?;
        let value = self.to_foreign(value)?;
        self.foreign().push(value);
        Ok(())
    }

    /// Push results of a bridge operation, returning their count.
    pub(crate) fn push_results(&self, values: &[HostValue]) -> Result<usize, BridgeError> {
        self.ensure_stack(values.len())?;
        for value in values {
            let value = self.to_foreign(value)?;
            self.foreign().push(value);
        }
        Ok(values.len())
    }

    /// Make room for `needed` values plus the configured reserve.
    pub(crate) fn ensure_stack(&self, needed: usize) -> Result<(), BridgeError> {
        if self.foreign().check_stack(needed + self.config().stack_reserve) {
            Ok(())
        } else {
            Err(BridgeError::runtime("stack overflow (bridge stack reserve exhausted)"))
        }
    }

    /// The host object behind a bridge userdata, without unboxing.
    ///
    /// `None` for every other foreign value.
    pub(crate) fn host_object(&self, value: &ForeignValue) -> Result<Option<HostObject>, BridgeError> {
        let Some(handle) = self.foreign().userdata_id(value) else {
            return Ok(None);
        };
        let metatable = self.foreign().metatable(value);
        let state = self.state();
        if metatable.as_ref() != Some(&state.object_metatable) && metatable.as_ref() != Some(&state.partial_metatable) {
            return Ok(None);
        }
        match self.identity().target(handle) {
            Some(object) => Ok(Some(object.clone())),
            None => Err(BridgeError::ObjectDisposed(format!("handle {handle}"))),
        }
    }

    /// Wrap a host error as a foreign error value.
    ///
    /// The error travels as exception userdata so that it comes back to the
    /// host unchanged, and a host exception object keeps its identity.
    pub(crate) fn raise(&self, error: BridgeError) -> ForeignError {
        tracing::debug!(%error, "raising host error into foreign engine");
        let message = error.to_string();
        let object = error.into_exception_object();
        match self.to_foreign(&HostValue::Object(object)) {
            Ok(value) => ForeignError::Raised(value),
            Err(_) => ForeignError::message(message),
        }
    }

    /// Recover a host error from a foreign error value.
    pub(crate) fn error_from_value(&self, value: &ForeignValue) -> BridgeError {
        if let Ok(Some(object)) = self.host_object(value) {
            return BridgeError::from_exception_object(object);
        }
        match value {
            ForeignValue::String(bytes) => BridgeError::runtime(self.config().encoding.decode(bytes)),
            other => BridgeError::runtime(format!("(error object is a {} value)", other.type_name())),
        }
    }

    pub(crate) fn error_from_foreign(&self, error: ForeignError) -> BridgeError {
        match error {
            ForeignError::Raised(value) => self.error_from_value(&value),
            ForeignError::Unprotected(value) => BridgeError::Panic(match &value {
                ForeignValue::String(bytes) => self.config().encoding.decode(bytes),
                _ => "unspecified error".to_string(),
            }),
        }
    }
}

/// Integer boxes cross back as the primitive they carry.
fn unbox(object: HostObject) -> HostValue {
    if let Some(value) = object.with(|b: &Int64Box| b.0) {
        return HostValue::I64(value);
    }
    if let Some(value) = object.with(|b: &UInt64Box| b.0) {
        return HostValue::U64(value);
    }
    HostValue::Object(object)
}
