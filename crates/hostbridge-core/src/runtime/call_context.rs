//! Call context passed to native implementations.

use std::any::Any;
use std::fmt;

use crate::{BridgeError, FromHostValue, HostObject, HostType, HostValue};

/// Context for a native call.
///
/// Arguments arrive already coerced to the declared parameter types.
/// By-ref and out parameters are written back through
/// [`set_arg`](Self::set_arg); the binder reads them after the call.
///
/// ```ignore
/// let x: i32 = ctx.arg(0)?;
/// ctx.set_return(x * 2);
/// ```
pub struct CallContext<'a> {
    this: Option<&'a HostValue>,
    args: &'a mut [HostValue],
    type_args: &'a [HostType],
    declaring_type: &'a HostType,
    ret: HostValue,
}

impl<'a> CallContext<'a> {
    /// Create a new call context.
    ///
    /// * `this` - The receiver, `None` for static members and constructors
    /// * `args` - Coerced argument values, one per declared parameter
    /// * `type_args` - Method-level generic arguments
    /// * `declaring_type` - The (possibly constructed) declaring type
    pub fn new(
        this: Option<&'a HostValue>,
        args: &'a mut [HostValue],
        type_args: &'a [HostType],
        declaring_type: &'a HostType,
    ) -> Self {
        Self {
            this,
            args,
            type_args,
            declaring_type,
            ret: HostValue::Null,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Get a raw reference to an argument.
    pub fn arg_value(&self, index: usize) -> Result<&HostValue, BridgeError> {
        self.args.get(index).ok_or_else(|| {
            BridgeError::Argument(format!(
                "argument index {index} out of bounds ({} arguments)",
                self.args.len()
            ))
        })
    }

    /// Get a typed argument value.
    pub fn arg<T: FromHostValue>(&self, index: usize) -> Result<T, BridgeError> {
        T::from_host_value(self.arg_value(index)?)
    }

    /// Write back a by-ref or out argument.
    pub fn set_arg(&mut self, index: usize, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        let count = self.args.len();
        let slot = self.args.get_mut(index).ok_or_else(|| {
            BridgeError::Argument(format!("argument index {index} out of bounds ({count} arguments)"))
        })?;
        *slot = value.into();
        Ok(())
    }

    /// All arguments.
    pub fn args(&self) -> &[HostValue] {
        self.args
    }

    /// Method-level generic arguments.
    pub fn type_args(&self) -> &[HostType] {
        self.type_args
    }

    /// The declaring type, with generic arguments substituted.
    pub fn declaring_type(&self) -> &HostType {
        self.declaring_type
    }

    /// The receiver value.
    pub fn this_value(&self) -> Result<&HostValue, BridgeError> {
        self.this
            .ok_or_else(|| BridgeError::Target("non-static member requires a target".into()))
    }

    /// The receiver object.
    pub fn this_object(&self) -> Result<&HostObject, BridgeError> {
        match self.this_value()? {
            HostValue::Object(object) => Ok(object),
            other => Err(BridgeError::Target(format!(
                "receiver is not an object: {other:?}"
            ))),
        }
    }

    /// Borrow the receiver's payload as `T`.
    pub fn with_this<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, BridgeError> {
        let object = self.this_object()?;
        object.with(f).ok_or_else(|| {
            BridgeError::Target(format!(
                "receiver of type {:?} does not hold a {}",
                object.ty(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// Mutably borrow the receiver's payload as `T`.
    pub fn with_this_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BridgeError> {
        let object = self.this_object()?;
        object.with_mut(f).ok_or_else(|| {
            BridgeError::Target(format!(
                "receiver of type {:?} does not hold a {}",
                object.ty(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// Set the return value.
    pub fn set_return(&mut self, value: impl Into<HostValue>) {
        self.ret = value.into();
    }

    /// Take the return value, leaving null.
    pub fn take_return(&mut self) -> HostValue {
        std::mem::take(&mut self.ret)
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("arg_count", &self.arg_count())
            .field("has_this", &self.this.is_some())
            .field("declaring_type", &self.declaring_type)
            .finish()
    }
}
