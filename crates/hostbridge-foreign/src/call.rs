//! Function calls, protected calls and tracebacks.
//!
//! A call places the function below its arguments:
//!
//! ```text
//! before:  [.., f, a1, a2]        call(2, Some(1))
//! during:        ^ frame base = position of a1
//! after:   [.., r1]
//! ```
//!
//! Errors unwind as `Err(ForeignError::Raised(value))`. The message handler
//! of the innermost protected call runs while the raising frame is still on
//! the stack, so a traceback taken inside it sees the whole call chain.

use std::fmt::Write as _;
use std::mem;

use crate::heap::{Frame, NativeFunction};
use crate::state::{MAX_CALL_DEPTH, Unwind};
use crate::{ForeignError, ForeignState, ForeignValue, GcRef, Status};

/// A failed protected call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub status: Status,
    /// The error value, after the message handler if one ran.
    pub value: ForeignValue,
}

impl ForeignState {
    /// Call the function below the top `nargs` values.
    ///
    /// With `nresults` the results are truncated or padded to that count;
    /// `None` keeps all of them. An error that escapes with no protected
    /// call in progress is reported to the panic hook and returned as
    /// [`ForeignError::Unprotected`].
    pub fn call(&self, nargs: usize, nresults: Option<usize>) -> Result<(), ForeignError> {
        let position = self.callee_position(nargs)?;
        match self.call_at(position, nresults) {
            Err(ForeignError::Raised(value)) if self.inner().protected == 0 => {
                self.report_panic(&value);
                Err(ForeignError::Unprotected(value))
            }
            other => other,
        }
    }

    /// Call the function below the top `nargs` values in protected mode.
    ///
    /// On failure the stack is cut back to where the function was and the
    /// error value (passed through `handler` when given) is pushed.
    pub fn pcall(&self, nargs: usize, nresults: Option<usize>, handler: Option<ForeignValue>) -> Status {
        let position = match self.callee_position(nargs) {
            Ok(position) => position,
            Err(error) => {
                self.push(error.into_value());
                return Status::RuntimeError;
            }
        };

        let saved = {
            let mut inner = self.inner_mut();
            inner.protected += 1;
            inner.handlers.push(handler);
            mem::take(&mut inner.unwinding)
        };

        let mut result = self.call_at(position, nresults);
        if let Err(ForeignError::Raised(value)) = result {
            // raised before any frame was entered
            result = Err(ForeignError::Raised(self.handle_error(value)));
        }

        let unwinding = {
            let mut inner = self.inner_mut();
            inner.protected -= 1;
            inner.handlers.pop();
            mem::replace(&mut inner.unwinding, saved)
        };

        match result {
            Ok(()) => Status::Ok,
            Err(error) => {
                {
                    let mut inner = self.inner_mut();
                    inner.stack_mut().values.truncate(position);
                }
                self.push(error.into_value());
                if unwinding == Unwind::HandlerFailed {
                    Status::HandlerError
                } else {
                    Status::RuntimeError
                }
            }
        }
    }

    /// Call `function` with `args`, returning every result.
    ///
    /// Errors propagate as [`ForeignError::Raised`] without consulting the
    /// panic hook.
    pub fn call_value(&self, function: &ForeignValue, args: &[ForeignValue]) -> Result<Vec<ForeignValue>, ForeignError> {
        let position = self.push_call(function, args);
        self.call_at(position, None)?;
        Ok(self.inner_mut().stack_mut().values.split_off(position))
    }

    /// Call `function` with `args` in protected mode.
    pub fn pcall_value(
        &self,
        function: &ForeignValue,
        args: &[ForeignValue],
        handler: Option<ForeignValue>,
    ) -> Result<Vec<ForeignValue>, CallFailure> {
        let position = self.push_call(function, args);
        let status = self.pcall(args.len(), None, handler);
        let mut values = self.inner_mut().stack_mut().values.split_off(position);
        match status {
            Status::Ok => Ok(values),
            status => Err(CallFailure {
                status,
                value: values.pop().unwrap_or_default(),
            }),
        }
    }

    /// Describe the active call frames, innermost first.
    pub fn traceback(&self, message: Option<&str>) -> String {
        let inner = self.inner();
        let mut out = String::new();
        if let Some(message) = message {
            out.push_str(message);
            out.push('\n');
        }
        out.push_str("stack traceback:");
        for frame in inner.stack().frames.iter().rev() {
            match inner.heap.function(frame.function).and_then(|f| f.name.as_deref()) {
                Some(name) => {
                    let _ = write!(out, "\n\t[native]: in function '{name}'");
                }
                None => out.push_str("\n\t[native]: in ?"),
            }
        }
        out
    }

    /// Number of calls in progress on all threads.
    pub fn call_depth(&self) -> usize {
        self.inner().depth
    }

    fn push_call(&self, function: &ForeignValue, args: &[ForeignValue]) -> usize {
        let mut inner = self.inner_mut();
        let stack = inner.stack_mut();
        let position = stack.values.len();
        stack.values.push(function.clone());
        stack.values.extend_from_slice(args);
        position
    }

    fn callee_position(&self, nargs: usize) -> Result<usize, ForeignError> {
        let inner = self.inner();
        let stack = inner.stack();
        stack
            .values
            .len()
            .checked_sub(nargs + 1)
            .filter(|position| *position >= stack.base())
            .ok_or_else(|| ForeignError::message("not enough values on the stack for call"))
    }

    /// Resolve the callable at `position`, going through `__call` for
    /// non-functions.
    fn resolve_callee(&self, position: usize) -> Result<(NativeFunction, GcRef), ForeignError> {
        let mut inner = self.inner_mut();
        let callee = inner.stack().values.get(position).cloned().unwrap_or_default();
        if let ForeignValue::Function(r) = callee
            && let Some(function) = inner.heap.function(r)
        {
            return Ok((function.body.clone(), r));
        }

        let handler = inner.heap.metamethod(&callee, "__call");
        if let ForeignValue::Function(r) = handler
            && let Some(function) = inner.heap.function(r)
        {
            let body = function.body.clone();
            inner.stack_mut().values.insert(position, handler);
            return Ok((body, r));
        }

        Err(ForeignError::message(format!(
            "attempt to call a {} value",
            callee.type_name()
        )))
    }

    pub(crate) fn call_at(&self, position: usize, nresults: Option<usize>) -> Result<(), ForeignError> {
        let (body, function) = match self.resolve_callee(position) {
            Ok(callee) => callee,
            Err(error) => {
                self.inner_mut().stack_mut().values.truncate(position);
                return Err(error);
            }
        };

        {
            let mut inner = self.inner_mut();
            if inner.depth >= MAX_CALL_DEPTH {
                inner.stack_mut().values.truncate(position);
                return Err(ForeignError::message("stack overflow"));
            }
            inner.depth += 1;
            inner.stack_mut().frames.push(Frame {
                base: position + 1,
                function,
            });
        }

        let result = match body(self) {
            Err(ForeignError::Raised(value)) => Err(ForeignError::Raised(self.handle_error(value))),
            other => other,
        };

        let mut inner = self.inner_mut();
        inner.depth -= 1;
        if result.is_ok() {
            inner.unwinding = Unwind::None;
        }
        let stack = inner.stack_mut();
        stack.frames.pop();
        match result {
            Ok(count) => {
                let len = stack.values.len();
                let count = count.min(len.saturating_sub(position + 1));
                let mut results = stack.values.split_off(len - count);
                stack.values.truncate(position);
                if let Some(wanted) = nresults {
                    results.resize(wanted, ForeignValue::Nil);
                }
                stack.values.append(&mut results);
                Ok(())
            }
            Err(error) => {
                stack.values.truncate(position);
                Err(error)
            }
        }
    }

    /// Pass a raised value through the innermost message handler, once per
    /// unwinding.
    fn handle_error(&self, value: ForeignValue) -> ForeignValue {
        let handler = {
            let mut inner = self.inner_mut();
            if inner.unwinding != Unwind::None {
                return value;
            }
            match inner.handlers.last() {
                Some(Some(handler)) => {
                    let handler = handler.clone();
                    inner.unwinding = Unwind::Handled;
                    handler
                }
                _ => return value,
            }
        };

        match self.call_value(&handler, &[value]) {
            Ok(results) => {
                self.inner_mut().unwinding = Unwind::Handled;
                results.into_iter().next().unwrap_or_default()
            }
            Err(error) => {
                self.inner_mut().unwinding = Unwind::HandlerFailed;
                error.into_value()
            }
        }
    }
}
