//! Reference foreign engine for the host bridge.
//!
//! A dynamically-typed, garbage-collected engine reduced to the surface the
//! bridge consumes. It has no language of its own: functions are native
//! closures that drive the engine through [`ForeignState`].
//!
//! - Value stack with frame-relative indices and call frames per thread
//! - Reference table ([`RefKey`]) keeping values alive for the host
//! - Tables with [`WeakMode`], named metatables, userdata with finalizers
//! - Protected calls with message handlers and tracebacks ([`Status`])
//! - A mark and sweep collector ([`ForeignState::collect_garbage`])
//!
//! ```ignore
//! let state = ForeignState::new();
//! let add = state.new_function(|state| {
//!     let a = state.get(1).as_number().unwrap_or_default();
//!     let b = state.get(2).as_number().unwrap_or_default();
//!     state.push(a + b);
//!     Ok(1)
//! });
//! let sum = state.call_value(&add, &[1.0.into(), 2.0.into()])?;
//! ```

mod call;
mod error;
mod gc;
mod heap;
mod ops;
mod state;
mod table;
mod value;

pub use call::CallFailure;
pub use error::{ForeignError, Status};
pub use heap::NativeFunction;
pub use ops::ArithOp;
pub use state::{DEFAULT_MAX_STACK, ForeignState, PanicHook};
pub use table::WeakMode;
pub use value::{ForeignValue, GcRef, RefKey, ValueKind};

pub(crate) use table::Table;
