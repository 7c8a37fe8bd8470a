//! Native function storage and execution context.
//!
//! ## Key Types
//!
//! - [`NativeFn`]: Type-erased callable backing every host member
//! - [`CallContext`]: Receiver, arguments and return slot of one call

mod call_context;
mod native_fn;

pub use call_context::CallContext;
pub use native_fn::{NativeCallable, NativeFn};
