//! Delegate payloads and multicast handler lists.

use crate::{BridgeError, CallContext, HostObject, HostType, HostValue, NativeFn};

/// Payload of a delegate object.
///
/// The body receives the delegate's `Invoke` arguments unchanged; the
/// receiver is the delegate object itself.
#[derive(Debug, Clone)]
pub struct DelegateData {
    body: NativeFn,
}

impl DelegateData {
    pub fn new(body: NativeFn) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &NativeFn {
        &self.body
    }

    /// Create a delegate object of `delegate_type` running `body`.
    pub fn into_object(self, delegate_type: HostType) -> HostObject {
        HostObject::new(delegate_type, self)
    }
}

/// Invoke a delegate object directly.
///
/// `args` must already match the `Invoke` signature; by-ref slots are
/// written back in place.
pub fn invoke_delegate(delegate: &HostObject, args: &mut [HostValue]) -> Result<HostValue, BridgeError> {
    let body = delegate
        .with(|data: &DelegateData| data.body().clone())
        .ok_or_else(|| BridgeError::Target(format!("{:?} is not a delegate", delegate.ty())))?;
    let this = HostValue::Object(delegate.clone());
    let declaring = delegate.ty().clone();
    let mut ctx = CallContext::new(Some(&this), args, &[], &declaring);
    body.call(&mut ctx)?;
    Ok(ctx.take_return())
}

/// Ordered list of handlers behind an event.
///
/// Removal matches by delegate identity and removes the most recently added
/// occurrence, so adding and removing the same handler object is balanced.
#[derive(Debug, Clone, Default)]
pub struct DelegateList {
    handlers: Vec<HostObject>,
}

impl DelegateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: HostObject) {
        self.handlers.push(handler);
    }

    /// Remove the last occurrence of `handler`. Returns whether one was found.
    pub fn remove(&mut self, handler: &HostObject) -> bool {
        match self.handlers.iter().rposition(|h| h.ptr_eq(handler)) {
            Some(index) => {
                self.handlers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers(&self) -> &[HostObject] {
        &self.handlers
    }

    /// Invoke every handler in order with a copy of `args`.
    ///
    /// Returns the last handler's result, or null when the list is empty.
    pub fn invoke_all(&self, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        let mut result = HostValue::Null;
        for handler in &self.handlers {
            let mut args = args.to_vec();
            result = invoke_delegate(handler, &mut args)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder(offset: i32) -> HostObject {
        DelegateData::new(NativeFn::from_fn(move |ctx: &mut CallContext| {
            let x: i32 = ctx.arg(0)?;
            ctx.set_return(x + offset);
            Ok(())
        }))
        .into_object(HostType::named("Demo.Transform"))
    }

    #[test]
    fn invoke_runs_body() {
        let delegate = adder(10);
        let result = invoke_delegate(&delegate, &mut [HostValue::I32(5)]).unwrap();
        assert_eq!(result, HostValue::I32(15));
    }

    #[test]
    fn list_removes_by_identity() {
        let a = adder(1);
        let b = adder(2);
        let mut list = DelegateList::new();
        list.add(a.clone());
        list.add(b.clone());
        list.add(a.clone());

        assert!(list.remove(&a));
        assert_eq!(list.len(), 2);
        assert!(list.handlers()[1].ptr_eq(&b));
        assert!(!list.remove(&adder(1)));
    }

    #[test]
    fn invoke_all_returns_last() {
        let mut list = DelegateList::new();
        list.add(adder(1));
        list.add(adder(100));
        let result = list.invoke_all(&[HostValue::I32(1)]).unwrap();
        assert_eq!(result, HostValue::I32(101));
        assert_eq!(DelegateList::new().invoke_all(&[]).unwrap(), HostValue::Null);
    }
}
