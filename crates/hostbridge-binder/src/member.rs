//! Field and property binding, and invocation of bound methods.

use std::sync::Arc;

use hostbridge_core::{BridgeError, CallContext, HostType, HostValue, MemberEntry, MemberKind, MethodEntry};
use hostbridge_registry::MemberAccess;

use crate::{BindFailure, Binder, BoundMethod};

/// A field or property chosen for an access.
#[derive(Debug, Clone)]
pub struct BoundMember {
    pub member: Arc<MemberEntry>,
    /// For writes, the value coerced to the member's type.
    pub value: Option<HostValue>,
}

impl Binder<'_> {
    /// Pick the field or property of `members` for an access.
    ///
    /// A read binds the single candidate. A write binds the single
    /// candidate whose type accepts `value` and coerces the value.
    pub fn bind_to_field_or_property(
        &self,
        access: MemberAccess,
        members: &[Arc<MemberEntry>],
        value: Option<&HostValue>,
    ) -> Result<BoundMember, BindFailure> {
        let mut selected: Option<(&Arc<MemberEntry>, &HostType)> = None;

        for member in members {
            let data_type = match &member.kind {
                MemberKind::Field(field) => &field.data_type,
                MemberKind::Property(property) => &property.data_type,
                _ => continue,
            };

            if access == MemberAccess::Set {
                let accepts = value.is_some_and(|value| self.can_change_type(value, data_type));
                if !accepts {
                    continue;
                }
            }

            if selected.is_some() {
                return Err(BindFailure::Ambiguous);
            }
            selected = Some((member, data_type));
        }

        let (member, data_type) = selected.ok_or(BindFailure::NoMatch)?;
        let value = match (access, value) {
            (MemberAccess::Set, Some(value)) => Some(self.change_type(value.clone(), data_type)?),
            _ => None,
        };

        Ok(BoundMember {
            member: Arc::clone(member),
            value,
        })
    }

    /// Invoke a bound method.
    ///
    /// Results are the return value (unless void) followed by the final
    /// values of by-ref and out arguments, in parameter order.
    pub fn invoke(&self, bound: BoundMethod, this: Option<&HostValue>) -> Result<Vec<HostValue>, BridgeError> {
        let BoundMethod { method, mut args } = bound;
        let ret = call_native(&method, this, &mut args)?;

        let mut results = Vec::with_capacity(1 + method.by_ref_count());
        if !method.returns_void() {
            results.push(ret);
        }
        results.extend(
            method
                .params
                .iter()
                .zip(args)
                .filter(|(param, _)| param.is_by_ref())
                .map(|(_, value)| value),
        );
        Ok(results)
    }

    /// Bind `args` against `methods` and invoke the result.
    ///
    /// Binding failures are reported against `declaring.name`.
    pub fn call_method(
        &self,
        declaring: &HostType,
        name: &str,
        methods: &[Arc<MethodEntry>],
        this: Option<&HostValue>,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, BridgeError> {
        let bound = self
            .bind_to_method(methods, args)
            .map_err(|failure| self.call_error(failure, declaring, name, args))?;
        self.invoke(bound, this)
    }
}

/// Run `method`'s native implementation over already coerced `args`.
pub(crate) fn call_native(
    method: &MethodEntry,
    this: Option<&HostValue>,
    args: &mut [HostValue],
) -> Result<HostValue, BridgeError> {
    let this = if method.is_static() { None } else { this };
    let mut ctx = CallContext::new(this, args, &method.type_args, &method.declaring_type);
    method.implementation.call(&mut ctx)?;
    Ok(ctx.take_return())
}
