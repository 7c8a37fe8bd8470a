//! Payloads of the bridge's own host objects.
//!
//! - [`StaticContext`]: a host type used as a value; its members are the
//!   type's static members and calling it constructs an instance
//! - `HintedTarget`: an object or static context with member binding hints
//! - `PartialTarget`: a named, not yet invoked member group bound to its
//!   receiver

use std::sync::Arc;

use hostbridge_binder::SignatureBindingHints;
use hostbridge_core::{
    EventEntry, HostObject, HostType, HostValue, MemberEntry, MemberKind, MethodEntry, PropertyEntry,
};
use hostbridge_registry::{MemberBindingHints, TypeRegistry};

/// A host type standing in as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticContext {
    pub ty: HostType,
}

impl StaticContext {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }

    pub fn into_object(self) -> HostObject {
        HostObject::new(HostType::STATIC_CONTEXT, self)
    }

    /// The type behind a static context object.
    pub fn type_of(object: &HostObject) -> Option<HostType> {
        object.with(|context: &StaticContext| context.ty.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HintedTarget {
    pub(crate) target: HostObject,
    pub(crate) hints: MemberBindingHints,
}

impl HintedTarget {
    pub(crate) fn into_object(self) -> HostObject {
        HostObject::new(HostType::HINTED_TARGET, self)
    }
}

/// Methods, constructors, indexed properties or events sharing a name.
#[derive(Debug, Clone)]
pub(crate) struct PartialTarget {
    pub(crate) name: String,
    pub(crate) members: Vec<Arc<MemberEntry>>,
    /// Receiver for instance members; `None` for static ones.
    pub(crate) this: Option<HostValue>,
    pub(crate) declaring: HostType,
    pub(crate) hints: Option<SignatureBindingHints>,
}

impl PartialTarget {
    pub(crate) fn new(
        name: impl Into<String>,
        members: Vec<Arc<MemberEntry>>,
        this: Option<HostValue>,
        declaring: HostType,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            this,
            declaring,
            hints: None,
        }
    }

    pub(crate) fn with_hints(&self, hints: SignatureBindingHints) -> Self {
        Self {
            hints: Some(hints),
            ..self.clone()
        }
    }

    pub(crate) fn into_object(self) -> HostObject {
        HostObject::new(HostType::PARTIAL_TARGET, self)
    }

    pub(crate) fn of(value: &HostValue) -> Option<PartialTarget> {
        value.as_object()?.with(|partial: &PartialTarget| partial.clone())
    }

    /// Methods and constructors of the group.
    pub(crate) fn methods(&self) -> Vec<Arc<MethodEntry>> {
        self.members
            .iter()
            .filter_map(|member| match &member.kind {
                MemberKind::Method(method) | MemberKind::Constructor(method) => Some(Arc::clone(method)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn properties(&self) -> impl Iterator<Item = &PropertyEntry> {
        self.members.iter().filter_map(|member| member.as_property())
    }

    pub(crate) fn events(&self) -> impl Iterator<Item = &EventEntry> {
        self.members.iter().filter_map(|member| member.as_event())
    }

    pub(crate) fn is_method_group(&self) -> bool {
        !self.members.is_empty()
            && self
                .members
                .iter()
                .all(|member| matches!(member.kind, MemberKind::Method(_) | MemberKind::Constructor(_)))
    }

    /// Narrow `methods` by the signature hints, if any.
    pub(crate) fn hinted(&self, registry: &TypeRegistry, methods: Vec<Arc<MethodEntry>>) -> Vec<Arc<MethodEntry>> {
        match &self.hints {
            Some(hints) => hints.select(registry, &methods),
            None => methods,
        }
    }
}

/// The type and receiver a member access resolves against.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub(crate) ty: HostType,
    /// `None` when the target is a static context.
    pub(crate) this: Option<HostValue>,
    pub(crate) hints: Option<MemberBindingHints>,
}

impl Target {
    /// Unwrap hinted targets and static contexts.
    ///
    /// Returns `None` for null, which has no members.
    pub(crate) fn of(value: &HostValue) -> Option<Target> {
        let (value, hints) = match value.as_object().and_then(|o| o.with(|h: &HintedTarget| h.clone())) {
            Some(hinted) => (HostValue::Object(hinted.target), Some(hinted.hints)),
            None => (value.clone(), None),
        };
        if let Some(ty) = value.as_object().and_then(StaticContext::type_of) {
            return Some(Target { ty, this: None, hints });
        }
        let ty = value.type_of()?;
        Some(Target {
            ty,
            this: Some(value),
            hints,
        })
    }

    pub(crate) fn is_static(&self) -> bool {
        self.this.is_none()
    }

    pub(crate) fn object(&self) -> Option<&HostObject> {
        self.this.as_ref().and_then(HostValue::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_context_round_trip() {
        let ty = HostType::named("Demo.Widget");
        let object = StaticContext::new(ty.clone()).into_object();
        assert_eq!(object.ty(), &HostType::STATIC_CONTEXT);
        assert_eq!(StaticContext::type_of(&object), Some(ty.clone()));
        assert_eq!(StaticContext::type_of(&HostObject::new(ty.clone(), 1u8)), None);
    }

    #[test]
    fn target_unwraps_wrappers() {
        let ty = HostType::named("Demo.Widget");
        let instance = HostObject::new(ty.clone(), ());
        let hinted = HintedTarget {
            target: instance.clone(),
            hints: MemberBindingHints::new().with_special_name(Some(true)),
        }
        .into_object();

        let target = Target::of(&HostValue::Object(hinted)).expect("target");
        assert_eq!(target.ty, ty);
        assert!(target.object().is_some_and(|o| o.ptr_eq(&instance)));
        assert_eq!(target.hints.and_then(|h| h.special_name()), Some(true));

        let context = StaticContext::new(ty.clone()).into_object();
        let target = Target::of(&HostValue::Object(context)).expect("target");
        assert!(target.is_static());
        assert_eq!(target.ty, ty);

        assert!(Target::of(&HostValue::Null).is_none());
        assert_eq!(Target::of(&HostValue::from("s")).map(|t| t.ty), Some(HostType::STRING));
    }

    #[test]
    fn partial_splits_member_kinds() {
        let ty = HostType::named("Demo.Widget");
        let method = Arc::new(MethodEntry::new("Run", |_| Ok(())));
        let partial = PartialTarget::new(
            "Run",
            vec![Arc::new(MemberEntry::method(Arc::clone(&method)))],
            None,
            ty,
        );
        assert!(partial.is_method_group());
        assert_eq!(partial.methods().len(), 1);
        assert_eq!(partial.properties().count(), 0);
        assert_eq!(partial.events().count(), 0);
        assert!(!PartialTarget::new("Empty", Vec::new(), None, HostType::OBJECT).is_method_group());
    }
}
