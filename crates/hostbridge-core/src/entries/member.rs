//! Member entries: fields, properties, events, methods and nested types.

use std::sync::Arc;

use crate::{BridgeError, CallContext, HostType, MemberFlags, MethodEntry, NativeFn, ParamEntry};

/// A field backed by native accessors.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub data_type: HostType,
    /// Reads the field of `this` (or the static field) into the return slot.
    pub getter: NativeFn,
    /// Writes argument 0 into the field. `None` for read-only fields.
    pub setter: Option<NativeFn>,
}

impl FieldEntry {
    pub fn new<F>(data_type: HostType, getter: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        Self {
            data_type,
            getter: NativeFn::from_fn(getter),
            setter: None,
        }
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        self.setter = Some(NativeFn::from_fn(setter));
        self
    }
}

/// A property with accessor methods.
///
/// Accessors are ordinary [`MethodEntry`]s named `get_{name}` and
/// `set_{name}`, flagged `SPECIAL_NAME`. A property with index parameters
/// is an indexed property: both accessors take the index parameters first.
#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub data_type: HostType,
    pub index_params: Vec<ParamEntry>,
    pub getter: Option<Arc<MethodEntry>>,
    pub setter: Option<Arc<MethodEntry>>,
}

impl PropertyEntry {
    /// Create a property without accessors.
    pub fn new(data_type: HostType) -> Self {
        Self {
            data_type,
            index_params: Vec::new(),
            getter: None,
            setter: None,
        }
    }

    /// Getter body; the accessor signature is completed on registration.
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(MethodEntry::new("", getter)));
        self
    }

    /// Setter body; the value is the last argument.
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(MethodEntry::new("", setter)));
        self
    }

    pub fn with_index_param(mut self, param: ParamEntry) -> Self {
        self.index_params.push(param);
        self
    }

    pub fn is_indexed(&self) -> bool {
        !self.index_params.is_empty()
    }
}

/// An event with add/remove accessors.
#[derive(Debug, Clone)]
pub struct EventEntry {
    /// Delegate type of handlers.
    pub handler_type: HostType,
    pub add: Option<Arc<MethodEntry>>,
    pub remove: Option<Arc<MethodEntry>>,
}

impl EventEntry {
    pub fn new(handler_type: HostType) -> Self {
        Self {
            handler_type,
            add: None,
            remove: None,
        }
    }

    /// Add accessor body; the handler is argument 0.
    pub fn with_add<F>(mut self, add: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        self.add = Some(Arc::new(MethodEntry::new("", add)));
        self
    }

    /// Remove accessor body; the handler is argument 0.
    pub fn with_remove<F>(mut self, remove: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        self.remove = Some(Arc::new(MethodEntry::new("", remove)));
        self
    }
}

/// What a member is.
#[derive(Debug, Clone)]
pub enum MemberKind {
    Field(FieldEntry),
    Property(PropertyEntry),
    Method(Arc<MethodEntry>),
    Constructor(Arc<MethodEntry>),
    Event(EventEntry),
    NestedType(HostType),
}

/// A named member of a host type.
#[derive(Debug, Clone)]
pub struct MemberEntry {
    pub name: String,
    pub declaring_type: HostType,
    pub flags: MemberFlags,
    pub kind: MemberKind,
}

impl MemberEntry {
    /// Member wrapping a method, carrying the method's flags.
    pub fn method(method: Arc<MethodEntry>) -> Self {
        Self {
            name: method.name.clone(),
            declaring_type: method.declaring_type.clone(),
            flags: method.flags,
            kind: MemberKind::Method(method),
        }
    }

    /// Member wrapping a constructor.
    pub fn constructor(method: Arc<MethodEntry>) -> Self {
        Self {
            name: method.name.clone(),
            declaring_type: method.declaring_type.clone(),
            flags: method.flags,
            kind: MemberKind::Constructor(method),
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    pub fn is_special_name(&self) -> bool {
        self.flags.contains(MemberFlags::SPECIAL_NAME)
    }

    pub fn hides_by_name(&self) -> bool {
        self.flags.contains(MemberFlags::HIDE_BY_NAME)
    }

    /// Methods and constructors.
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_) | MemberKind::Constructor(_))
    }

    /// Members that resolve to a partial target rather than a value:
    /// callables, events and indexed properties.
    pub fn is_callable_like(&self) -> bool {
        match &self.kind {
            MemberKind::Method(_) | MemberKind::Constructor(_) | MemberKind::Event(_) => true,
            MemberKind::Property(property) => property.is_indexed(),
            MemberKind::Field(_) | MemberKind::NestedType(_) => false,
        }
    }

    /// The method of a method or constructor member.
    pub fn as_method(&self) -> Option<&Arc<MethodEntry>> {
        match &self.kind {
            MemberKind::Method(method) | MemberKind::Constructor(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyEntry> {
        match &self.kind {
            MemberKind::Property(property) => Some(property),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventEntry> {
        match &self.kind {
            MemberKind::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MemberKind::Field(_) => "field",
            MemberKind::Property(_) => "property",
            MemberKind::Method(_) => "method",
            MemberKind::Constructor(_) => "constructor",
            MemberKind::Event(_) => "event",
            MemberKind::NestedType(_) => "nested type",
        }
    }

    /// Copy of this member on the constructed generic type `constructed`.
    pub fn substitute_type_params(&self, constructed: &HostType, type_args: &[HostType]) -> MemberEntry {
        let method = |m: &Arc<MethodEntry>| Arc::new(m.substitute_type_params(constructed, type_args));
        let kind = match &self.kind {
            MemberKind::Field(field) => MemberKind::Field(FieldEntry {
                data_type: field.data_type.substitute_type_params(type_args),
                ..field.clone()
            }),
            MemberKind::Property(property) => MemberKind::Property(PropertyEntry {
                data_type: property.data_type.substitute_type_params(type_args),
                index_params: property
                    .index_params
                    .iter()
                    .map(|p| ParamEntry {
                        data_type: p.data_type.substitute_type_params(type_args),
                        ..p.clone()
                    })
                    .collect(),
                getter: property.getter.as_ref().map(method),
                setter: property.setter.as_ref().map(method),
            }),
            MemberKind::Method(m) => MemberKind::Method(method(m)),
            MemberKind::Constructor(m) => MemberKind::Constructor(method(m)),
            MemberKind::Event(event) => MemberKind::Event(EventEntry {
                handler_type: event.handler_type.substitute_type_params(type_args),
                add: event.add.as_ref().map(method),
                remove: event.remove.as_ref().map(method),
            }),
            MemberKind::NestedType(ty) => MemberKind::NestedType(ty.substitute_type_params(type_args)),
        };
        MemberEntry {
            name: self.name.clone(),
            declaring_type: constructed.clone(),
            flags: self.flags,
            kind,
        }
    }
}
