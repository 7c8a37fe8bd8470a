//! Registered host type entries.
//!
//! A [`TypeEntry`] is built with chained builder calls and handed to the
//! type registry:
//!
//! ```rust
//! use hostbridge_core::{HostType, MethodEntry, ParamEntry, PropertyEntry, TypeEntry};
//!
//! let widget = TypeEntry::class("Demo.Widget")
//!     .with_method(
//!         MethodEntry::new("Resize", |_ctx| Ok(()))
//!             .with_param(ParamEntry::new("width", HostType::INT32)),
//!     )
//!     .with_property(
//!         "Name",
//!         PropertyEntry::new(HostType::STRING).with_getter(|ctx| {
//!             ctx.set_return("widget");
//!             Ok(())
//!         }),
//!     );
//! assert_eq!(widget.name, "Widget");
//! ```

use std::sync::Arc;

use crate::{
    DelegateData, EventEntry, FieldEntry, HostType, MemberEntry, MemberFlags, MemberKind,
    MethodEntry, ParamEntry, PropertyEntry, TypeFlags, TypeHash, TypeKind, Variance, primitives,
};

/// A generic type parameter declared by a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    pub name: String,
    pub variance: Variance,
}

/// Registry entry for a host type.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    /// Short name, the last segment of `full_name`.
    pub name: String,
    pub full_name: String,
    pub type_hash: TypeHash,
    pub kind: TypeKind,
    pub flags: TypeFlags,

    // === Inheritance ===
    pub base: Option<HostType>,
    pub interfaces: Vec<HostType>,

    // === Generics ===
    /// Non-empty for generic type definitions.
    pub generic_params: Vec<GenericParam>,

    // === Members ===
    pub members: Vec<Arc<MemberEntry>>,
    pub constructors: Vec<Arc<MethodEntry>>,
}

impl TypeEntry {
    /// Create an entry of `kind` with no base type.
    pub fn new(full_name: impl Into<String>, kind: TypeKind) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit(['.', '+'])
            .next()
            .unwrap_or(&full_name)
            .to_string();
        Self {
            type_hash: TypeHash::from_name(&full_name),
            name,
            full_name,
            kind,
            flags: TypeFlags::empty(),
            base: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            members: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// A reference type deriving from `Object`.
    pub fn class(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Class).with_base(HostType::OBJECT)
    }

    /// A value type deriving from `ValueType`.
    pub fn structure(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Struct).with_base(HostType::VALUE_TYPE)
    }

    pub fn interface(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Interface)
    }

    /// A delegate type whose `Invoke` method has `params` and `return_type`.
    ///
    /// `Invoke` forwards to the [`DelegateData`] body of the receiver.
    pub fn delegate(
        full_name: impl Into<String>,
        params: impl IntoIterator<Item = ParamEntry>,
        return_type: HostType,
    ) -> Self {
        let invoke = MethodEntry::new("Invoke", |ctx| {
            let body = ctx.with_this(|data: &DelegateData| data.body().clone())?;
            body.call(ctx)
        })
        .with_params(params)
        .returns(return_type);
        Self::new(full_name, TypeKind::Delegate)
            .with_base(HostType::DELEGATE)
            .sealed()
            .with_method(invoke)
    }

    // === Builder Methods ===

    pub fn with_base(mut self, base: HostType) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_interface(mut self, interface: HostType) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Declare a generic type parameter. Members refer to it as
    /// [`HostType::TypeParam`] by declaration order.
    pub fn with_generic_param(mut self, name: impl Into<String>, variance: Variance) -> Self {
        self.generic_params.push(GenericParam {
            name: name.into(),
            variance,
        });
        self
    }

    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Lookup on this type sees only its own members.
    pub fn hide_inherited_members(self) -> Self {
        self.with_flags(TypeFlags::HIDE_INHERITED_MEMBERS)
    }

    pub fn sealed(self) -> Self {
        self.with_flags(TypeFlags::SEALED)
    }

    /// Add a method. Its flags decide whether it is static.
    pub fn with_method(mut self, method: MethodEntry) -> Self {
        let method = self.adopt_method(method);
        self.members.push(Arc::new(MemberEntry::method(method)));
        self
    }

    /// Add a constructor. The declared return type is the type itself.
    pub fn with_constructor(mut self, mut constructor: MethodEntry) -> Self {
        constructor.name = ".ctor".to_string();
        constructor.return_type = self.self_type();
        constructor.declaring_type = self.self_type();
        let param_hashes = constructor.param_hashes();
        let id = TypeHash::from_constructor(self.type_hash, &param_hashes);
        constructor.implementation = constructor.implementation.with_id(id);
        self.constructors.push(Arc::new(constructor));
        self
    }

    pub fn with_field(self, name: impl Into<String>, field: FieldEntry) -> Self {
        self.add_field(name.into(), field, MemberFlags::empty())
    }

    pub fn with_static_field(self, name: impl Into<String>, field: FieldEntry) -> Self {
        self.add_field(name.into(), field, MemberFlags::STATIC)
    }

    pub fn with_property(self, name: impl Into<String>, property: PropertyEntry) -> Self {
        self.add_property(name.into(), property, MemberFlags::empty())
    }

    pub fn with_static_property(self, name: impl Into<String>, property: PropertyEntry) -> Self {
        self.add_property(name.into(), property, MemberFlags::STATIC)
    }

    pub fn with_event(self, name: impl Into<String>, event: EventEntry) -> Self {
        self.add_event(name.into(), event, MemberFlags::empty())
    }

    pub fn with_static_event(self, name: impl Into<String>, event: EventEntry) -> Self {
        self.add_event(name.into(), event, MemberFlags::STATIC)
    }

    /// Add a nested type, visible in static context.
    pub fn with_nested_type(mut self, name: impl Into<String>, nested: HostType) -> Self {
        let member = MemberEntry {
            name: name.into(),
            declaring_type: self.self_type(),
            flags: MemberFlags::STATIC,
            kind: MemberKind::NestedType(nested),
        };
        self.members.push(Arc::new(member));
        self
    }

    fn add_field(mut self, name: String, field: FieldEntry, mut flags: MemberFlags) -> Self {
        if field.setter.is_none() {
            flags |= MemberFlags::READ_ONLY;
        }
        let member = MemberEntry {
            name,
            declaring_type: self.self_type(),
            flags,
            kind: MemberKind::Field(field),
        };
        self.members.push(Arc::new(member));
        self
    }

    fn add_property(mut self, name: String, mut property: PropertyEntry, flags: MemberFlags) -> Self {
        let accessor_flags = flags | MemberFlags::SPECIAL_NAME;
        if let Some(getter) = property.getter.take() {
            let mut getter = Arc::unwrap_or_clone(getter);
            getter.name = format!("get_{name}");
            getter.params = property.index_params.clone();
            getter.return_type = property.data_type.clone();
            getter.flags = accessor_flags;
            let getter = self.adopt_method(getter);
            self.members.push(Arc::new(MemberEntry::method(Arc::clone(&getter))));
            property.getter = Some(getter);
        }
        if let Some(setter) = property.setter.take() {
            let mut setter = Arc::unwrap_or_clone(setter);
            setter.name = format!("set_{name}");
            setter.params = property.index_params.clone();
            setter
                .params
                .push(ParamEntry::new("value", property.data_type.clone()));
            setter.return_type = HostType::VOID;
            setter.flags = accessor_flags;
            let setter = self.adopt_method(setter);
            self.members.push(Arc::new(MemberEntry::method(Arc::clone(&setter))));
            property.setter = Some(setter);
        }
        let member = MemberEntry {
            name,
            declaring_type: self.self_type(),
            flags,
            kind: MemberKind::Property(property),
        };
        self.members.push(Arc::new(member));
        self
    }

    fn add_event(mut self, name: String, mut event: EventEntry, flags: MemberFlags) -> Self {
        let accessor_flags = flags | MemberFlags::SPECIAL_NAME;
        let handler = ParamEntry::new("handler", event.handler_type.clone());
        for (prefix, slot) in [("add", &mut event.add), ("remove", &mut event.remove)] {
            if let Some(accessor) = slot.take() {
                let mut accessor = Arc::unwrap_or_clone(accessor);
                accessor.name = format!("{prefix}_{name}");
                accessor.params = vec![handler.clone()];
                accessor.return_type = HostType::VOID;
                accessor.flags = accessor_flags;
                let accessor = self.adopt_method(accessor);
                self.members.push(Arc::new(MemberEntry::method(Arc::clone(&accessor))));
                *slot = Some(accessor);
            }
        }
        let member = MemberEntry {
            name,
            declaring_type: self.self_type(),
            flags,
            kind: MemberKind::Event(event),
        };
        self.members.push(Arc::new(member));
        self
    }

    fn adopt_method(&self, mut method: MethodEntry) -> Arc<MethodEntry> {
        method.declaring_type = self.self_type();
        let id = TypeHash::from_method(self.type_hash, &method.name, &method.param_hashes());
        method.implementation = method.implementation.with_id(id);
        Arc::new(method)
    }

    // === Queries ===

    /// The type as seen from its own members: the named type, or for a
    /// generic definition the definition applied to its own parameters.
    pub fn self_type(&self) -> HostType {
        if self.generic_params.is_empty() {
            HostType::Named(self.type_hash)
        } else {
            let args = (0..self.generic_params.len())
                .map(|i| HostType::TypeParam(i as u16))
                .collect();
            HostType::Generic {
                definition: self.type_hash,
                args,
            }
        }
    }

    pub fn is_generic_definition(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn is_value_type(&self) -> bool {
        self.kind.is_value_type()
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn is_delegate(&self) -> bool {
        self.kind == TypeKind::Delegate
    }

    pub fn hides_inherited_members(&self) -> bool {
        self.flags.contains(TypeFlags::HIDE_INHERITED_MEMBERS)
    }

    /// Declared members named `name`.
    pub fn members_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MemberEntry>> + 'a {
        self.members.iter().filter(move |m| m.name == name)
    }

    /// The `Invoke` method of a delegate type.
    pub fn invoke_method(&self) -> Option<&Arc<MethodEntry>> {
        if !self.is_delegate() {
            return None;
        }
        self.members_named("Invoke").find_map(|m| m.as_method())
    }

    /// Whether this is the root `Object` type.
    pub fn is_object(&self) -> bool {
        self.type_hash == primitives::OBJECT
    }
}
