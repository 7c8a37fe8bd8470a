//! Member lookup by name.
//!
//! A lookup walks the inheritance chain collecting same-named members of
//! the requested context, filters them through [`MemberBindingHints`],
//! drops members hidden by more-derived declarations and classifies what
//! is left:
//!
//! ```text
//! collect ──► hint filter ──► remove_hidden ──┬─ none            → MissingMember
//!                                             ├─ all callable    → Lookup::Partial
//!                                             ├─ none callable   → Lookup::Members
//!                                             └─ mixed           → AmbiguousMatch
//! ```
//!
//! Hiding between callables with identical signatures is left to the
//! binder, which prefers the more-derived declaration.

use std::sync::Arc;

use hostbridge_core::{BridgeError, HostType, MemberEntry, MemberKind};

use crate::TypeRegistry;

/// Which accessor a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess {
    /// Reading: every member kind takes part.
    Get,
    /// Writing: only fields and properties take part.
    Set,
}

impl MemberAccess {
    fn includes(self, member: &MemberEntry) -> bool {
        match self {
            MemberAccess::Get => true,
            MemberAccess::Set => matches!(member.kind, MemberKind::Field(_) | MemberKind::Property(_)),
        }
    }

    /// Members that resolve to a partial target under this access.
    fn is_partial(self, member: &MemberEntry) -> bool {
        match self {
            MemberAccess::Get => member.is_callable_like(),
            MemberAccess::Set => member.as_property().is_some_and(|p| p.is_indexed()),
        }
    }
}

/// Member-level binding hints attached to an object or static context.
///
/// By default members flagged `SPECIAL_NAME` (property and event accessors,
/// operators) are invisible. A hint can require them or lift the
/// restriction. A generic type definition's static context can also be
/// given type arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBindingHints {
    /// `Some(flag)`: a member's `SPECIAL_NAME` flag must equal `flag`.
    special_name: Option<bool>,
    type_args: Vec<HostType>,
}

impl Default for MemberBindingHints {
    fn default() -> Self {
        Self {
            special_name: Some(false),
            type_args: Vec::new(),
        }
    }
}

impl MemberBindingHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict on `SPECIAL_NAME`: `Some(true)` requires it, `Some(false)`
    /// excludes it, `None` accepts either.
    pub fn with_special_name(mut self, special_name: Option<bool>) -> Self {
        self.special_name = special_name;
        self
    }

    pub fn with_type_args(mut self, type_args: Vec<HostType>) -> Self {
        self.type_args = type_args;
        self
    }

    pub fn special_name(&self) -> Option<bool> {
        self.special_name
    }

    pub fn type_args(&self) -> &[HostType] {
        &self.type_args
    }

    /// Whether `member` passes the attribute restriction.
    pub fn accepts(&self, member: &MemberEntry) -> bool {
        self.special_name
            .is_none_or(|required| member.is_special_name() == required)
    }
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Callable-like members; the caller wraps them in a partial target.
    Partial(Vec<Arc<MemberEntry>>),
    /// Fields, properties and nested types.
    Members(Vec<Arc<MemberEntry>>),
}

impl Lookup {
    pub fn members(&self) -> &[Arc<MemberEntry>] {
        match self {
            Lookup::Partial(members) | Lookup::Members(members) => members,
        }
    }
}

impl TypeRegistry {
    /// Look up the members named `name` on `ty`.
    ///
    /// `is_static` selects static context (static members and nested types)
    /// over instance context (instance members).
    pub fn find_members(
        &self,
        ty: &HostType,
        name: &str,
        is_static: bool,
        access: MemberAccess,
        hints: &MemberBindingHints,
    ) -> Result<Lookup, BridgeError> {
        let collected = self.collect_members(ty, name, is_static, access);
        let members = remove_hidden(self, collected.into_iter().filter(|m| hints.accepts(m)));

        tracing::trace!(
            type_name = %self.type_name(ty),
            name,
            is_static,
            found = members.len(),
            "member lookup"
        );

        if members.is_empty() {
            return Err(BridgeError::missing_member(name, self.type_name(ty)));
        }

        let partial = members.iter().filter(|m| access.is_partial(m)).count();
        if partial == 0 {
            return Ok(Lookup::Members(members));
        }
        if partial != members.len() {
            return Err(BridgeError::ambiguous_member(name, self.type_name(ty)));
        }
        Ok(Lookup::Partial(members))
    }

    /// Same-named members of `ty` and its bases, most derived first.
    ///
    /// A type that hides inherited members contributes only its own.
    pub fn collect_members(
        &self,
        ty: &HostType,
        name: &str,
        is_static: bool,
        access: MemberAccess,
    ) -> Vec<Arc<MemberEntry>> {
        let start = match ty {
            HostType::Array { .. } => HostType::ARRAY,
            HostType::Nullable(inner) => (**inner).clone(),
            other => other.clone(),
        };
        let declared_only = self
            .entry_of(&start)
            .is_some_and(|entry| entry.hides_inherited_members());

        let mut found = Vec::new();
        let mut current = Some(start);
        while let Some(ty) = current {
            found.extend(
                self.declared_members(&ty)
                    .iter()
                    .filter(|m| m.name == name && m.is_static() == is_static && access.includes(m))
                    .cloned(),
            );
            if declared_only {
                break;
            }
            current = self.base_of(&ty);
        }
        found
    }

    /// Static `SPECIAL_NAME` methods named `name` on `ty` and its bases.
    ///
    /// Operator candidates are gathered this way from both operand types.
    pub fn operator_methods(&self, ty: &HostType, name: &str) -> Vec<Arc<MemberEntry>> {
        self.collect_members(ty, name, true, MemberAccess::Get)
            .into_iter()
            .filter(|m| matches!(m.kind, MemberKind::Method(_)) && m.is_special_name())
            .collect()
    }
}

/// Drop members hidden by more-derived declarations.
///
/// A non-callable hides every same-named member of its base types. A
/// callable hides base non-callables; it hides base callables only when it
/// hides by name. Input order does not matter. The result lists the
/// surviving non-callables first, then the callables.
pub fn remove_hidden(
    registry: &TypeRegistry,
    members: impl IntoIterator<Item = Arc<MemberEntry>>,
) -> Vec<Arc<MemberEntry>> {
    let derives = |derived: &HostType, base: &HostType| registry.is_subclass_of(derived, base);

    let mut most_derived_non_callable = HostType::OBJECT;
    let mut most_derived_callable = HostType::OBJECT;
    let mut non_callables: Vec<Arc<MemberEntry>> = Vec::new();
    let mut callables: Vec<Arc<MemberEntry>> = Vec::new();

    for member in members {
        let declaring = member.declaring_type.clone();
        let mut add = true;

        if member.is_callable() {
            if derives(&declaring, &most_derived_non_callable) {
                non_callables.clear();
            } else if declaring != most_derived_non_callable {
                // hidden by a non-callable in a derived type
                add = false;
            }

            if derives(&declaring, &most_derived_callable) {
                if member.hides_by_name() {
                    callables.clear();
                }
                most_derived_callable = declaring;
            } else {
                if member.hides_by_name() {
                    callables.retain(|c| !derives(&declaring, &c.declaring_type));
                }
                if add
                    && callables
                        .iter()
                        .any(|c| c.hides_by_name() && derives(&c.declaring_type, &declaring))
                {
                    // hidden by a hide-by-name callable in a derived type
                    add = false;
                }
            }

            if add {
                callables.push(member);
            }
        } else {
            if derives(&declaring, &most_derived_non_callable) {
                non_callables.clear();
                most_derived_non_callable = declaring.clone();
            } else if declaring != most_derived_non_callable {
                add = false;
            }

            if derives(&declaring, &most_derived_callable) {
                callables.clear();
            } else {
                callables.retain(|c| !derives(&declaring, &c.declaring_type));
                if add && declaring != most_derived_callable {
                    // hidden by a callable in a derived type
                    add = false;
                }
            }

            if add {
                non_callables.push(member);
            }
        }
    }

    non_callables.extend(callables);
    non_callables
}

#[cfg(test)]
mod tests {
    use hostbridge_core::{
        CallContext, EventEntry, FieldEntry, MethodEntry, ParamEntry, PropertyEntry, TypeEntry,
    };

    use super::*;

    fn noop(_: &mut CallContext) -> Result<(), BridgeError> {
        Ok(())
    }

    fn method(name: &str, param: HostType) -> MethodEntry {
        MethodEntry::new(name, noop).with_param(ParamEntry::new("value", param))
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry
            .register_all([
                TypeEntry::class("Demo.Base")
                    .with_method(method("Run", HostType::INT32))
                    .with_method(method("Stop", HostType::INT32))
                    .with_field("Label", FieldEntry::new(HostType::STRING, noop))
                    .with_method(method("Label", HostType::INT32))
                    .with_field("Count", FieldEntry::new(HostType::INT32, noop))
                    .with_method(method("Create", HostType::INT32).as_static())
                    .with_nested_type("Options", HostType::named("Demo.Base+Options")),
                TypeEntry::class("Demo.Derived")
                    .with_base(HostType::named("Demo.Base"))
                    .with_method(method("Run", HostType::DOUBLE))
                    .with_method(method("Stop", HostType::DOUBLE).hide_by_name())
                    .with_method(method("Count", HostType::INT32))
                    .with_property(
                        "Size",
                        PropertyEntry::new(HostType::INT32).with_getter(noop).with_setter(noop),
                    )
                    .with_property(
                        "Item",
                        PropertyEntry::new(HostType::INT32)
                            .with_index_param(ParamEntry::new("index", HostType::INT32))
                            .with_getter(noop),
                    )
                    .with_event("Changed", EventEntry::new(HostType::DELEGATE).with_add(noop)),
                TypeEntry::class("Demo.Sealed")
                    .with_base(HostType::named("Demo.Derived"))
                    .hide_inherited_members()
                    .with_method(method("Run", HostType::STRING)),
            ])
            .unwrap();
        registry
    }

    fn lookup(registry: &TypeRegistry, ty: &str, name: &str, is_static: bool) -> Result<Lookup, BridgeError> {
        registry.find_members(
            &HostType::named(ty),
            name,
            is_static,
            MemberAccess::Get,
            &MemberBindingHints::default(),
        )
    }

    fn declaring_names(registry: &TypeRegistry, lookup: &Lookup) -> Vec<String> {
        lookup
            .members()
            .iter()
            .map(|m| registry.type_name(&m.declaring_type))
            .collect()
    }

    #[test]
    fn overloads_across_hierarchy_survive() {
        let registry = registry();
        let found = lookup(&registry, "Demo.Derived", "Run", false).unwrap();
        assert!(matches!(found, Lookup::Partial(_)));
        assert_eq!(declaring_names(&registry, &found), ["Demo.Derived", "Demo.Base"]);
    }

    #[test]
    fn hide_by_name_hides_base_callables() {
        let registry = registry();
        let found = lookup(&registry, "Demo.Derived", "Stop", false).unwrap();
        assert_eq!(declaring_names(&registry, &found), ["Demo.Derived"]);
    }

    #[test]
    fn derived_callable_hides_base_field() {
        let registry = registry();
        let found = lookup(&registry, "Demo.Derived", "Count", false).unwrap();
        assert!(matches!(found, Lookup::Partial(_)));
        assert_eq!(found.members().len(), 1);
        assert!(found.members()[0].is_callable());
    }

    #[test]
    fn hiding_is_order_independent() {
        let registry = registry();
        let members = registry.collect_members(&HostType::named("Demo.Derived"), "Count", false, MemberAccess::Get);
        let reversed = remove_hidden(&registry, members.into_iter().rev());
        assert_eq!(reversed.len(), 1);
        assert!(reversed[0].is_callable());
    }

    #[test]
    fn mixed_members_are_ambiguous() {
        let registry = registry();
        let error = lookup(&registry, "Demo.Base", "Label", false).unwrap_err();
        assert_eq!(
            error.to_string(),
            "'Label' designates ambiguous members of type 'Demo.Base'"
        );
    }

    #[test]
    fn missing_member() {
        let registry = registry();
        let error = lookup(&registry, "Demo.Derived", "Nope", false).unwrap_err();
        assert!(matches!(error, BridgeError::MissingMember(_)));
        assert_eq!(error.to_string(), "'Nope' is not a member of type 'Demo.Derived'");
    }

    #[test]
    fn static_context_sees_statics_and_nested_types() {
        let registry = registry();
        assert!(lookup(&registry, "Demo.Base", "Create", false).is_err());
        assert!(matches!(
            lookup(&registry, "Demo.Base", "Create", true),
            Ok(Lookup::Partial(_))
        ));

        let nested = lookup(&registry, "Demo.Derived", "Options", true).unwrap();
        assert!(matches!(nested, Lookup::Members(ref m) if matches!(m[0].kind, MemberKind::NestedType(_))));
        assert!(lookup(&registry, "Demo.Derived", "Options", false).is_err());
    }

    #[test]
    fn special_names_need_a_hint() {
        let registry = registry();
        assert!(lookup(&registry, "Demo.Derived", "get_Size", false).is_err());

        let hints = MemberBindingHints::new().with_special_name(Some(true));
        let found = registry
            .find_members(&HostType::named("Demo.Derived"), "get_Size", false, MemberAccess::Get, &hints)
            .unwrap();
        assert!(matches!(found, Lookup::Partial(_)));

        let hints = MemberBindingHints::new().with_special_name(Some(true));
        assert!(
            registry
                .find_members(&HostType::named("Demo.Derived"), "Size", false, MemberAccess::Get, &hints)
                .is_err()
        );
    }

    #[test]
    fn indexed_properties_and_events_are_partial() {
        let registry = registry();
        assert!(matches!(
            lookup(&registry, "Demo.Derived", "Item", false),
            Ok(Lookup::Partial(_))
        ));
        assert!(matches!(
            lookup(&registry, "Demo.Derived", "Changed", false),
            Ok(Lookup::Partial(_))
        ));
        assert!(matches!(
            lookup(&registry, "Demo.Derived", "Size", false),
            Ok(Lookup::Members(_))
        ));
    }

    #[test]
    fn set_access_sees_only_fields_and_properties() {
        let registry = registry();
        let derived = HostType::named("Demo.Derived");
        let hints = MemberBindingHints::default();

        let item = registry
            .find_members(&derived, "Item", false, MemberAccess::Set, &hints)
            .unwrap();
        assert!(matches!(item, Lookup::Partial(_)));

        assert!(
            registry
                .find_members(&derived, "Run", false, MemberAccess::Set, &hints)
                .is_err()
        );
    }

    #[test]
    fn hide_inherited_members_stops_the_walk() {
        let registry = registry();
        let found = lookup(&registry, "Demo.Sealed", "Run", false).unwrap();
        assert_eq!(declaring_names(&registry, &found), ["Demo.Sealed"]);
        assert!(lookup(&registry, "Demo.Sealed", "Stop", false).is_err());
    }

    #[test]
    fn array_members_come_from_array() {
        let registry = registry();
        let found = registry
            .find_members(
                &HostType::array_of(HostType::INT32),
                "Length",
                false,
                MemberAccess::Get,
                &MemberBindingHints::default(),
            )
            .unwrap();
        assert_eq!(found.members().len(), 1);
    }

    #[test]
    fn operator_methods_are_static_special() {
        let registry = registry();
        assert_eq!(registry.operator_methods(&HostType::INT64_BOX, "op_Addition").len(), 3);
        assert!(registry.operator_methods(&HostType::named("Demo.Base"), "op_Addition").is_empty());
    }
}
