//! Type relations: display names, base chains and assignability.

use std::sync::Arc;

use hostbridge_core::{HostType, HostValue, MethodEntry, Variance};

use crate::TypeRegistry;

impl TypeRegistry {
    // ==========================================================================
    // Names
    // ==========================================================================

    /// Display name of `ty`, e.g. `Demo.List[Int32]`, `Int32[,]`.
    pub fn type_name(&self, ty: &HostType) -> String {
        self.format_type(ty, true)
    }

    /// Short display name of `ty`, using the last name segment of each
    /// named type.
    pub fn short_type_name(&self, ty: &HostType) -> String {
        self.format_type(ty, false)
    }

    /// Display name of the runtime type of `value`, or `null`.
    pub fn value_type_name(&self, value: &HostValue) -> String {
        match value.type_of() {
            Some(ty) => self.type_name(&ty),
            None => "null".to_string(),
        }
    }

    fn format_type(&self, ty: &HostType, full: bool) -> String {
        let named = |hash| match self.get(hash) {
            Some(entry) if full => entry.full_name.clone(),
            Some(entry) => entry.name.clone(),
            None => hash.to_string(),
        };
        match ty {
            HostType::Named(hash) => named(*hash),
            HostType::Array { element, rank } => {
                let commas = ",".repeat(usize::from(*rank).saturating_sub(1));
                format!("{}[{commas}]", self.format_type(element, full))
            }
            HostType::Generic { definition, args } => {
                let args: Vec<String> = args.iter().map(|arg| self.format_type(arg, full)).collect();
                format!("{}[{}]", named(*definition), args.join(","))
            }
            HostType::Nullable(inner) => format!("Nullable[{}]", self.format_type(inner, full)),
            HostType::TypeParam(i) => format!("!{i}"),
            HostType::MethodParam(i) => format!("!!{i}"),
        }
    }

    // ==========================================================================
    // Classification
    // ==========================================================================

    /// Whether values of `ty` are copied rather than shared.
    pub fn is_value_type(&self, ty: &HostType) -> bool {
        match ty {
            HostType::Nullable(_) => true,
            HostType::Named(_) | HostType::Generic { .. } => {
                self.entry_of(ty).is_some_and(|entry| entry.is_value_type())
            }
            HostType::Array { .. } | HostType::TypeParam(_) | HostType::MethodParam(_) => false,
        }
    }

    /// Whether `ty` is a known reference type.
    pub fn is_reference_type(&self, ty: &HostType) -> bool {
        match ty {
            HostType::Array { .. } => true,
            HostType::Named(_) | HostType::Generic { .. } => {
                !ty.is_void() && self.entry_of(ty).is_some_and(|entry| !entry.is_value_type())
            }
            HostType::Nullable(_) | HostType::TypeParam(_) | HostType::MethodParam(_) => false,
        }
    }

    pub fn is_interface(&self, ty: &HostType) -> bool {
        !ty.is_array() && self.entry_of(ty).is_some_and(|entry| entry.is_interface())
    }

    pub fn is_delegate(&self, ty: &HostType) -> bool {
        !ty.is_array() && self.entry_of(ty).is_some_and(|entry| entry.is_delegate())
    }

    /// Whether `ty` names an unconstructed generic type definition.
    pub fn is_generic_definition(&self, ty: &HostType) -> bool {
        matches!(ty, HostType::Named(_)) && self.entry_of(ty).is_some_and(|entry| entry.is_generic_definition())
    }

    // ==========================================================================
    // Inheritance
    // ==========================================================================

    /// Direct base type of `ty`.
    pub fn base_of(&self, ty: &HostType) -> Option<HostType> {
        match ty {
            HostType::Array { .. } => Some(HostType::ARRAY),
            HostType::Nullable(_) => Some(HostType::VALUE_TYPE),
            HostType::Named(_) => self.entry_of(ty)?.base.clone(),
            HostType::Generic { args, .. } => {
                let base = self.entry_of(ty)?.base.as_ref()?;
                Some(base.substitute_type_params(args))
            }
            HostType::TypeParam(_) | HostType::MethodParam(_) => None,
        }
    }

    /// Interfaces declared directly by `ty`.
    pub fn interfaces_of(&self, ty: &HostType) -> Vec<HostType> {
        let Some(entry) = self.entry_of(ty) else {
            return Vec::new();
        };
        match ty {
            HostType::Array { .. } | HostType::Nullable(_) => Vec::new(),
            HostType::Generic { args, .. } => entry
                .interfaces
                .iter()
                .map(|iface| iface.substitute_type_params(args))
                .collect(),
            _ => entry.interfaces.clone(),
        }
    }

    /// `ty` followed by its base types, most derived first.
    pub fn base_chain(&self, ty: &HostType) -> Vec<HostType> {
        let mut chain = vec![ty.clone()];
        let mut current = self.base_of(ty);
        while let Some(base) = current {
            current = self.base_of(&base);
            chain.push(base);
        }
        chain
    }

    /// Whether `derived` strictly derives from `base`.
    ///
    /// Every type other than `Object` itself derives from `Object`, including
    /// interfaces.
    pub fn is_subclass_of(&self, derived: &HostType, base: &HostType) -> bool {
        if derived == base {
            return false;
        }
        if *base == HostType::OBJECT {
            return true;
        }
        let mut current = self.base_of(derived);
        while let Some(ty) = current {
            if ty == *base {
                return true;
            }
            current = self.base_of(&ty);
        }
        false
    }

    // ==========================================================================
    // Assignability
    // ==========================================================================

    /// Whether a value of type `source` can be stored in a location of type
    /// `target` without conversion.
    ///
    /// Covers identity, base chains, interface implementation, array
    /// covariance over reference elements, generic variance, boxing to
    /// `Object`/`ValueType` and `T` into `Nullable[T]`.
    pub fn is_assignable_from(&self, target: &HostType, source: &HostType) -> bool {
        if target == source {
            return true;
        }
        if target.is_void() || source.is_void() {
            return false;
        }
        if *target == HostType::OBJECT {
            return true;
        }
        if let HostType::Nullable(inner) = target {
            return **inner == *source;
        }
        if let (
            HostType::Array { element: target_element, rank: target_rank },
            HostType::Array { element: source_element, rank: source_rank },
        ) = (target, source)
        {
            return target_rank == source_rank
                && self.is_reference_type(source_element)
                && self.is_reference_type(target_element)
                && self.is_assignable_from(target_element, source_element);
        }

        let chain = self.base_chain(source);
        if chain.iter().any(|ty| self.variant_matches(target, ty)) {
            return true;
        }
        self.is_interface(target) && chain.iter().any(|ty| self.implements(ty, target))
    }

    /// Whether `value` is an instance of `ty`. Null is an instance of nothing.
    pub fn is_instance_of(&self, value: &HostValue, ty: &HostType) -> bool {
        value
            .type_of()
            .is_some_and(|value_type| self.is_assignable_from(ty, &value_type))
    }

    fn implements(&self, ty: &HostType, interface: &HostType) -> bool {
        self.interfaces_of(ty)
            .iter()
            .any(|declared| self.variant_matches(interface, declared) || self.implements(declared, interface))
    }

    /// Identity, or the same generic definition with every type argument
    /// related as its parameter's variance allows.
    fn variant_matches(&self, target: &HostType, candidate: &HostType) -> bool {
        if target == candidate {
            return true;
        }
        let (
            HostType::Generic { definition: target_def, args: target_args },
            HostType::Generic { definition: candidate_def, args: candidate_args },
        ) = (target, candidate)
        else {
            return false;
        };
        if target_def != candidate_def || target_args.len() != candidate_args.len() {
            return false;
        }
        let Some(entry) = self.get(*target_def) else {
            return false;
        };
        target_args
            .iter()
            .zip(candidate_args)
            .zip(&entry.generic_params)
            .all(|((t, c), param)| match param.variance {
                Variance::Invariant => t == c,
                Variance::Covariant => self.is_reference_type(c) && self.is_assignable_from(t, c),
                Variance::Contravariant => self.is_reference_type(t) && self.is_assignable_from(c, t),
            })
    }

    // ==========================================================================
    // Delegates
    // ==========================================================================

    /// The `Invoke` method of delegate type `ty`, substituted for
    /// constructed generic delegates.
    pub fn delegate_invoke(&self, ty: &HostType) -> Option<Arc<MethodEntry>> {
        if !self.is_delegate(ty) {
            return None;
        }
        self.declared_members(ty)
            .iter()
            .filter(|member| member.name == "Invoke")
            .find_map(|member| member.as_method().cloned())
    }
}
