//! Signature binding hints.
//!
//! A script narrows a method group before calling it by passing a table
//! of parameter types, optionally with explicit method type arguments:
//!
//! ```text
//! obj.Method{'Double', 'Int32'}(1, 2)
//! obj.Convert{_ = {clr.Type('System.String')}}(x)
//! ```
//!
//! The table is parsed by the bridge; this module holds the parsed form
//! and applies it to candidate methods.

use std::sync::Arc;

use hostbridge_core::{HostType, MethodEntry};
use hostbridge_registry::TypeRegistry;

/// One positional parameter hint.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamHint {
    /// Matches a parameter whose type has this full or short name.
    Name(String),
    /// Matches a parameter of exactly this type.
    Type(HostType),
}

impl ParamHint {
    fn matches(&self, registry: &TypeRegistry, param_type: &HostType) -> bool {
        match self {
            ParamHint::Type(ty) => ty == param_type,
            ParamHint::Name(name) => {
                registry.type_name(param_type) == *name || registry.short_type_name(param_type) == *name
            }
        }
    }
}

/// Parameter-type hints plus optional method type arguments.
///
/// Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureBindingHints {
    params: Vec<ParamHint>,
    type_args: Option<Vec<HostType>>,
}

impl SignatureBindingHints {
    pub fn new(params: Vec<ParamHint>, type_args: Option<Vec<HostType>>) -> Self {
        Self { params, type_args }
    }

    pub fn params(&self) -> &[ParamHint] {
        &self.params
    }

    pub fn type_args(&self) -> Option<&[HostType]> {
        self.type_args.as_deref()
    }

    /// The methods of `methods` these hints select.
    ///
    /// With type arguments, only generic definitions of matching arity
    /// remain, constructed over them. With parameter hints, only methods
    /// with exactly as many parameters, each matching its hint, remain.
    pub fn select(&self, registry: &TypeRegistry, methods: &[Arc<MethodEntry>]) -> Vec<Arc<MethodEntry>> {
        let mut selected: Vec<Arc<MethodEntry>> = match &self.type_args {
            Some(type_args) => methods
                .iter()
                .filter_map(|method| method.instantiate(type_args).map(Arc::new))
                .collect(),
            None => methods.to_vec(),
        };

        if !self.params.is_empty() {
            selected.retain(|method| {
                method.params.len() == self.params.len()
                    && self
                        .params
                        .iter()
                        .zip(&method.params)
                        .all(|(hint, param)| hint.matches(registry, &param.data_type))
            });
        }

        tracing::trace!(
            hints = self.params.len(),
            before = methods.len(),
            after = selected.len(),
            "applied signature hints"
        );
        selected
    }
}
