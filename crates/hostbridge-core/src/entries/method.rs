//! Callable member entries.
//!
//! A [`MethodEntry`] describes one overload: its parameters, return type,
//! method-level generic parameters and the native implementation. Property
//! and event accessors, constructors and delegate `Invoke` methods are all
//! method entries too.

use crate::{
    BridgeError, CallContext, HostType, HostValue, MemberFlags, NativeFn, RefModifier, TypeHash,
};

/// A formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub name: String,
    /// Declared type. For a param array this is the array type.
    pub data_type: HostType,
    pub ref_modifier: RefModifier,
    /// Default value of an optional parameter.
    pub default: Option<HostValue>,
    /// Trailing variable-argument array.
    pub is_params: bool,
}

impl ParamEntry {
    /// Create a by-value, required parameter.
    pub fn new(name: impl Into<String>, data_type: HostType) -> Self {
        Self {
            name: name.into(),
            data_type,
            ref_modifier: RefModifier::None,
            default: None,
            is_params: false,
        }
    }

    /// Create a param array of `element`.
    pub fn params(name: impl Into<String>, element: HostType) -> Self {
        Self {
            is_params: true,
            ..Self::new(name, HostType::array_of(element))
        }
    }

    /// Pass by reference.
    pub fn by_ref(mut self) -> Self {
        self.ref_modifier = RefModifier::Ref;
        self
    }

    /// Output parameter.
    pub fn out(mut self) -> Self {
        self.ref_modifier = RefModifier::Out;
        self
    }

    /// Make optional with `default`.
    pub fn optional(mut self, default: impl Into<HostValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }

    pub fn is_by_ref(&self) -> bool {
        self.ref_modifier != RefModifier::None
    }

    pub fn is_out(&self) -> bool {
        self.ref_modifier == RefModifier::Out
    }

    /// Element type of a param array.
    pub fn params_element(&self) -> Option<&HostType> {
        if self.is_params {
            self.data_type.element_type()
        } else {
            None
        }
    }
}

/// One callable overload.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    /// Declaring type; set when the entry is added to a type.
    pub declaring_type: HostType,
    pub params: Vec<ParamEntry>,
    pub return_type: HostType,
    /// Names of method-level generic parameters, referenced as
    /// [`HostType::MethodParam`] by position.
    pub generic_params: Vec<String>,
    /// Method type arguments of a constructed generic method.
    pub type_args: Vec<HostType>,
    pub flags: MemberFlags,
    pub implementation: NativeFn,
}

impl MethodEntry {
    /// Create a method returning void with no parameters.
    pub fn new<F>(name: impl Into<String>, implementation: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), BridgeError> + Send + Sync + 'static,
    {
        Self::from_native(name, NativeFn::from_fn(implementation))
    }

    /// Create a method over an existing native implementation.
    pub fn from_native(name: impl Into<String>, implementation: NativeFn) -> Self {
        Self {
            name: name.into(),
            declaring_type: HostType::OBJECT,
            params: Vec::new(),
            return_type: HostType::VOID,
            generic_params: Vec::new(),
            type_args: Vec::new(),
            flags: MemberFlags::empty(),
            implementation,
        }
    }

    // === Builder Methods ===

    pub fn with_param(mut self, param: ParamEntry) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = ParamEntry>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn returns(mut self, return_type: HostType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Declare method-level generic parameters.
    pub fn with_generic_params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.generic_params.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark as a static member.
    pub fn as_static(self) -> Self {
        self.with_flags(MemberFlags::STATIC)
    }

    /// Mark as hiding inherited callables by name.
    pub fn hide_by_name(self) -> Self {
        self.with_flags(MemberFlags::HIDE_BY_NAME)
    }

    // === Queries ===

    pub fn id(&self) -> TypeHash {
        self.implementation.id
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    pub fn is_special_name(&self) -> bool {
        self.flags.contains(MemberFlags::SPECIAL_NAME)
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn returns_void(&self) -> bool {
        self.return_type.is_void()
    }

    /// Element type of a trailing param array.
    pub fn params_array_element(&self) -> Option<&HostType> {
        self.params.last().and_then(ParamEntry::params_element)
    }

    /// Number of parameters that must be supplied in normal form.
    pub fn required_count(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !p.is_optional() && !p.is_params)
            .count()
    }

    /// Number of by-ref and out parameters.
    pub fn by_ref_count(&self) -> usize {
        self.params.iter().filter(|p| p.is_by_ref()).count()
    }

    /// Structural hashes of the parameter types.
    pub fn param_hashes(&self) -> Vec<TypeHash> {
        self.params.iter().map(|p| p.data_type.hash_key()).collect()
    }

    /// Whether both methods declare the same parameter list.
    pub fn same_signature(&self, other: &MethodEntry) -> bool {
        self.generic_params.len() == other.generic_params.len()
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.data_type == b.data_type && a.ref_modifier == b.ref_modifier)
    }

    /// Construct a generic method over `type_args`.
    ///
    /// Returns `None` when the entry is not a generic definition or the
    /// argument count differs.
    pub fn instantiate(&self, type_args: &[HostType]) -> Option<MethodEntry> {
        if !self.is_generic() || type_args.len() != self.generic_params.len() {
            return None;
        }
        let mut method = self.clone();
        for param in &mut method.params {
            param.data_type = param.data_type.substitute_method_params(type_args);
        }
        method.return_type = method.return_type.substitute_method_params(type_args);
        method.generic_params.clear();
        method.type_args = type_args.to_vec();
        Some(method)
    }

    /// Whether this was constructed from a generic definition.
    pub fn is_constructed_generic(&self) -> bool {
        !self.type_args.is_empty()
    }

    /// Copy of this entry with the declaring type's generic parameters
    /// replaced by `type_args`, declared on `constructed`.
    pub fn substitute_type_params(&self, constructed: &HostType, type_args: &[HostType]) -> MethodEntry {
        let mut method = self.clone();
        method.declaring_type = constructed.clone();
        for param in &mut method.params {
            param.data_type = param.data_type.substitute_type_params(type_args);
        }
        method.return_type = method.return_type.substitute_type_params(type_args);
        method
    }
}
