//! Member access, invocation, events and operators on host values.
//!
//! Bridge userdata carry one of two metatables. Objects, static contexts
//! and hinted targets share the object metatable; partial targets (method
//! groups, indexed properties, events) use the partial metatable, which
//! has no operators.
//!
//! ```text
//! obj.Name            __index     field, property or nested type; else a partial
//! obj.Name = v        __newindex  field or property setter
//! obj(...)            __call      delegate Invoke / constructor / hint table
//! obj.f(...)          __call      overload resolution over the group
//! obj.Item[k]         __index     indexed property getter on a partial
//! a + b, a < b, ...   __add, ...  op_Addition, op_LessThan, ...
//! ```
//!
//! Every handler runs under the bridge lock. The same operations are
//! available to host code on [`LockedState`].

use std::sync::{Arc, Weak};

use hostbridge_binder::{BindFailure, BoundMethod};
use hostbridge_core::numeric::ArithOp;
use hostbridge_core::{
    ArrayData, BridgeError, CallContext, EventEntry, HostObject, HostType, HostValue, Int64Box, MemberEntry,
    MemberKind, MethodEntry, UInt64Box,
};
use hostbridge_foreign::{ForeignState, ForeignValue};
use hostbridge_registry::{Lookup, MemberAccess, MemberBindingHints};

use crate::foreign_ref::{ForeignFunction, ForeignRef};
use crate::state::{LockedState, OBJECT_METATABLE, PARTIAL_METATABLE, Shared, native_body};
use crate::targets::{PartialTarget, StaticContext, Target};

type Metamethod = fn(&LockedState<'_>) -> Result<usize, BridgeError>;

const SHARED_METAMETHODS: [(&str, Metamethod); 5] = [
    ("__index", index),
    ("__newindex", new_index),
    ("__call", call),
    ("__tostring", to_string),
    ("__gc", finalize),
];

const OPERATOR_METAMETHODS: [(&str, Metamethod); 9] = [
    ("__unm", unary_minus),
    ("__add", add),
    ("__sub", subtract),
    ("__mul", multiply),
    ("__div", divide),
    ("__mod", modulus),
    ("__eq", equal),
    ("__lt", less_than),
    ("__le", less_equal),
];

pub(crate) fn object_metatable(foreign: &ForeignState, this: &Weak<Shared>) -> ForeignValue {
    let (metatable, _) = foreign.new_metatable(OBJECT_METATABLE);
    install(foreign, this, &metatable, SHARED_METAMETHODS.iter().chain(&OPERATOR_METAMETHODS));
    metatable
}

pub(crate) fn partial_metatable(foreign: &ForeignState, this: &Weak<Shared>) -> ForeignValue {
    let (metatable, _) = foreign.new_metatable(PARTIAL_METATABLE);
    install(foreign, this, &metatable, &SHARED_METAMETHODS);
    metatable
}

fn install<'m>(
    foreign: &ForeignState,
    this: &Weak<Shared>,
    metatable: &ForeignValue,
    methods: impl IntoIterator<Item = &'m (&'static str, Metamethod)>,
) {
    for &(event, method) in methods {
        let function = foreign.new_closure(Some(event), Vec::new(), native_body(this, method));
        if let Err(error) = foreign.raw_set(metatable, ForeignValue::from(event), function) {
            tracing::error!(event, %error, "failed to install metamethod");
        }
    }
}

// ============================================================================
// Metamethods
// ============================================================================

/// Argument 1 of a metamethod: the bridge userdata, not unboxed.
fn target_arg(state: &LockedState<'_>) -> Result<HostValue, BridgeError> {
    let value = state.foreign().get(1);
    match state.host_object(&value)? {
        Some(object) => Ok(HostValue::Object(object)),
        None => Err(BridgeError::Target(format!(
            "Value of type '{}' is not a host object",
            value.type_name()
        ))),
    }
}

fn arg(state: &LockedState<'_>, index: i32) -> Result<HostValue, BridgeError> {
    state.to_host(&state.foreign().get(index))
}

fn replace_results(state: &LockedState<'_>, results: &[HostValue]) -> Result<usize, BridgeError> {
    state.foreign().set_top(0);
    state.push_results(results)
}

fn index(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let target = target_arg(state)?;
    let key = arg(state, 2)?;
    let value = state.index(&target, &key)?;
    replace_results(state, &[value])
}

fn new_index(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let target = target_arg(state)?;
    let key = arg(state, 2)?;
    let value = arg(state, 3)?;
    state.new_index(&target, &key, value)?;
    state.foreign().set_top(0);
    Ok(0)
}

fn call(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let target = target_arg(state)?;
    let args = state
        .foreign()
        .frame_values()
        .iter()
        .skip(1)
        .map(|value| state.to_host(value))
        .collect::<Result<Vec<_>, _>>()?;
    let results = state.call(&target, args)?;
    replace_results(state, &results)
}

fn to_string(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let target = target_arg(state)?;
    let text = state.display(&target)?;
    replace_results(state, &[HostValue::from(text)])
}

fn finalize(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let userdata = state.foreign().get(1);
    if let Some(handle) = state.foreign().userdata_id(&userdata) {
        let released = state.identity().unregister(handle);
        drop(released);
    }
    Ok(0)
}

fn operands(state: &LockedState<'_>) -> Result<(HostValue, HostValue), BridgeError> {
    Ok((arg(state, 1)?, arg(state, 2)?))
}

macro_rules! arithmetic_metamethods {
    ($($name:ident => $op:expr),* $(,)?) => {
        $(
            fn $name(state: &LockedState<'_>) -> Result<usize, BridgeError> {
                let (lhs, rhs) = operands(state)?;
                let result = state.arithmetic($op, lhs, rhs)?;
                replace_results(state, &[result])
            }
        )*
    };
}

arithmetic_metamethods! {
    add => ArithOp::Add,
    subtract => ArithOp::Sub,
    multiply => ArithOp::Mul,
    divide => ArithOp::Div,
    modulus => ArithOp::Rem,
}

fn unary_minus(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let operand = arg(state, 1)?;
    let result = state.negate(operand)?;
    replace_results(state, &[result])
}

fn equal(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let (lhs, rhs) = operands(state)?;
    let result = state.equals(lhs, rhs)?;
    replace_results(state, &[HostValue::Bool(result)])
}

fn less_than(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let (lhs, rhs) = operands(state)?;
    let result = state.less_than(lhs, rhs)?;
    replace_results(state, &[HostValue::Bool(result)])
}

fn less_equal(state: &LockedState<'_>) -> Result<usize, BridgeError> {
    let (lhs, rhs) = operands(state)?;
    let result = state.less_equal(lhs, rhs)?;
    replace_results(state, &[HostValue::Bool(result)])
}

fn operator_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "op_Addition",
        ArithOp::Sub => "op_Subtraction",
        ArithOp::Mul => "op_Multiply",
        ArithOp::Div => "op_Division",
        ArithOp::Rem => "op_Modulus",
    }
}

/// Exact integral value of a foreign index.
fn integral(number: f64) -> Option<i64> {
    (number.fract() == 0.0 && number >= i64::MIN as f64 && number < i64::MAX as f64).then_some(number as i64)
}

fn is_primitive(value: &HostValue) -> bool {
    value.type_of().is_some_and(|ty| ty.primitive_kind().is_some())
}

// ============================================================================
// Host-side operations
// ============================================================================

impl LockedState<'_> {
    /// `target[key]`: a member by name, an array element, or an indexed
    /// property through a partial target.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn index(&self, target: &HostValue, key: &HostValue) -> Result<HostValue, BridgeError> {
        if let Some(partial) = PartialTarget::of(target) {
            return self.partial_index(&partial, key);
        }
        let resolved = self.resolve(target)?;
        if let HostValue::String(name) = key {
            return self.get_member(&resolved, name);
        }
        if resolved.ty.is_array()
            && let Some(array) = resolved.object()
        {
            let indices = self
                .array_indices(key)?
                .ok_or_else(|| self.invalid_index(key, &resolved.ty))?;
            return array
                .with(|data: &ArrayData| data.get(&indices).cloned())
                .flatten()
                .ok_or_else(|| self.invalid_index(key, &resolved.ty));
        }
        Err(self.not_indexable(key, &resolved.ty))
    }

    /// `target[key] = value`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn new_index(&self, target: &HostValue, key: &HostValue, value: HostValue) -> Result<(), BridgeError> {
        if let Some(partial) = PartialTarget::of(target) {
            return self.partial_new_index(&partial, key, value);
        }
        let resolved = self.resolve(target)?;
        if let HostValue::String(name) = key {
            return self.set_member(&resolved, name, value);
        }
        if resolved.ty.is_array()
            && let Some(array) = resolved.object()
        {
            let indices = self
                .array_indices(key)?
                .ok_or_else(|| self.invalid_index(key, &resolved.ty))?;
            let element = resolved.ty.element_type().cloned().unwrap_or(HostType::OBJECT);
            let source = self.registry().value_type_name(&value);
            let value = self.binder().change_type(value, &element).map_err(|_| {
                BridgeError::InvalidCast(format!(
                    "Element of type '{}' cannot be assigned a value of type '{source}'",
                    self.registry().type_name(&element)
                ))
            })?;
            let stored = array
                .with_mut(|data: &mut ArrayData| data.set(&indices, value))
                .unwrap_or(false);
            return if stored { Ok(()) } else { Err(self.invalid_index(key, &resolved.ty)) };
        }
        Err(self.not_indexable(key, &resolved.ty))
    }

    /// `target(args...)`.
    ///
    /// A single foreign table argument is a binding-hints table: the result
    /// is the hinted target rather than a call.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, target: &HostValue, args: Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> {
        if let Some(partial) = PartialTarget::of(target) {
            return self.partial_call(&partial, args);
        }
        let resolved = self.resolve(target)?;
        if resolved.hints.is_none()
            && let Some(table) = self.single_table(&args)?
        {
            return Ok(vec![self.attach_member_hints(target, &table)?]);
        }

        let registry = self.registry();
        if let Some(this) = &resolved.this {
            if registry.is_delegate(&resolved.ty)
                && let Some(invoke) = registry.delegate_invoke(&resolved.ty)
            {
                return self
                    .binder()
                    .call_method(&resolved.ty, "Invoke", &[invoke], Some(this), &args);
            }
            return Err(BridgeError::Target(format!(
                "Object of type '{}' cannot be called",
                registry.type_name(&resolved.ty)
            )));
        }

        let constructors = registry
            .constructors_of(&resolved.ty)
            .iter()
            .map(|constructor| Arc::new(MemberEntry::constructor(Arc::clone(constructor))))
            .collect();
        let partial = PartialTarget::new(
            registry.short_type_name(&resolved.ty),
            constructors,
            None,
            resolved.ty.clone(),
        );
        self.partial_call(&partial, args)
    }

    /// Subscribe `handler` to an event obtained by indexing.
    ///
    /// A foreign function converts to the same delegate every time, so the
    /// same function can later be removed.
    pub fn add_handler(&self, event: &HostValue, handler: &HostValue) -> Result<(), BridgeError> {
        self.change_handler(event, handler, true)
    }

    /// Unsubscribe `handler` from an event obtained by indexing.
    pub fn remove_handler(&self, event: &HostValue, handler: &HostValue) -> Result<(), BridgeError> {
        self.change_handler(event, handler, false)
    }

    /// `lhs op rhs` through the operand types' operator methods.
    pub fn arithmetic(&self, op: ArithOp, lhs: HostValue, rhs: HostValue) -> Result<HostValue, BridgeError> {
        self.operator(operator_name(op), vec![lhs, rhs])
    }

    /// `-operand` through `op_UnaryNegation`.
    pub fn negate(&self, operand: HostValue) -> Result<HostValue, BridgeError> {
        self.operator("op_UnaryNegation", vec![operand])
    }

    /// `lhs == rhs`.
    ///
    /// The same object is always equal to itself. Otherwise `op_Equality`
    /// decides; reference types without one compare by identity.
    pub fn equals(&self, lhs: HostValue, rhs: HostValue) -> Result<bool, BridgeError> {
        if let (HostValue::Object(a), HostValue::Object(b)) = (&lhs, &rhs)
            && a.ptr_eq(b)
        {
            return Ok(true);
        }
        let value_typed = [&lhs, &rhs]
            .iter()
            .any(|value| value.type_of().is_some_and(|ty| self.registry().is_value_type(&ty)));
        let identical = lhs == rhs;
        match self.operator("op_Equality", vec![lhs, rhs]) {
            Ok(result) => Ok(matches!(result, HostValue::Bool(true))),
            Err(BridgeError::MissingMethod(_)) if !value_typed => Ok(identical),
            Err(error) => Err(error),
        }
    }

    /// `lhs < rhs`, falling back to `rhs > lhs`.
    pub fn less_than(&self, lhs: HostValue, rhs: HostValue) -> Result<bool, BridgeError> {
        self.compare("op_LessThan", "op_GreaterThan", lhs, rhs)
    }

    /// `lhs <= rhs`, falling back to `rhs >= lhs`.
    pub fn less_equal(&self, lhs: HostValue, rhs: HostValue) -> Result<bool, BridgeError> {
        self.compare("op_LessThanOrEqual", "op_GreaterThanOrEqual", lhs, rhs)
    }

    /// Text of a value as `tostring` shows it.
    pub fn display(&self, value: &HostValue) -> Result<String, BridgeError> {
        if let Some(partial) = PartialTarget::of(value) {
            return Ok(format!(
                "{}.{}",
                self.registry().type_name(&partial.declaring),
                partial.name
            ));
        }
        let Some(target) = Target::of(value) else {
            return Ok("null".to_string());
        };
        if target.is_static() {
            return Ok(self.registry().type_name(&target.ty));
        }
        match value {
            HostValue::String(text) => return Ok(text.to_string()),
            HostValue::Object(_) => {}
            primitive => return Ok(self.describe(primitive)),
        }

        let registry = self.registry();
        let hints = MemberBindingHints::default();
        if let Ok(Lookup::Partial(members)) = registry.find_members(&target.ty, "ToString", false, MemberAccess::Get, &hints) {
            let methods: Vec<Arc<MethodEntry>> = members.iter().filter_map(|m| m.as_method().cloned()).collect();
            if let Ok(bound) = self.binder().bind_to_method(&methods, &[]) {
                let results = self.binder().invoke(bound, target.this.as_ref())?;
                if let Some(HostValue::String(text)) = results.first() {
                    return Ok(text.to_string());
                }
            }
        }
        if let Some(object) = target.object()
            && registry.is_assignable_from(&HostType::EXCEPTION, object.ty())
        {
            return Ok(BridgeError::from_exception_object(object.clone()).to_string());
        }
        Ok(registry.type_name(&target.ty))
    }

    /// Short human-readable form of a value for error messages.
    pub(crate) fn describe(&self, value: &HostValue) -> String {
        match value {
            HostValue::Null => "null".to_string(),
            HostValue::Bool(true) => "True".to_string(),
            HostValue::Bool(false) => "False".to_string(),
            HostValue::String(text) => text.to_string(),
            HostValue::I64(v) => v.to_string(),
            HostValue::U64(v) => v.to_string(),
            HostValue::Object(object) => match StaticContext::type_of(object) {
                Some(ty) => self.registry().type_name(&ty),
                None => self.registry().type_name(object.ty()),
            },
            number => number.as_f64().map(|n| n.to_string()).unwrap_or_default(),
        }
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    fn resolve(&self, target: &HostValue) -> Result<Target, BridgeError> {
        Target::of(target).ok_or_else(|| BridgeError::Target("Attempt to access a member of null".to_string()))
    }

    fn lookup(&self, target: &Target, name: &str, access: MemberAccess) -> Result<Lookup, BridgeError> {
        let default_hints = MemberBindingHints::default();
        let hints = target.hints.as_ref().unwrap_or(&default_hints);
        self.registry()
            .find_members(&target.ty, name, target.is_static(), access, hints)
    }

    fn get_member(&self, target: &Target, name: &str) -> Result<HostValue, BridgeError> {
        let registry = self.registry();
        let members = match self.lookup(target, name, MemberAccess::Get)? {
            Lookup::Partial(members) => {
                let partial = PartialTarget::new(name, members, target.this.clone(), target.ty.clone());
                return Ok(HostValue::Object(partial.into_object()));
            }
            Lookup::Members(members) => members,
        };

        let nested: Vec<&HostType> = members
            .iter()
            .filter_map(|member| match &member.kind {
                MemberKind::NestedType(ty) => Some(ty),
                _ => None,
            })
            .collect();
        match (nested.as_slice(), members.len()) {
            ([], _) => {}
            ([ty], 1) => return Ok(HostValue::Object(StaticContext::new((*ty).clone()).into_object())),
            _ => return Err(BridgeError::ambiguous_member(name, registry.type_name(&target.ty))),
        }

        let bound = self
            .binder()
            .bind_to_field_or_property(MemberAccess::Get, &members, None)
            .map_err(|failure| match failure {
                BindFailure::NoMatch => BridgeError::missing_member(name, registry.type_name(&target.ty)),
                BindFailure::Ambiguous => BridgeError::ambiguous_member(name, registry.type_name(&target.ty)),
                BindFailure::Conversion(error) => error,
            })?;
        self.read_member(&bound.member, target, name)
    }

    fn read_member(&self, member: &MemberEntry, target: &Target, name: &str) -> Result<HostValue, BridgeError> {
        match &member.kind {
            MemberKind::Field(field) => {
                let mut no_args: [HostValue; 0] = [];
                let mut ctx = CallContext::new(target.this.as_ref(), &mut no_args, &[], &member.declaring_type);
                field.getter.call(&mut ctx)?;
                Ok(ctx.take_return())
            }
            MemberKind::Property(property) => {
                let getter = property
                    .getter
                    .as_ref()
                    .ok_or_else(|| self.not_accessible(&target.ty, name, "get"))?;
                let bound = BoundMethod {
                    method: Arc::clone(getter),
                    args: Vec::new(),
                };
                let results = self.binder().invoke(bound, target.this.as_ref())?;
                Ok(results.into_iter().next().unwrap_or_default())
            }
            _ => Err(BridgeError::missing_member(name, self.registry().type_name(&target.ty))),
        }
    }

    fn set_member(&self, target: &Target, name: &str, value: HostValue) -> Result<(), BridgeError> {
        let registry = self.registry();
        let type_name = registry.type_name(&target.ty);
        let members = match self.lookup(target, name, MemberAccess::Set)? {
            Lookup::Partial(_) => {
                return Err(BridgeError::Target(format!(
                    "'{name}' is not an assignable member of type '{type_name}'"
                )));
            }
            Lookup::Members(members) => members,
        };

        if let [member] = members.as_slice()
            && !is_writable(member)
        {
            return Err(self.not_accessible(&target.ty, name, "set"));
        }

        let bound = self
            .binder()
            .bind_to_field_or_property(MemberAccess::Set, &members, Some(&value))
            .map_err(|failure| match failure {
                BindFailure::NoMatch => BridgeError::InvalidCast(format!(
                    "'{type_name}.{name}' cannot be assigned a value of type '{}'",
                    registry.value_type_name(&value)
                )),
                BindFailure::Ambiguous => BridgeError::ambiguous_member(name, &type_name),
                BindFailure::Conversion(error) => error,
            })?;
        let value = bound.value.unwrap_or_default();
        self.write_member(&bound.member, target, name, value)
    }

    fn write_member(&self, member: &MemberEntry, target: &Target, name: &str, value: HostValue) -> Result<(), BridgeError> {
        match &member.kind {
            MemberKind::Field(field) => {
                let setter = field
                    .setter
                    .as_ref()
                    .ok_or_else(|| self.not_accessible(&target.ty, name, "set"))?;
                let mut args = [value];
                let mut ctx = CallContext::new(target.this.as_ref(), &mut args, &[], &member.declaring_type);
                setter.call(&mut ctx)
            }
            MemberKind::Property(property) => {
                let setter = property
                    .setter
                    .as_ref()
                    .ok_or_else(|| self.not_accessible(&target.ty, name, "set"))?;
                let bound = BoundMethod {
                    method: Arc::clone(setter),
                    args: vec![value],
                };
                self.binder().invoke(bound, target.this.as_ref())?;
                Ok(())
            }
            _ => Err(BridgeError::missing_member(name, self.registry().type_name(&target.ty))),
        }
    }

    fn not_accessible(&self, ty: &HostType, name: &str, accessor: &str) -> BridgeError {
        BridgeError::MethodAccess(format!(
            "'{}.{name}' is not {accessor}-accessible",
            self.registry().type_name(ty)
        ))
    }

    // ------------------------------------------------------------------------
    // Partial targets
    // ------------------------------------------------------------------------

    fn partial_call(&self, partial: &PartialTarget, args: Vec<HostValue>) -> Result<Vec<HostValue>, BridgeError> {
        if partial.hints.is_none()
            && let Some(table) = self.single_table(&args)?
        {
            let hints = self.signature_hints(&table)?;
            return Ok(vec![HostValue::Object(partial.with_hints(hints).into_object())]);
        }
        let methods = partial.hinted(self.registry(), partial.methods());
        self.binder()
            .call_method(&partial.declaring, &partial.name, &methods, partial.this.as_ref(), &args)
    }

    fn partial_index(&self, partial: &PartialTarget, key: &HostValue) -> Result<HostValue, BridgeError> {
        let getters: Vec<Arc<MethodEntry>> = partial.properties().filter_map(|p| p.getter.clone()).collect();
        if getters.is_empty() {
            return Err(self.partial_accessor_error(partial, "get"));
        }
        let args = self.index_args(key)?;
        let getters = partial.hinted(self.registry(), getters);
        let results = self.binder().call_method(
            &partial.declaring,
            &format!("get_{}", partial.name),
            &getters,
            partial.this.as_ref(),
            &args,
        )?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    fn partial_new_index(&self, partial: &PartialTarget, key: &HostValue, value: HostValue) -> Result<(), BridgeError> {
        let setters: Vec<Arc<MethodEntry>> = partial.properties().filter_map(|p| p.setter.clone()).collect();
        if setters.is_empty() {
            return Err(self.partial_accessor_error(partial, "set"));
        }
        let mut args = self.index_args(key)?;
        args.push(value);
        let setters = partial.hinted(self.registry(), setters);
        self.binder().call_method(
            &partial.declaring,
            &format!("set_{}", partial.name),
            &setters,
            partial.this.as_ref(),
            &args,
        )?;
        Ok(())
    }

    fn partial_accessor_error(&self, partial: &PartialTarget, accessor: &str) -> BridgeError {
        if partial.properties().next().is_none() {
            BridgeError::Target(format!(
                "'{}.{}' cannot be indexed",
                self.registry().type_name(&partial.declaring),
                partial.name
            ))
        } else {
            self.not_accessible(&partial.declaring, &partial.name, accessor)
        }
    }

    // ------------------------------------------------------------------------
    // Indices and hint tables
    // ------------------------------------------------------------------------

    /// The foreign table behind `args`, when it is a lone table.
    fn single_table(&self, args: &[HostValue]) -> Result<Option<ForeignValue>, BridgeError> {
        match args {
            [HostValue::Object(object)] if *object.ty() == HostType::FOREIGN_TABLE => ForeignRef::value_in(object, self),
            _ => Ok(None),
        }
    }

    /// Values `1..=n` of a foreign table.
    fn table_sequence(&self, table: &ForeignValue) -> Result<Vec<HostValue>, BridgeError> {
        let foreign = self.foreign();
        let len = foreign.raw_len(table).map_err(|e| self.error_from_foreign(e))?;
        (1..=len)
            .map(|i| {
                let value = foreign
                    .raw_get(table, &ForeignValue::number(i as f64))
                    .map_err(|e| self.error_from_foreign(e))?;
                self.to_host(&value)
            })
            .collect()
    }

    /// Arguments of an indexed-property access; a table key spreads into
    /// several index arguments.
    fn index_args(&self, key: &HostValue) -> Result<Vec<HostValue>, BridgeError> {
        match self.single_table(std::slice::from_ref(key))? {
            Some(table) => self.table_sequence(&table),
            None => Ok(vec![key.clone()]),
        }
    }

    /// Zero-based array indices from a number or a table of numbers.
    fn array_indices(&self, key: &HostValue) -> Result<Option<Vec<i64>>, BridgeError> {
        let values = self.index_args(key)?;
        Ok(values
            .iter()
            .map(|value| value.as_f64().and_then(integral))
            .collect())
    }

    fn invalid_index(&self, key: &HostValue, ty: &HostType) -> BridgeError {
        BridgeError::Argument(format!(
            "'{}' is not a valid index for type '{}'",
            self.describe(key),
            self.registry().type_name(ty)
        ))
    }

    fn not_indexable(&self, key: &HostValue, ty: &HostType) -> BridgeError {
        BridgeError::Target(format!(
            "'{}' cannot be used to index into type '{}'",
            self.describe(key),
            self.registry().type_name(ty)
        ))
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    fn change_handler(&self, event: &HostValue, handler: &HostValue, add: bool) -> Result<(), BridgeError> {
        let partial = PartialTarget::of(event).ok_or_else(|| BridgeError::Argument("Must represent an event".to_string()))?;
        let registry = self.registry();
        let (name, type_name) = (&partial.name, registry.type_name(&partial.declaring));
        let events: Vec<&EventEntry> = partial.events().collect();
        let entry = match events.as_slice() {
            [] => {
                return Err(BridgeError::MissingMember(format!(
                    "'{name}' is not an event member of type '{type_name}'"
                )));
            }
            [entry] => *entry,
            _ => return Err(BridgeError::ambiguous_member(name, &type_name)),
        };

        let verb = if add { "add" } else { "remove" };
        if add && entry.add.is_none() {
            return Err(self.not_accessible(&partial.declaring, name, verb));
        }
        let delegate = self.handler_delegate(&entry.handler_type, handler)?;
        if !registry.is_assignable_from(&entry.handler_type, delegate.ty()) {
            return Err(BridgeError::InvalidCast(format!(
                "Delegate of type '{}' cannot handle '{type_name}.{name}'",
                registry.type_name(delegate.ty())
            )));
        }
        let accessor = if add { &entry.add } else { &entry.remove };
        let accessor = accessor
            .as_ref()
            .ok_or_else(|| self.not_accessible(&partial.declaring, name, verb))?;

        tracing::debug!(event = %name, declaring = %type_name, add, "changing event handler");
        let bound = BoundMethod {
            method: Arc::clone(accessor),
            args: vec![HostValue::Object(delegate)],
        };
        self.binder().invoke(bound, partial.this.as_ref())?;
        Ok(())
    }

    fn handler_delegate(&self, handler_type: &HostType, handler: &HostValue) -> Result<HostObject, BridgeError> {
        if let Some(function) = ForeignFunction::from_value(handler) {
            return self.new_delegate(handler_type, &function.into_value());
        }
        if PartialTarget::of(handler).is_some() {
            return self.new_delegate(handler_type, handler);
        }
        match handler {
            HostValue::Object(object) if self.registry().is_delegate(object.ty()) => Ok(object.clone()),
            other => Err(BridgeError::InvalidCast(format!(
                "Value of type '{}' cannot be used as an event handler",
                self.registry().value_type_name(other)
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    /// Operands that are all primitives travel as the integer boxes, whose
    /// operator methods keep 64-bit arithmetic exact.
    fn rewrap(&self, operands: Vec<HostValue>) -> Vec<HostValue> {
        if !operands.iter().all(is_primitive) {
            return operands;
        }
        operands
            .into_iter()
            .map(|value| match value {
                HostValue::I64(v) => HostValue::Object(Int64Box(v).into_object()),
                HostValue::U64(v) => HostValue::Object(UInt64Box(v).into_object()),
                other => other,
            })
            .collect()
    }

    fn operator(&self, name: &str, operands: Vec<HostValue>) -> Result<HostValue, BridgeError> {
        let operands = self.rewrap(operands);
        let registry = self.registry();

        let mut types: Vec<HostType> = Vec::new();
        for ty in operands.iter().filter_map(HostValue::type_of) {
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
        let mut methods: Vec<Arc<MethodEntry>> = Vec::new();
        for method in types
            .iter()
            .flat_map(|ty| registry.operator_methods(ty, name))
            .filter_map(|member| member.as_method().cloned())
        {
            if !methods.iter().any(|known| Arc::ptr_eq(known, &method)) {
                methods.push(method);
            }
        }

        let bound = self
            .binder()
            .bind_to_method(&methods, &operands)
            .map_err(|failure| self.operator_error(failure, name, &operands, &types))?;
        let results = self.binder().invoke(bound, None)?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    fn operator_error(&self, failure: BindFailure, name: &str, operands: &[HostValue], types: &[HostType]) -> BridgeError {
        let registry = self.registry();
        let args = operands
            .iter()
            .map(|value| registry.value_type_name(value))
            .collect::<Vec<_>>()
            .join(", ");
        let names: Vec<String> = types.iter().map(|ty| registry.type_name(ty)).collect();
        let single = names.first().cloned().unwrap_or_else(|| "null".to_string());
        match failure {
            BindFailure::NoMatch => BridgeError::MissingMethod(match names.as_slice() {
                [lhs, rhs] => format!("'{name}({args})' is not a special member of type '{lhs}' or '{rhs}'"),
                _ => format!("'{name}({args})' is not a special member of type '{single}'"),
            }),
            BindFailure::Ambiguous => BridgeError::AmbiguousMatch(match names.as_slice() {
                [lhs, rhs] => {
                    format!("'{name}({args})' designates ambiguous special members of types '{lhs}' and '{rhs}'")
                }
                _ => format!("'{name}({args})' designates ambiguous special members of type '{single}'"),
            }),
            BindFailure::Conversion(error) => error,
        }
    }

    fn compare(&self, less: &str, greater: &str, lhs: HostValue, rhs: HostValue) -> Result<bool, BridgeError> {
        let outcome = match self.operator(less, vec![lhs.clone(), rhs.clone()]) {
            Err(BridgeError::MissingMethod(less_message)) => match self.operator(greater, vec![rhs, lhs]) {
                Err(BridgeError::MissingMethod(greater_message)) => {
                    return Err(BridgeError::MissingMethod(format!("{less_message}; {greater_message}")));
                }
                other => other,
            },
            other => other,
        }?;
        Ok(matches!(outcome, HostValue::Bool(true)))
    }
}

fn is_writable(member: &MemberEntry) -> bool {
    match &member.kind {
        MemberKind::Field(field) => field.setter.is_some(),
        MemberKind::Property(property) => property.setter.is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use hostbridge_core::{FieldEntry, ParamEntry, PropertyEntry, TypeEntry};
    use hostbridge_registry::TypeRegistry;

    use crate::{Bridge, BridgeConfig};

    use super::*;

    struct Counter {
        count: Mutex<i32>,
    }

    fn counter_type() -> TypeEntry {
        TypeEntry::class("Demo.Counter")
            .with_constructor(
                MethodEntry::new("", |ctx| {
                    let start: i32 = ctx.arg(0)?;
                    let counter = Counter {
                        count: Mutex::new(start),
                    };
                    ctx.set_return(HostObject::new(HostType::named("Demo.Counter"), counter));
                    Ok(())
                })
                .with_param(ParamEntry::new("start", HostType::INT32)),
            )
            .with_field(
                "Count",
                FieldEntry::new(HostType::INT32, |ctx| {
                    let count = ctx.with_this(|c: &Counter| c.count.lock().map(|g| *g).unwrap_or_default())?;
                    ctx.set_return(count);
                    Ok(())
                })
                .with_setter(|ctx| {
                    let value: i32 = ctx.arg(0)?;
                    ctx.with_this(|c: &Counter| {
                        if let Ok(mut count) = c.count.lock() {
                            *count = value;
                        }
                    })
                }),
            )
            .with_property(
                "Doubled",
                PropertyEntry::new(HostType::INT32).with_getter(|ctx| {
                    let count = ctx.with_this(|c: &Counter| c.count.lock().map(|g| *g).unwrap_or_default())?;
                    ctx.set_return(count * 2);
                    Ok(())
                }),
            )
            .with_method(
                MethodEntry::new("Add", |ctx| {
                    let step: i32 = ctx.arg(0)?;
                    let count = ctx.with_this(|c: &Counter| {
                        c.count
                            .lock()
                            .map(|mut g| {
                                *g += step;
                                *g
                            })
                            .unwrap_or_default()
                    })?;
                    ctx.set_return(count);
                    Ok(())
                })
                .with_param(ParamEntry::new("step", HostType::INT32))
                .returns(HostType::INT32),
            )
    }

    fn bridge() -> Bridge {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_all([counter_type()]).expect("register");
        Bridge::new(registry, BridgeConfig::default().without_library())
    }

    fn counter(state: &LockedState<'_>, start: f64) -> HostValue {
        let context = HostValue::Object(StaticContext::new(HostType::named("Demo.Counter")).into_object());
        state
            .call(&context, vec![HostValue::F64(start)])
            .expect("construct")
            .remove(0)
    }

    #[test]
    fn fields_and_properties() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let counter = counter(&state, 3.0);

        assert_eq!(state.index(&counter, &HostValue::from("Count")).expect("get"), HostValue::I32(3));
        state
            .new_index(&counter, &HostValue::from("Count"), HostValue::F64(5.0))
            .expect("set");
        assert_eq!(state.index(&counter, &HostValue::from("Doubled")).expect("get"), HostValue::I32(10));

        let error = state
            .new_index(&counter, &HostValue::from("Doubled"), HostValue::F64(1.0))
            .expect_err("read-only");
        assert_eq!(
            error,
            BridgeError::MethodAccess("'Demo.Counter.Doubled' is not set-accessible".to_string())
        );

        let error = state
            .new_index(&counter, &HostValue::from("Count"), HostValue::from("x"))
            .expect_err("wrong type");
        assert!(matches!(error, BridgeError::InvalidCast(_)));
    }

    #[test]
    fn methods_are_partial_targets() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let counter = counter(&state, 1.0);

        let add = state.index(&counter, &HostValue::from("Add")).expect("group");
        assert!(PartialTarget::of(&add).is_some());
        assert_eq!(state.display(&add).expect("text"), "Demo.Counter.Add");
        assert_eq!(state.call(&add, vec![HostValue::F64(2.0)]).expect("call"), vec![HostValue::I32(3)]);

        let error = state.call(&add, vec![HostValue::from("two")]).expect_err("no overload");
        assert_eq!(
            error,
            BridgeError::MissingMethod("'Add(String)' is not a member of type 'Demo.Counter'".to_string())
        );
    }

    #[test]
    fn missing_member_and_null_target() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let counter = counter(&state, 1.0);
        assert_eq!(
            state.index(&counter, &HostValue::from("Nope")).expect_err("missing"),
            BridgeError::MissingMember("'Nope' is not a member of type 'Demo.Counter'".to_string())
        );
        assert!(matches!(
            state.index(&HostValue::Null, &HostValue::from("Count")),
            Err(BridgeError::Target(_))
        ));
        assert!(matches!(state.call(&counter, Vec::new()), Err(BridgeError::Target(_))));
    }

    #[test]
    fn arrays_index_from_zero() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let array = HostValue::Object(
            ArrayData::from_vec(vec![HostValue::I32(1), HostValue::I32(2)]).into_object(HostType::INT32),
        );

        assert_eq!(state.index(&array, &HostValue::F64(1.0)).expect("get"), HostValue::I32(2));
        state.new_index(&array, &HostValue::F64(0.0), HostValue::F64(7.0)).expect("set");
        assert_eq!(state.index(&array, &HostValue::F64(0.0)).expect("get"), HostValue::I32(7));
        assert_eq!(state.index(&array, &HostValue::from("Length")).expect("length"), HostValue::I32(2));

        assert_eq!(
            state.index(&array, &HostValue::F64(2.0)).expect_err("out of range"),
            BridgeError::Argument("'2' is not a valid index for type 'Int32[]'".to_string())
        );
        assert!(matches!(
            state.index(&array, &HostValue::F64(0.5)),
            Err(BridgeError::Argument(_))
        ));
    }

    #[test]
    fn box_arithmetic_stays_exact() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let sum = state
            .arithmetic(ArithOp::Add, HostValue::I64(i64::MAX - 1), HostValue::F64(1.0))
            .expect("add");
        assert_eq!(sum, HostValue::I64(i64::MAX));

        assert!(state.less_than(HostValue::I64(1), HostValue::U64(2)).expect("compare"));
        assert!(state.equals(HostValue::U64(5), HostValue::U64(5)).expect("equal"));
        assert_eq!(state.negate(HostValue::I64(4)).expect("negate"), HostValue::I64(-4));
    }

    #[test]
    fn operators_on_reference_types() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let a = counter(&state, 1.0);
        let b = counter(&state, 1.0);

        assert!(state.equals(a.clone(), a.clone()).expect("same"));
        assert!(!state.equals(a.clone(), b.clone()).expect("identity"));

        let error = state.arithmetic(ArithOp::Add, a.clone(), b.clone()).expect_err("no operator");
        assert_eq!(
            error,
            BridgeError::MissingMethod(
                "'op_Addition(Demo.Counter, Demo.Counter)' is not a special member of type 'Demo.Counter'"
                    .to_string()
            )
        );

        let error = state.less_than(a, HostValue::F64(1.0)).expect_err("no comparison");
        match error {
            BridgeError::MissingMethod(message) => {
                assert!(message.starts_with("'op_LessThan(Demo.Counter, Double)'"));
                assert!(message.contains("; 'op_GreaterThan(Double, Demo.Counter)'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_uses_to_string_or_type_name() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        assert_eq!(state.display(&counter(&state, 1.0)).expect("text"), "Demo.Counter");
        assert_eq!(state.display(&HostValue::I64(-3)).expect("text"), "-3");
        let boxed = HostValue::Object(Int64Box(12).into_object());
        assert_eq!(state.display(&boxed).expect("text"), "12");
        let error = HostValue::Object(BridgeError::Argument("bad".to_string()).into_exception_object());
        assert_eq!(state.display(&error).expect("text"), "bad");
    }

    #[test]
    fn metamethods_dispatch_through_the_engine() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let counter = state.to_foreign(&counter(&state, 2.0)).expect("userdata");
        let foreign = state.foreign();

        let count = foreign.index(&counter, &ForeignValue::from("Count")).expect("index");
        assert_eq!(count, ForeignValue::number(2.0));

        foreign
            .new_index(&counter, ForeignValue::from("Count"), ForeignValue::number(4.0))
            .expect("new index");
        let add = foreign.index(&counter, &ForeignValue::from("Add")).expect("group");
        let results = foreign.call_value(&add, &[ForeignValue::number(1.0)]).expect("call");
        assert_eq!(results, vec![ForeignValue::number(5.0)]);

        assert_eq!(foreign.to_display(&counter).expect("display"), "Demo.Counter");
    }

    #[test]
    fn finalizer_releases_handle() {
        let bridge = bridge();
        let state = bridge.lock().expect("lock");
        let object = HostObject::new(HostType::OBJECT, ());
        let userdata = state.to_foreign(&HostValue::Object(object.clone())).expect("userdata");
        assert_eq!(object.strong_count(), 2);

        drop(userdata);
        state.foreign().collect_garbage();
        assert_eq!(object.strong_count(), 1);
    }
}
