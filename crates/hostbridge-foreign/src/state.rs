//! Engine state: value stack, reference table, globals and metatables.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::heap::{Function, GcObject, Heap, ThreadStack, UserData};
use crate::{ForeignError, ForeignValue, GcRef, RefKey, Table, ValueKind, WeakMode};

/// Largest number of values a stack may hold.
pub const DEFAULT_MAX_STACK: usize = 1_000_000;

/// Largest number of nested calls.
pub(crate) const MAX_CALL_DEPTH: usize = 200;

/// Receives errors that escape an unprotected call.
pub type PanicHook = Box<dyn Fn(&ForeignValue) + Send>;

/// Error state of the unwinding in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Unwind {
    #[default]
    None,
    /// The innermost message handler has run.
    Handled,
    /// The innermost message handler raised an error itself.
    HandlerFailed,
}

#[derive(Debug, Default)]
pub(crate) struct RefTable {
    slots: Vec<ForeignValue>,
    free: Vec<u32>,
}

impl RefTable {
    fn reference(&mut self, value: ForeignValue) -> RefKey {
        if value.is_nil() {
            return RefKey::NIL;
        }
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = value;
                RefKey(index)
            }
            None => {
                self.slots.push(value);
                RefKey(self.slots.len() as u32 - 1)
            }
        }
    }

    fn dereference(&self, key: RefKey) -> ForeignValue {
        self.slots.get(key.0 as usize).cloned().unwrap_or_default()
    }

    fn unreference(&mut self, key: RefKey) -> bool {
        match self.slots.get_mut(key.0 as usize) {
            Some(slot) if !slot.is_nil() => {
                *slot = ForeignValue::Nil;
                self.free.push(key.0);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &ForeignValue> {
        self.slots.iter()
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

pub(crate) struct Inner {
    pub(crate) heap: Heap,
    pub(crate) main: ThreadStack,
    /// Threads entered through `with_thread`, innermost last.
    pub(crate) active: Vec<GcRef>,
    pub(crate) globals: GcRef,
    pub(crate) refs: RefTable,
    pub(crate) metatables: FxHashMap<String, GcRef>,
    pub(crate) max_stack: usize,
    pub(crate) depth: usize,
    /// Number of protected calls in progress.
    pub(crate) protected: usize,
    /// Message handler of each protected call in progress.
    pub(crate) handlers: Vec<Option<ForeignValue>>,
    pub(crate) unwinding: Unwind,
    pub(crate) closed: bool,
}

impl Inner {
    fn new(max_stack: usize) -> Self {
        let mut heap = Heap::default();
        let globals = heap.allocate(GcObject::Table(Table::default()));
        Self {
            heap,
            main: ThreadStack::default(),
            active: Vec::new(),
            globals,
            refs: RefTable::default(),
            metatables: FxHashMap::default(),
            max_stack,
            depth: 0,
            protected: 0,
            handlers: Vec::new(),
            unwinding: Unwind::None,
            closed: false,
        }
    }

    pub(crate) fn stack(&self) -> &ThreadStack {
        self.active
            .last()
            .and_then(|thread| self.heap.thread(*thread))
            .unwrap_or(&self.main)
    }

    pub(crate) fn stack_mut(&mut self) -> &mut ThreadStack {
        match self.active.last().copied() {
            Some(thread) => match self.heap.thread_mut(thread) {
                Some(stack) => stack,
                None => &mut self.main,
            },
            None => &mut self.main,
        }
    }

    /// Absolute position of a frame-relative index.
    ///
    /// Positive indices count from 1 at the frame base; negative indices
    /// count back from the top.
    fn absolute(&self, index: i32) -> Option<usize> {
        let stack = self.stack();
        let base = stack.base();
        let top = stack.values.len();
        let position = match index {
            0 => return None,
            i if i > 0 => base + (i as usize) - 1,
            i => top.checked_sub(i.unsigned_abs() as usize)?,
        };
        (position >= base && position < top).then_some(position)
    }

    pub(crate) fn table(&self, value: &ForeignValue) -> Result<&Table, ForeignError> {
        match value {
            ForeignValue::Table(r) => self
                .heap
                .table(*r)
                .ok_or_else(|| ForeignError::message("attempt to use a collected table")),
            other => Err(ForeignError::message(format!(
                "table expected, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn table_mut(&mut self, value: &ForeignValue) -> Result<&mut Table, ForeignError> {
        match value {
            ForeignValue::Table(r) => self
                .heap
                .table_mut(*r)
                .ok_or_else(|| ForeignError::message("attempt to use a collected table")),
            other => Err(ForeignError::message(format!(
                "table expected, got {}",
                other.type_name()
            ))),
        }
    }
}

/// A foreign engine state.
///
/// Every operation takes `&self`: native functions receive the state they
/// run in and may re-enter it freely. The state is `Send` but not `Sync`;
/// hosts that share it across threads wrap it in a re-entrant lock.
pub struct ForeignState {
    inner: RefCell<Inner>,
    panic_hook: RefCell<Option<PanicHook>>,
}

impl ForeignState {
    pub fn new() -> Self {
        Self::with_max_stack(DEFAULT_MAX_STACK)
    }

    /// Create a state whose stacks hold at most `max_stack` values.
    pub fn with_max_stack(max_stack: usize) -> Self {
        Self {
            inner: RefCell::new(Inner::new(max_stack)),
            panic_hook: RefCell::new(None),
        }
    }

    pub(crate) fn inner(&self) -> Ref<'_, Inner> {
        self.inner.borrow()
    }

    pub(crate) fn inner_mut(&self) -> RefMut<'_, Inner> {
        self.inner.borrow_mut()
    }

    /// Install the hook that sees errors escaping an unprotected call.
    pub fn set_panic_hook(&self, hook: impl Fn(&ForeignValue) + Send + 'static) {
        *self.panic_hook.borrow_mut() = Some(Box::new(hook));
    }

    pub(crate) fn report_panic(&self, value: &ForeignValue) {
        if let Some(hook) = self.panic_hook.borrow().as_ref() {
            hook(value);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    // === Stack ===

    /// Number of values in the current frame.
    pub fn top(&self) -> usize {
        let inner = self.inner();
        let stack = inner.stack();
        stack.values.len() - stack.base()
    }

    /// Resize the current frame to `top` values, filling with nil.
    pub fn set_top(&self, top: usize) {
        let mut inner = self.inner_mut();
        let stack = inner.stack_mut();
        let len = stack.base() + top;
        stack.values.resize(len, ForeignValue::Nil);
    }

    /// Whether `extra` more values fit on the stack.
    pub fn check_stack(&self, extra: usize) -> bool {
        let inner = self.inner();
        inner.stack().values.len() + extra <= inner.max_stack
    }

    pub fn push(&self, value: impl Into<ForeignValue>) {
        self.inner_mut().stack_mut().values.push(value.into());
    }

    /// Pop the top of the current frame; nil if the frame is empty.
    pub fn pop(&self) -> ForeignValue {
        let mut inner = self.inner_mut();
        let stack = inner.stack_mut();
        if stack.values.len() > stack.base() {
            stack.values.pop().unwrap_or_default()
        } else {
            ForeignValue::Nil
        }
    }

    /// Value at `index`; nil for an index outside the frame.
    pub fn get(&self, index: i32) -> ForeignValue {
        let inner = self.inner();
        inner
            .absolute(index)
            .and_then(|position| inner.stack().values.get(position).cloned())
            .unwrap_or_default()
    }

    /// Type of the value at `index`.
    pub fn value_kind(&self, index: i32) -> ValueKind {
        self.get(index).kind()
    }

    /// Replace the value at `index`. Returns false for an invalid index.
    pub fn replace(&self, index: i32, value: ForeignValue) -> bool {
        let mut inner = self.inner_mut();
        match inner.absolute(index) {
            Some(position) => {
                inner.stack_mut().values[position] = value;
                true
            }
            None => false,
        }
    }

    /// Remove the value at `index`, shifting the values above it down.
    pub fn remove(&self, index: i32) -> ForeignValue {
        let mut inner = self.inner_mut();
        match inner.absolute(index) {
            Some(position) => inner.stack_mut().values.remove(position),
            None => ForeignValue::Nil,
        }
    }

    /// Insert `value` at `index`, shifting the values above it up.
    pub fn insert(&self, index: i32, value: ForeignValue) -> bool {
        let mut inner = self.inner_mut();
        match inner.absolute(index) {
            Some(position) => {
                inner.stack_mut().values.insert(position, value);
                true
            }
            None => false,
        }
    }

    /// All values of the current frame, bottom first.
    pub fn frame_values(&self) -> Vec<ForeignValue> {
        let inner = self.inner();
        let stack = inner.stack();
        stack.values[stack.base()..].to_vec()
    }

    /// Upvalue `index` of the running function; nil outside a call.
    pub fn upvalue(&self, index: usize) -> ForeignValue {
        let inner = self.inner();
        inner
            .stack()
            .frames
            .last()
            .and_then(|frame| inner.heap.function(frame.function))
            .and_then(|function| function.upvalues.get(index).cloned())
            .unwrap_or_default()
    }

    // === Objects ===

    pub fn new_table(&self) -> ForeignValue {
        self.new_table_with_mode(WeakMode::None)
    }

    pub fn new_table_with_mode(&self, mode: WeakMode) -> ForeignValue {
        let r = self.inner_mut().heap.allocate(GcObject::Table(Table::with_mode(mode)));
        ForeignValue::Table(r)
    }

    /// Create a function from a native body.
    pub fn new_function<F>(&self, body: F) -> ForeignValue
    where
        F: Fn(&ForeignState) -> Result<usize, ForeignError> + Send + Sync + 'static,
    {
        self.new_closure(None, Vec::new(), body)
    }

    /// Create a named function whose `upvalues` the collector keeps alive.
    pub fn new_closure<F>(&self, name: Option<&str>, upvalues: Vec<ForeignValue>, body: F) -> ForeignValue
    where
        F: Fn(&ForeignState) -> Result<usize, ForeignError> + Send + Sync + 'static,
    {
        let function = Function {
            body: Arc::new(body),
            upvalues,
            name: name.map(str::to_string),
        };
        ForeignValue::Function(self.inner_mut().heap.allocate(GcObject::Function(function)))
    }

    /// Create a userdata carrying `id`, optionally with a metatable.
    pub fn new_userdata(&self, id: u64, metatable: Option<&ForeignValue>) -> ForeignValue {
        let metatable = metatable.and_then(ForeignValue::gc_ref);
        let r = self.inner_mut().heap.allocate(GcObject::UserData(UserData {
            id,
            metatable,
            finalized: false,
        }));
        ForeignValue::UserData(r)
    }

    /// Payload of a live userdata.
    pub fn userdata_id(&self, value: &ForeignValue) -> Option<u64> {
        match value {
            ForeignValue::UserData(r) => self.inner().heap.userdata(*r).map(|userdata| userdata.id),
            _ => None,
        }
    }

    pub fn new_thread(&self) -> ForeignValue {
        ForeignValue::Thread(self.inner_mut().heap.allocate(GcObject::Thread(ThreadStack::default())))
    }

    /// Run `f` with `thread` as the current stack.
    ///
    /// Threads share the globals, the metatables and the reference table.
    pub fn with_thread<R>(&self, thread: &ForeignValue, f: impl FnOnce(&ForeignState) -> R) -> Result<R, ForeignError> {
        let ForeignValue::Thread(r) = thread else {
            return Err(ForeignError::message(format!(
                "thread expected, got {}",
                thread.type_name()
            )));
        };
        {
            let mut inner = self.inner_mut();
            if inner.heap.thread(*r).is_none() {
                return Err(ForeignError::message("cannot use a collected thread"));
            }
            inner.active.push(*r);
        }
        let result = f(self);
        self.inner_mut().active.pop();
        Ok(result)
    }

    // === Metatables ===

    pub fn metatable(&self, value: &ForeignValue) -> Option<ForeignValue> {
        self.inner().heap.metatable_of(value).map(ForeignValue::Table)
    }

    /// Set or clear the metatable of a table or userdata.
    pub fn set_metatable(&self, value: &ForeignValue, metatable: Option<&ForeignValue>) -> Result<(), ForeignError> {
        let metatable = match metatable {
            None => None,
            Some(ForeignValue::Table(r)) => Some(*r),
            Some(other) => {
                return Err(ForeignError::message(format!(
                    "metatable must be a table, got {}",
                    other.type_name()
                )));
            }
        };
        let mut inner = self.inner_mut();
        match value {
            ForeignValue::Table(r) => {
                if let Some(table) = inner.heap.table_mut(*r) {
                    table.metatable = metatable;
                }
            }
            ForeignValue::UserData(r) => {
                if let Some(userdata) = inner.heap.userdata_mut(*r) {
                    userdata.metatable = metatable;
                }
            }
            other => {
                return Err(ForeignError::message(format!(
                    "cannot set the metatable of a {} value",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    /// The metatable registered under `name`, creating it if needed.
    ///
    /// Returns the metatable and whether it was created by this call.
    pub fn new_metatable(&self, name: &str) -> (ForeignValue, bool) {
        let mut inner = self.inner_mut();
        if let Some(existing) = inner.metatables.get(name) {
            return (ForeignValue::Table(*existing), false);
        }
        let mut table = Table::default();
        table.set(ForeignValue::from("__name"), ForeignValue::from(name));
        let r = inner.heap.allocate(GcObject::Table(table));
        inner.metatables.insert(name.to_string(), r);
        (ForeignValue::Table(r), true)
    }

    pub fn named_metatable(&self, name: &str) -> Option<ForeignValue> {
        self.inner().metatables.get(name).copied().map(ForeignValue::Table)
    }

    // === Raw table access ===

    pub fn raw_get(&self, table: &ForeignValue, key: &ForeignValue) -> Result<ForeignValue, ForeignError> {
        Ok(self.inner().table(table)?.get(key))
    }

    pub fn raw_set(&self, table: &ForeignValue, key: ForeignValue, value: ForeignValue) -> Result<(), ForeignError> {
        check_key(&key)?;
        self.inner_mut().table_mut(table)?.set(key, value);
        Ok(())
    }

    /// Border of the sequence part of a table.
    pub fn raw_len(&self, table: &ForeignValue) -> Result<usize, ForeignError> {
        Ok(self.inner().table(table)?.border())
    }

    /// Snapshot of every entry of a table.
    pub fn pairs(&self, table: &ForeignValue) -> Result<Vec<(ForeignValue, ForeignValue)>, ForeignError> {
        Ok(self
            .inner()
            .table(table)?
            .entries()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    // === Globals ===

    pub fn globals(&self) -> ForeignValue {
        ForeignValue::Table(self.inner().globals)
    }

    pub fn get_global(&self, name: &str) -> ForeignValue {
        let inner = self.inner();
        inner
            .heap
            .table(inner.globals)
            .map(|globals| globals.get_str(name))
            .unwrap_or_default()
    }

    pub fn set_global(&self, name: &str, value: impl Into<ForeignValue>) {
        let mut inner = self.inner_mut();
        let globals = inner.globals;
        if let Some(table) = inner.heap.table_mut(globals) {
            table.set(ForeignValue::from(name), value.into());
        }
    }

    // === Reference table ===

    /// Keep `value` alive under a new key.
    pub fn reference(&self, value: ForeignValue) -> RefKey {
        self.inner_mut().refs.reference(value)
    }

    pub fn dereference(&self, key: RefKey) -> ForeignValue {
        if key.is_nil() {
            return ForeignValue::Nil;
        }
        self.inner().refs.dereference(key)
    }

    /// Release `key`. Returns false if it was not in use.
    pub fn unreference(&self, key: RefKey) -> bool {
        if key.is_nil() {
            return false;
        }
        self.inner_mut().refs.unreference(key)
    }

    /// Release `key` unless the state is in the middle of an operation on
    /// this thread. Returns false when the release could not run now.
    pub fn try_unreference(&self, key: RefKey) -> bool {
        match self.inner.try_borrow_mut() {
            Ok(mut inner) => {
                inner.refs.unreference(key);
                true
            }
            Err(_) => false,
        }
    }

    /// Number of keys in use.
    pub fn reference_count(&self) -> usize {
        self.inner().refs.live()
    }

    /// Number of objects on the heap.
    pub fn object_count(&self) -> usize {
        self.inner().heap.live_count()
    }

    /// Run every pending finalizer and drop all objects.
    ///
    /// The state stays usable as an empty state; `is_closed` reports true.
    pub fn close(&self) {
        let pending = self.inner_mut().take_all_finalizable();
        for userdata in pending.into_iter().rev() {
            self.run_finalizer(userdata);
        }

        let mut inner = self.inner_mut();
        let max_stack = inner.max_stack;
        *inner = Inner::new(max_stack);
        inner.closed = true;
        tracing::debug!("foreign state closed");
    }
}

pub(crate) fn check_key(key: &ForeignValue) -> Result<(), ForeignError> {
    match key {
        ForeignValue::Nil => Err(ForeignError::message("table index is nil")),
        ForeignValue::Number(n) if n.is_nan() => Err(ForeignError::message("table index is NaN")),
        _ => Ok(()),
    }
}

impl Default for ForeignState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ForeignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("ForeignState")
                .field("heap", &inner.heap)
                .field("references", &inner.refs.live())
                .field("depth", &inner.depth)
                .field("closed", &inner.closed)
                .finish(),
            Err(_) => f.debug_struct("ForeignState").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_indices() {
        let state = ForeignState::new();
        state.push(1.0);
        state.push("two");
        state.push(true);

        assert_eq!(state.top(), 3);
        assert_eq!(state.get(1), ForeignValue::number(1.0));
        assert_eq!(state.get(-1), ForeignValue::Boolean(true));
        assert_eq!(state.get(-3), ForeignValue::number(1.0));
        assert!(state.get(4).is_nil());
        assert!(state.get(-4).is_nil());
        assert_eq!(state.value_kind(2), ValueKind::String);

        assert_eq!(state.remove(1), ForeignValue::number(1.0));
        assert_eq!(state.get(1), ForeignValue::from("two"));
        state.set_top(0);
        assert_eq!(state.top(), 0);
        assert!(state.pop().is_nil());
    }

    #[test]
    fn reference_table_reuses_keys() {
        let state = ForeignState::new();
        let table = state.new_table();
        let first = state.reference(table.clone());
        assert_eq!(state.dereference(first), table);
        assert_eq!(state.reference_count(), 1);

        assert!(state.unreference(first));
        assert!(!state.unreference(first));
        assert!(state.dereference(first).is_nil());

        let second = state.reference(ForeignValue::from("x"));
        assert_eq!(second, first);
        assert_eq!(state.reference(ForeignValue::Nil), RefKey::NIL);
    }

    #[test]
    fn named_metatables_are_unique() {
        let state = ForeignState::new();
        let (first, created) = state.new_metatable("object");
        assert!(created);
        let (again, created) = state.new_metatable("object");
        assert!(!created);
        assert_eq!(first, again);
        assert_eq!(state.named_metatable("object"), Some(first.clone()));
        assert_eq!(state.raw_get(&first, &ForeignValue::from("__name")).unwrap(), ForeignValue::from("object"));
    }

    #[test]
    fn userdata_payload_and_metatable() {
        let state = ForeignState::new();
        let (mt, _) = state.new_metatable("object");
        let userdata = state.new_userdata(42, Some(&mt));
        assert_eq!(state.userdata_id(&userdata), Some(42));
        assert_eq!(state.metatable(&userdata), Some(mt));
        assert_eq!(state.userdata_id(&state.new_table()), None);
    }

    #[test]
    fn globals_and_raw_tables() {
        let state = ForeignState::new();
        let table = state.new_table();
        state.raw_set(&table, ForeignValue::number(1.0), ForeignValue::from("a")).unwrap();
        state.raw_set(&table, ForeignValue::number(2.0), ForeignValue::from("b")).unwrap();
        assert_eq!(state.raw_len(&table).unwrap(), 2);
        assert!(state.raw_set(&table, ForeignValue::Nil, ForeignValue::Boolean(true)).is_err());

        state.set_global("t", table.clone());
        assert_eq!(state.get_global("t"), table);
        assert_eq!(state.pairs(&table).unwrap().len(), 2);
        assert!(state.raw_get(&ForeignValue::number(1.0), &ForeignValue::Nil).is_err());
    }

    #[test]
    fn threads_have_their_own_stack() {
        let state = ForeignState::new();
        state.push("main");
        let thread = state.new_thread();

        let top = state
            .with_thread(&thread, |state| {
                state.push(1.0);
                state.push(2.0);
                state.top()
            })
            .unwrap();
        assert_eq!(top, 2);
        assert_eq!(state.top(), 1);
        assert_eq!(state.get(-1), ForeignValue::from("main"));
        assert!(state.with_thread(&ForeignValue::Nil, |_| ()).is_err());
    }

    #[test]
    fn check_stack_respects_limit() {
        let state = ForeignState::with_max_stack(4);
        assert!(state.check_stack(4));
        state.push(1.0);
        assert!(!state.check_stack(4));
    }
}
