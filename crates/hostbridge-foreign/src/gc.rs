//! Mark and sweep collector with weak tables and finalizers.
//!
//! ## Cycle
//!
//! 1. Mark everything reachable from the roots: every stack, the globals,
//!    the reference table, the named metatables and active message handlers
//! 2. Weak-keyed tables act as ephemerons: a value is marked only once its
//!    key is
//! 3. Unreachable userdata whose metatable has `__gc` are resurrected and
//!    scheduled for finalization, once per object
//! 4. Weak entries pointing at unreachable or resurrected objects are cleared
//! 5. Unmarked objects are freed
//! 6. Finalizers run after the heap is consistent again, in protected mode

use rustc_hash::FxHashSet;

use crate::heap::GcObject;
use crate::state::Inner;
use crate::{ForeignState, ForeignValue, GcRef};

impl ForeignState {
    /// Run a full collection cycle. Returns the number of objects freed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&self) -> usize {
        let (freed, finalize) = self.inner_mut().collect();
        for userdata in finalize {
            self.run_finalizer(userdata);
        }
        freed
    }

    pub(crate) fn run_finalizer(&self, userdata: ForeignValue) {
        let finalizer = self.inner().heap.metamethod(&userdata, "__gc");
        if !matches!(finalizer, ForeignValue::Function(_)) {
            return;
        }
        if let Err(failure) = self.pcall_value(&finalizer, &[userdata], None) {
            tracing::warn!(error = %failure.value.display_raw(), "finalizer raised an error");
        }
    }
}

impl Inner {
    pub(crate) fn collect(&mut self) -> (usize, Vec<ForeignValue>) {
        self.heap.clear_marks();

        let mut gray = self.roots();
        let mut ephemerons = Vec::new();
        self.propagate(&mut gray, &mut ephemerons);
        self.converge(&mut gray, &mut ephemerons);

        let finalize: Vec<GcRef> = self
            .heap
            .live_refs()
            .filter(|r| !self.heap.is_marked(*r) && self.needs_finalizer(*r))
            .collect();
        for r in &finalize {
            if let Some(userdata) = self.heap.userdata_mut(*r) {
                userdata.finalized = true;
            }
        }
        gray.extend(finalize.iter().copied());
        self.propagate(&mut gray, &mut ephemerons);
        self.converge(&mut gray, &mut ephemerons);

        let resurrected: FxHashSet<GcRef> = finalize.iter().copied().collect();
        self.clear_weak_entries(&resurrected);

        let freed = self.heap.sweep();
        tracing::debug!(
            freed,
            finalizers = finalize.len(),
            live = self.heap.live_count(),
            "collected garbage"
        );
        (freed, finalize.into_iter().map(ForeignValue::UserData).collect())
    }

    /// Schedule every remaining finalizer, as on shutdown.
    pub(crate) fn take_all_finalizable(&mut self) -> Vec<ForeignValue> {
        let pending: Vec<GcRef> = self.heap.live_refs().filter(|r| self.needs_finalizer(*r)).collect();
        for r in &pending {
            if let Some(userdata) = self.heap.userdata_mut(*r) {
                userdata.finalized = true;
            }
        }
        pending.into_iter().map(ForeignValue::UserData).collect()
    }

    fn needs_finalizer(&self, r: GcRef) -> bool {
        self.heap.userdata(r).is_some_and(|userdata| !userdata.finalized)
            && matches!(
                self.heap.metamethod(&ForeignValue::UserData(r), "__gc"),
                ForeignValue::Function(_)
            )
    }

    fn roots(&self) -> Vec<GcRef> {
        let mut gray = vec![self.globals];
        gray.extend(self.active.iter().copied());
        gray.extend(self.metatables.values().copied());
        gray.extend(self.main.values.iter().filter_map(ForeignValue::gc_ref));
        gray.extend(self.main.frames.iter().map(|frame| frame.function));
        gray.extend(self.refs.values().filter_map(ForeignValue::gc_ref));
        gray.extend(self.handlers.iter().flatten().filter_map(ForeignValue::gc_ref));
        gray
    }

    fn propagate(&mut self, gray: &mut Vec<GcRef>, ephemerons: &mut Vec<GcRef>) {
        while let Some(r) = gray.pop() {
            if !self.heap.mark(r) {
                continue;
            }
            match self.heap.get(r) {
                Some(GcObject::Table(table)) => {
                    gray.extend(table.metatable);
                    let mode = table.mode;
                    if mode.weak_keys() && !mode.weak_values() {
                        ephemerons.push(r);
                    }
                    for (key, value) in table.entries() {
                        if !mode.weak_keys() {
                            gray.extend(key.gc_ref());
                        }
                        if !mode.weak_values() && !mode.weak_keys() {
                            gray.extend(value.gc_ref());
                        }
                    }
                }
                Some(GcObject::Function(function)) => {
                    gray.extend(function.upvalues.iter().filter_map(ForeignValue::gc_ref));
                }
                Some(GcObject::Thread(thread)) => {
                    gray.extend(thread.values.iter().filter_map(ForeignValue::gc_ref));
                    gray.extend(thread.frames.iter().map(|frame| frame.function));
                }
                Some(GcObject::UserData(userdata)) => {
                    gray.extend(userdata.metatable);
                }
                None => {}
            }
        }
    }

    /// Mark ephemeron values whose keys are alive until nothing changes.
    fn converge(&mut self, gray: &mut Vec<GcRef>, ephemerons: &mut Vec<GcRef>) {
        loop {
            for table in ephemerons.iter() {
                let Some(table) = self.heap.table(*table) else {
                    continue;
                };
                for (key, value) in table.entries() {
                    let key_alive = key.gc_ref().is_none_or(|r| self.heap.is_marked(r));
                    if let Some(r) = value.gc_ref()
                        && key_alive
                        && !self.heap.is_marked(r)
                        && self.heap.get(r).is_some()
                    {
                        gray.push(r);
                    }
                }
            }
            if gray.is_empty() {
                break;
            }
            self.propagate(gray, ephemerons);
        }
    }

    fn clear_weak_entries(&mut self, resurrected: &FxHashSet<GcRef>) {
        let weak_tables: Vec<GcRef> = self
            .heap
            .live_refs()
            .filter(|r| self.heap.is_marked(*r))
            .filter(|r| {
                self.heap
                    .table(*r)
                    .is_some_and(|table| table.mode.weak_keys() || table.mode.weak_values())
            })
            .collect();

        for r in weak_tables {
            let doomed: Vec<ForeignValue> = match self.heap.table(r) {
                Some(table) => {
                    let mode = table.mode;
                    table
                        .entries()
                        .filter(|(key, value)| {
                            (mode.weak_keys() && self.is_dead(key, resurrected))
                                || (mode.weak_values() && self.is_dead(value, resurrected))
                        })
                        .map(|(key, _)| key.clone())
                        .collect()
                }
                None => continue,
            };
            if let Some(table) = self.heap.table_mut(r) {
                for key in doomed {
                    table.set(key, ForeignValue::Nil);
                }
            }
        }
    }

    fn is_dead(&self, value: &ForeignValue, resurrected: &FxHashSet<GcRef>) -> bool {
        value
            .gc_ref()
            .is_some_and(|r| !self.heap.is_marked(r) || resurrected.contains(&r))
    }
}
