//! Generational arena holding every collectable object.

use std::fmt;
use std::sync::Arc;

use crate::{ForeignError, ForeignState, ForeignValue, GcRef, Table};

/// Body of a native function.
///
/// Arguments are the values of the function's stack frame; the function
/// pushes its results and returns how many it pushed.
pub type NativeFunction = Arc<dyn Fn(&ForeignState) -> Result<usize, ForeignError> + Send + Sync>;

pub(crate) struct Function {
    pub(crate) body: NativeFunction,
    pub(crate) upvalues: Vec<ForeignValue>,
    pub(crate) name: Option<String>,
}

#[derive(Debug)]
pub(crate) struct UserData {
    /// Opaque payload chosen by the creator.
    pub(crate) id: u64,
    pub(crate) metatable: Option<GcRef>,
    /// Set once the finalizer has been scheduled; it never runs twice.
    pub(crate) finalized: bool,
}

/// An activation record on a thread's stack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    /// Absolute stack position of the first argument.
    pub(crate) base: usize,
    pub(crate) function: GcRef,
}

/// A value stack with its call frames.
#[derive(Debug, Default)]
pub(crate) struct ThreadStack {
    pub(crate) values: Vec<ForeignValue>,
    pub(crate) frames: Vec<Frame>,
}

impl ThreadStack {
    /// Absolute position where the current frame starts.
    pub(crate) fn base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }
}

pub(crate) enum GcObject {
    Table(Table),
    Function(Function),
    Thread(ThreadStack),
    UserData(UserData),
}

struct HeapSlot {
    generation: u32,
    object: Option<GcObject>,
    marked: bool,
}

/// Heap storage with generational indices.
///
/// A freed slot is reused with its generation incremented, so a handle to a
/// collected object never resolves to its successor.
#[derive(Default)]
pub(crate) struct Heap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
}

impl Heap {
    pub(crate) fn allocate(&mut self, object: GcObject) -> GcRef {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            GcRef::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
                marked: false,
            });
            GcRef::new(index, 0)
        }
    }

    pub(crate) fn get(&self, r: GcRef) -> Option<&GcObject> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, r: GcRef) -> Option<&mut GcObject> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub(crate) fn table(&self, r: GcRef) -> Option<&Table> {
        match self.get(r)? {
            GcObject::Table(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn table_mut(&mut self, r: GcRef) -> Option<&mut Table> {
        match self.get_mut(r)? {
            GcObject::Table(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn function(&self, r: GcRef) -> Option<&Function> {
        match self.get(r)? {
            GcObject::Function(function) => Some(function),
            _ => None,
        }
    }

    pub(crate) fn userdata(&self, r: GcRef) -> Option<&UserData> {
        match self.get(r)? {
            GcObject::UserData(userdata) => Some(userdata),
            _ => None,
        }
    }

    pub(crate) fn userdata_mut(&mut self, r: GcRef) -> Option<&mut UserData> {
        match self.get_mut(r)? {
            GcObject::UserData(userdata) => Some(userdata),
            _ => None,
        }
    }

    pub(crate) fn thread(&self, r: GcRef) -> Option<&ThreadStack> {
        match self.get(r)? {
            GcObject::Thread(thread) => Some(thread),
            _ => None,
        }
    }

    pub(crate) fn thread_mut(&mut self, r: GcRef) -> Option<&mut ThreadStack> {
        match self.get_mut(r)? {
            GcObject::Thread(thread) => Some(thread),
            _ => None,
        }
    }

    /// Metatable of a table or userdata.
    pub(crate) fn metatable_of(&self, value: &ForeignValue) -> Option<GcRef> {
        match value {
            ForeignValue::Table(r) => self.table(*r)?.metatable,
            ForeignValue::UserData(r) => self.userdata(*r)?.metatable,
            _ => None,
        }
    }

    /// Field `event` of the metatable of `value`, nil when absent.
    pub(crate) fn metamethod(&self, value: &ForeignValue, event: &str) -> ForeignValue {
        self.metatable_of(value)
            .and_then(|mt| self.table(mt))
            .map(|mt| mt.get_str(event))
            .unwrap_or_default()
    }

    // === Collector support ===

    pub(crate) fn is_marked(&self, r: GcRef) -> bool {
        self.slots
            .get(r.index as usize)
            .is_some_and(|slot| slot.generation == r.generation && slot.marked)
    }

    /// Mark `r`; returns true if it was live and not yet marked.
    pub(crate) fn mark(&mut self, r: GcRef) -> bool {
        match self.slots.get_mut(r.index as usize) {
            Some(slot) if slot.generation == r.generation && slot.object.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    pub(crate) fn live_refs(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object
                .as_ref()
                .map(|_| GcRef::new(index as u32, slot.generation))
        })
    }

    /// Free every unmarked object. Returns how many were freed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_some() && !slot.marked {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                freed += 1;
            }
        }
        freed
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_does_not_resolve() {
        let mut heap = Heap::default();
        let first = heap.allocate(GcObject::Table(Table::default()));
        assert!(heap.table(first).is_some());

        heap.clear_marks();
        assert_eq!(heap.sweep(), 1);
        assert!(heap.table(first).is_none());

        let second = heap.allocate(GcObject::Table(Table::default()));
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(heap.table(first).is_none());
        assert!(heap.table(second).is_some());
    }

    #[test]
    fn marked_objects_survive_sweep() {
        let mut heap = Heap::default();
        let kept = heap.allocate(GcObject::Table(Table::default()));
        let dropped = heap.allocate(GcObject::Table(Table::default()));

        heap.clear_marks();
        assert!(heap.mark(kept));
        assert!(!heap.mark(kept));
        assert_eq!(heap.sweep(), 1);
        assert!(heap.table(kept).is_some());
        assert!(heap.table(dropped).is_none());
        assert_eq!(heap.live_count(), 1);
    }
}
