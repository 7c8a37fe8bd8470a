//! Tables.

use rustc_hash::FxHashMap;

use crate::{ForeignValue, GcRef};

/// Which parts of a table's entries the collector treats as weak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeakMode {
    #[default]
    None,
    Keys,
    Values,
    Both,
}

impl WeakMode {
    pub fn weak_keys(self) -> bool {
        matches!(self, WeakMode::Keys | WeakMode::Both)
    }

    pub fn weak_values(self) -> bool {
        matches!(self, WeakMode::Values | WeakMode::Both)
    }
}

/// An associative table. Nil is never stored as a key or a value.
#[derive(Debug, Default)]
pub(crate) struct Table {
    entries: FxHashMap<ForeignValue, ForeignValue>,
    pub(crate) metatable: Option<GcRef>,
    pub(crate) mode: WeakMode,
}

impl Table {
    pub(crate) fn with_mode(mode: WeakMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub(crate) fn get(&self, key: &ForeignValue) -> ForeignValue {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn get_str(&self, key: &str) -> ForeignValue {
        self.get(&ForeignValue::from(key))
    }

    /// Store `value` under `key`; a nil value removes the entry.
    pub(crate) fn set(&mut self, key: ForeignValue, value: ForeignValue) {
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// A border: `n` such that `t[n]` is present and `t[n + 1]` is absent,
    /// counting from 1.
    pub(crate) fn border(&self) -> usize {
        let mut n = 0;
        while self.entries.contains_key(&ForeignValue::number((n + 1) as f64)) {
            n += 1;
        }
        n
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&ForeignValue, &ForeignValue)> {
        self.entries.iter()
    }
}
