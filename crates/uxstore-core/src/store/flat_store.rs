// ── Flat value store ──
//
// Path-addressed slots holding the current and previous value of each
// key. No type checks and no notification: `KeyedStore` owns both.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::value::Value;

/// Snapshot of one key's slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub current: Value,
    pub previous: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) struct FlatStore {
    slots: DashMap<String, StoredValue>,
}

impl FlatStore {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: DashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn get(&self, path: &str) -> Option<StoredValue> {
        self.slots.get(path).map(|r| r.value().clone())
    }

    pub(crate) fn get_current(&self, path: &str) -> Option<Value> {
        self.slots.get(path).map(|r| r.value().current.clone())
    }

    /// Write `value`, shifting the old current into `previous`.
    /// Returns the replaced value.
    pub(crate) fn set(&self, path: &str, value: Value) -> Option<Value> {
        let now = Utc::now();
        match self.slots.get_mut(path) {
            Some(mut slot) => {
                let old = std::mem::replace(&mut slot.current, value);
                slot.previous = Some(old.clone());
                slot.updated_at = now;
                Some(old)
            }
            None => {
                self.slots.insert(
                    path.to_owned(),
                    StoredValue {
                        current: value,
                        previous: None,
                        updated_at: now,
                    },
                );
                None
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
