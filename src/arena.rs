//! Per-key single-writer arena.
//!
//! The analyzers keep per-vehicle records (integration status, maintenance
//! lists, session state) whose counter and dedup invariants require that all
//! writes for one key are serialized. The arena gives each key its own
//! `Mutex`, reached through a short-lived read lock on the index, so
//! concurrent work on different vehicles never contends and no caller holds
//! the index lock while working on an entry.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Map of stable id → independently lockable record.
#[derive(Debug, Default)]
pub struct KeyedArena<V> {
    entries: RwLock<HashMap<String, Arc<Mutex<V>>>>,
}

impl<V> KeyedArena<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the slot for `key`, creating it with `init` when absent.
    pub fn get_or_insert_with(&self, key: &str, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        {
            let entries = self.entries.read();
            if let Some(slot) = entries.get(key) {
                return Arc::clone(slot);
            }
        }

        let mut entries = self.entries.write();
        // Re-check under the write lock: another writer may have won the race
        Arc::clone(
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(init()))),
        )
    }

    /// Fetch the slot for `key` if it exists.
    pub fn get(&self, key: &str) -> Option<Arc<Mutex<V>>> {
        self.entries.read().get(key).map(Arc::clone)
    }

    /// Run `f` against the entry for `key`, if present. The entry lock is
    /// held only for the duration of `f`.
    pub fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let slot = self.get(key)?;
        let mut guard = slot.lock();
        Some(f(&mut guard))
    }

    /// Remove the entry for `key`, returning its last value when this was the
    /// only live handle.
    pub fn remove(&self, key: &str) -> Option<Arc<Mutex<V>>> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the current keys (for iteration outside the index lock).
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl<V: Clone> KeyedArena<V> {
    /// Clone of the entry for `key`, if present.
    pub fn get_cloned(&self, key: &str) -> Option<V> {
        self.get(key).map(|slot| slot.lock().clone())
    }
}
