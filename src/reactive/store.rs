// ============================================================================
// lumen - Reactive Store
// Keyed reactive state with per-key subscriptions
// ============================================================================

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use super::cell::{notify_write, track_read, AnySource, CellInner};
use super::context::with_context;

// =============================================================================
// STORE
// =============================================================================

/// A keyed reactive map with per-key dependency tracking.
///
/// Each key is backed by its own reactive cell, so a computation that reads
/// one key is re-run only when that key changes. Reads of keys that do not
/// exist yet subscribe to the store's structure instead, and get re-run when
/// any key is inserted or removed.
///
/// Values are [`serde_json::Value`] so the store can hold heterogeneous
/// state behind one uniform accessor surface.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    entries: RefCell<IndexMap<String, Rc<CellInner<Value>>>>,
    /// Bumped on insert and remove. Computations that probed a missing key
    /// subscribe here so structural changes wake them.
    structural: Rc<CellInner<u64>>,
    /// Monotonic write counter, bumped on every accepted mutation.
    /// Non-reactive; callers poll it to detect changes between passes.
    version: std::cell::Cell<u64>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                entries: RefCell::new(IndexMap::new()),
                structural: Rc::new(CellInner::new(0)),
                version: std::cell::Cell::new(0),
            }),
        }
    }

    /// Read a key, subscribing the ambient computation to it.
    ///
    /// Returns `Value::Null` for missing keys, in which case the subscription
    /// lands on the store's structure so a later insert re-runs the reader.
    pub fn get(&self, key: &str) -> Value {
        let entry = self.inner.entries.borrow().get(key).cloned();
        match entry {
            Some(cell) => {
                track_read(&(cell.clone() as Rc<dyn AnySource>));
                cell.get()
            }
            None => {
                track_read(&(self.inner.structural.clone() as Rc<dyn AnySource>));
                Value::Null
            }
        }
    }

    /// Read a key without subscribing.
    pub fn peek(&self, key: &str) -> Value {
        match self.inner.entries.borrow().get(key) {
            Some(cell) => cell.get(),
            None => Value::Null,
        }
    }

    /// Write a key. Existing keys notify only their own subscribers, and only
    /// when the value actually changed. New keys also notify structural
    /// subscribers.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let existing = self.inner.entries.borrow().get(key).cloned();
        match existing {
            Some(cell) => {
                if cell.set(value) {
                    self.bump_version();
                    with_context(|ctx| ctx.increment_write_version());
                    notify_write(&*cell);
                }
            }
            None => {
                let cell = Rc::new(CellInner::new(value));
                self.inner
                    .entries
                    .borrow_mut()
                    .insert(key.to_string(), cell);
                self.bump_version();
                self.bump_structural();
            }
        }
    }

    /// Remove a key. Subscribers of the key itself and structural subscribers
    /// are both notified.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.entries.borrow_mut().shift_remove(key);
        removed.map(|cell| {
            self.bump_version();
            with_context(|ctx| ctx.increment_write_version());
            notify_write(&*cell);
            self.bump_structural();
            cell.get()
        })
    }

    /// Check for a key, subscribing to the store's structure.
    pub fn contains_key(&self, key: &str) -> bool {
        track_read(&(self.inner.structural.clone() as Rc<dyn AnySource>));
        self.inner.entries.borrow().contains_key(key)
    }

    /// Number of keys, untracked.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order, untracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Untracked snapshot of the whole store as a JSON object.
    pub fn snapshot(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .inner
            .entries
            .borrow()
            .iter()
            .map(|(k, cell)| (k.clone(), cell.get()))
            .collect();
        Value::Object(map)
    }

    /// Count of accepted mutations since creation. Unchanged writes do not
    /// advance it.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    fn bump_version(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
    }

    fn bump_structural(&self) {
        let next = self.inner.structural.with(|v| *v) + 1;
        self.inner.structural.set(next);
        with_context(|ctx| ctx.increment_write_version());
        notify_write(&*self.inner.structural);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
