// ============================================================================
// lumen - Reactive Cell
// The core mutable value holder with a subscriber set
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::computation::ComputationInner;
use super::context::with_context;

// =============================================================================
// EQUALITY
// =============================================================================

/// Equality function deciding whether a write actually changes a cell.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality via `PartialEq`.
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Equality that never matches - every write notifies.
pub fn never_equals<T>(_: &T, _: &T) -> bool {
    false
}

// =============================================================================
// ANY SOURCE - type-erased subscription surface
// =============================================================================

/// Type-erased subscription surface implemented by every cell.
///
/// Computations hold their dependencies as `Rc<dyn AnySource>` so a single
/// computation can subscribe to cells of different value types. Both
/// subscribe and unsubscribe are idempotent.
pub trait AnySource {
    fn add_subscriber(&self, computation: Weak<ComputationInner>);
    fn remove_subscriber(&self, computation: *const ComputationInner);
    fn subscriber_count(&self) -> usize;
    /// Snapshot of live subscribers in subscription order. Dead entries are
    /// pruned as a side effect.
    fn subscribers(&self) -> Vec<Weak<ComputationInner>>;
}

// =============================================================================
// CELL INNER
// =============================================================================

/// Shared cell storage: the value, its equality function, and the subscriber
/// list in subscription order.
pub struct CellInner<T> {
    value: RefCell<T>,
    equals: EqualsFn<T>,
    subscribers: RefCell<Vec<Weak<ComputationInner>>>,
}

impl<T> CellInner<T> {
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self {
            value: RefCell::new(value),
            equals: default_equals::<T>,
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            value: RefCell::new(value),
            equals,
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Store a new value. Returns true if the equality gate considered it a
    /// change; the value is left untouched otherwise.
    pub fn set(&self, value: T) -> bool {
        let changed = !(self.equals)(&self.value.borrow(), &value);
        if changed {
            *self.value.borrow_mut() = value;
        }
        changed
    }
}

impl<T> AnySource for CellInner<T> {
    fn add_subscriber(&self, computation: Weak<ComputationInner>) {
        let ptr = computation.as_ptr();
        let mut subs = self.subscribers.borrow_mut();
        if !subs.iter().any(|s| s.as_ptr() == ptr) {
            subs.push(computation);
        }
    }

    fn remove_subscriber(&self, computation: *const ComputationInner) {
        self.subscribers
            .borrow_mut()
            .retain(|s| s.as_ptr() != computation);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    fn subscribers(&self) -> Vec<Weak<ComputationInner>> {
        let mut subs = self.subscribers.borrow_mut();
        subs.retain(|s| s.strong_count() > 0);
        subs.clone()
    }
}

// =============================================================================
// TRACKING
// =============================================================================

/// Register a read of `source` with the active computation, if tracking.
///
/// Creates the bidirectional link: the computation records the source as a
/// dependency (so it can unsubscribe before its next run) and the source
/// records the computation as a subscriber.
pub(crate) fn track_read(source: &Rc<dyn AnySource>) {
    with_context(|ctx| {
        if ctx.is_untracking() {
            return;
        }
        let Some(weak) = ctx.active_computation() else {
            return;
        };
        if let Some(computation) = weak.upgrade() {
            computation.add_dep(source.clone());
            source.add_subscriber(Rc::downgrade(&computation));
        }
    });
}

/// Notify a source's subscribers after a changed write.
///
/// Inside a batch (or a flush pass) the subscribers are queued and
/// deduplicated; otherwise each is re-run immediately, in subscription
/// order. The snapshot-then-run pattern keeps subscriber mutation during
/// re-runs from invalidating the iteration.
pub(crate) fn notify_write(source: &dyn AnySource) {
    let subs = source.subscribers();
    let deferred = with_context(|ctx| {
        if ctx.is_batching() || ctx.is_flushing() {
            for s in subs.iter() {
                ctx.add_pending(s.clone());
            }
            true
        } else {
            false
        }
    });
    if deferred {
        return;
    }
    for s in subs {
        if let Some(computation) = s.upgrade() {
            // Execution errors are logged inside execute (policy: the
            // computation stays subscribed and re-runs on the next change).
            let _ = ComputationInner::execute(&computation);
        }
    }
}

// =============================================================================
// CELL<T> - the public handle
// =============================================================================

/// A reactive cell holding a value of type `T`.
///
/// Reading inside an active computation registers that computation as a
/// subscriber; writing a value that fails the equality gate notifies the
/// subscribers (immediately, or once per batch).
///
/// # Example
///
/// ```
/// use lumen::reactive::cell;
///
/// let count = cell(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Cell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Cell<T> {
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self {
            inner: Rc::new(CellInner::new(value)),
        }
    }

    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            inner: Rc::new(CellInner::new_with_equals(value, equals)),
        }
    }

    /// Get the current value (cloning), registering a dependency when read
    /// inside an active computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        track_read(&(self.inner.clone() as Rc<dyn AnySource>));
        self.inner.get()
    }

    /// Access the current value with a closure, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(&(self.inner.clone() as Rc<dyn AnySource>));
        self.inner.with(f)
    }

    /// Read without registering a dependency.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    /// Write a new value. Returns true if the value changed; subscribers are
    /// notified only on change.
    pub fn set(&self, value: T) -> bool {
        let changed = self.inner.set(value);
        if changed {
            with_context(|ctx| ctx.increment_write_version());
            notify_write(&*self.inner);
        }
        changed
    }

    /// Update the value in place via a closure.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        let mut value = self.inner.get();
        f(&mut value);
        self.set(value);
    }

    /// Number of live subscribers. Useful in tests.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    /// Type-erased handle for heterogeneous storage.
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone()
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell").field("value", &self.peek()).finish()
    }
}

/// Create a reactive cell. The primary constructor.
pub fn cell<T>(value: T) -> Cell<T>
where
    T: PartialEq + 'static,
{
    Cell::new(value)
}

/// Create a cell with a custom equality function.
pub fn cell_with_equals<T>(value: T, equals: EqualsFn<T>) -> Cell<T>
where
    T: 'static,
{
    Cell::new_with_equals(value, equals)
}

// =============================================================================
// TESTS
// =============================================================================
