// ============================================================================
// lumen - Reactive Context
// Thread-local state for the ambient computation, batching, and flushing
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use super::computation::ComputationInner;

/// Upper bound on cascading flush passes. Writes performed by re-running
/// computations re-queue work; a cycle that never settles is cut here.
pub const MAX_FLUSH_PASSES: usize = 1000;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local reactive context holding all ambient state for reactivity.
///
/// Execution is single-threaded and cooperative: there is exactly one of
/// these per thread and all propagation is synchronous call-stack recursion.
pub struct ReactiveContext {
    /// Currently executing computation, if any. Reads of cells register the
    /// active computation as a subscriber.
    pub active_computation: RefCell<Option<Weak<ComputationInner>>>,

    /// Whether reads are currently untracked (inside `untrack`).
    pub untracking: Cell<bool>,

    /// Global write version - incremented on every cell write that changes
    /// a value.
    pub write_version: Cell<u64>,

    /// Current batch depth (nested batches supported).
    pub batch_depth: Cell<u32>,

    /// Computations queued for re-run when the outermost batch closes.
    pub pending: RefCell<Vec<Weak<ComputationInner>>>,

    /// Whether a flush pass is currently draining the pending queue.
    pub flushing: Cell<bool>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self {
            active_computation: RefCell::new(None),
            untracking: Cell::new(false),
            write_version: Cell::new(1),
            batch_depth: Cell::new(0),
            pending: RefCell::new(Vec::new()),
            flushing: Cell::new(false),
        }
    }

    /// Set the active computation, returning the previous one.
    pub fn set_active_computation(
        &self,
        computation: Option<Weak<ComputationInner>>,
    ) -> Option<Weak<ComputationInner>> {
        self.active_computation.replace(computation)
    }

    /// Get the active computation.
    pub fn active_computation(&self) -> Option<Weak<ComputationInner>> {
        self.active_computation.borrow().clone()
    }

    pub fn has_active_computation(&self) -> bool {
        self.active_computation.borrow().is_some()
    }

    /// Set untracking mode, returning the previous value.
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    /// Increment and return the write version.
    pub fn increment_write_version(&self) -> u64 {
        let v = self.write_version.get() + 1;
        self.write_version.set(v);
        v
    }

    pub fn get_write_version(&self) -> u64 {
        self.write_version.get()
    }

    /// Increment batch depth, returning the new depth.
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Decrement batch depth, returning the new depth.
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Queue a computation for the next flush pass.
    pub fn add_pending(&self, computation: Weak<ComputationInner>) {
        self.pending.borrow_mut().push(computation);
    }

    /// Take the pending queue, leaving it empty.
    pub fn take_pending(&self) -> Vec<Weak<ComputationInner>> {
        self.pending.replace(Vec::new())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Set the flushing flag, returning the previous value.
    pub fn set_flushing(&self, value: bool) -> bool {
        self.flushing.replace(value)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if currently tracking dependencies (inside a computation and not
/// untracking).
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_computation() && !ctx.is_untracking())
}

/// Get the current global write version.
pub fn write_version() -> u64 {
    with_context(|ctx| ctx.get_write_version())
}

// =============================================================================
// TESTS
// =============================================================================
