// ============================================================================
// lumen - Computation
// Re-runnable reactive functions with automatic dependency tracking
// ============================================================================
//
// A computation re-runs whenever a cell it read during its most recent
// execution changes. Before every run it unsubscribes from all prior
// dependencies and rebuilds the set from the reads that actually happen,
// so stale subscriptions cannot accumulate.
// ============================================================================

use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::CoreError;

use super::cell::AnySource;
use super::context::with_context;

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Cleanup function captured from a run, executed before the next run or on
/// disposal.
pub type CleanupFn = Box<dyn FnOnce()>;

/// Computation function signature. Errors are logged and swallowed on
/// reactive re-runs (the computation stays subscribed).
pub type ComputationFn = Box<dyn FnMut() -> Result<Option<CleanupFn>, CoreError>>;

// =============================================================================
// STAGE
// =============================================================================

/// Computation lifecycle stage. Transitions are monotonic:
/// `Initial -> Active -> Disposed`, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationStage {
    Initial,
    Active,
    Disposed,
}

// =============================================================================
// COMPUTATION INNER
// =============================================================================

/// Shared computation state.
pub struct ComputationInner {
    stage: StdCell<ComputationStage>,
    /// Re-entrancy guard: execution while already executing is a no-op.
    /// This also means a computation writing to one of its own dependencies
    /// does not re-run itself synchronously - the nested notification is
    /// dropped for this computation.
    running: StdCell<bool>,
    func: RefCell<Option<ComputationFn>>,
    deps: RefCell<Vec<Rc<dyn AnySource>>>,
    cleanup: RefCell<Option<CleanupFn>>,
    self_weak: RefCell<Weak<ComputationInner>>,
}

impl ComputationInner {
    pub(crate) fn new(func: ComputationFn) -> Rc<Self> {
        let computation = Rc::new(Self {
            stage: StdCell::new(ComputationStage::Initial),
            running: StdCell::new(false),
            func: RefCell::new(Some(func)),
            deps: RefCell::new(Vec::new()),
            cleanup: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });
        *computation.self_weak.borrow_mut() = Rc::downgrade(&computation);
        computation
    }

    pub fn stage(&self) -> ComputationStage {
        self.stage.get()
    }

    pub fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    /// Record a dependency (idempotent per run).
    pub(crate) fn add_dep(&self, source: Rc<dyn AnySource>) {
        let ptr = Rc::as_ptr(&source) as *const ();
        let mut deps = self.deps.borrow_mut();
        if !deps.iter().any(|d| Rc::as_ptr(d) as *const () == ptr) {
            deps.push(source);
        }
    }

    /// Unsubscribe from every dependency and clear the set.
    fn purge_deps(&self, self_ptr: *const ComputationInner) {
        let mut deps = self.deps.borrow_mut();
        for dep in deps.drain(..) {
            dep.remove_subscriber(self_ptr);
        }
    }

    /// Execute the computation.
    ///
    /// No-op when disposed or already running. Otherwise: run the prior
    /// cleanup, purge the dependency set, install self as the ambient
    /// computation, run the function (capturing a returned cleanup), and
    /// restore the previous ambient computation.
    ///
    /// Errors are logged here; the computation is NOT disposed and will
    /// re-run on the next dependency change.
    pub(crate) fn execute(this: &Rc<Self>) -> Result<(), CoreError> {
        if this.stage.get() == ComputationStage::Disposed || this.running.get() {
            return Ok(());
        }

        struct ExecGuard<'a> {
            inner: &'a ComputationInner,
            prev_active: Option<Option<Weak<ComputationInner>>>,
            prev_untracking: bool,
        }

        impl Drop for ExecGuard<'_> {
            fn drop(&mut self) {
                if let Some(prev) = self.prev_active.take() {
                    with_context(|ctx| {
                        ctx.set_active_computation(prev);
                        ctx.set_untracking(self.prev_untracking);
                    });
                }
                self.inner.running.set(false);
            }
        }

        this.running.set(true);
        let mut guard = ExecGuard {
            inner: this,
            prev_active: None,
            prev_untracking: false,
        };

        let prior_cleanup = this.cleanup.borrow_mut().take();
        if let Some(cleanup) = prior_cleanup {
            cleanup();
        }

        this.purge_deps(Rc::as_ptr(this));
        this.stage.set(ComputationStage::Active);

        let (prev_active, prev_untracking) = with_context(|ctx| {
            (
                ctx.set_active_computation(Some(Rc::downgrade(this))),
                ctx.set_untracking(false),
            )
        });
        guard.prev_active = Some(prev_active);
        guard.prev_untracking = prev_untracking;

        let result = {
            let mut func = this.func.borrow_mut();
            match func.as_mut() {
                Some(f) => f(),
                None => Ok(None),
            }
        };

        drop(guard);

        match result {
            Ok(cleanup) => {
                if this.stage.get() == ComputationStage::Disposed {
                    // Disposed from within its own run: the fresh cleanup
                    // runs now and the function is released.
                    if let Some(c) = cleanup {
                        c();
                    }
                    this.func.borrow_mut().take();
                } else {
                    *this.cleanup.borrow_mut() = cleanup;
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "computation failed; it stays subscribed and will re-run on the next change"
                );
                Err(err)
            }
        }
    }

    /// Dispose the computation: unsubscribe everywhere, run cleanup, release
    /// the function. Idempotent; safe to call from within its own execution.
    pub(crate) fn dispose(this: &Rc<Self>) {
        if this.stage.get() == ComputationStage::Disposed {
            return;
        }
        this.stage.set(ComputationStage::Disposed);
        this.purge_deps(Rc::as_ptr(this));
        let cleanup = this.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        // The function cell is borrowed while running; execute releases it
        // after the run notices the disposal.
        if !this.running.get() {
            this.func.borrow_mut().take();
        }
    }
}

// =============================================================================
// COMPUTATION - the public handle
// =============================================================================

/// Handle to a computation. Cloning shares the underlying computation.
pub struct Computation {
    inner: Rc<ComputationInner>,
}

impl Clone for Computation {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Computation {
    pub fn stage(&self) -> ComputationStage {
        self.inner.stage()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.stage() == ComputationStage::Disposed
    }

    /// Number of dependencies from the most recent run. Useful in tests.
    pub fn dep_count(&self) -> usize {
        self.inner.dep_count()
    }

    /// Re-run manually. Errors follow the standard policy (logged, kept
    /// subscribed).
    pub fn run(&self) {
        let _ = ComputationInner::execute(&self.inner);
    }

    /// Dispose the computation. Idempotent.
    pub fn dispose(&self) {
        ComputationInner::dispose(&self.inner);
    }

    pub(crate) fn inner(&self) -> &Rc<ComputationInner> {
        &self.inner
    }
}

impl std::fmt::Debug for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computation")
            .field("stage", &self.stage())
            .field("deps", &self.dep_count())
            .finish()
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Create and immediately run a computation.
///
/// # Example
///
/// ```
/// use lumen::reactive::{cell, effect};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = cell(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let seen_clone = seen.clone();
/// let count_clone = count.clone();
/// let _c = effect(move || {
///     seen_clone.set(count_clone.get());
/// });
///
/// count.set(7);
/// assert_eq!(seen.get(), 7);
/// ```
pub fn effect(mut f: impl FnMut() + 'static) -> Computation {
    let inner = ComputationInner::new(Box::new(move || {
        f();
        Ok(None)
    }));
    let _ = ComputationInner::execute(&inner);
    Computation { inner }
}

/// Create and run a computation whose function may return a cleanup closure,
/// executed before the next run and on disposal.
pub fn effect_with_cleanup(
    mut f: impl FnMut() -> Option<CleanupFn> + 'static,
) -> Computation {
    let inner = ComputationInner::new(Box::new(move || Ok(f())));
    let _ = ComputationInner::execute(&inner);
    Computation { inner }
}

/// Create and run a fallible computation. The first run's error propagates
/// to the caller; errors on later reactive re-runs are logged and swallowed.
pub fn try_effect(
    f: impl FnMut() -> Result<Option<CleanupFn>, CoreError> + 'static,
) -> Result<Computation, CoreError> {
    let inner = ComputationInner::new(Box::new(f));
    ComputationInner::execute(&inner)?;
    Ok(Computation { inner })
}

// =============================================================================
// TESTS
// =============================================================================
