// ============================================================================
// lumen - Batching
// Coalesce multiple cell writes into a single notification pass
// ============================================================================

use super::computation::ComputationInner;
use super::context::{with_context, MAX_FLUSH_PASSES};

// =============================================================================
// BATCH
// =============================================================================

/// Batch multiple cell writes into a single notification pass.
///
/// While the batch is open, notifications are queued instead of delivered.
/// When the outermost batch closes, the queue is flushed exactly once,
/// deduplicating multiple writes into one re-run per affected computation,
/// which then observes only the final values.
///
/// # Example
///
/// ```
/// use lumen::reactive::{batch, cell, effect};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = cell(1);
/// let b = cell(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let runs_clone = runs.clone();
/// let a_clone = a.clone();
/// let b_clone = b.clone();
/// let _c = effect(move || {
///     let _ = a_clone.get() + b_clone.get();
///     runs_clone.set(runs_clone.get() + 1);
/// });
/// assert_eq!(runs.get(), 1);
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
///
/// // One re-run, not two
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());
            if depth == 0 {
                flush_pending();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read cells without creating subscriptions.
///
/// The ambient computation is temporarily cleared, so reads inside `f` do
/// not register dependencies.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

/// Alias for [`untrack`].
pub fn peek<T>(f: impl FnOnce() -> T) -> T {
    untrack(f)
}

// =============================================================================
// FLUSH
// =============================================================================

/// Drain the pending queue, re-running each distinct computation once per
/// pass. Writes performed by those re-runs queue further work; cascades are
/// bounded by `MAX_FLUSH_PASSES`.
pub(crate) fn flush_pending() {
    let already_flushing = with_context(|ctx| ctx.is_flushing());
    if already_flushing {
        // The active flush loop will pick up whatever was queued.
        return;
    }
    with_context(|ctx| ctx.set_flushing(true));

    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_flushing(false));
        }
    }

    let _guard = FlushGuard;
    let mut passes = 0usize;

    loop {
        let pending = with_context(|ctx| ctx.take_pending());
        if pending.is_empty() {
            break;
        }

        passes += 1;
        if passes > MAX_FLUSH_PASSES {
            tracing::error!(
                passes,
                "flush did not settle; dropping remaining notifications"
            );
            break;
        }

        let mut seen: Vec<*const ComputationInner> = Vec::new();
        for weak in pending {
            let ptr = weak.as_ptr();
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            if let Some(computation) = weak.upgrade() {
                let _ = ComputationInner::execute(&computation);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
