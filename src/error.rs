//! Error types and the error-reporting sink.
//!
//! Three distinct error policies coexist in this crate and are intentionally
//! different:
//!
//! 1. Computation execution errors are caught, logged, and swallowed - the
//!    computation stays subscribed and self-heals on the next dependency
//!    change (see [`crate::reactive::computation`]).
//! 2. Hook-phase errors halt the remaining handlers of that phase and
//!    surface to the phase's caller (see [`crate::lifecycle::hooks`]).
//! 3. Reconciliation errors are reported through [`ErrorReporter`];
//!    recoverable cases keep rendering siblings, unrecoverable cases
//!    propagate to the nearest error boundary (see [`crate::reconcile`]).

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::lifecycle::stage::LifecycleError;

// =============================================================================
// Diffing Errors
// =============================================================================

/// Error raised while reconciling a tree description against live output.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A previously rendered node no longer resolves against the live output
    /// tree. Unrecoverable: propagates to the nearest error boundary.
    #[error("live output for {kind} node no longer resolves")]
    Unresolved { kind: &'static str },

    /// Hydration found a live node that does not match the description at the
    /// same position. Recoverable: the node is recreated.
    #[error("hydration mismatch: expected {expected}, found {found}")]
    HydrationMismatch { expected: String, found: String },

    /// Two siblings carry the same explicit key. Recoverable: the duplicate
    /// is treated as unkeyed.
    #[error("duplicate sibling key `{key}`")]
    DuplicateKey { key: String },
}

impl DiffError {
    /// Recoverable errors are reported and rendering continues; unrecoverable
    /// ones propagate toward an error boundary.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DiffError::Unresolved { .. })
    }
}

// =============================================================================
// Hook Errors
// =============================================================================

/// Error produced by a lifecycle-hook handler or by phase execution.
#[derive(Debug, Clone, Error)]
pub enum HookError {
    /// A handler reported failure.
    #[error("{0}")]
    Handler(String),

    /// Phase execution halted at a failing handler. Handlers after the
    /// failing one did not run.
    #[error("phase `{phase}` halted by handler owned by `{owner}`: {source}")]
    PhaseHalted {
        phase: String,
        owner: String,
        #[source]
        source: Box<HookError>,
    },
}

impl HookError {
    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        HookError::Handler(message.into())
    }
}

// =============================================================================
// Top-Level Error
// =============================================================================

/// Top-level error type for the rendering core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("plugin `{name}` failed: {message}")]
    Plugin { name: String, message: String },
}

// =============================================================================
// Error Reporter
// =============================================================================

/// Sink for diffing and lifecycle errors (external collaborator contract).
///
/// The reconciler reports recoverable errors here and keeps going; the
/// default implementation forwards to `tracing`.
pub trait ErrorReporter {
    fn report(&self, error: &CoreError, context: &str);
}

/// Default reporter backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &CoreError, context: &str) {
        tracing::error!(context, error = %error, "error reported");
    }
}

/// Reporter that collects `(message, context)` pairs. Test helper.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    reports: Rc<RefCell<Vec<(String, String)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reports collected so far.
    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    /// Drain and return all collected reports.
    pub fn take(&self) -> Vec<(String, String)> {
        self.reports.replace(Vec::new())
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &CoreError, context: &str) {
        self.reports
            .borrow_mut()
            .push((error.to_string(), context.to_string()));
    }
}

// =============================================================================
// Tests
// =============================================================================
