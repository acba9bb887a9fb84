// ============================================================================
// lumen - Reactivity
// Fine-grained dependency tracking: cells, computations, batching, stores
// ============================================================================

pub mod batch;
pub mod cell;
pub mod computation;
pub mod context;
pub mod store;

pub use batch::{batch, is_batching, peek, untrack};
pub use cell::{
    cell, cell_with_equals, default_equals, never_equals, AnySource, Cell, CellInner, EqualsFn,
};
pub use computation::{
    effect, effect_with_cleanup, try_effect, CleanupFn, Computation, ComputationFn,
    ComputationStage,
};
pub use context::{is_tracking, with_context, write_version, ReactiveContext};
pub use store::Store;
