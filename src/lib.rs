//! # lumen
//!
//! A reactive rendering core: fine-grained dependency tracking, virtual
//! tree reconciliation, component lifecycle, and server-side rendering
//! with hydration.
//!
//! ## Architecture
//!
//! Rendering is derived end to end. A mounted root runs inside a reactive
//! computation: every [`reactive::Cell`] and [`reactive::Store`] key read
//! while producing descriptions subscribes the mount, and any later write
//! re-runs the pass.
//!
//! ```text
//! cells / stores → root description → reconcile → live output tree
//! ```
//!
//! Descriptions ([`tree::VNode`]) are cheap immutable values rebuilt every
//! pass; the reconciler diffs them against the previous pass and applies
//! the minimal set of mutations to the [`output::LiveTree`]. Components
//! are instances in an arena-backed registry with an explicit lifecycle
//! stage machine, capability-gated hooks, and per-instance reactive state.
//!
//! ## Modules
//!
//! - [`reactive`] - Cells, computations, batching, and the keyed store
//! - [`tree`] - Tree descriptions, props, and component types
//! - [`output`] - The live output tree the reconciler mutates
//! - [`reconcile`] - Keyed diffing and lifecycle-aware reconciliation
//! - [`lifecycle`] - Instances, stages, hooks, capabilities, plugins
//! - [`render`] - App assembly, mounting, SSR, and hydration
//! - [`devtools`] - Event journal and component graph snapshots
//! - [`error`] - Error types and reporting
//!
//! ## Quick start
//!
//! ```
//! use lumen::output::LiveTree;
//! use lumen::reactive::cell;
//! use lumen::render::App;
//! use lumen::tree::text;
//!
//! let app = App::builder().build().unwrap();
//! let tree = LiveTree::new();
//! let container = tree.create_element("root");
//!
//! let count = cell(0);
//! let count_in_root = count.clone();
//! let handle = app
//!     .mount(&tree, container, move || {
//!         text(format!("count={}", count_in_root.get()))
//!     })
//!     .unwrap();
//!
//! count.set(1); // the mounted tree updates in place
//! # let root = tree.children(container)[0];
//! # assert_eq!(tree.text(root), Some("count=1".to_string()));
//! drop(handle);
//! ```

pub mod devtools;
pub mod error;
pub mod lifecycle;
pub mod output;
pub mod reactive;
pub mod reconcile;
pub mod render;
pub mod tree;

pub use error::{CoreError, DiffError, ErrorReporter, HookError};
pub use render::{App, AppBuilder, MountHandle};
