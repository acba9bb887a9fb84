// ============================================================================
// lumen - Live Output
// Arena-backed live nodes mutated by the reconciler
// ============================================================================

pub mod node;
pub mod tree;

pub use node::{LiveNode, LiveNodeFlags, LiveNodeId, LiveNodeKind};
pub use tree::LiveTree;
