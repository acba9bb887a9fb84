// ============================================================================
// lumen - Tree Description
// Immutable value-level descriptions of desired output
// ============================================================================

pub mod component;
pub mod node;
pub mod props;

pub use component::{
    component_type, try_component_type, ComponentRef, ComponentType, ComponentTypeBuilder,
};
pub use node::{
    component, create_node, element, fragment, normalize_children, text, ComponentNode,
    ElementNode, NodeKind, VNode,
};
pub use props::{EventHandler, Props};
