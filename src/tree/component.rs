// ============================================================================
// lumen - Component Types
// Named render functions with capability declarations
// ============================================================================

use std::rc::Rc;

use crate::error::CoreError;
use crate::lifecycle::instance::RenderScope;
use crate::tree::node::VNode;

/// Shared handle to a component type.
///
/// Two described component nodes refer to the same component when their
/// handles are pointer-equal; the differ uses that identity to decide whether
/// an instance can be updated in place or must be replaced.
pub type ComponentRef = Rc<ComponentType>;

/// Render function of a component type. Failures propagate to the nearest
/// error boundary.
pub type RenderFn = Box<dyn Fn(&RenderScope) -> Result<VNode, CoreError>>;

/// Fallback render function, invoked when the type acts as an error boundary.
pub type FallbackFn = Box<dyn Fn(&CoreError) -> VNode>;

// =============================================================================
// COMPONENT TYPE
// =============================================================================

/// A component type: a named render function plus the capabilities its
/// instances are granted when the host's gateway approves them.
///
/// A type with a `fallback` is an error boundary: unrecoverable diff errors
/// raised anywhere in its subtree render the fallback in place of the
/// regular output.
pub struct ComponentType {
    pub name: String,
    pub render: RenderFn,
    pub fallback: Option<FallbackFn>,
    pub capabilities: Vec<String>,
}

impl ComponentType {
    pub fn is_error_boundary(&self) -> bool {
        self.fallback.is_some()
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("error_boundary", &self.is_error_boundary())
            .finish()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

pub struct ComponentTypeBuilder {
    name: String,
    render: RenderFn,
    fallback: Option<FallbackFn>,
    capabilities: Vec<String>,
}

impl ComponentTypeBuilder {
    pub fn capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(name.into());
        self
    }

    /// Make this type an error boundary with the given fallback renderer.
    pub fn fallback(mut self, f: impl Fn(&CoreError) -> VNode + 'static) -> Self {
        self.fallback = Some(Box::new(f));
        self
    }

    pub fn build(self) -> ComponentRef {
        Rc::new(ComponentType {
            name: self.name,
            render: self.render,
            fallback: self.fallback,
            capabilities: self.capabilities,
        })
    }
}

/// Start building a component type from its name and an infallible render
/// function.
pub fn component_type(
    name: impl Into<String>,
    render: impl Fn(&RenderScope) -> VNode + 'static,
) -> ComponentTypeBuilder {
    try_component_type(name, move |scope| Ok(render(scope)))
}

/// Like [`component_type`], for render functions that can fail.
pub fn try_component_type(
    name: impl Into<String>,
    render: impl Fn(&RenderScope) -> Result<VNode, CoreError> + 'static,
) -> ComponentTypeBuilder {
    ComponentTypeBuilder {
        name: name.into(),
        render: Box::new(render),
        fallback: None,
        capabilities: Vec::new(),
    }
}
