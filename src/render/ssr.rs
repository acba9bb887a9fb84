// ============================================================================
// lumen - Server-Side Rendering
// Expand a description to markup with hydration annotations
// ============================================================================

use serde_json::Value;
use std::rc::Rc;

use crate::error::CoreError;
use crate::lifecycle::hooks::CapabilityGateway;
use crate::lifecycle::instance::{ComponentId, ComponentRegistry};
use crate::lifecycle::Stage;
use crate::tree::VNode;

/// Attribute carrying a node's hydration id in serialized output.
pub const HYDRATION_ATTR: &str = "data-hid";

// =============================================================================
// RENDER TO STRING
// =============================================================================

/// Serialize a description to markup.
///
/// Components render against a scratch registry: no lifecycle phases fire
/// and every instance is discarded afterwards. Elements are annotated with
/// hydration ids so client-side adoption can correlate positions.
pub fn render_to_string(
    desc: VNode,
    gateway: Rc<dyn CapabilityGateway>,
) -> Result<String, CoreError> {
    let mut registry = ComponentRegistry::new(gateway);
    let mut expanded = expand(desc, &mut registry, None)?;
    registry.destroy_all();
    annotate(&mut expanded);
    let mut out = String::new();
    write_node(&expanded, &mut out);
    Ok(out)
}

/// Replace every component node with its render output, recursively, so
/// only elements, text, and fragments remain.
pub fn expand(
    desc: VNode,
    registry: &mut ComponentRegistry,
    parent: Option<ComponentId>,
) -> Result<VNode, CoreError> {
    match desc {
        VNode::Text(value) => Ok(VNode::Text(value)),
        VNode::Element(mut el) => {
            el.children = el
                .children
                .into_iter()
                .map(|child| expand(child, registry, parent))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(VNode::Element(el))
        }
        VNode::Fragment(children) => {
            let children = children
                .into_iter()
                .map(|child| expand(child, registry, parent))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(VNode::Fragment(children))
        }
        VNode::Component(node) => {
            let id = registry.create(
                &node.type_ref,
                node.props.clone(),
                node.children.clone(),
                parent,
            );
            let _ = registry.transition(id, Stage::Initializing);
            match registry.render(id) {
                Ok(output) => expand(output, registry, Some(id)),
                Err(error) => match &node.type_ref.fallback {
                    Some(fallback) => {
                        tracing::warn!(
                            component = %node.type_ref.name,
                            error = %error,
                            "server render failed; serializing fallback"
                        );
                        expand((fallback)(&error), registry, Some(id))
                    }
                    None => Err(error),
                },
            }
        }
    }
}

// =============================================================================
// ANNOTATION
// =============================================================================

/// Assign hydration ids across a description. The root gets `h0`; each child
/// id is `{parent}.{index}.{counter}` with a counter that is monotonic over
/// the whole tree, so every id is unique even across reorder-prone shapes.
pub fn annotate(root: &mut VNode) {
    let mut counter = 0u64;
    mark(root, "h0".to_string(), &mut counter);
}

fn mark(node: &mut VNode, id: String, counter: &mut u64) {
    node.set_hydration_id(id.clone());
    let children = match node {
        VNode::Element(el) => Some(&mut el.children),
        VNode::Fragment(children) => Some(children),
        _ => None,
    };
    if let Some(children) = children {
        for (index, child) in children.iter_mut().enumerate() {
            *counter += 1;
            let child_id = format!("{id}.{index}.{counter}");
            mark(child, child_id, counter);
        }
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

fn write_node(node: &VNode, out: &mut String) {
    match node {
        VNode::Text(value) => out.push_str(&escape_text(value)),
        VNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.props.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(&value_to_attr(value)));
                out.push('"');
            }
            if let Some(hid) = &el.hydration_id {
                out.push(' ');
                out.push_str(HYDRATION_ATTR);
                out.push_str("=\"");
                out.push_str(hid);
                out.push('"');
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
        // Mirrors live realization: nothing, the child itself, or a wrapper
        VNode::Fragment(children) => match children.len() {
            0 => {}
            1 => write_node(&children[0], out),
            _ => {
                out.push_str("<div>");
                for child in children {
                    write_node(child, out);
                }
                out.push_str("</div>");
            }
        },
        VNode::Component(_) => {
            debug_assert!(false, "components must be expanded before serialization");
        }
    }
}

fn value_to_attr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

// =============================================================================
// TESTS
// =============================================================================
