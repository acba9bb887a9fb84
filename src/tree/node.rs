// ============================================================================
// lumen - Tree Nodes
// Value-level description of desired output
// ============================================================================

use std::rc::Rc;

use crate::tree::component::ComponentRef;
use crate::tree::props::Props;

// =============================================================================
// NODE TYPES
// =============================================================================

/// One node of a tree description.
///
/// Descriptions are plain values: building one performs no output mutation
/// and holds no live resources. The reconciler turns a description into live
/// output and keeps it current across re-renders.
#[derive(Clone)]
pub enum VNode {
    Text(String),
    Element(ElementNode),
    Component(ComponentNode),
    Fragment(Vec<VNode>),
}

/// A described output element with a tag, props, and children.
#[derive(Clone)]
pub struct ElementNode {
    pub tag: String,
    pub props: Props,
    pub children: Vec<VNode>,
    pub key: Option<String>,
    pub hydration_id: Option<String>,
}

/// A described component instance site.
///
/// `children` are slot children: passed through to the instance, rendered
/// wherever its render function places them.
#[derive(Clone)]
pub struct ComponentNode {
    pub type_ref: ComponentRef,
    pub props: Props,
    pub children: Vec<VNode>,
    pub key: Option<String>,
    pub hydration_id: Option<String>,
}

/// Node kind for the uniform constructor.
pub enum NodeKind {
    Element(String),
    Component(ComponentRef),
    Fragment,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Uniform constructor. Children are normalized: adjacent text runs merge
/// into one text node.
pub fn create_node(kind: NodeKind, props: Props, children: Vec<VNode>) -> VNode {
    let children = normalize_children(children);
    match kind {
        NodeKind::Element(tag) => VNode::Element(ElementNode {
            tag,
            props,
            children,
            key: None,
            hydration_id: None,
        }),
        NodeKind::Component(type_ref) => VNode::Component(ComponentNode {
            type_ref,
            props,
            children,
            key: None,
            hydration_id: None,
        }),
        NodeKind::Fragment => VNode::Fragment(children),
    }
}

pub fn element(tag: impl Into<String>, props: Props, children: Vec<VNode>) -> VNode {
    create_node(NodeKind::Element(tag.into()), props, children)
}

/// Text node. Anything printable works, numbers included.
pub fn text(value: impl ToString) -> VNode {
    VNode::Text(value.to_string())
}

pub fn component(type_ref: &ComponentRef, props: Props, children: Vec<VNode>) -> VNode {
    create_node(NodeKind::Component(type_ref.clone()), props, children)
}

pub fn fragment(children: Vec<VNode>) -> VNode {
    create_node(NodeKind::Fragment, Props::new(), children)
}

/// Merge adjacent text nodes into one. A run of text children always lands
/// in a single live text node, so merging here keeps descriptions and output
/// in one-to-one correspondence.
pub fn normalize_children(children: Vec<VNode>) -> Vec<VNode> {
    let mut out: Vec<VNode> = Vec::with_capacity(children.len());
    for child in children {
        match (out.last_mut(), child) {
            (Some(VNode::Text(prev)), VNode::Text(next)) => prev.push_str(&next),
            (_, child) => out.push(child),
        }
    }
    out
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl VNode {
    /// Stable name of the node's kind, used in derived child keys and
    /// diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            VNode::Text(_) => "text",
            VNode::Element(_) => "element",
            VNode::Component(_) => "component",
            VNode::Fragment(_) => "fragment",
        }
    }

    /// Element tag or component type name, when the node has one.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            VNode::Element(el) => Some(&el.tag),
            VNode::Component(c) => Some(&c.type_ref.name),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            VNode::Element(el) => el.key.as_deref(),
            VNode::Component(c) => c.key.as_deref(),
            _ => None,
        }
    }

    /// Attach an explicit reconciliation key. No-op on text and fragments,
    /// which carry no key slot.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        match &mut self {
            VNode::Element(el) => el.key = Some(key.into()),
            VNode::Component(c) => c.key = Some(key.into()),
            _ => {}
        }
        self
    }

    pub fn hydration_id(&self) -> Option<&str> {
        match self {
            VNode::Element(el) => el.hydration_id.as_deref(),
            VNode::Component(c) => c.hydration_id.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn set_hydration_id(&mut self, id: String) {
        match self {
            VNode::Element(el) => el.hydration_id = Some(id),
            VNode::Component(c) => c.hydration_id = Some(id),
            _ => {}
        }
    }

    /// Whether any component node appears in this subtree. Subtrees without
    /// components are pure output and can be skipped wholesale when their
    /// descriptions match.
    pub fn contains_component(&self) -> bool {
        match self {
            VNode::Text(_) => false,
            VNode::Component(_) => true,
            VNode::Element(el) => el.children.iter().any(VNode::contains_component),
            VNode::Fragment(children) => children.iter().any(VNode::contains_component),
        }
    }

    /// Deep structural equality: attrs by value, handlers and component
    /// types by identity. The update short-circuit for whole subtrees.
    pub fn desc_eq(&self, other: &VNode) -> bool {
        match (self, other) {
            (VNode::Text(a), VNode::Text(b)) => a == b,
            (VNode::Element(a), VNode::Element(b)) => {
                a.tag == b.tag
                    && a.key == b.key
                    && a.props.shallow_eq(&b.props)
                    && children_eq(&a.children, &b.children)
            }
            (VNode::Component(a), VNode::Component(b)) => {
                Rc::ptr_eq(&a.type_ref, &b.type_ref)
                    && a.key == b.key
                    && a.props.shallow_eq(&b.props)
                    && children_eq(&a.children, &b.children)
            }
            (VNode::Fragment(a), VNode::Fragment(b)) => children_eq(a, b),
            _ => false,
        }
    }
}

fn children_eq(a: &[VNode], b: &[VNode]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.desc_eq(y))
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VNode::Text(s) => f.debug_tuple("Text").field(s).finish(),
            VNode::Element(el) => f
                .debug_struct("Element")
                .field("tag", &el.tag)
                .field("key", &el.key)
                .field("children", &el.children.len())
                .finish(),
            VNode::Component(c) => f
                .debug_struct("Component")
                .field("type", &c.type_ref.name)
                .field("key", &c.key)
                .finish(),
            VNode::Fragment(children) => {
                f.debug_tuple("Fragment").field(&children.len()).finish()
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_accepts_strings_and_numbers() {
        assert!(matches!(text("hi"), VNode::Text(s) if s == "hi"));
        assert!(matches!(text(42), VNode::Text(s) if s == "42"));
        assert!(matches!(text(2.5), VNode::Text(s) if s == "2.5"));
    }

    #[test]
    fn adjacent_text_children_merge() {
        let node = element(
            "p",
            Props::new(),
            vec![text("hello "), text("world"), element("b", Props::new(), vec![]), text("!")],
        );
        let VNode::Element(el) = node else {
            panic!("expected element");
        };
        assert_eq!(el.children.len(), 3);
        assert!(matches!(&el.children[0], VNode::Text(s) if s == "hello world"));
        assert!(matches!(&el.children[2], VNode::Text(s) if s == "!"));
    }

    #[test]
    fn desc_eq_requires_identical_attrs() {
        let a = element("div", Props::new().attr("id", json!("x")), vec![text("hi")]);
        let b = element("div", Props::new().attr("id", json!("x")), vec![text("hi")]);
        let c = element("div", Props::new().attr("id", json!("y")), vec![text("hi")]);
        assert!(a.desc_eq(&b));
        assert!(!a.desc_eq(&c));
    }

    #[test]
    fn desc_eq_distinguishes_kinds() {
        let a = text("hi");
        let b = fragment(vec![text("hi")]);
        assert!(!a.desc_eq(&b));
    }

    #[test]
    fn with_key_sets_explicit_key() {
        let node = element("li", Props::new(), vec![]).with_key("row-3");
        assert_eq!(node.key(), Some("row-3"));
        // Text has no key slot
        assert_eq!(text("x").with_key("k").key(), None);
    }
}
