// ============================================================================
// lumen - Live Tree
// ============================================================================

use indexmap::IndexMap;
use serde_json::Value;
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;

use super::node::{LiveNode, LiveNodeFlags, LiveNodeId, LiveNodeKind};
use crate::tree::props::EventHandler;

// =============================================================================
// LIVE TREE
// =============================================================================

/// The live output tree the reconciler mutates.
///
/// Nodes live in a slotmap arena; ids stay stable across reparenting and
/// become invalid only on removal. The handle is a cheap clone over shared
/// state, mirroring how the rest of the crate shares single-threaded
/// structures.
#[derive(Clone)]
pub struct LiveTree {
    inner: Rc<RefCell<TreeInner>>,
}

struct TreeInner {
    nodes: SlotMap<LiveNodeId, LiveNode>,
    /// Total nodes ever created. Tests use this to assert reuse.
    created: u64,
    focused: Option<LiveNodeId>,
}

impl LiveTree {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TreeInner {
                nodes: SlotMap::with_key(),
                created: 0,
                focused: None,
            })),
        }
    }

    // =========================================================================
    // CREATION AND REMOVAL
    // =========================================================================

    pub fn create_element(&self, tag: impl Into<String>) -> LiveNodeId {
        let mut inner = self.inner.borrow_mut();
        inner.created += 1;
        inner.nodes.insert(LiveNode::element(tag.into()))
    }

    pub fn create_text(&self, value: impl Into<String>) -> LiveNodeId {
        let mut inner = self.inner.borrow_mut();
        inner.created += 1;
        inner.nodes.insert(LiveNode::text(value.into()))
    }

    /// Remove a node and everything under it from the arena.
    pub fn remove_subtree(&self, id: LiveNodeId) {
        self.detach(id);
        let mut inner = self.inner.borrow_mut();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = inner.nodes.remove(current) {
                stack.extend(node.children);
            }
            if inner.focused == Some(current) {
                inner.focused = None;
            }
        }
    }

    /// Nodes created over the tree's lifetime, including removed ones.
    pub fn created_count(&self) -> u64 {
        self.inner.borrow().created
    }

    pub fn contains(&self, id: LiveNodeId) -> bool {
        self.inner.borrow().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // STRUCTURE
    // =========================================================================

    /// Append a child, detaching it from any previous parent first.
    pub fn append(&self, parent: LiveNodeId, child: LiveNodeId) {
        self.detach(child);
        let mut inner = self.inner.borrow_mut();
        if let Some(node) = inner.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = inner.nodes.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Replace a parent's child list wholesale. Children already in place
    /// are reparented, not recreated; former children absent from the new
    /// list are left detached for the caller to drop or reuse.
    pub fn set_children(&self, parent: LiveNodeId, children: Vec<LiveNodeId>) {
        let mut inner = self.inner.borrow_mut();
        let old = match inner.nodes.get_mut(parent) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for id in old {
            if let Some(node) = inner.nodes.get_mut(id) {
                node.parent = None;
            }
        }
        for &id in &children {
            if let Some(node) = inner.nodes.get_mut(id) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = inner.nodes.get_mut(parent) {
            node.children = children;
        }
    }

    /// Unlink a node from its parent without removing it from the arena.
    pub fn detach(&self, id: LiveNodeId) {
        let mut inner = self.inner.borrow_mut();
        let Some(parent) = inner.nodes.get(id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = inner.nodes.get_mut(parent) {
            parent_node.children.retain(|&c| c != id);
        }
        if let Some(node) = inner.nodes.get_mut(id) {
            node.parent = None;
        }
    }

    /// Detach and drop all children of a node.
    pub fn clear_children(&self, parent: LiveNodeId) {
        let children = self.children(parent);
        for child in children {
            self.remove_subtree(child);
        }
    }

    pub fn parent(&self, id: LiveNodeId) -> Option<LiveNodeId> {
        self.inner.borrow().nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: LiveNodeId) -> Vec<LiveNodeId> {
        self.inner
            .borrow()
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // CONTENT
    // =========================================================================

    pub fn set_attr(&self, id: LiveNodeId, name: &str, value: Value) {
        let mut inner = self.inner.borrow_mut();
        if let Some(LiveNode {
            kind: LiveNodeKind::Element { attrs, .. },
            ..
        }) = inner.nodes.get_mut(id)
        {
            attrs.insert(name.to_string(), value);
        }
    }

    pub fn remove_attr(&self, id: LiveNodeId, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if let Some(LiveNode {
            kind: LiveNodeKind::Element { attrs, .. },
            ..
        }) = inner.nodes.get_mut(id)
        {
            attrs.shift_remove(name);
        }
    }

    pub fn attr(&self, id: LiveNodeId, name: &str) -> Option<Value> {
        match &self.inner.borrow().nodes.get(id)?.kind {
            LiveNodeKind::Element { attrs, .. } => attrs.get(name).cloned(),
            LiveNodeKind::Text { .. } => None,
        }
    }

    pub fn attr_names(&self, id: LiveNodeId) -> Vec<String> {
        match self.inner.borrow().nodes.get(id).map(|n| &n.kind) {
            Some(LiveNodeKind::Element { attrs, .. }) => attrs.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_text(&self, id: LiveNodeId, new_value: &str) {
        let mut inner = self.inner.borrow_mut();
        if let Some(LiveNode {
            kind: LiveNodeKind::Text { value },
            ..
        }) = inner.nodes.get_mut(id)
        {
            new_value.clone_into(value);
        }
    }

    pub fn text(&self, id: LiveNodeId) -> Option<String> {
        match &self.inner.borrow().nodes.get(id)?.kind {
            LiveNodeKind::Text { value } => Some(value.clone()),
            LiveNodeKind::Element { .. } => None,
        }
    }

    pub fn tag(&self, id: LiveNodeId) -> Option<String> {
        self.inner
            .borrow()
            .nodes
            .get(id)?
            .tag()
            .map(str::to_string)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Replace a node's handler map. Handlers are rebound wholesale on every
    /// update, so stale closures never survive a re-render.
    pub fn set_events(&self, id: LiveNodeId, events: IndexMap<String, EventHandler>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(LiveNode {
            kind: LiveNodeKind::Element { events: slot, .. },
            ..
        }) = inner.nodes.get_mut(id)
        {
            *slot = events;
        }
    }

    pub fn event_count(&self, id: LiveNodeId) -> usize {
        match self.inner.borrow().nodes.get(id).map(|n| &n.kind) {
            Some(LiveNodeKind::Element { events, .. }) => events.len(),
            _ => 0,
        }
    }

    /// Invoke a node's handler for `event`. Returns whether one was bound.
    /// The handler runs with the arena borrow released, so it may freely
    /// read or mutate the tree.
    pub fn dispatch(&self, id: LiveNodeId, event: &str, payload: &Value) -> bool {
        let handler = match self.inner.borrow().nodes.get(id).map(|n| &n.kind) {
            Some(LiveNodeKind::Element { events, .. }) => events.get(event).cloned(),
            _ => None,
        };
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // FLAGS AND FOCUS
    // =========================================================================

    pub fn set_flag(&self, id: LiveNodeId, flag: LiveNodeFlags) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(id) {
            node.flags.insert(flag);
        }
    }

    pub fn has_flag(&self, id: LiveNodeId, flag: LiveNodeFlags) -> bool {
        self.inner
            .borrow()
            .nodes
            .get(id)
            .is_some_and(|n| n.flags.contains(flag))
    }

    pub fn focus(&self, id: LiveNodeId) {
        let mut inner = self.inner.borrow_mut();
        if inner.nodes.contains_key(id) {
            inner.focused = Some(id);
        }
    }

    pub fn focused(&self) -> Option<LiveNodeId> {
        self.inner.borrow().focused
    }

    // =========================================================================
    // DEBUG SERIALIZATION
    // =========================================================================

    /// Serialize a subtree into an HTML-like string. Diagnostic output for
    /// tests and logging; not an escaping serializer.
    pub fn markup(&self, id: LiveNodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: LiveNodeId, out: &mut String) {
        enum Part {
            Tag(String, Vec<(String, Value)>),
            Text(String),
        }
        let (part, children) = {
            let inner = self.inner.borrow();
            let Some(node) = inner.nodes.get(id) else {
                return;
            };
            match &node.kind {
                LiveNodeKind::Element { tag, attrs, .. } => (
                    Part::Tag(
                        tag.clone(),
                        attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    ),
                    node.children.clone(),
                ),
                LiveNodeKind::Text { value } => (Part::Text(value.clone()), Vec::new()),
            }
        };
        match part {
            Part::Text(value) => out.push_str(&value),
            Part::Tag(tag, attrs) => {
                out.push('<');
                out.push_str(&tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(&name);
                    out.push_str("=\"");
                    match value {
                        Value::String(s) => out.push_str(&s),
                        other => out.push_str(&other.to_string()),
                    }
                    out.push('"');
                }
                out.push('>');
                for child in children {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
        }
    }
}

impl Default for LiveTree {
    fn default() -> Self {
        Self::new()
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
    fn ids_stay_valid_across_reparenting() {
        let tree = LiveTree::new();
        let a = tree.create_element("div");
        let b = tree.create_element("span");
        let t = tree.create_text("hi");
        tree.append(a, t);
        assert_eq!(tree.parent(t), Some(a));

        tree.append(b, t);
        assert_eq!(tree.parent(t), Some(b));
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.text(t), Some("hi".to_string()));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let tree = LiveTree::new();
        let root = tree.create_element("div");
        let child = tree.create_element("p");
        let grandchild = tree.create_text("deep");
        tree.append(root, child);
        tree.append(child, grandchild);

        tree.remove_subtree(child);
        assert!(!tree.contains(child));
        assert!(!tree.contains(grandchild));
        assert!(tree.contains(root));
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn set_children_reorders_without_recreating() {
        let tree = LiveTree::new();
        let root = tree.create_element("ul");
        let a = tree.create_element("li");
        let b = tree.create_element("li");
        tree.append(root, a);
        tree.append(root, b);
        let before = tree.created_count();

        tree.set_children(root, vec![b, a]);
        assert_eq!(tree.children(root), vec![b, a]);
        assert_eq!(tree.created_count(), before);
    }

    #[test]
    fn dispatch_invokes_bound_handler() {
        let tree = LiveTree::new();
        let node = tree.create_element("button");
        let hits = Rc::new(RefCell::new(Vec::new()));
        let hits_clone = hits.clone();
        let mut events: IndexMap<String, EventHandler> = IndexMap::new();
        events.insert(
            "click".into(),
            Rc::new(move |payload: &Value| {
                hits_clone.borrow_mut().push(payload.clone());
            }),
        );
        tree.set_events(node, events);

        assert!(tree.dispatch(node, "click", &json!({"x": 1})));
        assert!(!tree.dispatch(node, "hover", &Value::Null));
        assert_eq!(hits.borrow().as_slice(), &[json!({"x": 1})]);
    }

    #[test]
    fn markup_serializes_subtree() {
        let tree = LiveTree::new();
        let root = tree.create_element("div");
        tree.set_attr(root, "id", json!("app"));
        let p = tree.create_element("p");
        tree.append(root, p);
        tree.append(p, tree.create_text("hello"));
        assert_eq!(tree.markup(root), "<div id=\"app\"><p>hello</p></div>");
    }

    #[test]
    fn focus_clears_when_node_removed() {
        let tree = LiveTree::new();
        let node = tree.create_element("input");
        tree.focus(node);
        assert_eq!(tree.focused(), Some(node));
        tree.remove_subtree(node);
        assert_eq!(tree.focused(), None);
    }
}
