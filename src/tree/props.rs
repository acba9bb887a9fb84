// ============================================================================
// lumen - Props
// Attribute and event handler bags carried by tree descriptions
// ============================================================================

use indexmap::IndexMap;
use serde_json::Value;
use std::rc::Rc;

/// Event handler attached to an element description.
///
/// Handlers receive the event payload as a JSON value. Identity (pointer
/// equality) is what the differ compares, so a handler rebuilt every render
/// counts as changed.
pub type EventHandler = Rc<dyn Fn(&Value)>;

// =============================================================================
// PROPS
// =============================================================================

/// Attributes and event handlers for one described node.
///
/// Attributes keep insertion order so serialized output is deterministic.
#[derive(Clone, Default)]
pub struct Props {
    pub attrs: IndexMap<String, Value>,
    pub events: IndexMap<String, EventHandler>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insert.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Builder-style event handler insert.
    pub fn on(mut self, event: impl Into<String>, handler: impl Fn(&Value) + 'static) -> Self {
        self.events.insert(event.into(), Rc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.events.is_empty()
    }

    /// Shallow equality: attributes by value, event handlers by identity.
    ///
    /// This is the update short-circuit test. Two props bags that pass it
    /// produce identical output, so the differ can skip the subtree.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        if self.attrs.len() != other.attrs.len() || self.events.len() != other.events.len() {
            return false;
        }
        for (name, value) in &self.attrs {
            match other.attrs.get(name) {
                Some(v) if v == value => {}
                _ => return false,
            }
        }
        for (name, handler) in &self.events {
            match other.events.get(name) {
                Some(h) if Rc::ptr_eq(h, handler) => {}
                _ => return false,
            }
        }
        true
    }
}

// Debug skips handler bodies; only event names are meaningful.
impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
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
    fn shallow_eq_compares_attrs_by_value() {
        let a = Props::new().attr("id", "x").attr("count", 3);
        let b = Props::new().attr("id", "x").attr("count", 3);
        assert!(a.shallow_eq(&b));

        let c = Props::new().attr("id", "x").attr("count", 4);
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn shallow_eq_compares_events_by_identity() {
        let handler: EventHandler = Rc::new(|_payload: &serde_json::Value| {});
        let mut a = Props::new();
        a.events.insert("click".into(), handler.clone());
        let mut b = Props::new();
        b.events.insert("click".into(), handler);
        assert!(a.shallow_eq(&b));

        let c = Props::new().on("click", |_| {});
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn shallow_eq_detects_missing_keys() {
        let a = Props::new().attr("id", json!("x"));
        let b = Props::new().attr("class", json!("x"));
        assert!(!a.shallow_eq(&b));
    }
}
