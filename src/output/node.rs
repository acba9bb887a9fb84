// ============================================================================
// lumen - Live Nodes
// ============================================================================

use bitflags::bitflags;
use indexmap::IndexMap;
use serde_json::Value;
use slotmap::new_key_type;

use crate::tree::props::EventHandler;

new_key_type! {
    /// Arena key of one live output node.
    pub struct LiveNodeId;
}

bitflags! {
    /// Per-node state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LiveNodeFlags: u8 {
        /// Adopted from pre-rendered output instead of freshly created.
        const HYDRATED = 1 << 0;
    }
}

/// Payload of a live node: either a tagged element with attributes and
/// event handlers, or a text run.
pub enum LiveNodeKind {
    Element {
        tag: String,
        attrs: IndexMap<String, Value>,
        events: IndexMap<String, EventHandler>,
    },
    Text {
        value: String,
    },
}

/// One node of the live output tree.
pub struct LiveNode {
    pub kind: LiveNodeKind,
    pub flags: LiveNodeFlags,
    pub parent: Option<LiveNodeId>,
    pub children: Vec<LiveNodeId>,
}

impl LiveNode {
    pub(crate) fn element(tag: String) -> Self {
        Self {
            kind: LiveNodeKind::Element {
                tag,
                attrs: IndexMap::new(),
                events: IndexMap::new(),
            },
            flags: LiveNodeFlags::empty(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn text(value: String) -> Self {
        Self {
            kind: LiveNodeKind::Text { value },
            flags: LiveNodeFlags::empty(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            LiveNodeKind::Element { tag, .. } => Some(tag),
            LiveNodeKind::Text { .. } => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, LiveNodeKind::Text { .. })
    }
}
