// ============================================================================
// lumen - Devtools
// Event feed and component graph snapshots for inspection tooling
// ============================================================================

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::lifecycle::instance::{instance_serial, ComponentRegistry};
use crate::lifecycle::Stage;

/// Bounded event buffer size; oldest events drop first.
pub const MAX_EVENTS: usize = 1024;

// =============================================================================
// EVENTS
// =============================================================================

/// One entry in the devtools event feed. Serializable so hosts can ship the
/// feed across a boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DevtoolsEvent {
    Mounted { component: u64, name: String },
    Updated { component: u64, name: String },
    /// An update pass proved the subtree unchanged and skipped it.
    RenderSkipped { component: u64, name: String },
    Destroyed { component: u64, name: String },
    ErrorReported { context: String, message: String },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Devtools sink: a cheap-clone handle the renderer feeds events into and
/// inspection tooling drains.
#[derive(Clone, Default)]
pub struct Devtools {
    events: Rc<RefCell<VecDeque<DevtoolsEvent>>>,
}

impl Devtools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: DevtoolsEvent) {
        let mut events = self.events.borrow_mut();
        if events.len() == MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<DevtoolsEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Capture the current component graph.
    pub fn snapshot(&self, registry: &ComponentRegistry) -> GraphSnapshot {
        let mut components: Vec<ComponentSnapshot> = registry
            .ids()
            .into_iter()
            .filter_map(|id| {
                let instance = registry.instance(id)?;
                Some(ComponentSnapshot {
                    id: instance_serial(id),
                    name: instance.type_ref.name.clone(),
                    stage: instance.stage,
                    parent: instance.parent.map(instance_serial),
                    capabilities: {
                        let mut caps: Vec<String> =
                            instance.capabilities.iter().cloned().collect();
                        caps.sort();
                        caps
                    },
                    state: instance.state.snapshot(),
                    error: instance.captured_error.clone(),
                })
            })
            .collect();
        components.sort_by_key(|c| c.id);
        GraphSnapshot { components }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

#[derive(Debug, Serialize)]
pub struct GraphSnapshot {
    pub components: Vec<ComponentSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ComponentSnapshot {
    pub id: u64,
    pub name: String,
    #[serde(serialize_with = "serialize_stage")]
    pub stage: Stage,
    pub parent: Option<u64>,
    pub capabilities: Vec<String>,
    pub state: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_stage<S: serde::Serializer>(stage: &Stage, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&stage.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
