// ============================================================================
// lumen - Component Instances
// Per-instance state, context, capabilities, and owned computations
// ============================================================================

use serde_json::Value;
use slotmap::{new_key_type, Key, SlotMap};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::hooks::CapabilityGateway;
use super::stage::{transition, LifecycleError, Stage};
use crate::error::CoreError;
use crate::reactive::{effect, Computation, Store};
use crate::tree::{ComponentRef, Props, VNode};

new_key_type! {
    /// Arena key of one component instance.
    pub struct ComponentId;
}

/// Stable numeric form of an instance id, for hook payloads and devtools
/// events.
pub fn instance_serial(id: ComponentId) -> u64 {
    id.data().as_ffi()
}

// =============================================================================
// INSTANCE
// =============================================================================

/// One live component instance.
pub struct ComponentInstance {
    pub type_ref: ComponentRef,
    pub props: Props,
    pub slot_children: Vec<VNode>,
    /// Reactive keyed state, read through the render scope.
    pub state: Store,
    /// Context values provided to this instance's subtree.
    provided: HashMap<String, Value>,
    /// Capabilities declared by the type and approved by the gateway.
    pub capabilities: HashSet<String>,
    pub stage: Stage,
    pub parent: Option<ComponentId>,
    /// Reactive computations created during render, disposed with the
    /// instance.
    owned: Vec<Computation>,
    pub captured_error: Option<String>,
    /// State version observed by the last render; compared against the
    /// store's current version to decide whether an update can be skipped.
    state_seen: u64,
    /// Context values the last render resolved. A differing snapshot forces
    /// a re-render even when props are unchanged.
    last_context: HashMap<String, Value>,
}

impl ComponentInstance {
    /// Whether the instance's state is unchanged since its last render.
    pub fn state_clean(&self) -> bool {
        self.state.version() == self.state_seen
    }
}

/// Summary of a destroyed instance, reported after removal.
pub struct DestroyedInfo {
    pub name: String,
    pub serial: u64,
    pub capabilities: Vec<String>,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Owner of all component instances for one mounted tree.
///
/// Explicitly constructed and passed where needed; there is no ambient
/// global registry.
pub struct ComponentRegistry {
    instances: SlotMap<ComponentId, ComponentInstance>,
    gateway: Rc<dyn CapabilityGateway>,
}

impl ComponentRegistry {
    pub fn new(gateway: Rc<dyn CapabilityGateway>) -> Self {
        Self {
            instances: SlotMap::with_key(),
            gateway,
        }
    }

    /// Create an instance at stage `Created`. Declared capabilities the
    /// gateway refuses are dropped here, once, at creation.
    pub fn create(
        &mut self,
        type_ref: &ComponentRef,
        props: Props,
        slot_children: Vec<VNode>,
        parent: Option<ComponentId>,
    ) -> ComponentId {
        let capabilities: HashSet<String> = type_ref
            .capabilities
            .iter()
            .filter(|cap| self.gateway.grants(&type_ref.name, cap))
            .cloned()
            .collect();
        let refused: Vec<&String> = type_ref
            .capabilities
            .iter()
            .filter(|cap| !capabilities.contains(*cap))
            .collect();
        if !refused.is_empty() {
            tracing::debug!(component = %type_ref.name, ?refused, "capabilities refused");
        }
        self.instances.insert(ComponentInstance {
            type_ref: type_ref.clone(),
            props,
            slot_children,
            state: Store::new(),
            provided: HashMap::new(),
            capabilities,
            stage: Stage::Created,
            parent,
            owned: Vec::new(),
            captured_error: None,
            state_seen: 0,
            last_context: HashMap::new(),
        })
    }

    pub fn instance(&self, id: ComponentId) -> Option<&ComponentInstance> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.instances.keys().collect()
    }

    pub fn stage(&self, id: ComponentId) -> Option<Stage> {
        self.instances.get(id).map(|i| i.stage)
    }

    /// Advance an instance's lifecycle stage.
    pub fn transition(&mut self, id: ComponentId, to: Stage) -> Result<(), LifecycleError> {
        match self.instances.get_mut(id) {
            Some(instance) => transition(&mut instance.stage, to),
            None => Err(LifecycleError::InvalidTransition {
                from: Stage::Destroyed,
                to,
            }),
        }
    }

    /// Replace an instance's props and slot children ahead of a re-render.
    pub fn set_props(&mut self, id: ComponentId, props: Props, slot_children: Vec<VNode>) {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.props = props;
            instance.slot_children = slot_children;
        }
    }

    /// Run the instance's render function and absorb what it created:
    /// reactive effects into the instance's owned set, provided context
    /// values into its context map. Render failures pass through for the
    /// caller's error boundary handling.
    pub fn render(&mut self, id: ComponentId) -> Result<VNode, CoreError> {
        let Some(scope) = self.scope(id) else {
            return Err(CoreError::Render("render of a missing instance".into()));
        };
        let type_ref = match self.instances.get(id) {
            Some(instance) => instance.type_ref.clone(),
            None => return Err(CoreError::Render("render of a missing instance".into())),
        };
        let result = (type_ref.render)(&scope);
        self.absorb_scope(id, scope);
        result
    }

    /// Build a render scope: a self-contained snapshot handed to the render
    /// function, so rendering never needs to re-borrow the registry.
    pub fn scope(&self, id: ComponentId) -> Option<RenderScope> {
        let instance = self.instances.get(id)?;
        Some(RenderScope {
            id,
            props: instance.props.clone(),
            children: instance.slot_children.clone(),
            state: instance.state.clone(),
            context: self.context_snapshot(id),
            effects: Rc::new(RefCell::new(Vec::new())),
            provided: Rc::new(RefCell::new(Vec::new())),
        })
    }

    /// Move a finished scope's side effects into the instance and record
    /// what the render observed.
    pub fn absorb_scope(&mut self, id: ComponentId, scope: RenderScope) {
        let Some(instance) = self.instances.get_mut(id) else {
            for computation in scope.effects.borrow_mut().drain(..) {
                computation.dispose();
            }
            return;
        };
        instance.owned.append(&mut scope.effects.borrow_mut());
        for (name, value) in scope.provided.borrow_mut().drain(..) {
            instance.provided.insert(name, value);
        }
        instance.state_seen = instance.state.version();
        instance.last_context = scope.context;
    }

    /// Resolve a context value by walking the instance's ancestor chain,
    /// nearest provider wins.
    pub fn resolve_context(&self, id: ComponentId, name: &str) -> Option<Value> {
        let mut current = Some(id);
        while let Some(cid) = current {
            let instance = self.instances.get(cid)?;
            if let Some(value) = instance.provided.get(name) {
                return Some(value.clone());
            }
            current = instance.parent;
        }
        None
    }

    /// Whether the context the instance last rendered with still matches
    /// what its ancestors currently provide.
    pub(crate) fn context_clean(&self, id: ComponentId) -> bool {
        match self.instances.get(id) {
            Some(instance) => self.context_snapshot(id) == instance.last_context,
            None => true,
        }
    }

    pub(crate) fn context_snapshot(&self, id: ComponentId) -> HashMap<String, Value> {
        let mut snapshot = HashMap::new();
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(instance) = self.instances.get(cid) else {
                break;
            };
            chain.push(cid);
            current = instance.parent;
        }
        // Outermost first so nearer providers overwrite
        for cid in chain.into_iter().rev() {
            if let Some(instance) = self.instances.get(cid) {
                for (name, value) in &instance.provided {
                    snapshot.insert(name.clone(), value.clone());
                }
            }
        }
        snapshot
    }

    /// Record a failure on an instance: stage moves to `Error` and the
    /// message is retained until the boundary is reset.
    pub fn capture_error(&mut self, id: ComponentId, message: impl Into<String>) {
        if let Some(instance) = self.instances.get_mut(id) {
            let _ = transition(&mut instance.stage, Stage::Error);
            instance.captured_error = Some(message.into());
        }
    }

    /// Clear a boundary's captured error so the next render pass retries its
    /// regular output. Returns whether the instance held an error.
    pub fn reset_boundary(&mut self, id: ComponentId) -> bool {
        match self.instances.get_mut(id) {
            Some(instance) => {
                let had = instance.captured_error.take().is_some();
                if had {
                    let _ = transition(&mut instance.stage, Stage::Updating);
                }
                had
            }
            None => false,
        }
    }

    /// Tear down one instance: owned computations are disposed, the stage is
    /// driven to `Destroyed`, and the slot is freed.
    pub fn destroy(&mut self, id: ComponentId) -> Option<DestroyedInfo> {
        let mut instance = self.instances.remove(id)?;
        for computation in instance.owned.drain(..) {
            computation.dispose();
        }
        let _ = transition(&mut instance.stage, Stage::Destroyed);
        Some(DestroyedInfo {
            name: instance.type_ref.name.clone(),
            serial: instance_serial(id),
            capabilities: instance.capabilities.into_iter().collect(),
        })
    }

    pub fn destroy_all(&mut self) -> Vec<DestroyedInfo> {
        let ids = self.ids();
        ids.into_iter().filter_map(|id| self.destroy(id)).collect()
    }
}

// =============================================================================
// RENDER SCOPE
// =============================================================================

/// What a render function sees: the instance's props, slot children,
/// reactive state, and resolved context, plus registration points for
/// effects and provided context.
pub struct RenderScope {
    id: ComponentId,
    props: Props,
    children: Vec<VNode>,
    state: Store,
    context: HashMap<String, Value>,
    effects: Rc<RefCell<Vec<Computation>>>,
    provided: Rc<RefCell<Vec<(String, Value)>>>,
}

impl RenderScope {
    pub fn component_id(&self) -> ComponentId {
        self.id
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        self.props.get(name).cloned()
    }

    /// Slot children passed at the component's use site.
    pub fn children(&self) -> &[VNode] {
        &self.children
    }

    /// The instance's reactive state. Reads inside the render subscribe the
    /// enclosing render computation.
    pub fn state(&self) -> Store {
        self.state.clone()
    }

    /// Context value from the nearest providing ancestor, snapshotted at
    /// render start.
    pub fn context(&self, name: &str) -> Option<Value> {
        self.context.get(name).cloned()
    }

    /// Provide a context value to this instance's subtree.
    pub fn provide(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.provided.borrow_mut().push((name.into(), value.into()));
    }

    /// Create a reactive effect owned by the instance; it is disposed when
    /// the instance is destroyed.
    pub fn effect(&self, f: impl FnMut() + 'static) {
        self.effects.borrow_mut().push(effect(f));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::hooks::{AllowAll, StaticGateway};
    use crate::tree::{component_type, text};
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(Rc::new(AllowAll))
    }

    #[test]
    fn gateway_filters_declared_capabilities() {
        let mut registry = ComponentRegistry::new(Rc::new(StaticGateway::new(["storage"])));
        let ty = component_type("Widget", |_| text("x"))
            .capability("storage")
            .capability("network")
            .build();
        let id = registry.create(&ty, Props::new(), vec![], None);
        let granted = &registry.instance(id).unwrap().capabilities;
        assert!(granted.contains("storage"));
        assert!(!granted.contains("network"));
    }

    #[test]
    fn context_resolves_through_ancestors() {
        let mut registry = registry();
        let ty = component_type("Any", |_| text("x")).build();

        let root = registry.create(&ty, Props::new(), vec![], None);
        let scope = registry.scope(root).unwrap();
        scope.provide("theme", json!("dark"));
        registry.absorb_scope(root, scope);

        let child = registry.create(&ty, Props::new(), vec![], Some(root));
        let grandchild = registry.create(&ty, Props::new(), vec![], Some(child));
        assert_eq!(
            registry.resolve_context(grandchild, "theme"),
            Some(json!("dark"))
        );

        // Nearer provider wins
        let scope = registry.scope(child).unwrap();
        scope.provide("theme", json!("light"));
        registry.absorb_scope(child, scope);
        assert_eq!(
            registry.resolve_context(grandchild, "theme"),
            Some(json!("light"))
        );
        assert_eq!(registry.resolve_context(grandchild, "missing"), None);
    }

    #[test]
    fn render_reads_props_and_state() {
        let mut registry = registry();
        let ty = component_type("Greeting", |scope| {
            let name = scope
                .attr("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            text(format!("hello {name}"))
        })
        .build();

        let id = registry.create(&ty, Props::new().attr("name", "ada"), vec![], None);
        let output = registry.render(id).unwrap();
        assert!(matches!(output, VNode::Text(s) if s == "hello ada"));
    }

    #[test]
    fn destroy_disposes_owned_effects() {
        let mut registry = registry();
        let cell = crate::reactive::cell(0);
        let runs = Rc::new(std::cell::Cell::new(0));

        let cell_for_render = cell.clone();
        let runs_for_render = runs.clone();
        let ty = component_type("Watcher", move |scope| {
            let cell = cell_for_render.clone();
            let runs = runs_for_render.clone();
            scope.effect(move || {
                let _ = cell.get();
                runs.set(runs.get() + 1);
            });
            text("x")
        })
        .build();

        let id = registry.create(&ty, Props::new(), vec![], None);
        registry.render(id).unwrap();
        assert_eq!(runs.get(), 1);

        let info = registry.destroy(id).unwrap();
        assert_eq!(info.name, "Watcher");
        cell.set(1);
        // Disposed with the instance, so the write is inert
        assert_eq!(runs.get(), 1);
        assert!(!registry.contains(id));
    }

    #[test]
    fn capture_and_reset_error_cycle() {
        let mut registry = registry();
        let ty = component_type("Boundary", |_| text("x")).build();
        let id = registry.create(&ty, Props::new(), vec![], None);
        registry.transition(id, Stage::Initializing).unwrap();
        registry.transition(id, Stage::Mounted).unwrap();

        registry.capture_error(id, "subtree failed");
        assert_eq!(registry.stage(id), Some(Stage::Error));

        assert!(registry.reset_boundary(id));
        assert_eq!(registry.stage(id), Some(Stage::Updating));
        assert!(registry.instance(id).unwrap().captured_error.is_none());
        assert!(!registry.reset_boundary(id));
    }
}
