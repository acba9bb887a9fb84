// ============================================================================
// lumen - Reconciler
// Turns tree descriptions into live output and keeps them current
// ============================================================================

pub mod keyed;

use indexmap::IndexMap;
use std::collections::HashSet;
use std::rc::Rc;

use crate::devtools::{Devtools, DevtoolsEvent};
use crate::error::{CoreError, DiffError, ErrorReporter};
use crate::lifecycle::instance::{instance_serial, ComponentId, ComponentRegistry, DestroyedInfo};
use crate::lifecycle::stage::{LifecycleError, Stage};
use crate::output::{LiveNodeId, LiveTree};
use crate::tree::{ComponentNode, ElementNode, VNode};

pub use keyed::{child_keys, ChildKey};

// =============================================================================
// RENDERED NODES
// =============================================================================

/// Book-keeping for one described node that has been realized as live
/// output. The reconciler keeps the rendered tree of the previous pass and
/// diffs the next description against it.
pub struct RenderedNode {
    /// The description this realization came from.
    pub desc: VNode,
    /// The single live node this description is bound to.
    pub live: LiveNodeId,
    /// Set for component nodes: the instance driving the subtree.
    pub component: Option<ComponentId>,
    /// Set for component nodes: the realized render output.
    pub output: Option<Box<RenderedNode>>,
    /// Realized children, for elements and fragments.
    pub children: Vec<RenderedNode>,
}

/// Lifecycle transitions observed during a reconcile pass. They are queued
/// while the output tree is being mutated and fired afterwards, so hook
/// handlers always observe a settled tree.
pub enum LifecycleEvent {
    Mounted(ComponentId),
    Updated(ComponentId),
    Destroyed(DestroyedInfo),
}

enum FragmentClass {
    Empty,
    Single,
    Many,
}

/// Fragments bind to exactly one live node: none of their children means an
/// empty text node, one child is passed through, several get a wrapper
/// element.
fn fragment_class(len: usize) -> FragmentClass {
    match len {
        0 => FragmentClass::Empty,
        1 => FragmentClass::Single,
        _ => FragmentClass::Many,
    }
}

const FRAGMENT_WRAPPER_TAG: &str = "div";

fn children_desc_eq(a: &[VNode], b: &[VNode]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.desc_eq(y))
}

// =============================================================================
// RECONCILER
// =============================================================================

/// One reconcile pass over a mounted tree.
///
/// Constructed per pass; the created-node journals let an error boundary
/// roll back partial work from a failed subtree.
pub struct Reconciler<'a> {
    pub(crate) tree: &'a LiveTree,
    pub(crate) registry: &'a mut ComponentRegistry,
    pub(crate) reporter: &'a dyn ErrorReporter,
    pub(crate) devtools: Option<&'a Devtools>,
    pub(crate) component_stack: Vec<ComponentId>,
    pub(crate) events: Vec<LifecycleEvent>,
    pub(crate) created_live: Vec<LiveNodeId>,
    pub(crate) created_components: Vec<ComponentId>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        tree: &'a LiveTree,
        registry: &'a mut ComponentRegistry,
        reporter: &'a dyn ErrorReporter,
        devtools: Option<&'a Devtools>,
    ) -> Self {
        Self {
            tree,
            registry,
            reporter,
            devtools,
            component_stack: Vec::new(),
            events: Vec::new(),
            created_live: Vec::new(),
            created_components: Vec::new(),
        }
    }

    /// Realize `desc` under `container`, diffing against the previous pass
    /// when there is one.
    pub fn install(
        &mut self,
        desc: VNode,
        container: LiveNodeId,
        prev: Option<RenderedNode>,
    ) -> Result<RenderedNode, CoreError> {
        let rendered = match prev {
            Some(prev) => self.reconcile(desc, prev)?,
            None => self.create(desc)?,
        };
        self.tree.set_children(container, vec![rendered.live]);
        Ok(rendered)
    }

    /// Drain the lifecycle events queued by this pass, in occurrence order.
    pub fn take_events(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Realize a description that has no previous rendering.
    pub fn create(&mut self, desc: VNode) -> Result<RenderedNode, CoreError> {
        match desc {
            VNode::Text(value) => {
                let live = self.tree.create_text(&value);
                self.created_live.push(live);
                Ok(RenderedNode {
                    desc: VNode::Text(value),
                    live,
                    component: None,
                    output: None,
                    children: Vec::new(),
                })
            }
            VNode::Element(el) => self.create_element(el),
            VNode::Component(node) => self.create_component(node),
            VNode::Fragment(children) => self.create_fragment(children),
        }
    }

    fn create_element(&mut self, el: ElementNode) -> Result<RenderedNode, CoreError> {
        if el.tag.is_empty() {
            return Err(DiffError::Unresolved { kind: "element" }.into());
        }
        let live = self.tree.create_element(&el.tag);
        self.created_live.push(live);
        for (name, value) in &el.props.attrs {
            self.tree.set_attr(live, name, value.clone());
        }
        self.tree.set_events(live, el.props.events.clone());

        let mut children = Vec::with_capacity(el.children.len());
        for child in el.children.clone() {
            let rendered = self.create(child)?;
            self.tree.append(live, rendered.live);
            children.push(rendered);
        }
        Ok(RenderedNode {
            desc: VNode::Element(el),
            live,
            component: None,
            output: None,
            children,
        })
    }

    fn create_fragment(&mut self, children: Vec<VNode>) -> Result<RenderedNode, CoreError> {
        match fragment_class(children.len()) {
            FragmentClass::Empty => {
                let live = self.tree.create_text("");
                self.created_live.push(live);
                Ok(RenderedNode {
                    desc: VNode::Fragment(children),
                    live,
                    component: None,
                    output: None,
                    children: Vec::new(),
                })
            }
            FragmentClass::Single => {
                let mut children = children;
                let rendered = self.create(children.remove(0))?;
                Ok(RenderedNode {
                    desc: VNode::Fragment(vec![rendered.desc.clone()]),
                    live: rendered.live,
                    component: None,
                    output: None,
                    children: vec![rendered],
                })
            }
            FragmentClass::Many => {
                let live = self.tree.create_element(FRAGMENT_WRAPPER_TAG);
                self.created_live.push(live);
                let mut rendered_children = Vec::with_capacity(children.len());
                for child in children.clone() {
                    let rendered = self.create(child)?;
                    self.tree.append(live, rendered.live);
                    rendered_children.push(rendered);
                }
                Ok(RenderedNode {
                    desc: VNode::Fragment(children),
                    live,
                    component: None,
                    output: None,
                    children: rendered_children,
                })
            }
        }
    }

    fn create_component(&mut self, node: ComponentNode) -> Result<RenderedNode, CoreError> {
        let parent = self.component_stack.last().copied();
        let id = self.registry.create(
            &node.type_ref,
            node.props.clone(),
            node.children.clone(),
            parent,
        );
        self.created_components.push(id);
        self.registry.transition(id, Stage::Initializing)?;

        let live_mark = self.created_live.len();
        let comp_mark = self.created_components.len();
        self.component_stack.push(id);
        let attempt = match self.registry.render(id) {
            Ok(output_desc) => self.create(output_desc),
            Err(error) => Err(error),
        };
        self.component_stack.pop();

        match attempt {
            Ok(output) => {
                self.registry.transition(id, Stage::Mounted)?;
                self.events.push(LifecycleEvent::Mounted(id));
                if let Some(devtools) = self.devtools {
                    devtools.record(DevtoolsEvent::Mounted {
                        component: instance_serial(id),
                        name: node.type_ref.name.clone(),
                    });
                }
                Ok(RenderedNode {
                    desc: VNode::Component(node),
                    live: output.live,
                    component: Some(id),
                    output: Some(Box::new(output)),
                    children: Vec::new(),
                })
            }
            Err(error) => self.fail_component(node, id, live_mark, comp_mark, error),
        }
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Diff a new description against its previous rendering.
    pub fn reconcile(
        &mut self,
        desc: VNode,
        prev: RenderedNode,
    ) -> Result<RenderedNode, CoreError> {
        // An unchanged pure subtree is reused wholesale. Subtrees holding
        // components cannot take this path: instance state may have moved
        // even when the description has not.
        if !desc.contains_component() && desc.desc_eq(&prev.desc) {
            return Ok(RenderedNode { desc, ..prev });
        }

        match desc {
            VNode::Text(value) => {
                if matches!(prev.desc, VNode::Text(_)) {
                    self.tree.set_text(prev.live, &value);
                    Ok(RenderedNode {
                        desc: VNode::Text(value),
                        live: prev.live,
                        component: None,
                        output: None,
                        children: Vec::new(),
                    })
                } else {
                    self.replace(VNode::Text(value), prev)
                }
            }
            VNode::Element(el) => {
                // A changed explicit key is a new identity even when the
                // tag matches
                let same_identity = matches!(
                    &prev.desc,
                    VNode::Element(p) if p.tag == el.tag
                        && !matches!((&p.key, &el.key), (Some(a), Some(b)) if a != b)
                );
                if same_identity {
                    self.update_element(el, prev)
                } else {
                    self.replace(VNode::Element(el), prev)
                }
            }
            VNode::Component(node) => {
                let same_type = matches!(
                    &prev.desc,
                    VNode::Component(p) if Rc::ptr_eq(&p.type_ref, &node.type_ref)
                );
                if same_type {
                    self.update_component(node, prev)
                } else {
                    self.replace(VNode::Component(node), prev)
                }
            }
            VNode::Fragment(children) => {
                if matches!(prev.desc, VNode::Fragment(_)) {
                    self.update_fragment(children, prev)
                } else {
                    self.replace(VNode::Fragment(children), prev)
                }
            }
        }
    }

    /// Realize a fresh subtree and tear the old one down.
    fn replace(&mut self, desc: VNode, prev: RenderedNode) -> Result<RenderedNode, CoreError> {
        let fresh = self.create(desc)?;
        self.dispose_rendered(prev);
        Ok(fresh)
    }

    fn update_element(
        &mut self,
        el: ElementNode,
        prev: RenderedNode,
    ) -> Result<RenderedNode, CoreError> {
        let live = prev.live;
        if let VNode::Element(prev_el) = &prev.desc {
            if !el.props.shallow_eq(&prev_el.props) {
                for (name, value) in &el.props.attrs {
                    if prev_el.props.attrs.get(name) != Some(value) {
                        self.tree.set_attr(live, name, value.clone());
                    }
                }
                for name in prev_el.props.attrs.keys() {
                    if !el.props.attrs.contains_key(name) {
                        self.tree.remove_attr(live, name);
                    }
                }
            }
        }
        // Handlers are rebound wholesale so closures never go stale
        self.tree.set_events(live, el.props.events.clone());
        let children = self.diff_children(live, el.children.clone(), prev.children)?;
        Ok(RenderedNode {
            desc: VNode::Element(el),
            live,
            component: None,
            output: None,
            children,
        })
    }

    fn update_fragment(
        &mut self,
        mut children: Vec<VNode>,
        prev: RenderedNode,
    ) -> Result<RenderedNode, CoreError> {
        let prev_len = match &prev.desc {
            VNode::Fragment(prev_children) => prev_children.len(),
            _ => 0,
        };
        // A class change swaps the realization shape; rebuild
        let same_class = matches!(
            (fragment_class(children.len()), fragment_class(prev_len)),
            (FragmentClass::Empty, FragmentClass::Empty)
                | (FragmentClass::Single, FragmentClass::Single)
                | (FragmentClass::Many, FragmentClass::Many)
        );
        if !same_class {
            return self.replace(VNode::Fragment(children), prev);
        }

        match fragment_class(children.len()) {
            FragmentClass::Empty => Ok(RenderedNode {
                desc: VNode::Fragment(children),
                live: prev.live,
                component: None,
                output: None,
                children: Vec::new(),
            }),
            FragmentClass::Single => {
                let child_desc = children.remove(0);
                let rendered = match prev.children.into_iter().next() {
                    Some(prev_child) => self.reconcile(child_desc, prev_child)?,
                    None => self.create(child_desc)?,
                };
                Ok(RenderedNode {
                    desc: VNode::Fragment(vec![rendered.desc.clone()]),
                    live: rendered.live,
                    component: None,
                    output: None,
                    children: vec![rendered],
                })
            }
            FragmentClass::Many => {
                let rendered_children =
                    self.diff_children(prev.live, children.clone(), prev.children)?;
                Ok(RenderedNode {
                    desc: VNode::Fragment(children),
                    live: prev.live,
                    component: None,
                    output: None,
                    children: rendered_children,
                })
            }
        }
    }

    fn update_component(
        &mut self,
        node: ComponentNode,
        prev: RenderedNode,
    ) -> Result<RenderedNode, CoreError> {
        let RenderedNode {
            desc: prev_desc,
            live: prev_live,
            component,
            output: prev_output,
            ..
        } = prev;
        let Some(id) = component else {
            return self.replace(
                VNode::Component(node),
                RenderedNode {
                    desc: prev_desc,
                    live: prev_live,
                    component,
                    output: prev_output,
                    children: Vec::new(),
                },
            );
        };

        // A boundary holding a captured error keeps showing its fallback
        // until the host resets it
        let holding_error = self
            .registry
            .instance(id)
            .is_some_and(|i| i.captured_error.is_some());
        if holding_error {
            return Ok(RenderedNode {
                desc: VNode::Component(node),
                live: prev_live,
                component: Some(id),
                output: prev_output,
                children: Vec::new(),
            });
        }

        let desc_unchanged = match &prev_desc {
            VNode::Component(p) => {
                p.props.shallow_eq(&node.props) && children_desc_eq(&p.children, &node.children)
            }
            _ => false,
        };
        let instance_clean = self.registry.instance(id).is_some_and(|i| i.state_clean())
            && self.registry.context_clean(id);
        // A boundary fresh off a reset sits at Updating and must re-render
        let settled = self.registry.stage(id) == Some(Stage::Mounted);
        if desc_unchanged && instance_clean && settled {
            if let Some(devtools) = self.devtools {
                devtools.record(DevtoolsEvent::RenderSkipped {
                    component: instance_serial(id),
                    name: node.type_ref.name.clone(),
                });
            }
            return Ok(RenderedNode {
                desc: VNode::Component(node),
                live: prev_live,
                component: Some(id),
                output: prev_output,
                children: Vec::new(),
            });
        }

        self.registry
            .set_props(id, node.props.clone(), node.children.clone());
        self.begin_update(id)?;

        // Captured ahead of the attempt so a failure can finish tearing the
        // old subtree down
        let mut prior_components = Vec::new();
        if let Some(prev_output) = &prev_output {
            collect_components(prev_output, &mut prior_components);
        }

        let live_mark = self.created_live.len();
        let comp_mark = self.created_components.len();
        self.component_stack.push(id);
        let attempt = match self.registry.render(id) {
            Ok(output_desc) => match prev_output {
                Some(prev_output) => self.reconcile(output_desc, *prev_output),
                None => self.create(output_desc),
            },
            Err(error) => Err(error),
        };
        self.component_stack.pop();

        match attempt {
            Ok(output) => {
                self.registry.transition(id, Stage::Mounted)?;
                self.events.push(LifecycleEvent::Updated(id));
                if let Some(devtools) = self.devtools {
                    devtools.record(DevtoolsEvent::Updated {
                        component: instance_serial(id),
                        name: node.type_ref.name.clone(),
                    });
                }
                Ok(RenderedNode {
                    desc: VNode::Component(node),
                    live: output.live,
                    component: Some(id),
                    output: Some(Box::new(output)),
                    children: Vec::new(),
                })
            }
            Err(error) => {
                for prior in prior_components {
                    if prior != id && self.registry.contains(prior) {
                        if let Some(info) = self.registry.destroy(prior) {
                            self.push_destroyed(info);
                        }
                    }
                }
                if self.tree.contains(prev_live) {
                    self.tree.remove_subtree(prev_live);
                }
                self.fail_component(node, id, live_mark, comp_mark, error)
            }
        }
    }

    // =========================================================================
    // KEYED CHILDREN
    // =========================================================================

    /// Diff a sibling list under one live parent. Children match by key;
    /// matched pairs reconcile in place, leftovers are torn down, and the
    /// parent's child list is rewritten in description order.
    fn diff_children(
        &mut self,
        parent: LiveNodeId,
        new_children: Vec<VNode>,
        prev_children: Vec<RenderedNode>,
    ) -> Result<Vec<RenderedNode>, CoreError> {
        let prev_descs: Vec<VNode> = prev_children.iter().map(|c| c.desc.clone()).collect();
        let prev_keys = child_keys(&prev_descs);
        let mut prev_map: IndexMap<ChildKey, RenderedNode> = IndexMap::new();
        for (key, rendered) in prev_keys.into_iter().zip(prev_children) {
            if let Some(displaced) = prev_map.insert(key, rendered) {
                self.dispose_rendered(displaced);
            }
        }

        let new_keys = child_keys(&new_children);
        let mut seen: HashSet<ChildKey> = HashSet::new();
        let mut rendered_children = Vec::with_capacity(new_children.len());
        for (key, child) in new_keys.into_iter().zip(new_children) {
            let duplicate = !seen.insert(key.clone());
            if duplicate {
                if let ChildKey::Explicit(dup) = &key {
                    self.report_recoverable(
                        DiffError::DuplicateKey { key: dup.clone() },
                        "diff_children",
                    );
                }
            }
            let rendered = if duplicate {
                // The later occurrence loses its key claim and renders fresh
                self.create(child)?
            } else {
                match prev_map.shift_remove(&key) {
                    Some(prev_child) => self.reconcile(child, prev_child)?,
                    None => self.create(child)?,
                }
            };
            rendered_children.push(rendered);
        }

        for (_, stale) in prev_map {
            self.dispose_rendered(stale);
        }

        let lives: Vec<LiveNodeId> = rendered_children.iter().map(|c| c.live).collect();
        self.tree.set_children(parent, lives);
        Ok(rendered_children)
    }

    // =========================================================================
    // TEARDOWN AND ERRORS
    // =========================================================================

    /// Tear down a rendered subtree: instances are destroyed bottom-up, live
    /// nodes removed from the arena.
    pub fn dispose_rendered(&mut self, node: RenderedNode) {
        if let Some(output) = node.output {
            self.dispose_rendered(*output);
        }
        for child in node.children {
            self.dispose_rendered(child);
        }
        if let Some(id) = node.component {
            if let Some(info) = self.registry.destroy(id) {
                self.push_destroyed(info);
            }
        } else if self.tree.contains(node.live) {
            self.tree.remove_subtree(node.live);
        }
    }

    /// Handle a failed subtree under a component. Boundaries absorb the
    /// error and render their fallback; everything else propagates.
    pub(crate) fn fail_component(
        &mut self,
        node: ComponentNode,
        id: ComponentId,
        live_mark: usize,
        comp_mark: usize,
        error: CoreError,
    ) -> Result<RenderedNode, CoreError> {
        let type_ref = node.type_ref.clone();
        let Some(fallback) = type_ref.fallback.as_ref() else {
            return Err(error);
        };

        self.rollback(live_mark, comp_mark);
        self.reporter.report(&error, &type_ref.name);
        if let Some(devtools) = self.devtools {
            devtools.record(DevtoolsEvent::ErrorReported {
                context: type_ref.name.clone(),
                message: error.to_string(),
            });
        }

        let fallback_desc = (fallback)(&error);
        let output = self.create(fallback_desc)?;
        self.registry.capture_error(id, error.to_string());
        Ok(RenderedNode {
            desc: VNode::Component(node),
            live: output.live,
            component: Some(id),
            output: Some(Box::new(output)),
            children: Vec::new(),
        })
    }

    /// Undo creations journaled after the given marks. Instances that never
    /// mounted are destroyed without a lifecycle event.
    fn rollback(&mut self, live_mark: usize, comp_mark: usize) {
        for live in self.created_live.split_off(live_mark) {
            if self.tree.contains(live) {
                self.tree.remove_subtree(live);
            }
        }
        for component in self.created_components.split_off(comp_mark) {
            if self.registry.contains(component) {
                self.registry.destroy(component);
            }
        }
    }

    fn push_destroyed(&mut self, info: DestroyedInfo) {
        if let Some(devtools) = self.devtools {
            devtools.record(DevtoolsEvent::Destroyed {
                component: info.serial,
                name: info.name.clone(),
            });
        }
        self.events.push(LifecycleEvent::Destroyed(info));
    }

    pub(crate) fn report_recoverable(&mut self, error: DiffError, context: &str) {
        debug_assert!(error.is_recoverable());
        let error = CoreError::from(error);
        self.reporter.report(&error, context);
        if let Some(devtools) = self.devtools {
            devtools.record(DevtoolsEvent::ErrorReported {
                context: context.to_string(),
                message: error.to_string(),
            });
        }
    }

    fn begin_update(&mut self, id: ComponentId) -> Result<(), CoreError> {
        match self.registry.stage(id) {
            Some(Stage::Mounted) => {
                self.registry.transition(id, Stage::Updating)?;
                Ok(())
            }
            // A boundary reset leaves the stage here already
            Some(Stage::Updating) => Ok(()),
            Some(from) => Err(LifecycleError::InvalidTransition {
                from,
                to: Stage::Updating,
            }
            .into()),
            None => Err(CoreError::Render("update of a missing instance".into())),
        }
    }
}

/// Collect every component instance id in a rendered subtree.
fn collect_components(node: &RenderedNode, out: &mut Vec<ComponentId>) {
    if let Some(id) = node.component {
        out.push(id);
    }
    if let Some(output) = &node.output {
        collect_components(output, out);
    }
    for child in &node.children {
        collect_components(child, out);
    }
}

// =============================================================================
// TESTS
// =============================================================================
