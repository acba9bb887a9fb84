// ============================================================================
// lumen - Hydration
// Adopt pre-rendered live output instead of rebuilding it
// ============================================================================

use crate::devtools::DevtoolsEvent;
use crate::error::{CoreError, DiffError};
use crate::lifecycle::instance::instance_serial;
use crate::lifecycle::Stage;
use crate::output::{LiveNodeFlags, LiveNodeId};
use crate::reconcile::{LifecycleEvent, Reconciler, RenderedNode};
use crate::tree::{ComponentNode, ElementNode, VNode};

impl Reconciler<'_> {
    /// First render over pre-existing output: walk the description in order,
    /// binding each node to the live node at the same position. Matching
    /// nodes are adopted in place and flagged; mismatches are reported and
    /// recreated.
    pub fn hydrate_install(
        &mut self,
        desc: VNode,
        container: LiveNodeId,
    ) -> Result<RenderedNode, CoreError> {
        let existing = if occupies_served_slot(&desc) {
            self.tree.children(container).into_iter().next()
        } else {
            None
        };
        let rendered = self.hydrate_node(desc, existing)?;
        self.tree.set_children(container, vec![rendered.live]);
        Ok(rendered)
    }

    fn hydrate_node(
        &mut self,
        desc: VNode,
        live: Option<LiveNodeId>,
    ) -> Result<RenderedNode, CoreError> {
        let Some(live) = live else {
            // Nothing pre-rendered at this position
            return self.create(desc);
        };
        match desc {
            VNode::Text(value) => match self.tree.text(live) {
                Some(current) => {
                    if current != value {
                        self.report_recoverable(
                            DiffError::HydrationMismatch {
                                expected: format!("text `{value}`"),
                                found: format!("text `{current}`"),
                            },
                            "hydrate",
                        );
                        self.tree.set_text(live, &value);
                    }
                    self.tree.set_flag(live, LiveNodeFlags::HYDRATED);
                    Ok(RenderedNode {
                        desc: VNode::Text(value),
                        live,
                        component: None,
                        output: None,
                        children: Vec::new(),
                    })
                }
                None => {
                    let found = self.describe(live);
                    self.adopt_failure("text".to_string(), found, VNode::Text(value), live)
                }
            },
            VNode::Element(el) => {
                if self.tree.tag(live).as_deref() == Some(el.tag.as_str()) {
                    self.adopt_element(el, live)
                } else {
                    let expected = format!("<{}>", el.tag);
                    let found = self.describe(live);
                    self.adopt_failure(expected, found, VNode::Element(el), live)
                }
            }
            VNode::Component(node) => self.hydrate_component(node, live),
            VNode::Fragment(children) => self.hydrate_fragment(children, live),
        }
    }

    fn adopt_element(
        &mut self,
        el: ElementNode,
        live: LiveNodeId,
    ) -> Result<RenderedNode, CoreError> {
        // Attributes converge on the description; annotation attrs left by
        // the serializer fall away here
        for (name, value) in &el.props.attrs {
            self.tree.set_attr(live, name, value.clone());
        }
        for name in self.tree.attr_names(live) {
            if !el.props.attrs.contains_key(&name) {
                self.tree.remove_attr(live, &name);
            }
        }
        // Markup cannot carry closures; handlers attach during adoption
        self.tree.set_events(live, el.props.events.clone());
        self.tree.set_flag(live, LiveNodeFlags::HYDRATED);

        let live_children = self.tree.children(live);
        let mut served = 0usize;
        let mut rendered_children = Vec::with_capacity(el.children.len());
        for child in el.children.clone() {
            // Empty fragments serialize to nothing and own no served slot
            let slot = if occupies_served_slot(&child) {
                let slot = live_children.get(served).copied();
                served += 1;
                slot
            } else {
                None
            };
            let rendered = self.hydrate_node(child, slot)?;
            rendered_children.push(rendered);
        }
        // Surplus pre-rendered children have no description behind them
        for surplus in live_children.iter().skip(served) {
            if self.tree.contains(*surplus) {
                self.tree.remove_subtree(*surplus);
            }
        }
        let lives = rendered_children.iter().map(|c| c.live).collect();
        self.tree.set_children(live, lives);
        Ok(RenderedNode {
            desc: VNode::Element(el),
            live,
            component: None,
            output: None,
            children: rendered_children,
        })
    }

    fn hydrate_component(
        &mut self,
        node: ComponentNode,
        live: LiveNodeId,
    ) -> Result<RenderedNode, CoreError> {
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
            Ok(output_desc) => self.hydrate_node(output_desc, Some(live)),
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
            Err(error) => {
                if self.tree.contains(live) {
                    self.tree.remove_subtree(live);
                }
                self.fail_component(node, id, live_mark, comp_mark, error)
            }
        }
    }

    fn hydrate_fragment(
        &mut self,
        mut children: Vec<VNode>,
        live: LiveNodeId,
    ) -> Result<RenderedNode, CoreError> {
        match children.len() {
            0 => match self.tree.text(live) {
                Some(current) if current.is_empty() => {
                    self.tree.set_flag(live, LiveNodeFlags::HYDRATED);
                    Ok(RenderedNode {
                        desc: VNode::Fragment(children),
                        live,
                        component: None,
                        output: None,
                        children: Vec::new(),
                    })
                }
                _ => {
                    let found = self.describe(live);
                    self.adopt_failure(
                        "empty fragment".to_string(),
                        found,
                        VNode::Fragment(children),
                        live,
                    )
                }
            },
            1 => {
                let rendered = self.hydrate_node(children.remove(0), Some(live))?;
                Ok(RenderedNode {
                    desc: VNode::Fragment(vec![rendered.desc.clone()]),
                    live: rendered.live,
                    component: None,
                    output: None,
                    children: vec![rendered],
                })
            }
            _ => {
                // Serialized as a wrapper element
                if self.tree.tag(live).as_deref() != Some("div") {
                    let found = self.describe(live);
                    return self.adopt_failure(
                        "fragment wrapper <div>".to_string(),
                        found,
                        VNode::Fragment(children),
                        live,
                    );
                }
                self.tree.set_flag(live, LiveNodeFlags::HYDRATED);
                let live_children = self.tree.children(live);
                let mut served = 0usize;
                let mut rendered_children = Vec::with_capacity(children.len());
                for child in children.clone() {
                    let slot = if occupies_served_slot(&child) {
                        let slot = live_children.get(served).copied();
                        served += 1;
                        slot
                    } else {
                        None
                    };
                    let rendered = self.hydrate_node(child, slot)?;
                    rendered_children.push(rendered);
                }
                for surplus in live_children.iter().skip(served) {
                    if self.tree.contains(*surplus) {
                        self.tree.remove_subtree(*surplus);
                    }
                }
                let lives = rendered_children.iter().map(|c| c.live).collect();
                self.tree.set_children(live, lives);
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

    /// A mismatch is reported, the stray live node dropped, and the
    /// description realized fresh.
    fn adopt_failure(
        &mut self,
        expected: String,
        found: String,
        desc: VNode,
        live: LiveNodeId,
    ) -> Result<RenderedNode, CoreError> {
        self.report_recoverable(DiffError::HydrationMismatch { expected, found }, "hydrate");
        if self.tree.contains(live) {
            self.tree.remove_subtree(live);
        }
        self.create(desc)
    }

    fn describe(&self, live: LiveNodeId) -> String {
        if let Some(tag) = self.tree.tag(live) {
            format!("<{tag}>")
        } else if let Some(text) = self.tree.text(live) {
            format!("text `{text}`")
        } else {
            "missing node".to_string()
        }
    }
}

/// Whether a description contributes a node to served markup. Empty
/// fragments (and single-child fragments wrapping one) serialize to
/// nothing, so the adoption walk must not consume a live position for
/// them; their placeholder is created fresh instead.
fn occupies_served_slot(desc: &VNode) -> bool {
    match desc {
        VNode::Fragment(children) => match children.len() {
            0 => false,
            1 => occupies_served_slot(&children[0]),
            _ => true,
        },
        _ => true,
    }
}

// =============================================================================
// TESTS
// =============================================================================
