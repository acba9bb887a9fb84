// ============================================================================
// lumen - App
// Top-level assembly: registries, gateway, reporter, and mounting
// ============================================================================

use futures::executor::block_on;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::devtools::{Devtools, GraphSnapshot};
use crate::error::{CoreError, ErrorReporter, LogReporter};
use crate::lifecycle::hooks::{phases, CapabilityGateway, HookPayload, HookRegistry};
use crate::lifecycle::instance::{instance_serial, ComponentId, ComponentRegistry};
use crate::lifecycle::plugin::{MetadataRegistry, Plugin, PluginRegistry};
use crate::lifecycle::AllowAll;
use crate::output::{LiveNodeId, LiveTree};
use crate::reactive::{self, try_effect, Computation};
use crate::reconcile::{LifecycleEvent, Reconciler, RenderedNode};
use crate::tree::VNode;

// =============================================================================
// APP
// =============================================================================

/// Top-level handle owning everything one rendering host needs: the
/// component registry, hook and plugin registries, the capability gateway,
/// error reporting, and devtools. All collaborators are constructed and
/// wired here; nothing lives in globals.
#[derive(Clone)]
pub struct App {
    inner: Rc<AppInner>,
}

struct AppInner {
    components: RefCell<ComponentRegistry>,
    hooks: HookRegistry,
    plugins: RefCell<PluginRegistry>,
    metadata: RefCell<MetadataRegistry>,
    gateway: Rc<dyn CapabilityGateway>,
    reporter: Rc<dyn ErrorReporter>,
    devtools: Devtools,
    /// Bumped to force a render pass outside any reactive write.
    generation: reactive::Cell<u64>,
}

struct MountState {
    rendered: Option<RenderedNode>,
    hydrating: bool,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn hooks(&self) -> HookRegistry {
        self.inner.hooks.clone()
    }

    pub fn devtools(&self) -> Devtools {
        self.inner.devtools.clone()
    }

    pub fn gateway(&self) -> Rc<dyn CapabilityGateway> {
        self.inner.gateway.clone()
    }

    /// Service value exposed by an active plugin.
    pub fn service(&self, name: &str) -> Option<Value> {
        self.inner.plugins.borrow().service(name)
    }

    pub fn metadata<R>(&self, f: impl FnOnce(&mut MetadataRegistry) -> R) -> R {
        f(&mut self.inner.metadata.borrow_mut())
    }

    /// Serialize a description with hydration annotations, using this
    /// app's capability gateway for component expansion.
    pub fn render_to_string(&self, desc: VNode) -> Result<String, CoreError> {
        super::ssr::render_to_string(desc, self.inner.gateway.clone())
    }

    /// Current component graph, for inspection tooling.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.inner.devtools.snapshot(&self.inner.components.borrow())
    }

    /// Schedule a fresh render pass on every active mount.
    pub fn refresh(&self) {
        self.inner.generation.update(|g| *g += 1);
    }

    /// Clear a boundary's captured error and re-render so its regular
    /// output gets another attempt.
    pub fn reset_error_boundary(&self, id: ComponentId) -> bool {
        let had = self.inner.components.borrow_mut().reset_boundary(id);
        if had {
            self.refresh();
        }
        had
    }

    /// Mount a root description builder into a container. The builder runs
    /// inside a reactive computation: every cell and store read during a
    /// pass re-triggers rendering when written.
    pub fn mount(
        &self,
        tree: &LiveTree,
        container: LiveNodeId,
        root: impl Fn() -> VNode + 'static,
    ) -> Result<MountHandle, CoreError> {
        self.mount_inner(tree, container, root, false)
    }

    /// Like [`mount`](Self::mount), but the first pass adopts pre-rendered
    /// output under the container instead of rebuilding it.
    pub fn hydrate(
        &self,
        tree: &LiveTree,
        container: LiveNodeId,
        root: impl Fn() -> VNode + 'static,
    ) -> Result<MountHandle, CoreError> {
        self.mount_inner(tree, container, root, true)
    }

    fn mount_inner(
        &self,
        tree: &LiveTree,
        container: LiveNodeId,
        root: impl Fn() -> VNode + 'static,
        hydrating: bool,
    ) -> Result<MountHandle, CoreError> {
        let state = Rc::new(RefCell::new(MountState {
            rendered: None,
            hydrating,
        }));
        let app = self.clone();
        let tree_for_effect = tree.clone();
        let state_for_effect = state.clone();
        let computation = try_effect(move || {
            // Subscribes the pass to the refresh lever
            let _ = app.inner.generation.get();
            app.render_pass(&tree_for_effect, container, &root, &state_for_effect)?;
            Ok(None)
        })?;
        Ok(MountHandle {
            app: self.clone(),
            tree: tree.clone(),
            container,
            computation,
            state,
        })
    }

    fn render_pass(
        &self,
        tree: &LiveTree,
        container: LiveNodeId,
        root: &dyn Fn() -> VNode,
        state: &Rc<RefCell<MountState>>,
    ) -> Result<(), CoreError> {
        let desc = root();
        let (prev, hydrating) = {
            let mut state = state.borrow_mut();
            let hydrating = state.hydrating;
            state.hydrating = false;
            (state.rendered.take(), hydrating)
        };

        // The pass runs batched: a render function writing a cell another
        // mount subscribes to would otherwise re-enter this method while
        // the registry is still mutably borrowed. Writes queue and flush
        // once the borrow below is released.
        let (result, events) = reactive::batch(|| {
            let mut registry = self.inner.components.borrow_mut();
            let reporter: &dyn ErrorReporter = &*self.inner.reporter;
            let mut reconciler =
                Reconciler::new(tree, &mut registry, reporter, Some(&self.inner.devtools));
            let result = if hydrating && prev.is_none() {
                reconciler.hydrate_install(desc, container)
            } else {
                reconciler.install(desc, container, prev)
            };
            let events = reconciler.take_events();
            (result, events)
        });

        match result {
            Ok(rendered) => {
                state.borrow_mut().rendered = Some(rendered);
                // Hooks fire only once the output tree has settled
                self.fire_lifecycle_events(events)
            }
            Err(error) => {
                // The root had no boundary to absorb this; drop the output
                // and the instances behind it rather than show a torn tree
                self.inner.reporter.report(&error, "root");
                tree.clear_children(container);
                self.inner.components.borrow_mut().destroy_all();
                Err(error)
            }
        }
    }

    fn fire_lifecycle_events(&self, events: Vec<LifecycleEvent>) -> Result<(), CoreError> {
        for event in events {
            let (phase, serial, name, granted) = match &event {
                LifecycleEvent::Mounted(id) => match self.instance_meta(*id) {
                    Some((name, granted)) => (phases::MOUNT, instance_serial(*id), name, granted),
                    None => continue,
                },
                LifecycleEvent::Updated(id) => match self.instance_meta(*id) {
                    Some((name, granted)) => (phases::UPDATE, instance_serial(*id), name, granted),
                    None => continue,
                },
                LifecycleEvent::Destroyed(info) => (
                    phases::DESTROY,
                    info.serial,
                    info.name.clone(),
                    info.capabilities.iter().cloned().collect(),
                ),
            };
            let payload = HookPayload::new(phase)
                .component(serial)
                .detail(json!({ "component": name }));
            block_on(self.inner.hooks.call_hook_gated(phase, payload, &granted))?;
        }
        Ok(())
    }

    fn instance_meta(&self, id: ComponentId) -> Option<(String, HashSet<String>)> {
        let registry = self.inner.components.borrow();
        let instance = registry.instance(id)?;
        Some((
            instance.type_ref.name.clone(),
            instance.capabilities.clone(),
        ))
    }
}

// =============================================================================
// BUILDER
// =============================================================================

pub struct AppBuilder {
    gateway: Rc<dyn CapabilityGateway>,
    reporter: Rc<dyn ErrorReporter>,
    plugins: PluginRegistry,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            gateway: Rc::new(AllowAll),
            reporter: Rc::new(LogReporter),
            plugins: PluginRegistry::new(),
        }
    }
}

impl AppBuilder {
    pub fn gateway(mut self, gateway: Rc<dyn CapabilityGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Assemble the app and initialize its plugins.
    pub fn build(self) -> Result<App, CoreError> {
        let hooks = HookRegistry::new();
        let mut metadata = MetadataRegistry::new();
        let mut plugins = self.plugins;
        plugins.init_all(&self.gateway, &hooks, &mut metadata)?;
        Ok(App {
            inner: Rc::new(AppInner {
                components: RefCell::new(ComponentRegistry::new(self.gateway.clone())),
                hooks,
                plugins: RefCell::new(plugins),
                metadata: RefCell::new(metadata),
                gateway: self.gateway,
                reporter: self.reporter,
                devtools: Devtools::new(),
                generation: reactive::cell(0),
            }),
        })
    }
}

// =============================================================================
// MOUNT HANDLE
// =============================================================================

/// Keeps one mounted tree alive. Dropping the handle stops reactive updates;
/// [`unmount`](Self::unmount) additionally tears the rendered tree down with
/// destroy lifecycle phases.
pub struct MountHandle {
    app: App,
    tree: LiveTree,
    container: LiveNodeId,
    computation: Computation,
    state: Rc<RefCell<MountState>>,
}

impl MountHandle {
    /// Root component instance of the mounted tree, when the root
    /// description is a component.
    pub fn root_component(&self) -> Option<ComponentId> {
        self.state.borrow().rendered.as_ref().and_then(|r| r.component)
    }

    /// Stop updates and tear the rendered tree down.
    pub fn unmount(self) -> Result<(), CoreError> {
        self.computation.dispose();
        let rendered = self.state.borrow_mut().rendered.take();
        let events = if let Some(rendered) = rendered {
            let mut registry = self.app.inner.components.borrow_mut();
            let reporter: &dyn ErrorReporter = &*self.app.inner.reporter;
            let mut reconciler = Reconciler::new(
                &self.tree,
                &mut registry,
                reporter,
                Some(&self.app.inner.devtools),
            );
            reconciler.dispose_rendered(rendered);
            reconciler.take_events()
        } else {
            Vec::new()
        };
        self.tree.clear_children(self.container);
        self.app.fire_lifecycle_events(events)
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.computation.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::hooks::{hook, Tier};
    use crate::tree::{component, component_type, element, text, Props};
    use serde_json::json;

    #[test]
    fn mount_renders_and_reacts_to_cell_writes() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");
        let count = reactive::cell(0);

        let count_for_root = count.clone();
        let handle = app
            .mount(&tree, container, move || {
                text(format!("count={}", count_for_root.get()))
            })
            .unwrap();

        let root = tree.children(container)[0];
        assert_eq!(tree.text(root), Some("count=0".to_string()));

        count.set(3);
        let root = tree.children(container)[0];
        assert_eq!(tree.text(root), Some("count=3".to_string()));
        drop(handle);

        // Updates stop once the handle is gone
        count.set(9);
        let root = tree.children(container)[0];
        assert_eq!(tree.text(root), Some("count=3".to_string()));
    }

    #[test]
    fn component_state_write_rerenders_through_the_mount() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");

        let ty = component_type("Counter", |scope| {
            let count = scope.state().get("count");
            text(format!("n={count}"))
        })
        .build();

        let ty_for_root = ty.clone();
        let handle = app
            .mount(&tree, container, move || {
                component(&ty_for_root, Props::new(), vec![])
            })
            .unwrap();
        let id = handle.root_component().unwrap();
        assert_eq!(
            tree.text(tree.children(container)[0]),
            Some("n=null".to_string())
        );

        let state = app.inner.components.borrow().instance(id).unwrap().state.clone();
        state.set("count", json!(5));
        assert_eq!(
            tree.text(tree.children(container)[0]),
            Some("n=5".to_string())
        );
        handle.unmount().unwrap();
        assert!(tree.children(container).is_empty());
    }

    #[test]
    fn render_write_feeding_a_second_mount_defers_past_the_pass() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container_a = tree.create_element("root-a");
        let container_b = tree.create_element("root-b");
        let shared = reactive::cell(0i64);
        let trigger = reactive::cell(0i64);

        let shared_b = shared.clone();
        let _b = app
            .mount(&tree, container_b, move || text(shared_b.get()))
            .unwrap();

        // This component writes a cell the other mount depends on while
        // its own pass still holds the component registry
        let shared_a = shared.clone();
        let ty = component_type("Writer", move |scope| {
            let n = scope.attr("n").and_then(|v| v.as_i64()).unwrap_or(0);
            shared_a.set(n + 1);
            text(n)
        })
        .build();

        let (ty_in, trigger_a) = (ty.clone(), trigger.clone());
        let _a = app
            .mount(&tree, container_a, move || {
                component(&ty_in, Props::new().attr("n", trigger_a.get()), vec![])
            })
            .unwrap();

        assert_eq!(
            tree.text(tree.children(container_b)[0]),
            Some("1".to_string())
        );

        trigger.set(5);
        assert_eq!(
            tree.text(tree.children(container_a)[0]),
            Some("5".to_string())
        );
        assert_eq!(
            tree.text(tree.children(container_b)[0]),
            Some("6".to_string())
        );
    }

    #[test]
    fn lifecycle_hooks_fire_after_the_pass() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_mount = seen.clone();
        app.hooks().add_hook(
            phases::MOUNT,
            Tier::Normal,
            hook(move |payload| {
                seen_mount
                    .borrow_mut()
                    .push(format!("mount:{}", payload.detail["component"]))
            }),
        );
        let seen_destroy = seen.clone();
        app.hooks().add_hook(
            phases::DESTROY,
            Tier::Normal,
            hook(move |payload| {
                seen_destroy
                    .borrow_mut()
                    .push(format!("destroy:{}", payload.detail["component"]))
            }),
        );

        let ty = component_type("Widget", |_| element("w", Props::new(), vec![])).build();
        let ty_for_root = ty.clone();
        let handle = app
            .mount(&tree, container, move || {
                component(&ty_for_root, Props::new(), vec![])
            })
            .unwrap();
        assert_eq!(*seen.borrow(), vec!["mount:\"Widget\""]);

        handle.unmount().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["mount:\"Widget\"", "destroy:\"Widget\""]
        );
    }

    #[test]
    fn batched_writes_produce_one_render_pass() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");
        let a = reactive::cell(0);
        let b = reactive::cell(0);
        let passes = Rc::new(std::cell::Cell::new(0));

        let (a_root, b_root, passes_root) = (a.clone(), b.clone(), passes.clone());
        let _handle = app
            .mount(&tree, container, move || {
                passes_root.set(passes_root.get() + 1);
                text(format!("{}+{}", a_root.get(), b_root.get()))
            })
            .unwrap();
        assert_eq!(passes.get(), 1);

        reactive::batch(|| {
            a.set(1);
            b.set(2);
        });
        assert_eq!(passes.get(), 2);
        assert_eq!(
            tree.text(tree.children(container)[0]),
            Some("1+2".to_string())
        );
    }

    #[test]
    fn boundary_reset_rerenders_through_the_app() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");
        let fail = reactive::cell(true);

        let fail_for_render = fail.clone();
        let ty = crate::tree::try_component_type("Guarded", move |_| {
            if fail_for_render.get() {
                Err(CoreError::Render("broken".into()))
            } else {
                Ok(text("fine"))
            }
        })
        .fallback(|_| text("fallback"))
        .build();

        let ty_for_root = ty.clone();
        let handle = app
            .mount(&tree, container, move || {
                component(&ty_for_root, Props::new(), vec![])
            })
            .unwrap();
        assert_eq!(
            tree.text(tree.children(container)[0]),
            Some("fallback".to_string())
        );

        let id = handle.root_component().unwrap();
        fail.set(false);
        app.reset_error_boundary(id);
        assert_eq!(
            tree.text(tree.children(container)[0]),
            Some("fine".to_string())
        );
    }

    #[test]
    fn root_failure_without_boundary_clears_the_container() {
        let app = App::builder().build().unwrap();
        let tree = LiveTree::new();
        let container = tree.create_element("root");
        let ty = crate::tree::try_component_type("Broken", |_| {
            Err(CoreError::Render("no output".into()))
        })
        .build();

        let ty_for_root = ty.clone();
        let result = app.mount(&tree, container, move || {
            component(&ty_for_root, Props::new(), vec![])
        });
        assert!(result.is_err());
        assert!(tree.children(container).is_empty());
        assert!(app.inner.components.borrow().is_empty());
    }
}
