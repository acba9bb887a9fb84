//! End-to-end rendering tests: mount, reconcile, skip, server rendering,
//! and hydration through the public `App` surface.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use lumen::devtools::DevtoolsEvent;
use lumen::lifecycle::{hook, phases, AllowAll, Tier};
use lumen::output::LiveTree;
use lumen::reactive::cell;
use lumen::render::ssr::HYDRATION_ATTR;
use lumen::render::{render_to_string, App};
use lumen::tree::{component, component_type, element, text, Props};

// =============================================================================
// RENDER SHORT-CIRCUIT
// =============================================================================

#[test]
fn unchanged_component_rerender_skips_and_leaves_output_untouched() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");

    let renders = Rc::new(std::cell::Cell::new(0));
    let renders_in = renders.clone();
    let ty = component_type("Static", move |_| {
        renders_in.set(renders_in.get() + 1);
        element("p", Props::new().attr("class", "stable"), vec![text("hi")])
    })
    .build();

    let ty_in = ty.clone();
    let _handle = app
        .mount(&tree, container, move || {
            component(&ty_in, Props::new().attr("label", "fixed"), vec![])
        })
        .unwrap();
    assert_eq!(renders.get(), 1);
    let created_after_mount = tree.created_count();
    app.devtools().drain();

    // Same description again: the pass runs, the component does not.
    app.refresh();
    assert_eq!(renders.get(), 1);
    assert_eq!(tree.created_count(), created_after_mount);
    assert!(app
        .devtools()
        .drain()
        .iter()
        .any(|e| matches!(e, DevtoolsEvent::RenderSkipped { .. })));
}

// =============================================================================
// KEYED UPDATES
// =============================================================================

#[test]
fn keyed_sibling_property_update_keeps_the_live_node_and_its_focus() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");
    let class_b = cell("cold".to_string());

    let class_in = class_b.clone();
    let _handle = app
        .mount(&tree, container, move || {
            element(
                "list",
                Props::new(),
                vec![
                    element("item", Props::new().attr("class", "fixed"), vec![]).with_key("a"),
                    element("item", Props::new().attr("class", class_in.get()), vec![])
                        .with_key("b"),
                ],
            )
        })
        .unwrap();

    let list = tree.children(container)[0];
    let item_b = tree.children(list)[1];
    tree.focus(item_b);
    let created = tree.created_count();

    class_b.set("hot".to_string());

    assert_eq!(tree.created_count(), created);
    assert_eq!(tree.children(list)[1], item_b);
    assert_eq!(tree.attr(item_b, "class"), Some(json!("hot")));
    assert_eq!(tree.focused(), Some(item_b));
}

#[test]
fn keyed_reorder_moves_live_nodes_without_recreating_them() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");
    let reversed = cell(false);

    let reversed_in = reversed.clone();
    let _handle = app
        .mount(&tree, container, move || {
            let mut items = vec![
                element("item", Props::new().attr("id", "a"), vec![]).with_key("a"),
                element("item", Props::new().attr("id", "b"), vec![]).with_key("b"),
            ];
            if reversed_in.get() {
                items.reverse();
            }
            element("list", Props::new(), items)
        })
        .unwrap();

    let list = tree.children(container)[0];
    let before = tree.children(list);
    let created = tree.created_count();

    reversed.set(true);

    let after = tree.children(list);
    assert_eq!(tree.created_count(), created);
    assert_eq!(after, vec![before[1], before[0]]);
}

// =============================================================================
// LIFECYCLE PHASES
// =============================================================================

#[test]
fn mount_phase_handlers_run_in_tier_order_then_registration_order() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");

    let order = Rc::new(RefCell::new(Vec::new()));
    for (label, tier) in [
        ("L1", Tier::Low),
        ("N1", Tier::Normal),
        ("H1", Tier::High),
        ("C1", Tier::Critical),
        ("N2", Tier::Normal),
    ] {
        let order_in = order.clone();
        app.hooks().add_hook(
            phases::MOUNT,
            tier,
            hook(move |_| order_in.borrow_mut().push(label)),
        );
    }

    let ty = component_type("Widget", |_| text("w")).build();
    let ty_in = ty.clone();
    let _handle = app
        .mount(&tree, container, move || {
            component(&ty_in, Props::new(), vec![])
        })
        .unwrap();

    assert_eq!(*order.borrow(), vec!["C1", "H1", "N1", "N2", "L1"]);
}

#[test]
fn throwing_handler_halts_the_phase_after_earlier_tiers_ran() {
    use futures::executor::block_on;
    use lumen::lifecycle::{try_hook, HookPayload};

    let app = App::builder().build().unwrap();
    let ran = Rc::new(RefCell::new(Vec::new()));

    let ran_before = ran.clone();
    app.hooks().add_hook(
        phases::UPDATE,
        Tier::High,
        hook(move |_| ran_before.borrow_mut().push("before")),
    );
    app.hooks().add_hook(
        phases::UPDATE,
        Tier::Normal,
        try_hook(|_| Err(lumen::error::HookError::handler("refused"))),
    );
    let ran_after = ran.clone();
    app.hooks().add_hook(
        phases::UPDATE,
        Tier::Low,
        hook(move |_| ran_after.borrow_mut().push("after")),
    );

    let result = block_on(
        app.hooks()
            .call_hook(phases::UPDATE, HookPayload::new(phases::UPDATE)),
    );
    assert!(result.is_err());
    assert_eq!(*ran.borrow(), vec!["before"]);
}

// =============================================================================
// SERVER RENDERING AND HYDRATION
// =============================================================================

#[test]
fn render_to_string_expands_components_and_annotates_nodes() {
    let ty = component_type("Greeting", |scope| {
        let name = scope
            .attr("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        element("p", Props::new(), vec![text(format!("hello {name}"))])
    })
    .build();

    let desc = element(
        "main",
        Props::new().attr("id", "app"),
        vec![component(&ty, Props::new().attr("name", "world"), vec![])],
    );
    let html = render_to_string(desc, Rc::new(AllowAll)).unwrap();

    assert!(html.starts_with("<main id=\"app\""));
    assert!(html.contains("hello world"));
    assert!(html.contains(HYDRATION_ATTR));
    assert!(!html.contains("Greeting"));
}

#[test]
fn hydrating_matching_served_output_adopts_every_node() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");

    let clicked = Rc::new(std::cell::Cell::new(false));
    let clicked_in = clicked.clone();
    let root = move || {
        element(
            "main",
            Props::new().attr("id", "app"),
            vec![element(
                "button",
                Props::new().on("press", {
                    let clicked = clicked_in.clone();
                    move |_| clicked.set(true)
                }),
                vec![text("go")],
            )],
        )
    };

    // What a server pass would have produced for the same description
    let served_main = tree.create_element("main");
    tree.set_attr(served_main, "id", json!("app"));
    tree.set_attr(served_main, HYDRATION_ATTR, json!("h0"));
    let served_button = tree.create_element("button");
    tree.set_attr(served_button, HYDRATION_ATTR, json!("h0.0.1"));
    let served_label = tree.create_text("go");
    tree.append(served_button, served_label);
    tree.append(served_main, served_button);
    tree.append(container, served_main);
    let created_before = tree.created_count();

    let _handle = app.hydrate(&tree, container, root).unwrap();

    // Adopted, never rebuilt
    assert_eq!(tree.created_count(), created_before);
    assert_eq!(tree.children(container), vec![served_main]);
    assert_eq!(tree.attr(served_main, HYDRATION_ATTR), None);

    // Adoption wired the live handler
    assert!(tree.dispatch(served_button, "press", &json!(null)));
    assert!(clicked.get());
}

#[test]
fn hydrated_tree_keeps_updating_reactively() {
    let app = App::builder().build().unwrap();
    let tree = LiveTree::new();
    let container = tree.create_element("root");
    let label = cell("served".to_string());

    let served = tree.create_element("span");
    tree.set_attr(served, HYDRATION_ATTR, json!("h0"));
    let served_text = tree.create_text("served");
    tree.append(served, served_text);
    tree.append(container, served);

    let label_in = label.clone();
    let _handle = app
        .hydrate(&tree, container, move || {
            element("span", Props::new(), vec![text(label_in.get())])
        })
        .unwrap();

    label.set("updated".to_string());
    assert_eq!(tree.text(served_text), Some("updated".to_string()));
}
