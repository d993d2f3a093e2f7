//! Nested Scopes Demo
//!
//! Simulates a host runtime mounting three boundaries of one counter store:
//! an app-wide instance, a panel that seeds its own, and a lenient consumer
//! rendered outside every boundary.
//!
//! Run with:
//! `cargo run -p enclave_scope --example nested_scopes`

use std::sync::Arc;

use enclave_scope::{
    BoundaryId, BoundaryProps, MergeMode, ResolveOptions, ScopeError, ScopeRegistry,
    StoreDefinition,
};
use serde_json::{json, Value};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let counter = StoreDefinition::builder("Counter")
        .initial_state(json!({ "count": 0, "meta": { "label": "app", "step": 1 } }))
        .mutator("increment", |state: &Value, _: Value| {
            let step = state["meta"]["step"].as_i64().unwrap_or(1);
            let mut next = state.clone();
            next["count"] = json!(state["count"].as_i64().unwrap_or(0) + step);
            next
        })
        .strict(false)
        .fallback_state(json!({ "count": -1 }))
        .debug(true)
        .build()?;

    let mut registry: ScopeRegistry = ScopeRegistry::new(counter);

    // Boundary identities persist across re-evaluations of the host tree.
    let app = BoundaryId::new();
    let panel = BoundaryId::new();

    for pass in 0..2 {
        let app_node = registry.mount(app, None, BoundaryProps::keyed("app"))?;
        let panel_node = registry.mount(
            panel,
            Some(app_node),
            BoundaryProps::keyed("panel")
                .with_initial(json!({ "meta": { "label": "panel" } }))
                .with_merge(MergeMode::Deep),
        )?;

        let panel_store = registry.use_store(Some(panel_node), &ResolveOptions::default())?;
        let sub = panel_store.subscribe(Arc::new(|next: &Value, prev: &Value| {
            println!("  panel count {} -> {}", prev["count"], next["count"]);
        }));
        panel_store.dispatch("increment", Value::Null)?;

        let app_count = registry.use_selector(
            Some(panel_node),
            |s| s["count"].clone(),
            &ResolveOptions::from_key("app"),
        )?;
        println!(
            "pass {}: panel = {}, app (from panel) = {}",
            pass,
            registry.use_state(Some(panel_node))?,
            app_count
        );

        // Unknown keys degrade to the nearest instance in lenient mode.
        let missing = registry.use_selector(
            Some(panel_node),
            |s| s["meta"]["label"].clone(),
            &ResolveOptions::from_key("sidebar"),
        )?;
        println!("  'sidebar' resolved to label {}", missing);

        // The boundary survives re-evaluation; its listeners must not pile up.
        sub.unsubscribe();
    }

    // Outside every boundary: the static fallback, read-only.
    let orphan = registry.use_store(None, &ResolveOptions::default())?;
    orphan.dispatch("increment", Value::Null)?;
    println!("orphan state: {}", orphan.get_state());

    registry.unmount(panel);
    registry.unmount(app);
    println!("mounted nodes after teardown: {}", registry.len());

    let strict = StoreDefinition::builder("Strict").build()?;
    let strict_registry: ScopeRegistry = ScopeRegistry::new(strict);
    if let Err(ScopeError::NoScope { store }) = strict_registry.use_state(None) {
        println!("strict store {store:?} refused to resolve without a scope");
    }

    Ok(())
}
