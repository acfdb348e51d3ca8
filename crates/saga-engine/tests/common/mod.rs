#![allow(dead_code)]

use saga_core::Branch;
use saga_engine::{CollectPublisher, Engine, EngineConfig};
use saga_ledger::{MemoryStore, Store};
use serde_json::{json, Value};
use std::sync::Arc;

pub const CAMPAIGN: &str = "C1";

/// Root state from the walkthrough: one chapter, nothing else yet.
pub fn root_content() -> Value {
    json!({
        "name": "The Sunken Crown",
        "description": "A coastal kingdom slides into the sea.",
        "theme": "fantasy",
        "chapters": [{"id": "ch1", "title": "Intro"}],
        "npcs": [],
        "locations": []
    })
}

/// Root state with a location and an NPC, for merge and reference tests.
pub fn rich_content() -> Value {
    json!({
        "name": "The Sunken Crown",
        "description": "A coastal kingdom slides into the sea.",
        "theme": "fantasy",
        "chapters": [{"id": "ch1", "title": "Intro", "location_id": "loc1"}],
        "npcs": [{"id": "n1", "name": "Mira", "location_id": "loc1"}],
        "locations": [{"id": "loc1", "name": "Cave"}]
    })
}

pub struct Harness<S> {
    pub engine: Arc<Engine<S>>,
    pub events: Arc<CollectPublisher>,
    pub main: Branch,
}

pub fn harness_with<S: Store>(store: S, config: EngineConfig, root: Value) -> Harness<S> {
    let events = Arc::new(CollectPublisher::new());
    let engine = Engine::new(store)
        .with_config(config)
        .with_publisher(events.clone());
    engine.initialize(CAMPAIGN, root, "gm", "session zero").unwrap();
    let main = engine.find_branch(CAMPAIGN, "main").unwrap();
    events.clear();
    Harness {
        engine: Arc::new(engine),
        events,
        main,
    }
}

pub fn memory(root: Value) -> Harness<MemoryStore> {
    harness_with(MemoryStore::new(), EngineConfig::default(), root)
}

pub fn with(mut content: Value, edits: impl FnOnce(&mut Value)) -> Value {
    edits(&mut content);
    content
}
