use saga_ledger::config_file::{read_config, write_config};
use saga_ledger::{SagaPaths, SqliteStore};
use serde_json::{json, Map, Value};
use std::path::Path;

/// `saga init`: create `.saga/`, the ledger database and a default config.
pub fn execute(repo_root: &Path) -> anyhow::Result<()> {
    let paths = SagaPaths::discover(repo_root);
    let existed = paths.is_initialized();

    paths.ensure_layout()?;
    let store = SqliteStore::open_or_create(&paths.ledger_db)?;
    let schema = store.schema_version()?;
    drop(store);

    let mut config = read_config(&paths.config_json)?;
    if seed_defaults(&mut config)? {
        write_config(&paths.config_json, &config)?;
    }

    if existed {
        println!("Already initialized at {}", paths.saga_dir.display());
    } else {
        println!("Initialized saga workspace at {}", paths.saga_dir.display());
        println!("  ledger  {} (schema v{schema})", paths.ledger_db.display());
        println!("  events  {}", paths.events_jsonl.display());
    }
    Ok(())
}

/// Fill in missing keys. Returns whether anything was added.
fn seed_defaults(config: &mut Map<String, Value>) -> anyhow::Result<bool> {
    let defaults = [
        (
            "max_commit_attempts",
            json!(saga_engine::config::DEFAULT_MAX_COMMIT_ATTEMPTS),
        ),
        ("reference_rules", json!([])),
        (
            "notify_channels",
            serde_json::to_value(saga_notify::default_channels())?,
        ),
    ];
    let mut changed = false;
    for (key, value) in defaults {
        if !config.contains_key(key) {
            config.insert(key.to_string(), value);
            changed = true;
        }
    }
    Ok(changed)
}
