use saga_core::validate::{ReferenceRule, StateValidator};
use saga_ledger::config_file::read_config;
use saga_ledger::SagaPaths;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Engine settings read from `.saga/config.json`. Keys the engine does not
/// know about (e.g. `notify_channels`) are ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
    #[serde(default)]
    pub reference_rules: Vec<ReferenceRule>,
}

fn default_max_commit_attempts() -> u32 {
    DEFAULT_MAX_COMMIT_ATTEMPTS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            reference_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_map(map: &Map<String, Value>) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(Value::Object(map.clone()))?)
    }

    /// Load from the workspace config file. Missing file means defaults.
    pub fn load(paths: &SagaPaths) -> anyhow::Result<Self> {
        let map = read_config(&paths.config_json)?;
        Self::from_map(&map)
    }

    /// CAS attempts per commit, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_commit_attempts.max(1)
    }

    pub fn validator(&self) -> StateValidator {
        StateValidator::with_rules(&self.reference_rules)
    }
}
