//! Flat JSON key/value config stored at `.saga/config.json`.

use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

/// Read the config object. A missing file is an empty config; a file that
/// holds something other than an object is an error.
pub fn read_config(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must contain a JSON object", path.display()),
    }
}

/// Replace the config file atomically (write temp file, then rename).
pub fn write_config(path: &Path, config: &Map<String, Value>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(path, json.as_bytes())
}

/// Write `data` to `path` via a sibling temp file so readers never see a
/// partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Parse a CLI string into a JSON value: bool, integer, float, JSON
/// array/object, otherwise a plain string.
pub fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else if s.starts_with('[') || s.starts_with('{') {
                serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
            } else {
                Value::String(s.to_string())
            }
        }
    }
}
