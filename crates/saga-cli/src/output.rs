//! Human and `--json` rendering shared by the commands.

use saga_core::{Error, Version};
use saga_engine::Committed;
use serde_json::json;

/// One-line summary: short id, type, branch, title.
pub fn version_line(v: &Version) -> String {
    let title = if v.title.is_empty() {
        "(untitled)"
    } else {
        v.title.as_str()
    };
    format!(
        "{}  {:<8} {}  {}  {}",
        short_hash(&v.version_hash),
        v.version_type,
        v.id,
        v.created_at,
        title
    )
}

pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub fn print_committed(committed: &Committed, json: bool) -> anyhow::Result<()> {
    let v = &committed.version;
    if json {
        println!(
            "{}",
            serde_json::to_string(&json!({
                "version_id": v.id,
                "version_hash": v.version_hash,
                "branch_id": v.branch_id,
                "parent_id": v.parent_id,
                "version_type": v.version_type,
                "transition_id": committed.transition.id,
                "warnings": committed.warnings,
            }))?
        );
        return Ok(());
    }
    println!("Committed {} ({})", v.id, short_hash(&v.version_hash));
    if let Some(parent) = &v.parent_id {
        println!("  parent  {parent}");
    }
    for w in &committed.warnings {
        println!("  warning: {w}");
    }
    Ok(())
}

/// Print a failed command. Engine errors carry their rule name and, for
/// validation failures and merge conflicts, the structured detail.
pub fn report_error(err: &anyhow::Error, json: bool) {
    let engine_err = err.downcast_ref::<Error>();
    if json {
        let mut body = json!({
            "error": engine_err.map_or("error", Error::rule),
            "message": format!("{err:#}"),
        });
        match engine_err {
            Some(Error::Validation(v)) => body["detail"] = json!(v),
            Some(Error::MergeConflict(conflicts)) => body["conflicts"] = json!(conflicts),
            _ => {}
        }
        println!("{body}");
        return;
    }

    eprintln!("Error: {err:#}");
    match engine_err {
        Some(Error::Validation(v)) => {
            eprintln!("  rule: {}", v.rule());
        }
        Some(Error::MergeConflict(conflicts)) => {
            for c in conflicts {
                eprintln!("  conflict at {}", c.path);
                eprintln!("    source: {}", display_side(c.source_value.as_ref()));
                eprintln!("    target: {}", display_side(c.target_value.as_ref()));
            }
        }
        _ => {}
    }
}

fn display_side(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "(removed)".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_tolerates_short_input() {
        assert_eq!(short_hash("abcdef0123456789"), "abcdef012345");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn removed_side_is_labelled() {
        assert_eq!(display_side(None), "(removed)");
        assert_eq!(display_side(Some(&json!("Cave"))), "\"Cave\"");
    }
}
