use crate::Ctx;
use saga_core::delta::{Change, FieldChange};

/// `saga diff <from> <to>`
pub fn execute(ctx: &Ctx, from: &str, to: &str) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let from_v = ws.version(from)?;
    let to_v = ws.version(to)?;
    let changes = ws
        .engine
        .diff(ws.campaign()?, &from_v.id, &to_v.id)?;

    if ctx.json {
        println!("{}", serde_json::to_string(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("No changes.");
        return Ok(());
    }
    for c in &changes {
        println!("{}", change_line(c));
    }
    Ok(())
}

fn change_line(c: &FieldChange) -> String {
    match &c.change {
        Change::Set(v) => format!("~ {} = {v}", c.path),
        Change::Remove => format!("- {}", c.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_lines() {
        let changes = saga_core::delta::delta(
            &json!({"name": "a", "npcs": [{"id": "n1"}]}),
            &json!({"name": "b", "npcs": []}),
        );
        let lines: Vec<_> = changes.iter().map(change_line).collect();
        assert!(lines.contains(&"~ name = \"b\"".to_string()));
        assert!(lines.contains(&"- npcs[n1]".to_string()));
    }
}
