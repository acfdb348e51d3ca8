use crate::workspace::read_content;
use crate::Ctx;
use saga_core::TransitionType;
use std::path::Path;

/// `saga validate <file>`: run the validator against a branch head. Writes
/// nothing and publishes nothing.
pub fn execute(ctx: &Ctx, file: &Path, branch: &str, transition: &str) -> anyhow::Result<()> {
    let transition: TransitionType = transition.parse()?;
    let proposed = read_content(file)?;
    let ws = ctx.workspace()?;
    let head = ws.version(branch)?;

    ws.engine
        .validate_state_change(ws.campaign()?, Some(&head.content), &proposed, transition)?;

    if ctx.json {
        println!("{}", serde_json::json!({ "valid": true, "against": head.id }));
    } else {
        println!("OK: valid {transition} of {branch} ({})", head.id);
    }
    Ok(())
}
