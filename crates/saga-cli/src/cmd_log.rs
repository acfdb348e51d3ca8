use crate::output::{short_hash, version_line};
use crate::Ctx;
use saga_core::VersionSummary;

/// `saga log`: live versions of the campaign, newest first.
pub fn log(ctx: &Ctx, limit: usize) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let mut versions = ws.engine.list_versions(ws.campaign()?)?;
    versions.reverse();
    if limit > 0 {
        versions.truncate(limit);
    }

    if ctx.json {
        for v in &versions {
            println!("{}", serde_json::to_string(&VersionSummary::from(v))?);
        }
        return Ok(());
    }
    if versions.is_empty() {
        println!("No versions.");
        return Ok(());
    }
    for v in &versions {
        println!("{}", version_line(v));
    }
    println!("\n({} versions shown)", versions.len());
    Ok(())
}

/// `saga show <ref>`
pub fn show(ctx: &Ctx, reference: &str) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let v = ws.version(reference)?;
    if ctx.json {
        println!("{}", serde_json::to_string(&v)?);
        return Ok(());
    }
    println!("version  {}", v.id);
    println!("hash     {}", v.version_hash);
    println!("type     {}", v.version_type);
    println!("branch   {}", v.branch_id);
    println!("parent   {}", v.parent_id.as_deref().unwrap_or("(root)"));
    if let Some(src) = v.merge_source_branch() {
        println!("merged   {src}");
    }
    println!("author   {}", v.author);
    println!("date     {}", v.created_at);
    if v.is_deleted {
        println!("deleted  yes");
    }
    if !v.title.is_empty() {
        println!("\n    {}", v.title);
    }
    if !v.message.is_empty() {
        println!("\n    {}", v.message);
    }
    println!("\n{}", serde_json::to_string_pretty(&v.content)?);
    Ok(())
}

/// `saga history [branch]`: the ancestor chain of the branch head.
pub fn history(ctx: &Ctx, branch: &str) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let branch = ws.branch(branch)?;
    let chain = ws.engine.history(&branch.id)?;
    if ctx.json {
        for v in &chain {
            println!("{}", serde_json::to_string(&VersionSummary::from(v))?);
        }
        return Ok(());
    }
    for v in &chain {
        println!("{}", version_line(v));
    }
    Ok(())
}

/// `saga transitions`: the audit trail, oldest first.
pub fn transitions(ctx: &Ctx, limit: usize) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let mut all = ws.engine.list_transitions(ws.campaign()?)?;
    if limit > 0 && all.len() > limit {
        all.drain(..all.len() - limit);
    }

    if ctx.json {
        for t in &all {
            println!(
                "{}",
                serde_json::json!({
                    "id": t.id,
                    "version_id": t.version_id,
                    "transition_type": t.transition_type,
                    "reason": t.reason,
                    "created_at": t.created_at,
                    "to_hash": saga_core::hash::content_hash(&t.to_state),
                })
            );
        }
        return Ok(());
    }
    for t in &all {
        let from = t
            .from_state
            .as_ref()
            .map(saga_core::hash::content_hash)
            .unwrap_or_default();
        println!(
            "{}  {:<10} {} -> {}  {}",
            t.created_at,
            t.transition_type,
            if from.is_empty() { "(none)" } else { short_hash(&from) },
            short_hash(&saga_core::hash::content_hash(&t.to_state)),
            t.reason
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::tests::initialized;

    #[test]
    fn read_only_commands_run_in_both_modes() {
        let (tmp, ws) = initialized();
        let root = ws.version("main").unwrap();
        for json in [true, false] {
            let ctx = Ctx {
                repo_root: tmp.path().to_path_buf(),
                campaign: None,
                json,
            };
            log(&ctx, 0).unwrap();
            show(&ctx, &root.id).unwrap();
            history(&ctx, "main").unwrap();
            transitions(&ctx, 1).unwrap();
        }
        let ctx = Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: true,
        };
        assert!(show(&ctx, "missing").is_err());
        assert!(history(&ctx, "missing").is_err());
    }
}
