use crate::Ctx;
use clap::Subcommand;
use saga_core::BranchType;

#[derive(Subcommand)]
pub enum BranchCmd {
    /// Create a branch at an existing version
    Create {
        /// Branch name ([A-Za-z0-9._-/], 1-64 chars)
        name: String,
        /// Branch name, version id or content hash to start from
        #[arg(long, default_value = "main")]
        from: String,
        /// player_choice, alternate or experimental
        #[arg(long = "type", default_value = "alternate")]
        branch_type: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List live branches and their heads
    List,
    /// Soft-delete a branch (main is protected)
    Delete { name: String },
}

pub fn run(cmd: BranchCmd, ctx: &Ctx) -> anyhow::Result<()> {
    match cmd {
        BranchCmd::Create {
            name,
            from,
            branch_type,
            description,
        } => create(ctx, &name, &from, &branch_type, &description),
        BranchCmd::List => list(ctx),
        BranchCmd::Delete { name } => delete(ctx, &name),
    }
}

pub fn create(
    ctx: &Ctx,
    name: &str,
    from: &str,
    branch_type: &str,
    description: &str,
) -> anyhow::Result<()> {
    let branch_type: BranchType = branch_type.parse()?;
    if branch_type == BranchType::Main {
        anyhow::bail!("only the campaign's first branch can be of type main");
    }
    let ws = ctx.workspace()?;
    let _lock = ws.lock()?;
    let base = ws.version(from)?;
    let branch = ws.engine.create_branch(
        ws.campaign()?,
        name,
        branch_type,
        description,
        &base.version_hash,
    )?;

    if ctx.json {
        println!("{}", serde_json::to_string(&branch)?);
    } else {
        println!("Created branch {name} ({}) at {}", branch.id, base.id);
    }
    Ok(())
}

pub fn list(ctx: &Ctx) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let branches = ws.engine.list_branches(ws.campaign()?)?;

    let mut rows = Vec::with_capacity(branches.len());
    for b in branches {
        let head = ws.engine.get_head(&b.id)?;
        rows.push((b, head));
    }

    if ctx.json {
        for (b, head) in &rows {
            println!(
                "{}",
                serde_json::json!({
                    "id": b.id,
                    "name": b.name,
                    "branch_type": b.branch_type,
                    "description": b.description,
                    "head": head,
                })
            );
        }
        return Ok(());
    }
    if rows.is_empty() {
        println!("No branches. Run `saga campaign init` first.");
        return Ok(());
    }
    for (b, head) in &rows {
        println!(
            "{:<24} {:<14} {}  {}",
            b.name,
            b.branch_type,
            crate::output::short_hash(&head.version_hash),
            b.description
        );
    }
    Ok(())
}

pub fn delete(ctx: &Ctx, name: &str) -> anyhow::Result<()> {
    let ws = ctx.workspace()?;
    let _lock = ws.lock()?;
    let branch = ws.branch(name)?;
    let deleted = ws.engine.delete_branch(&branch.id)?;
    if ctx.json {
        println!("{}", serde_json::to_string(&deleted)?);
    } else {
        println!("Deleted branch {name} ({})", deleted.id);
    }
    Ok(())
}
