use crate::workspace::{read_content, Workspace, CAMPAIGN_KEY};
use crate::Ctx;
use clap::Subcommand;
use saga_ledger::config_file::{read_config, write_config};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum CampaignCmd {
    /// Start version control for a campaign from its initial state
    Init {
        /// Campaign id
        campaign_id: String,
        /// JSON file with the initial state (`-` for stdin)
        file: PathBuf,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
}

pub fn run(cmd: CampaignCmd, ctx: &Ctx) -> anyhow::Result<()> {
    match cmd {
        CampaignCmd::Init {
            campaign_id,
            file,
            author,
            message,
        } => init(ctx, &campaign_id, &file, &author, &message),
    }
}

/// `saga campaign init <id> <file>`. The first campaign initialized becomes
/// the workspace default.
pub fn init(
    ctx: &Ctx,
    campaign_id: &str,
    file: &Path,
    author: &str,
    message: &str,
) -> anyhow::Result<()> {
    let content = read_content(file)?;
    let ws = Workspace::open(&ctx.repo_root, Some(campaign_id))?;
    let _lock = ws.lock()?;

    let committed = ws.engine.initialize(campaign_id, content, author, message)?;

    let mut config = read_config(&ws.paths.config_json)?;
    if !config.contains_key(CAMPAIGN_KEY) {
        config.insert(CAMPAIGN_KEY.to_string(), Value::String(campaign_id.to_string()));
        write_config(&ws.paths.config_json, &config)?;
    }

    if !ctx.json {
        println!("Initialized campaign {campaign_id} on branch main");
    }
    crate::output::print_committed(&committed, ctx.json)
}
