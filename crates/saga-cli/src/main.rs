mod cmd_branch;
mod cmd_campaign;
mod cmd_commit;
mod cmd_config;
mod cmd_diff;
mod cmd_init;
mod cmd_log;
mod cmd_merge;
mod cmd_notify;
mod cmd_validate;
mod output;
mod workspace;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "saga", version, about = "Branching version control for tabletop campaigns")]
struct Cli {
    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,
    /// Campaign to act on (defaults to the `campaign` config key)
    #[arg(long, global = true)]
    campaign: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .saga/ workspace
    Init,
    /// Campaign operations
    Campaign {
        #[command(subcommand)]
        cmd: cmd_campaign::CampaignCmd,
    },
    /// Commit a full campaign state onto a branch
    Commit {
        /// JSON file with the new state (`-` for stdin)
        file: PathBuf,
        /// Target branch name
        #[arg(short, long, default_value = "main")]
        branch: String,
        /// Version title
        #[arg(short, long, default_value = "")]
        title: String,
        /// Commit message
        #[arg(short, long, default_value = "")]
        message: String,
        #[arg(long, default_value = "")]
        author: String,
        /// Transition type: create, update or delete
        #[arg(long = "type", default_value = "update")]
        transition: String,
        /// Reason recorded on the state transition
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Restore the content of an earlier version as a new commit
    Revert {
        /// Version id or content hash (must be in the branch history)
        target: String,
        #[arg(short, long, default_value = "main")]
        branch: String,
        #[arg(short, long, default_value = "")]
        message: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    /// Branch operations
    Branch {
        #[command(subcommand)]
        cmd: cmd_branch::BranchCmd,
    },
    /// Merge a source branch into a target branch
    Merge {
        /// Source branch name
        src: String,
        /// Target branch name
        dst: String,
        #[arg(short, long, default_value = "")]
        message: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    /// List versions of the campaign, newest first
    Log {
        /// Maximum number of versions to show (0 = unlimited)
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one version with its content
    Show {
        /// Branch name, version id or content hash
        reference: String,
    },
    /// Ancestor chain of a branch head
    History {
        #[arg(default_value = "main")]
        branch: String,
    },
    /// Field-level changes between two versions
    Diff {
        /// Branch name, version id or content hash
        from: String,
        /// Branch name, version id or content hash
        to: String,
    },
    /// Check a proposed state against a branch head without committing
    Validate {
        /// JSON file with the proposed state (`-` for stdin)
        file: PathBuf,
        #[arg(short, long, default_value = "main")]
        branch: String,
        #[arg(long = "type", default_value = "update")]
        transition: String,
    },
    /// Audit trail of state transitions, oldest first
    Transitions {
        /// Maximum number of transitions to show, most recent kept (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Manage workspace config
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
    /// Event channel operations
    Notify {
        #[command(subcommand)]
        cmd: cmd_notify::NotifyCmd,
    },
}

/// Per-invocation settings shared by every command.
pub struct Ctx {
    pub repo_root: PathBuf,
    pub campaign: Option<String>,
    pub json: bool,
}

impl Ctx {
    pub fn workspace(&self) -> anyhow::Result<workspace::Workspace> {
        workspace::Workspace::open(&self.repo_root, self.campaign.as_deref())
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::report_error(&e, json);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Ctx {
        repo_root: std::env::current_dir()?,
        campaign: cli.campaign,
        json: cli.json,
    };

    match cli.cmd {
        Command::Init => cmd_init::execute(&ctx.repo_root),
        Command::Campaign { cmd } => cmd_campaign::run(cmd, &ctx),
        Command::Commit {
            file,
            branch,
            title,
            message,
            author,
            transition,
            reason,
        } => cmd_commit::commit(
            &ctx,
            &cmd_commit::CommitParams {
                file: &file,
                branch: &branch,
                title: &title,
                message: &message,
                author: &author,
                transition: &transition,
                reason: &reason,
            },
        ),
        Command::Revert {
            target,
            branch,
            message,
            author,
        } => cmd_commit::revert(&ctx, &target, &branch, &author, &message),
        Command::Branch { cmd } => cmd_branch::run(cmd, &ctx),
        Command::Merge {
            src,
            dst,
            message,
            author,
        } => cmd_merge::execute(&ctx, &src, &dst, &author, &message),
        Command::Log { limit } => cmd_log::log(&ctx, limit),
        Command::Show { reference } => cmd_log::show(&ctx, &reference),
        Command::History { branch } => cmd_log::history(&ctx, &branch),
        Command::Diff { from, to } => cmd_diff::execute(&ctx, &from, &to),
        Command::Validate {
            file,
            branch,
            transition,
        } => cmd_validate::execute(&ctx, &file, &branch, &transition),
        Command::Transitions { limit } => cmd_log::transitions(&ctx, limit),
        Command::Config { cmd } => cmd_config::run(cmd, &ctx),
        Command::Notify { cmd } => cmd_notify::run(cmd, &ctx),
    }
}
