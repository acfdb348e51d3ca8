use crate::Ctx;
use clap::Subcommand;
use saga_engine::EngineConfig;
use saga_ledger::config_file::{parse_value, read_config, write_config};
use saga_ledger::SagaPaths;
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. max_commit_attempts)
        key: String,
        /// Config value (true/false/number/JSON/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, ctx: &Ctx) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(&ctx.repo_root, &key, &value),
        ConfigCmd::Get { key } => get(&ctx.repo_root, &key),
        ConfigCmd::List => list(&ctx.repo_root),
    }
}

// ── Command Implementations ──

fn workspace_paths(repo_root: &Path) -> anyhow::Result<SagaPaths> {
    SagaPaths::find_upwards(repo_root)
        .ok_or_else(|| anyhow::anyhow!("No .saga/ workspace found. Run `saga init` first."))
}

/// `saga config set <key> <value>`. Engine keys are checked before the
/// file is written.
pub fn set(repo_root: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let paths = workspace_paths(repo_root)?;
    let mut config = read_config(&paths.config_json)?;
    config.insert(key.to_string(), parse_value(value));
    EngineConfig::from_map(&config)
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?;
    write_config(&paths.config_json, &config)?;
    println!("{key} = {value}");
    Ok(())
}

/// `saga config get <key>`
pub fn get(repo_root: &Path, key: &str) -> anyhow::Result<()> {
    let paths = workspace_paths(repo_root)?;
    let config = read_config(&paths.config_json)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `saga config list`
pub fn list(repo_root: &Path) -> anyhow::Result<()> {
    let paths = workspace_paths(repo_root)?;
    let config = read_config(&paths.config_json)?;
    if config.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &config {
            println!("{k} = {v}");
        }
    }
    Ok(())
}
