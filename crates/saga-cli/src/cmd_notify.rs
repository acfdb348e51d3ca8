use crate::Ctx;
use clap::Subcommand;
use saga_ledger::SagaPaths;
use saga_notify::NotifyConfig;

#[derive(Subcommand)]
pub enum NotifyCmd {
    /// Send a test event to all configured channels
    Test,
    /// Show configured event channels
    Status,
}

pub fn run(cmd: NotifyCmd, ctx: &Ctx) -> anyhow::Result<()> {
    let paths = SagaPaths::find_upwards(&ctx.repo_root)
        .ok_or_else(|| anyhow::anyhow!("No .saga/ workspace found. Run `saga init` first."))?;
    let config = NotifyConfig::load(&paths);

    match cmd {
        NotifyCmd::Test => run_test(&config),
        NotifyCmd::Status => run_status(&config),
    }
}

fn run_test(config: &NotifyConfig) -> anyhow::Result<()> {
    if config.channels.is_empty() {
        println!("No event channels configured.");
        println!();
        println!("Add channels in .saga/config.json under \"notify_channels\":");
        println!(
            "  saga config set notify_channels '[{{\"type\":\"ntfy\",\"url\":\"https://ntfy.sh/my-topic\",\"events\":[\"*\"]}}]'"
        );
        return Ok(());
    }

    println!(
        "Sending test event to {} channel(s)...",
        config.channels.len()
    );
    let results = saga_notify::test_channels(config);
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(()) => println!("  OK  {name}"),
            Err(e) => {
                failed += 1;
                println!("  ERR {name}: {e}");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} channel(s) failed");
    }
    Ok(())
}

fn run_status(config: &NotifyConfig) -> anyhow::Result<()> {
    if config.channels.is_empty() {
        println!("No event channels configured.");
        return Ok(());
    }

    println!("{} channel(s) configured:", config.channels.len());
    for ch in &config.channels {
        println!("  - {}", ch.display_name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_reaches_default_jsonl_channel() {
        let tmp = tempfile::tempdir().unwrap();
        crate::cmd_init::execute(tmp.path()).unwrap();
        let ctx = Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: false,
        };
        run(NotifyCmd::Test, &ctx).unwrap();
        run(NotifyCmd::Status, &ctx).unwrap();

        let paths = SagaPaths::discover(tmp.path());
        let text = std::fs::read_to_string(&paths.events_jsonl).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(line["type"], "version_control_initialized");
    }
}
