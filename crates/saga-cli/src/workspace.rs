use saga_core::{Branch, Version};
use saga_engine::{CancellationToken, Engine, EngineConfig, FanoutPublisher, TracingPublisher};
use saga_ledger::config_file::read_config;
use saga_ledger::{SagaPaths, SqliteStore, WorkspaceLock};
use saga_notify::{ChannelPublisher, NotifyConfig};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Config key naming the campaign commands act on when `--campaign` is omitted.
pub const CAMPAIGN_KEY: &str = "campaign";

/// An opened `.saga/` workspace: the SQLite-backed engine plus the campaign
/// the current command targets.
pub struct Workspace {
    pub paths: SagaPaths,
    pub engine: Engine<SqliteStore>,
    campaign: Option<String>,
}

impl Workspace {
    /// Open the workspace containing `repo_root` (searching upwards).
    pub fn open(repo_root: &Path, campaign: Option<&str>) -> anyhow::Result<Self> {
        let paths = SagaPaths::find_upwards(repo_root)
            .ok_or_else(|| anyhow::anyhow!("No .saga/ workspace found. Run `saga init` first."))?;
        let store = SqliteStore::open(&paths.ledger_db)?;
        let config = EngineConfig::load(&paths)?;

        let publisher = FanoutPublisher::new()
            .with(TracingPublisher)
            .with(ChannelPublisher::new(NotifyConfig::load(&paths)));
        let engine = Engine::new(store)
            .with_config(config)
            .with_publisher(Arc::new(publisher));

        let campaign = match campaign {
            Some(c) => Some(c.to_string()),
            None => read_config(&paths.config_json)?
                .get(CAMPAIGN_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        tracing::debug!(root = %paths.root.display(), campaign = ?campaign, "workspace opened");
        Ok(Self {
            paths,
            engine,
            campaign,
        })
    }

    pub fn campaign(&self) -> anyhow::Result<&str> {
        self.campaign.as_deref().ok_or_else(|| {
            anyhow::anyhow!("no campaign selected: pass --campaign or run `saga campaign init`")
        })
    }

    /// Exclusive lock for commands that write to the ledger.
    pub fn lock(&self) -> anyhow::Result<WorkspaceLock> {
        WorkspaceLock::acquire(&self.paths)
    }

    /// Live branch of the current campaign, by name.
    pub fn branch(&self, name: &str) -> anyhow::Result<Branch> {
        Ok(self.engine.find_branch(self.campaign()?, name)?)
    }

    /// Resolve a version reference: a branch name (its head), a version id,
    /// or a content hash.
    pub fn version(&self, reference: &str) -> anyhow::Result<Version> {
        let campaign = self.campaign()?;
        let reference = match self.engine.find_branch(campaign, reference) {
            Ok(branch) => self.engine.get_head(&branch.id)?.version_id,
            Err(_) => reference.to_string(),
        };
        Ok(self.engine.get_version(campaign, &reference)?)
    }
}

/// Read campaign content from a JSON file (`-` for stdin).
pub fn read_content(path: &Path) -> anyhow::Result<Value> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?
    };
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("{} is not valid JSON: {e}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("{} must contain a JSON object", path.display());
    }
    Ok(value)
}

/// A token cancelled by Ctrl-C, so a long retry loop stops before its next
/// compare-and-swap.
pub fn ctrlc_cancel() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    let _ = ctrlc::set_handler(move || {
        handle.cancel();
    });
    cancel
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn content() -> Value {
        json!({
            "name": "The Sunken Crown",
            "description": "",
            "theme": "fantasy",
            "chapters": [{"id": "ch1", "title": "Intro"}],
            "npcs": [],
            "locations": []
        })
    }

    /// A workspace in a temp dir with campaign `c1` initialized.
    pub(crate) fn initialized() -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        crate::cmd_init::execute(tmp.path()).unwrap();
        let file = tmp.path().join("root.json");
        std::fs::write(&file, content().to_string()).unwrap();
        let ctx = crate::Ctx {
            repo_root: tmp.path().to_path_buf(),
            campaign: None,
            json: true,
        };
        crate::cmd_campaign::init(&ctx, "c1", &file, "gm", "").unwrap();
        let ws = Workspace::open(tmp.path(), None).unwrap();
        (tmp, ws)
    }

    #[test]
    fn open_without_workspace_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Workspace::open(tmp.path(), None).err().unwrap();
        assert!(err.to_string().contains("saga init"));
    }

    #[test]
    fn campaign_comes_from_config_or_flag() {
        let (tmp, ws) = initialized();
        assert_eq!(ws.campaign().unwrap(), "c1");
        let other = Workspace::open(tmp.path(), Some("c2")).unwrap();
        assert_eq!(other.campaign().unwrap(), "c2");
    }

    #[test]
    fn version_resolves_branch_names_ids_and_hashes() {
        let (_tmp, ws) = initialized();
        let root = ws.version("main").unwrap();
        assert!(root.is_root());
        assert_eq!(ws.version(&root.id).unwrap().id, root.id);
        assert_eq!(ws.version(&root.version_hash).unwrap().id, root.id);
        assert!(ws.version("nope").is_err());
    }

    #[test]
    fn read_content_rejects_non_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("c.json");
        std::fs::write(&file, "[1]").unwrap();
        assert!(read_content(&file).is_err());
        std::fs::write(&file, "{oops").unwrap();
        assert!(read_content(&file).unwrap_err().to_string().contains("not valid JSON"));
    }
}
