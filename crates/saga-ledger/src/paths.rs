use std::path::{Path, PathBuf};

/// All well-known paths under `.saga/`.
#[derive(Debug, Clone)]
pub struct SagaPaths {
    pub root: PathBuf,
    pub saga_dir: PathBuf,
    pub ledger_db: PathBuf,
    pub config_json: PathBuf,
    pub lock_file: PathBuf,
    pub events_jsonl: PathBuf,
}

impl SagaPaths {
    /// Derive all paths from a workspace root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let saga_dir = root.join(".saga");
        Self {
            ledger_db: saga_dir.join("ledger.db"),
            config_json: saga_dir.join("config.json"),
            lock_file: saga_dir.join("LOCK"),
            events_jsonl: saga_dir.join("events.jsonl"),
            saga_dir,
            root,
        }
    }

    /// Create `.saga/`. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.saga_dir)?;
        Ok(())
    }

    /// Check whether `.saga/` exists.
    pub fn is_initialized(&self) -> bool {
        self.saga_dir.is_dir()
    }

    /// Walk up from `start` to the first directory containing `.saga/`.
    pub fn find_upwards(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .map(Self::discover)
            .find(|p| p.is_initialized())
    }
}
