use crate::paths::SagaPaths;
use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

/// Cross-process guard held by every `saga` command that writes to the
/// ledger. The holder's pid is kept in `.saga/LOCK` so a refused command can
/// say who has the campaign open. Dropping the guard unlocks the file.
pub struct WorkspaceLock {
    _file: File,
}

impl WorkspaceLock {
    /// Take the guard, or fail at once if another process holds it.
    pub fn acquire(paths: &SagaPaths) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .with_context(|| format!("open {}", paths.lock_file.display()))?;

        if file.try_lock_exclusive().is_err() {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            let holder = match holder.trim() {
                "" => "another saga process".to_string(),
                pid => format!("pid {pid}"),
            };
            anyhow::bail!(
                "campaign ledger is busy: {} is held by {holder}",
                paths.lock_file.display()
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        tracing::debug!(
            path = %paths.lock_file.display(),
            pid = std::process::id(),
            "ledger guard taken"
        );
        Ok(Self { _file: file })
    }
}
