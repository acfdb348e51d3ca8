//! SQLite-backed storage for Saga version history.
//!
//! A single `ledger.db` in WAL mode holds versions, branches, heads and the
//! state-transition audit trail. Every write goes through an IMMEDIATE
//! transaction so two writers never interleave between the head check and
//! the head update.

use crate::store::{LedgerRead, LedgerWrite, Store};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use saga_core::{
    Branch, Error, Head, Result, StateError, StateTransition, Version, VersionControlError,
};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS versions (
    seq INTEGER PRIMARY KEY,
    id TEXT UNIQUE NOT NULL,
    campaign_id TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    parent_id TEXT,
    version_hash TEXT NOT NULL,
    version_type TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    message TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_versions_campaign ON versions(campaign_id);
CREATE INDEX IF NOT EXISTS idx_versions_campaign_hash ON versions(campaign_id, version_hash);
CREATE UNIQUE INDEX IF NOT EXISTS idx_versions_live_child
    ON versions(branch_id, parent_id)
    WHERE is_deleted = FALSE AND parent_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS branches (
    seq INTEGER PRIMARY KEY,
    id TEXT UNIQUE NOT NULL,
    campaign_id TEXT NOT NULL,
    name TEXT NOT NULL,
    branch_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    base_version_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_live_name
    ON branches(campaign_id, name)
    WHERE is_deleted = FALSE;

CREATE TABLE IF NOT EXISTS heads (
    branch_id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    version_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_heads_campaign_branch ON heads(campaign_id, branch_id);

CREATE TABLE IF NOT EXISTS state_transitions (
    seq INTEGER PRIMARY KEY,
    id TEXT UNIQUE NOT NULL,
    campaign_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    from_state TEXT,
    to_state TEXT NOT NULL,
    transition_type TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transitions_campaign ON state_transitions(campaign_id);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const VERSION_COLUMNS: &str = "id, campaign_id, branch_id, parent_id, version_hash, version_type,
    title, message, author, content, metadata, created_at, is_deleted";

const BRANCH_COLUMNS: &str =
    "id, campaign_id, name, branch_type, description, base_version_hash, created_at, is_deleted";

const TRANSITION_COLUMNS: &str =
    "id, campaign_id, version_id, from_state, to_state, transition_type, reason, created_at";

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing ledger.db.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if !db_path.exists() {
            anyhow::bail!("no ledger at {}; run `saga init` first", db_path.display());
        }
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open or create ledger.db with full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        tracing::debug!(path = %db_path.display(), "ledger opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> anyhow::Result<u32> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger connection mutex poisoned"))?;
        schema_version(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("ledger connection mutex poisoned"))
    }
}

fn apply_pragmas(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        anyhow::bail!("ledger schema v{current} is newer than this build supports (v{SCHEMA_VERSION})");
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> anyhow::Result<u32> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(SCHEMA_VERSION))
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Merge WAL back into main DB so users see a single file when idle.
        if let Ok(conn) = self.conn.get_mut() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

// ── Reads ───────────────────────────────────────────────────────────

/// Read queries over any connection, including an open transaction.
struct Queries<'c>(&'c Connection);

impl Queries<'_> {
    fn versions_where(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Version>> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM versions WHERE {clause}");
        let mut stmt = self.0.prepare(&sql).map_err(Error::storage)?;
        let rows = stmt
            .query_map(args, read_version_row)
            .map_err(Error::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage)?;
        rows.into_iter().map(row_to_version).collect()
    }

    fn branches_where(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Branch>> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE {clause}");
        let mut stmt = self.0.prepare(&sql).map_err(Error::storage)?;
        let rows = stmt
            .query_map(args, read_branch_row)
            .map_err(Error::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage)?;
        rows.into_iter().map(row_to_branch).collect()
    }
}

impl LedgerRead for Queries<'_> {
    fn version(&self, id: &str) -> Result<Option<Version>> {
        Ok(self.versions_where("id = ?1", &[&id])?.pop())
    }

    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>> {
        Ok(self
            .versions_where(
                "campaign_id = ?1 AND version_hash = ?2
                 ORDER BY is_deleted ASC, seq DESC LIMIT 1",
                &[&campaign_id, &version_hash],
            )?
            .pop())
    }

    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        self.versions_where("campaign_id = ?1 ORDER BY seq", &[&campaign_id])
    }

    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>> {
        Ok(self
            .versions_where(
                "branch_id = ?1 AND parent_id = ?2 AND is_deleted = FALSE LIMIT 1",
                &[&branch_id, &parent_id],
            )?
            .pop())
    }

    fn branch(&self, id: &str) -> Result<Option<Branch>> {
        Ok(self.branches_where("id = ?1", &[&id])?.pop())
    }

    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>> {
        Ok(self
            .branches_where(
                "campaign_id = ?1 AND name = ?2 AND is_deleted = FALSE",
                &[&campaign_id, &name],
            )?
            .pop())
    }

    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        self.branches_where("campaign_id = ?1 ORDER BY seq", &[&campaign_id])
    }

    fn head(&self, branch_id: &str) -> Result<Option<Head>> {
        self.0
            .query_row(
                "SELECT version_id, version_hash FROM heads WHERE branch_id = ?1",
                params![branch_id],
                |row| {
                    Ok(Head {
                        version_id: row.get(0)?,
                        version_hash: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Error::storage)
    }

    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        let sql = format!(
            "SELECT {TRANSITION_COLUMNS} FROM state_transitions WHERE campaign_id = ?1 ORDER BY seq"
        );
        let mut stmt = self.0.prepare(&sql).map_err(Error::storage)?;
        let rows = stmt
            .query_map(params![campaign_id], read_transition_row)
            .map_err(Error::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage)?;
        rows.into_iter().map(row_to_transition).collect()
    }
}

impl LedgerRead for SqliteStore {
    fn version(&self, id: &str) -> Result<Option<Version>> {
        Queries(&*self.lock()?).version(id)
    }

    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>> {
        Queries(&*self.lock()?).version_by_hash(campaign_id, version_hash)
    }

    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        Queries(&*self.lock()?).versions(campaign_id)
    }

    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>> {
        Queries(&*self.lock()?).live_child(branch_id, parent_id)
    }

    fn branch(&self, id: &str) -> Result<Option<Branch>> {
        Queries(&*self.lock()?).branch(id)
    }

    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>> {
        Queries(&*self.lock()?).branch_by_name(campaign_id, name)
    }

    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        Queries(&*self.lock()?).branches(campaign_id)
    }

    fn head(&self, branch_id: &str) -> Result<Option<Head>> {
        Queries(&*self.lock()?).head(branch_id)
    }

    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        Queries(&*self.lock()?).transitions(campaign_id)
    }
}

// ── Writes ──────────────────────────────────────────────────────────

/// An open IMMEDIATE transaction. Rolled back on drop unless committed.
struct SqliteTx<'c> {
    tx: rusqlite::Transaction<'c>,
}

impl LedgerRead for SqliteTx<'_> {
    fn version(&self, id: &str) -> Result<Option<Version>> {
        Queries(&self.tx).version(id)
    }

    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>> {
        Queries(&self.tx).version_by_hash(campaign_id, version_hash)
    }

    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        Queries(&self.tx).versions(campaign_id)
    }

    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>> {
        Queries(&self.tx).live_child(branch_id, parent_id)
    }

    fn branch(&self, id: &str) -> Result<Option<Branch>> {
        Queries(&self.tx).branch(id)
    }

    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>> {
        Queries(&self.tx).branch_by_name(campaign_id, name)
    }

    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        Queries(&self.tx).branches(campaign_id)
    }

    fn head(&self, branch_id: &str) -> Result<Option<Head>> {
        Queries(&self.tx).head(branch_id)
    }

    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        Queries(&self.tx).transitions(campaign_id)
    }
}

impl LedgerWrite for SqliteTx<'_> {
    fn insert_version(&mut self, version: &Version) -> Result<()> {
        let content = serde_json::to_string(&version.content).map_err(Error::storage)?;
        let metadata = serde_json::to_string(&version.metadata).map_err(Error::storage)?;
        self.tx
            .execute(
                "INSERT INTO versions (
                    id, campaign_id, branch_id, parent_id, version_hash, version_type,
                    title, message, author, content, metadata, created_at, is_deleted
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    version.id,
                    version.campaign_id,
                    version.branch_id,
                    version.parent_id,
                    version.version_hash,
                    version.version_type.as_str(),
                    version.title,
                    version.message,
                    version.author,
                    content,
                    metadata,
                    version.created_at,
                    version.is_deleted,
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("versions.branch_id") {
                    Error::from(VersionControlError::DuplicateHash {
                        branch_id: version.branch_id.clone(),
                        parent_id: version.parent_id.clone().unwrap_or_default(),
                    })
                } else {
                    Error::storage(e)
                }
            })?;
        Ok(())
    }

    fn insert_branch(&mut self, branch: &Branch, head: &Head) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO branches (
                    id, campaign_id, name, branch_type, description,
                    base_version_hash, created_at, is_deleted
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    branch.id,
                    branch.campaign_id,
                    branch.name,
                    branch.branch_type.as_str(),
                    branch.description,
                    branch.base_version_hash,
                    branch.created_at,
                    branch.is_deleted,
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("branches.campaign_id") {
                    Error::from(VersionControlError::BranchExists {
                        campaign_id: branch.campaign_id.clone(),
                        name: branch.name.clone(),
                    })
                } else {
                    Error::storage(e)
                }
            })?;
        self.set_head(&branch.campaign_id, &branch.id, head)
    }

    fn set_head(&mut self, campaign_id: &str, branch_id: &str, head: &Head) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO heads (branch_id, campaign_id, version_id, version_hash)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(branch_id) DO UPDATE SET
                    version_id = excluded.version_id,
                    version_hash = excluded.version_hash",
                params![branch_id, campaign_id, head.version_id, head.version_hash],
            )
            .map_err(Error::storage)?;
        Ok(())
    }

    fn insert_transition(&mut self, transition: &StateTransition) -> Result<()> {
        let from_state = transition
            .from_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::storage)?;
        let to_state = serde_json::to_string(&transition.to_state).map_err(Error::storage)?;
        self.tx
            .execute(
                "INSERT INTO state_transitions (
                    id, campaign_id, version_id, from_state, to_state,
                    transition_type, reason, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    transition.id,
                    transition.campaign_id,
                    transition.version_id,
                    from_state,
                    to_state,
                    transition.transition_type.as_str(),
                    transition.reason,
                    transition.created_at,
                ],
            )
            .map_err(Error::storage)?;
        Ok(())
    }

    fn mark_version_deleted(&mut self, version_id: &str) -> Result<()> {
        let n = self
            .tx
            .execute(
                "UPDATE versions SET is_deleted = TRUE WHERE id = ?1",
                params![version_id],
            )
            .map_err(Error::storage)?;
        if n == 0 {
            return Err(Error::storage(format!("no version {version_id}")));
        }
        Ok(())
    }

    fn mark_branch_deleted(&mut self, branch_id: &str) -> Result<()> {
        let n = self
            .tx
            .execute(
                "UPDATE branches SET is_deleted = TRUE WHERE id = ?1",
                params![branch_id],
            )
            .map_err(Error::storage)?;
        if n == 0 {
            return Err(Error::storage(format!("no branch {branch_id}")));
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn LedgerWrite) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(Error::storage)?;
        let mut handle = SqliteTx { tx };
        let out = f(&mut handle)?;
        handle.tx.commit().map_err(Error::storage)?;
        Ok(out)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

struct VersionRow {
    id: String,
    campaign_id: String,
    branch_id: String,
    parent_id: Option<String>,
    version_hash: String,
    version_type: String,
    title: String,
    message: String,
    author: String,
    content: String,
    metadata: String,
    created_at: String,
    is_deleted: bool,
}

fn read_version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        branch_id: row.get(2)?,
        parent_id: row.get(3)?,
        version_hash: row.get(4)?,
        version_type: row.get(5)?,
        title: row.get(6)?,
        message: row.get(7)?,
        author: row.get(8)?,
        content: row.get(9)?,
        metadata: row.get(10)?,
        created_at: row.get(11)?,
        is_deleted: row.get(12)?,
    })
}

fn row_to_version(row: VersionRow) -> Result<Version> {
    let content = parse_json(&row.content, &row.id)?;
    let metadata: Map<String, Value> = serde_json::from_str(&row.metadata)
        .map_err(|e| StateError::MalformedContent(format!("metadata of {}: {e}", row.id)))?;
    Ok(Version {
        version_type: row.version_type.parse()?,
        id: row.id,
        campaign_id: row.campaign_id,
        branch_id: row.branch_id,
        parent_id: row.parent_id,
        version_hash: row.version_hash,
        title: row.title,
        message: row.message,
        author: row.author,
        content,
        metadata,
        created_at: row.created_at,
        is_deleted: row.is_deleted,
    })
}

struct BranchRow {
    id: String,
    campaign_id: String,
    name: String,
    branch_type: String,
    description: String,
    base_version_hash: String,
    created_at: String,
    is_deleted: bool,
}

fn read_branch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BranchRow> {
    Ok(BranchRow {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        name: row.get(2)?,
        branch_type: row.get(3)?,
        description: row.get(4)?,
        base_version_hash: row.get(5)?,
        created_at: row.get(6)?,
        is_deleted: row.get(7)?,
    })
}

fn row_to_branch(row: BranchRow) -> Result<Branch> {
    Ok(Branch {
        branch_type: row.branch_type.parse()?,
        id: row.id,
        campaign_id: row.campaign_id,
        name: row.name,
        description: row.description,
        base_version_hash: row.base_version_hash,
        created_at: row.created_at,
        is_deleted: row.is_deleted,
    })
}

struct TransitionRow {
    id: String,
    campaign_id: String,
    version_id: String,
    from_state: Option<String>,
    to_state: String,
    transition_type: String,
    reason: String,
    created_at: String,
}

fn read_transition_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRow> {
    Ok(TransitionRow {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        version_id: row.get(2)?,
        from_state: row.get(3)?,
        to_state: row.get(4)?,
        transition_type: row.get(5)?,
        reason: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_transition(row: TransitionRow) -> Result<StateTransition> {
    let from_state = match &row.from_state {
        Some(s) => Some(parse_json(s, &row.id)?),
        None => None,
    };
    Ok(StateTransition {
        to_state: parse_json(&row.to_state, &row.id)?,
        transition_type: row.transition_type.parse()?,
        from_state,
        id: row.id,
        campaign_id: row.campaign_id,
        version_id: row.version_id,
        reason: row.reason,
        created_at: row.created_at,
    })
}

fn parse_json(s: &str, owner: &str) -> Result<Value> {
    serde_json::from_str(s)
        .map_err(|e| StateError::MalformedContent(format!("{owner}: {e}")).into())
}
