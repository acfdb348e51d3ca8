//! Branch Manager: named head pointers and their compare-and-swap.

use saga_core::{
    new_branch_id, now_rfc3339, Branch, BranchType, Error, Head, Result, VersionControlError,
};
use saga_ledger::{LedgerRead, LedgerWrite};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(VersionControlError::InvalidBranchName(format!(
            "`{name}` must be 1-64 characters"
        ))
        .into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' || c == '/')
    {
        return Err(VersionControlError::InvalidBranchName(format!(
            "`{name}` may only contain [A-Za-z0-9._-/]"
        ))
        .into());
    }
    Ok(())
}

/// Read side of the branch table.
pub struct BranchManager<'a, R: LedgerRead + ?Sized> {
    ledger: &'a R,
}

impl<'a, R: LedgerRead + ?Sized> BranchManager<'a, R> {
    pub fn new(ledger: &'a R) -> Self {
        Self { ledger }
    }

    /// Any branch, live or deleted.
    pub fn get(&self, branch_id: &str) -> Result<Branch> {
        self.ledger
            .branch(branch_id)?
            .ok_or_else(|| VersionControlError::BranchNotFound(branch_id.to_string()).into())
    }

    /// A branch that still accepts commits.
    pub fn get_live(&self, branch_id: &str) -> Result<Branch> {
        let branch = self.get(branch_id)?;
        if branch.is_deleted {
            return Err(VersionControlError::BranchDeleted(branch_id.to_string()).into());
        }
        Ok(branch)
    }

    pub fn find(&self, campaign_id: &str, name: &str) -> Result<Branch> {
        self.ledger
            .branch_by_name(campaign_id, name)?
            .ok_or_else(|| VersionControlError::BranchNotFound(name.to_string()).into())
    }

    pub fn get_head(&self, branch_id: &str) -> Result<Head> {
        self.ledger
            .head(branch_id)?
            .ok_or_else(|| VersionControlError::BranchNotFound(branch_id.to_string()).into())
    }

    /// Live branches of a campaign in creation order.
    pub fn list(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        Ok(self
            .ledger
            .branches(campaign_id)?
            .into_iter()
            .filter(|b| !b.is_deleted)
            .collect())
    }
}

/// What a new branch looks like before it is stored.
#[derive(Debug, Clone)]
pub struct NewBranch<'a> {
    pub campaign_id: &'a str,
    pub name: &'a str,
    pub branch_type: BranchType,
    pub description: &'a str,
    pub base_version_hash: &'a str,
}

/// Create a branch whose head is the existing version `base_version_hash`.
///
/// The base must be a live version of the same campaign, on any branch. No
/// version is written.
pub fn create_branch<W: LedgerWrite + ?Sized>(tx: &mut W, new: NewBranch<'_>) -> Result<Branch> {
    validate_branch_name(new.name)?;
    if tx.branch_by_name(new.campaign_id, new.name)?.is_some() {
        return Err(VersionControlError::BranchExists {
            campaign_id: new.campaign_id.to_string(),
            name: new.name.to_string(),
        }
        .into());
    }
    let base = match tx.version_by_hash(new.campaign_id, new.base_version_hash)? {
        Some(v) if !v.is_deleted => v,
        _ => {
            return Err(
                VersionControlError::VersionNotFound(new.base_version_hash.to_string()).into(),
            )
        }
    };
    let branch = Branch {
        id: new_branch_id(),
        campaign_id: new.campaign_id.to_string(),
        name: new.name.to_string(),
        branch_type: new.branch_type,
        description: new.description.to_string(),
        base_version_hash: base.version_hash.clone(),
        created_at: now_rfc3339(),
        is_deleted: false,
    };
    tx.insert_branch(&branch, &base.head())?;
    Ok(branch)
}

/// Compare-and-swap the branch head.
///
/// Succeeds only if the stored head still names `expected.version_id`.
pub fn advance_head<W: LedgerWrite + ?Sized>(
    tx: &mut W,
    branch: &Branch,
    expected: &Head,
    new_head: &Head,
) -> Result<()> {
    let current = tx
        .head(&branch.id)?
        .ok_or_else(|| Error::from(VersionControlError::BranchNotFound(branch.id.clone())))?;
    if current.version_id != expected.version_id {
        return Err(VersionControlError::StaleHead {
            branch_id: branch.id.clone(),
            expected: expected.version_hash.clone(),
            actual: current.version_hash,
        }
        .into());
    }
    tx.set_head(&branch.campaign_id, &branch.id, new_head)
}

/// In-process per-branch mutual exclusion for operations that touch more
/// than one head.
///
/// Ids are always taken in sorted order, so two holders can never wait on
/// each other.
#[derive(Default)]
pub struct BranchLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every id in `branch_ids` is free, then hold them all.
    pub fn acquire(&self, branch_ids: &[&str]) -> Result<BranchGuard<'_>> {
        let mut ids: Vec<String> = branch_ids.iter().map(|s| s.to_string()).collect();
        ids.sort();
        ids.dedup();

        let mut held = self.lock_set()?;
        for id in &ids {
            while held.contains(id) {
                held = self
                    .released
                    .wait(held)
                    .map_err(|_| Error::storage("branch lock poisoned"))?;
            }
            held.insert(id.clone());
        }
        tracing::debug!(branches = ?ids, "branch locks acquired");
        Ok(BranchGuard { locks: self, ids })
    }

    fn lock_set(&self) -> Result<MutexGuard<'_, HashSet<String>>> {
        self.held
            .lock()
            .map_err(|_| Error::storage("branch lock poisoned"))
    }
}

/// Releases its branch ids on drop.
pub struct BranchGuard<'a> {
    locks: &'a BranchLocks,
    ids: Vec<String>,
}

impl BranchGuard<'_> {
    pub fn branch_ids(&self) -> &[String] {
        &self.ids
    }
}

impl Drop for BranchGuard<'_> {
    fn drop(&mut self) {
        let mut held = match self.locks.held.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        for id in &self.ids {
            held.remove(id);
        }
        self.locks.released.notify_all();
    }
}
