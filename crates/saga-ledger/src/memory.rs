//! In-process store. Used by tests and by callers embedding the engine
//! without durable storage.

use crate::store::{LedgerRead, LedgerWrite, Store};
use saga_core::{Branch, Error, Head, Result, StateTransition, Version};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    versions: Vec<Version>,
    branches: Vec<Branch>,
    heads: HashMap<String, (String, Head)>,
    transitions: Vec<StateTransition>,
}

/// `Mutex`-guarded tables. A transaction runs against a working copy that
/// replaces the tables only if the closure succeeds.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::storage("memory store mutex poisoned"))
    }
}

impl LedgerRead for Tables {
    fn version(&self, id: &str) -> Result<Option<Version>> {
        Ok(self.versions.iter().find(|v| v.id == id).cloned())
    }

    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>> {
        let matching = || {
            self.versions
                .iter()
                .rev()
                .filter(|v| v.campaign_id == campaign_id && v.version_hash == version_hash)
        };
        Ok(matching()
            .find(|v| !v.is_deleted)
            .or_else(|| matching().next())
            .cloned())
    }

    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        Ok(self
            .versions
            .iter()
            .filter(|v| v.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>> {
        Ok(self
            .versions
            .iter()
            .find(|v| {
                !v.is_deleted
                    && v.branch_id == branch_id
                    && v.parent_id.as_deref() == Some(parent_id)
            })
            .cloned())
    }

    fn branch(&self, id: &str) -> Result<Option<Branch>> {
        Ok(self.branches.iter().find(|b| b.id == id).cloned())
    }

    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>> {
        Ok(self
            .branches
            .iter()
            .find(|b| !b.is_deleted && b.campaign_id == campaign_id && b.name == name)
            .cloned())
    }

    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        Ok(self
            .branches
            .iter()
            .filter(|b| b.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn head(&self, branch_id: &str) -> Result<Option<Head>> {
        Ok(self.heads.get(branch_id).map(|(_, head)| head.clone()))
    }

    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        Ok(self
            .transitions
            .iter()
            .filter(|t| t.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

impl LedgerWrite for Tables {
    fn insert_version(&mut self, version: &Version) -> Result<()> {
        if self.versions.iter().any(|v| v.id == version.id) {
            return Err(Error::storage(format!("duplicate version id {}", version.id)));
        }
        self.versions.push(version.clone());
        Ok(())
    }

    fn insert_branch(&mut self, branch: &Branch, head: &Head) -> Result<()> {
        if self.branches.iter().any(|b| b.id == branch.id) {
            return Err(Error::storage(format!("duplicate branch id {}", branch.id)));
        }
        self.branches.push(branch.clone());
        self.heads
            .insert(branch.id.clone(), (branch.campaign_id.clone(), head.clone()));
        Ok(())
    }

    fn set_head(&mut self, campaign_id: &str, branch_id: &str, head: &Head) -> Result<()> {
        self.heads
            .insert(branch_id.to_string(), (campaign_id.to_string(), head.clone()));
        Ok(())
    }

    fn insert_transition(&mut self, transition: &StateTransition) -> Result<()> {
        self.transitions.push(transition.clone());
        Ok(())
    }

    fn mark_version_deleted(&mut self, version_id: &str) -> Result<()> {
        match self.versions.iter_mut().find(|v| v.id == version_id) {
            Some(v) => {
                v.is_deleted = true;
                Ok(())
            }
            None => Err(Error::storage(format!("no version {version_id}"))),
        }
    }

    fn mark_branch_deleted(&mut self, branch_id: &str) -> Result<()> {
        match self.branches.iter_mut().find(|b| b.id == branch_id) {
            Some(b) => {
                b.is_deleted = true;
                Ok(())
            }
            None => Err(Error::storage(format!("no branch {branch_id}"))),
        }
    }
}

impl LedgerRead for MemoryStore {
    fn version(&self, id: &str) -> Result<Option<Version>> {
        self.lock()?.version(id)
    }

    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>> {
        self.lock()?.version_by_hash(campaign_id, version_hash)
    }

    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        self.lock()?.versions(campaign_id)
    }

    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>> {
        self.lock()?.live_child(branch_id, parent_id)
    }

    fn branch(&self, id: &str) -> Result<Option<Branch>> {
        self.lock()?.branch(id)
    }

    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>> {
        self.lock()?.branch_by_name(campaign_id, name)
    }

    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        self.lock()?.branches(campaign_id)
    }

    fn head(&self, branch_id: &str) -> Result<Option<Head>> {
        self.lock()?.head(branch_id)
    }

    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        self.lock()?.transitions(campaign_id)
    }
}

impl Store for MemoryStore {
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn LedgerWrite) -> Result<T>) -> Result<T> {
        let mut tables = self.lock()?;
        let mut work = tables.clone();
        let out = f(&mut work)?;
        *tables = work;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_core::{BranchType, VersionType};
    use serde_json::json;

    fn version(id: &str, parent: Option<&str>, hash: &str) -> Version {
        Version {
            id: id.into(),
            campaign_id: "c1".into(),
            branch_id: "br_main".into(),
            parent_id: parent.map(str::to_string),
            version_hash: hash.into(),
            version_type: VersionType::Snapshot,
            title: String::new(),
            message: String::new(),
            author: "gm".into(),
            content: json!({}),
            metadata: Default::default(),
            created_at: "2026-01-01T00:00:00Z".into(),
            is_deleted: false,
        }
    }

    fn branch() -> Branch {
        Branch {
            id: "br_main".into(),
            campaign_id: "c1".into(),
            name: "main".into(),
            branch_type: BranchType::Main,
            description: String::new(),
            base_version_hash: "h0".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            is_deleted: false,
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let res: Result<()> = store.transaction(|tx| {
            tx.insert_version(&version("ver_0", None, "h0"))?;
            Err(Error::storage("boom"))
        });
        assert!(res.is_err());
        assert!(store.version("ver_0").unwrap().is_none());
    }

    #[test]
    fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let v0 = version("ver_0", None, "h0");
        store
            .transaction(|tx| {
                tx.insert_version(&v0)?;
                tx.insert_branch(&branch(), &v0.head())
            })
            .unwrap();
        assert_eq!(store.version("ver_0").unwrap(), Some(v0.clone()));
        assert_eq!(store.head("br_main").unwrap(), Some(v0.head()));
        assert_eq!(store.branch_by_name("c1", "main").unwrap().unwrap().id, "br_main");
    }

    #[test]
    fn reads_inside_transaction_see_own_writes() {
        let store = MemoryStore::new();
        store
            .transaction(|tx| {
                tx.insert_version(&version("ver_0", None, "h0"))?;
                tx.insert_version(&version("ver_1", Some("ver_0"), "h1"))?;
                assert!(tx.live_child("br_main", "ver_0")?.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn version_by_hash_prefers_live() {
        let store = MemoryStore::new();
        store
            .transaction(|tx| {
                tx.insert_version(&version("ver_a", None, "same"))?;
                tx.insert_version(&version("ver_b", Some("ver_a"), "same"))?;
                tx.mark_version_deleted("ver_b")
            })
            .unwrap();
        let v = store.version_by_hash("c1", "same").unwrap().unwrap();
        assert_eq!(v.id, "ver_a");
        assert!(store.live_child("br_main", "ver_a").unwrap().is_none());
    }

    #[test]
    fn deleted_branch_hidden_from_name_lookup() {
        let store = MemoryStore::new();
        let v0 = version("ver_0", None, "h0");
        store
            .transaction(|tx| {
                tx.insert_branch(&branch(), &v0.head())?;
                tx.mark_branch_deleted("br_main")
            })
            .unwrap();
        assert!(store.branch_by_name("c1", "main").unwrap().is_none());
        assert!(store.branch("br_main").unwrap().unwrap().is_deleted);
        assert_eq!(store.branches("c1").unwrap().len(), 1);
    }
}
