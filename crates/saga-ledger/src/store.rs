//! Persistence Store contract.
//!
//! Three append-mostly collections (`versions`, `branches`,
//! `state_transitions`) plus a head index keyed by `(campaign_id,
//! branch_id)`. Writes only happen inside [`Store::transaction`], which is
//! all-or-nothing: when the closure returns an error nothing it wrote is
//! visible to later reads.

use saga_core::{Branch, Head, Result, StateTransition, Version};

/// Point and list queries. Implemented by stores and by open transactions.
pub trait LedgerRead {
    fn version(&self, id: &str) -> Result<Option<Version>>;

    /// Version with this content hash in the campaign. Prefers live versions,
    /// then the most recently created.
    fn version_by_hash(&self, campaign_id: &str, version_hash: &str) -> Result<Option<Version>>;

    /// Every version of a campaign in commit order, deleted ones included.
    fn versions(&self, campaign_id: &str) -> Result<Vec<Version>>;

    /// The live (non-deleted) child of `parent_id` on `branch_id`, if any.
    fn live_child(&self, branch_id: &str, parent_id: &str) -> Result<Option<Version>>;

    fn branch(&self, id: &str) -> Result<Option<Branch>>;

    /// Live branch with this name in the campaign.
    fn branch_by_name(&self, campaign_id: &str, name: &str) -> Result<Option<Branch>>;

    /// Every branch of a campaign in creation order, deleted ones included.
    fn branches(&self, campaign_id: &str) -> Result<Vec<Branch>>;

    fn head(&self, branch_id: &str) -> Result<Option<Head>>;

    /// Audit trail of a campaign, oldest first.
    fn transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>>;
}

/// Mutations available inside a transaction.
pub trait LedgerWrite: LedgerRead {
    fn insert_version(&mut self, version: &Version) -> Result<()>;

    /// Insert a branch together with its initial head.
    fn insert_branch(&mut self, branch: &Branch, head: &Head) -> Result<()>;

    fn set_head(&mut self, campaign_id: &str, branch_id: &str, head: &Head) -> Result<()>;

    fn insert_transition(&mut self, transition: &StateTransition) -> Result<()>;

    fn mark_version_deleted(&mut self, version_id: &str) -> Result<()>;

    fn mark_branch_deleted(&mut self, branch_id: &str) -> Result<()>;
}

/// A durable home for version history, safe to share across threads.
pub trait Store: LedgerRead + Send + Sync {
    /// Run `f` atomically. Commits when `f` returns `Ok`, rolls back otherwise.
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn LedgerWrite) -> Result<T>) -> Result<T>;
}
