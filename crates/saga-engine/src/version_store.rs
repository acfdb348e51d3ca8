//! Version Store: the append-only graph of versions.
//!
//! Every version points at a single parent. Merges record their second
//! parent in metadata only, so an ancestor walk is a plain linked-list walk
//! that may cross branches.

use saga_core::{meta, Error, Result, Version, VersionControlError, VersionType};
use saga_ledger::{LedgerRead, LedgerWrite};
use std::collections::HashSet;

/// Read side of the version graph over any ledger view (a store or an open
/// transaction).
pub struct VersionStore<'a, R: LedgerRead + ?Sized> {
    ledger: &'a R,
}

impl<'a, R: LedgerRead + ?Sized> VersionStore<'a, R> {
    pub fn new(ledger: &'a R) -> Self {
        Self { ledger }
    }

    /// Look up a version by content hash within a campaign.
    pub fn get(&self, campaign_id: &str, version_hash: &str) -> Result<Version> {
        self.ledger
            .version_by_hash(campaign_id, version_hash)?
            .ok_or_else(|| VersionControlError::VersionNotFound(version_hash.to_string()).into())
    }

    pub fn get_by_id(&self, version_id: &str) -> Result<Version> {
        self.ledger
            .version(version_id)?
            .ok_or_else(|| VersionControlError::VersionNotFound(version_id.to_string()).into())
    }

    /// Resolve either a version id or a content hash.
    pub fn resolve(&self, campaign_id: &str, reference: &str) -> Result<Version> {
        match self.ledger.version(reference)? {
            Some(v) if v.campaign_id == campaign_id => Ok(v),
            _ => self.get(campaign_id, reference),
        }
    }

    /// Lazy walk from `start` (inclusive) back to its root.
    pub fn ancestors(&self, start: &Version) -> Ancestors<'a, R> {
        Ancestors::new(self.ledger, start.clone())
    }

    /// Whether `candidate_id` is `of` itself or one of its ancestors.
    pub fn is_ancestor(&self, candidate_id: &str, of: &Version) -> Result<bool> {
        for v in self.ancestors(of) {
            if v?.id == candidate_id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The most recent version reachable from both `left` and `right`.
    pub fn lowest_common_ancestor(&self, left: &Version, right: &Version) -> Result<Version> {
        let no_common = || {
            Error::from(VersionControlError::NoCommonAncestor {
                left: left.id.clone(),
                right: right.id.clone(),
            })
        };
        if left.campaign_id != right.campaign_id {
            return Err(no_common());
        }
        let left_chain: HashSet<String> = self
            .ancestors(left)
            .map(|v| v.map(|v| v.id))
            .collect::<Result<_>>()?;
        for v in self.ancestors(right) {
            let v = v?;
            if left_chain.contains(&v.id) {
                tracing::debug!(left = %left.id, right = %right.id, ancestor = %v.id, "common ancestor found");
                return Ok(v);
            }
        }
        Err(no_common())
    }

    /// Base for a three-way merge of `source` into `target`.
    ///
    /// Starts from the parent-link LCA, then looks at merge versions on the
    /// target side of it. The newest one whose recorded `source_head_id` is in
    /// the source's history already carries that source head, so that head is
    /// the base. Repeated merges of a long-lived branch therefore only see the
    /// source commits made since the previous merge.
    pub fn merge_base(&self, source: &Version, target: &Version) -> Result<Version> {
        let lca = self.lowest_common_ancestor(source, target)?;
        for v in self.ancestors(target) {
            let v = v?;
            if v.id == lca.id {
                break;
            }
            if v.version_type != VersionType::Merge {
                continue;
            }
            let Some(merged_id) = v.metadata.get(meta::SOURCE_HEAD_ID).and_then(|id| id.as_str())
            else {
                continue;
            };
            if !self.is_ancestor(merged_id, source)? {
                continue;
            }
            let merged = self.get_by_id(merged_id)?;
            if merged.id != lca.id && self.is_ancestor(&lca.id, &merged)? {
                tracing::debug!(
                    source = %source.id,
                    target = %target.id,
                    lca = %lca.id,
                    base = %merged.id,
                    merge = %v.id,
                    "merge base moved past earlier merge"
                );
                return Ok(merged);
            }
        }
        Ok(lca)
    }
}

/// Append a new immutable version.
///
/// Fails with `duplicate_hash` when the branch already has a live child of
/// the same parent.
pub fn append<W: LedgerWrite + ?Sized>(tx: &mut W, version: Version) -> Result<Version> {
    if let Some(parent_id) = &version.parent_id {
        if tx.live_child(&version.branch_id, parent_id)?.is_some() {
            return Err(VersionControlError::DuplicateHash {
                branch_id: version.branch_id.clone(),
                parent_id: parent_id.clone(),
            }
            .into());
        }
    }
    tx.insert_version(&version)?;
    tracing::debug!(version_id = %version.id, hash = %version.version_hash, "version appended");
    Ok(version)
}

/// Iterator over a version and its ancestors, newest first.
///
/// Finite: stops at a root, at a missing parent (yielding the error once),
/// or if a parent link ever loops back on itself. Cloning, or calling
/// [`Ancestors::restart`], re-walks from the same start.
pub struct Ancestors<'a, R: LedgerRead + ?Sized> {
    ledger: &'a R,
    start: Version,
    next: Option<Next>,
    seen: HashSet<String>,
}

enum Next {
    Start,
    Id(String),
}

impl<R: LedgerRead + ?Sized> Clone for Ancestors<'_, R> {
    fn clone(&self) -> Self {
        Self::new(self.ledger, self.start.clone())
    }
}

impl<'a, R: LedgerRead + ?Sized> Ancestors<'a, R> {
    fn new(ledger: &'a R, start: Version) -> Self {
        Self {
            ledger,
            start,
            next: Some(Next::Start),
            seen: HashSet::new(),
        }
    }

    pub fn restart(&mut self) {
        self.next = Some(Next::Start);
        self.seen.clear();
    }
}

impl<R: LedgerRead + ?Sized> Iterator for Ancestors<'_, R> {
    type Item = Result<Version>;

    fn next(&mut self) -> Option<Self::Item> {
        let version = match self.next.take()? {
            Next::Start => self.start.clone(),
            Next::Id(id) => match self.ledger.version(&id) {
                Ok(Some(v)) => v,
                Ok(None) => return Some(Err(VersionControlError::VersionNotFound(id).into())),
                Err(e) => return Some(Err(e)),
            },
        };
        if !self.seen.insert(version.id.clone()) {
            tracing::warn!(version_id = %version.id, "cycle in parent links");
            return None;
        }
        self.next = version.parent_id.clone().map(Next::Id);
        Some(Ok(version))
    }
}
