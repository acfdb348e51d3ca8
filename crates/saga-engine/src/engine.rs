//! The orchestrating engine: every inbound operation lives here.
//!
//! A commit is `validate -> hash -> advance head (CAS) -> append -> record`,
//! with the last three inside one store transaction, then best-effort event
//! publication. A stale head sends the commit back to the top with a fresh
//! head, up to `max_commit_attempts` times.

use crate::branch_manager::{self, BranchLocks, BranchManager, NewBranch};
use crate::config::EngineConfig;
use crate::merge::plan_merge;
use crate::publish::{EventPublisher, NullPublisher};
use crate::recorder;
use crate::version_store::{self, VersionStore};
use saga_core::delta::{self, FieldChange};
use saga_core::event::{EngineEvent, EventKind};
use saga_core::hash::content_hash;
use saga_core::validate::StateValidator;
use saga_core::{
    meta, new_branch_id, new_version_id, now_rfc3339, Branch, BranchType, Error, Head, Result,
    StateTransition, TransitionType, ValidationError, Version, VersionControlError, VersionType,
    CANON_SAGA_V1, MAIN_BRANCH,
};
use saga_ledger::Store;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A new snapshot for a branch.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub campaign_id: String,
    pub branch_id: String,
    pub content: Value,
    pub title: String,
    pub message: String,
    pub author: String,
    pub transition_type: TransitionType,
    pub reason: String,
    pub metadata: Map<String, Value>,
    pub cancel: CancellationToken,
}

impl CommitRequest {
    pub fn new(campaign_id: impl Into<String>, branch_id: impl Into<String>, content: Value) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            branch_id: branch_id.into(),
            content,
            title: String::new(),
            message: String::new(),
            author: String::new(),
            transition_type: TransitionType::Update,
            reason: String::new(),
            metadata: Map::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn transition(mut self, transition_type: TransitionType) -> Self {
        self.transition_type = transition_type;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Merge `source_branch_id` into `target_branch_id`.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub campaign_id: String,
    pub source_branch_id: String,
    pub target_branch_id: String,
    pub author: String,
    pub message: String,
    pub cancel: CancellationToken,
}

impl MergeRequest {
    pub fn new(
        campaign_id: impl Into<String>,
        source_branch_id: impl Into<String>,
        target_branch_id: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            source_branch_id: source_branch_id.into(),
            target_branch_id: target_branch_id.into(),
            author: String::new(),
            message: String::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Restore the content of an earlier version on a branch.
#[derive(Debug, Clone)]
pub struct RevertRequest {
    pub campaign_id: String,
    pub branch_id: String,
    /// Version id or content hash of an ancestor of the branch head.
    pub target: String,
    pub author: String,
    pub message: String,
    pub cancel: CancellationToken,
}

impl RevertRequest {
    pub fn new(
        campaign_id: impl Into<String>,
        branch_id: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            branch_id: branch_id.into(),
            target: target.into(),
            author: String::new(),
            message: String::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A landed commit. `warnings` lists event publications that failed.
#[derive(Debug, Clone)]
pub struct Committed {
    pub version: Version,
    pub transition: StateTransition,
    pub warnings: Vec<String>,
}

/// What a commit attempt wants to write, computed against a fresh head.
struct Draft {
    content: Value,
    version_type: VersionType,
    transition_type: TransitionType,
    metadata: Map<String, Value>,
}

struct CommitMeta<'r> {
    campaign_id: &'r str,
    branch_id: &'r str,
    title: &'r str,
    message: &'r str,
    author: &'r str,
    reason: &'r str,
    operation: &'static str,
    cancel: &'r CancellationToken,
}

pub struct Engine<S> {
    store: S,
    config: EngineConfig,
    validator: StateValidator,
    publisher: Arc<dyn EventPublisher>,
    locks: BranchLocks,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        Self {
            validator: config.validator(),
            config,
            store,
            publisher: Arc::new(NullPublisher),
            locks: BranchLocks::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.validator = config.validator();
        self.config = config;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Create the `main` branch and the campaign's root version.
    pub fn initialize(
        &self,
        campaign_id: &str,
        content: Value,
        author: &str,
        message: &str,
    ) -> Result<Committed> {
        if !self.store.branches(campaign_id)?.is_empty() {
            return Err(VersionControlError::AlreadyInitialized(campaign_id.to_string()).into());
        }
        if let Err(reason) =
            self.validator
                .validate_state_change(None, &content, TransitionType::Initialize)
        {
            self.reject(campaign_id, None, "initialize", &reason);
            return Err(reason.into());
        }

        let branch_id = new_branch_id();
        let created_at = now_rfc3339();
        let root = Version {
            id: new_version_id(),
            campaign_id: campaign_id.to_string(),
            branch_id: branch_id.clone(),
            parent_id: None,
            version_hash: content_hash(&content),
            version_type: VersionType::Snapshot,
            title: "Initial version".to_string(),
            message: message.to_string(),
            author: author.to_string(),
            content,
            metadata: canon_metadata(Map::new()),
            created_at: created_at.clone(),
            is_deleted: false,
        };
        let main = Branch {
            id: branch_id,
            campaign_id: campaign_id.to_string(),
            name: MAIN_BRANCH.to_string(),
            branch_type: BranchType::Main,
            description: "Main storyline".to_string(),
            base_version_hash: root.version_hash.clone(),
            created_at,
            is_deleted: false,
        };

        let (root, transition) = self.store.transaction(|tx| {
            if !tx.branches(campaign_id)?.is_empty() {
                return Err(VersionControlError::AlreadyInitialized(campaign_id.to_string()).into());
            }
            let root = version_store::append(tx, root)?;
            tx.insert_branch(&main, &root.head())?;
            let transition =
                recorder::record(tx, &root, None, TransitionType::Initialize, message)?;
            Ok((root, transition))
        })?;
        tracing::info!(
            campaign_id,
            branch_id = %main.id,
            version_id = %root.id,
            hash = %root.version_hash,
            "version control initialized"
        );

        let warnings = self.publish(vec![
            EngineEvent::new(
                campaign_id,
                EventKind::VersionControlInitialized {
                    branch_id: main.id.clone(),
                    version_id: root.id.clone(),
                    version_hash: root.version_hash.clone(),
                },
            ),
            version_created_event(&root),
            transition_event(&transition),
        ]);
        Ok(Committed {
            version: root,
            transition,
            warnings,
        })
    }

    /// Commit a full snapshot on top of the branch head.
    pub fn create_version(&self, req: CommitRequest) -> Result<Committed> {
        let params = CommitMeta {
            campaign_id: &req.campaign_id,
            branch_id: &req.branch_id,
            title: &req.title,
            message: &req.message,
            author: &req.author,
            reason: &req.reason,
            operation: "create_version",
            cancel: &req.cancel,
        };
        let (version, transition) = self.commit(&params, |_head| {
            Ok(Draft {
                content: req.content.clone(),
                version_type: VersionType::Snapshot,
                transition_type: req.transition_type,
                metadata: req.metadata.clone(),
            })
        })?;

        let warnings = self.publish(vec![
            version_created_event(&version),
            transition_event(&transition),
        ]);
        Ok(Committed {
            version,
            transition,
            warnings,
        })
    }

    /// Create a branch pointing at an existing version.
    pub fn create_branch(
        &self,
        campaign_id: &str,
        name: &str,
        branch_type: BranchType,
        description: &str,
        base_version_hash: &str,
    ) -> Result<Branch> {
        let branch = self.store.transaction(|tx| {
            branch_manager::create_branch(
                tx,
                NewBranch {
                    campaign_id,
                    name,
                    branch_type,
                    description,
                    base_version_hash,
                },
            )
        })?;
        tracing::info!(
            campaign_id,
            branch_id = %branch.id,
            name,
            base = base_version_hash,
            "branch created"
        );
        Ok(branch)
    }

    /// Three-way merge of the source head into the target branch.
    ///
    /// Both branch ids are locked (in sorted order) for the whole
    /// read-plan-commit cycle. The source head is never moved.
    pub fn merge_branches(&self, req: MergeRequest) -> Result<Committed> {
        if req.source_branch_id == req.target_branch_id {
            return Err(VersionControlError::SelfMerge(req.source_branch_id.clone()).into());
        }
        let guard = self
            .locks
            .acquire(&[req.source_branch_id.as_str(), req.target_branch_id.as_str()])?;

        let branches = BranchManager::new(&self.store);
        let versions = VersionStore::new(&self.store);
        let source = branches.get_live(&req.source_branch_id)?;
        if source.campaign_id != req.campaign_id {
            return Err(VersionControlError::BranchNotFound(source.id).into());
        }

        let reason = format!("merge {} into {}", req.source_branch_id, req.target_branch_id);
        let params = CommitMeta {
            campaign_id: &req.campaign_id,
            branch_id: &req.target_branch_id,
            title: &reason,
            message: &req.message,
            author: &req.author,
            reason: &reason,
            operation: "merge_branches",
            cancel: &req.cancel,
        };
        let (version, transition) = self.commit(&params, |target_head| {
            let source_head = versions.get_by_id(&branches.get_head(&source.id)?.version_id)?;
            let ancestor = versions.merge_base(&source_head, target_head)?;
            let plan = plan_merge(&ancestor, &source_head, target_head).map_err(|conflicts| {
                tracing::warn!(
                    source = %source.id,
                    target = %req.target_branch_id,
                    conflicts = conflicts.len(),
                    "merge conflict"
                );
                Error::MergeConflict(conflicts)
            })?;
            if plan.is_empty() {
                tracing::debug!(
                    source = %source.id,
                    base = %plan.ancestor_id,
                    "source has no changes since the merge base"
                );
            }
            let mut metadata = Map::new();
            metadata.insert(meta::SOURCE_BRANCH_ID.into(), source.id.clone().into());
            metadata.insert(
                meta::SOURCE_HEAD_HASH.into(),
                source_head.version_hash.clone().into(),
            );
            metadata.insert(meta::SOURCE_HEAD_ID.into(), source_head.id.clone().into());
            metadata.insert(meta::ANCESTOR_ID.into(), plan.ancestor_id.clone().into());
            Ok(Draft {
                content: plan.content,
                version_type: VersionType::Merge,
                transition_type: TransitionType::Merge,
                metadata,
            })
        })?;
        drop(guard);

        let source_head_hash = version
            .metadata
            .get(meta::SOURCE_HEAD_HASH)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::info!(
            source = %source.id,
            target = %req.target_branch_id,
            version_id = %version.id,
            "branches merged"
        );
        let warnings = self.publish(vec![
            EngineEvent::new(
                &req.campaign_id,
                EventKind::BranchesMerged {
                    source_branch_id: source.id.clone(),
                    target_branch_id: req.target_branch_id.clone(),
                    source_head_hash,
                    version_id: version.id.clone(),
                    version_hash: version.version_hash.clone(),
                },
            ),
            transition_event(&transition),
        ]);
        Ok(Committed {
            version,
            transition,
            warnings,
        })
    }

    /// Commit a `revert` version restoring an ancestor's content.
    pub fn revert(&self, req: RevertRequest) -> Result<Committed> {
        let versions = VersionStore::new(&self.store);
        let target = versions.resolve(&req.campaign_id, &req.target)?;
        let title = format!("Revert to {}", target.id);
        let params = CommitMeta {
            campaign_id: &req.campaign_id,
            branch_id: &req.branch_id,
            title: &title,
            message: &req.message,
            author: &req.author,
            reason: &title,
            operation: "revert",
            cancel: &req.cancel,
        };
        let (version, transition) = self.commit(&params, |head| {
            if !versions.is_ancestor(&target.id, head)? {
                return Err(VersionControlError::NotAnAncestor {
                    target: target.id.clone(),
                    head: head.id.clone(),
                }
                .into());
            }
            let mut metadata = Map::new();
            metadata.insert(meta::REVERTED_TO.into(), target.id.clone().into());
            Ok(Draft {
                content: target.content.clone(),
                version_type: VersionType::Revert,
                transition_type: TransitionType::Revert,
                metadata,
            })
        })?;

        let warnings = self.publish(vec![
            version_created_event(&version),
            transition_event(&transition),
        ]);
        Ok(Committed {
            version,
            transition,
            warnings,
        })
    }

    /// Soft-delete a branch. `main` is protected.
    pub fn delete_branch(&self, branch_id: &str) -> Result<Branch> {
        let branch = self.store.transaction(|tx| {
            let branch = BranchManager::new(&*tx).get_live(branch_id)?;
            if branch.branch_type == BranchType::Main || branch.name == MAIN_BRANCH {
                return Err(VersionControlError::ProtectedBranch(branch.name).into());
            }
            tx.mark_branch_deleted(branch_id)?;
            Ok(Branch {
                is_deleted: true,
                ..branch
            })
        })?;
        tracing::info!(branch_id, name = %branch.name, "branch deleted");
        Ok(branch)
    }

    /// Soft-delete a version that no live branch points at.
    pub fn delete_version(&self, version_id: &str) -> Result<Version> {
        let version = self.store.transaction(|tx| {
            let version = VersionStore::new(&*tx).get_by_id(version_id)?;
            for branch in tx.branches(&version.campaign_id)? {
                if branch.is_deleted {
                    continue;
                }
                if tx.head(&branch.id)?.map(|h| h.version_id).as_deref() == Some(version_id) {
                    return Err(VersionControlError::VersionInUse {
                        version_id: version_id.to_string(),
                        branch_id: branch.id,
                    }
                    .into());
                }
            }
            tx.mark_version_deleted(version_id)?;
            Ok(Version {
                is_deleted: true,
                ..version
            })
        })?;
        tracing::info!(version_id, "version deleted");
        Ok(version)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// A version by id or content hash.
    pub fn get_version(&self, campaign_id: &str, reference: &str) -> Result<Version> {
        VersionStore::new(&self.store).resolve(campaign_id, reference)
    }

    /// Live versions of a campaign in commit order.
    pub fn list_versions(&self, campaign_id: &str) -> Result<Vec<Version>> {
        Ok(self
            .store
            .versions(campaign_id)?
            .into_iter()
            .filter(|v| !v.is_deleted)
            .collect())
    }

    /// Live branches of a campaign in creation order.
    pub fn list_branches(&self, campaign_id: &str) -> Result<Vec<Branch>> {
        BranchManager::new(&self.store).list(campaign_id)
    }

    pub fn get_head(&self, branch_id: &str) -> Result<Head> {
        BranchManager::new(&self.store).get_head(branch_id)
    }

    pub fn get_branch(&self, branch_id: &str) -> Result<Branch> {
        BranchManager::new(&self.store).get(branch_id)
    }

    pub fn find_branch(&self, campaign_id: &str, name: &str) -> Result<Branch> {
        BranchManager::new(&self.store).find(campaign_id, name)
    }

    /// The branch head and all its ancestors, newest first.
    pub fn history(&self, branch_id: &str) -> Result<Vec<Version>> {
        let head = self.get_head(branch_id)?;
        let versions = VersionStore::new(&self.store);
        let start = versions.get_by_id(&head.version_id)?;
        versions.ancestors(&start).collect()
    }

    /// Field-level changes from one version to another.
    pub fn diff(&self, campaign_id: &str, from: &str, to: &str) -> Result<Vec<FieldChange>> {
        let versions = VersionStore::new(&self.store);
        let from = versions.resolve(campaign_id, from)?;
        let to = versions.resolve(campaign_id, to)?;
        Ok(delta::delta(&from.content, &to.content))
    }

    pub fn list_transitions(&self, campaign_id: &str) -> Result<Vec<StateTransition>> {
        self.store.transitions(campaign_id)
    }

    /// Run the validator without committing anything.
    pub fn validate_state_change(
        &self,
        campaign_id: &str,
        current_state: Option<&Value>,
        new_state: &Value,
        transition_type: TransitionType,
    ) -> Result<()> {
        self.validator
            .validate_state_change(current_state, new_state, transition_type)
            .map_err(|e| {
                tracing::debug!(campaign_id, rule = e.rule(), "state change rejected");
                e.into()
            })
    }

    // ── Internals ───────────────────────────────────────────────────

    /// The optimistic commit loop shared by every operation that moves a
    /// branch head.
    fn commit(
        &self,
        params: &CommitMeta<'_>,
        mut prepare: impl FnMut(&Version) -> Result<Draft>,
    ) -> Result<(Version, StateTransition)> {
        let attempts = self.config.attempts();
        let branches = BranchManager::new(&self.store);
        let versions = VersionStore::new(&self.store);

        for attempt in 1..=attempts {
            if params.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let branch = branches.get_live(params.branch_id)?;
            if branch.campaign_id != params.campaign_id {
                return Err(VersionControlError::BranchNotFound(params.branch_id.to_string()).into());
            }
            let head = branches.get_head(&branch.id)?;
            let head_version = versions.get_by_id(&head.version_id)?;

            let draft = prepare(&head_version)?;
            if let Err(reason) = self.validator.validate_state_change(
                Some(&head_version.content),
                &draft.content,
                draft.transition_type,
            ) {
                self.reject(params.campaign_id, Some(params.branch_id), params.operation, &reason);
                return Err(reason.into());
            }

            let version = Version {
                id: new_version_id(),
                campaign_id: params.campaign_id.to_string(),
                branch_id: branch.id.clone(),
                parent_id: Some(head_version.id.clone()),
                version_hash: content_hash(&draft.content),
                version_type: draft.version_type,
                title: params.title.to_string(),
                message: params.message.to_string(),
                author: params.author.to_string(),
                content: draft.content,
                metadata: canon_metadata(draft.metadata),
                created_at: now_rfc3339(),
                is_deleted: false,
            };

            let result = self.store.transaction(|tx| {
                if params.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                branch_manager::advance_head(tx, &branch, &head, &version.head())?;
                let version = version_store::append(tx, version.clone())?;
                let transition = recorder::record(
                    tx,
                    &version,
                    Some(&head_version.content),
                    draft.transition_type,
                    params.reason,
                )?;
                Ok((version, transition))
            });

            match result {
                Ok((version, transition)) => {
                    tracing::info!(
                        campaign_id = params.campaign_id,
                        branch_id = params.branch_id,
                        version_id = %version.id,
                        hash = %version.version_hash,
                        version_type = %version.version_type,
                        attempt,
                        "version committed"
                    );
                    return Ok((version, transition));
                }
                Err(e) if e.is_stale_head() => {
                    tracing::warn!(
                        branch_id = params.branch_id,
                        attempt,
                        attempts,
                        error = %e,
                        "stale head, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(VersionControlError::CommitConflict {
            branch_id: params.branch_id.to_string(),
            attempts,
        }
        .into())
    }

    fn reject(
        &self,
        campaign_id: &str,
        branch_id: Option<&str>,
        operation: &str,
        reason: &ValidationError,
    ) {
        tracing::warn!(campaign_id, ?branch_id, operation, rule = reason.rule(), %reason, "validation failed");
        self.publish(vec![EngineEvent::new(
            campaign_id,
            EventKind::StateValidationFailed {
                branch_id: branch_id.map(str::to_string),
                operation: operation.to_string(),
                reason: reason.clone(),
            },
        )]);
    }

    /// Best effort. Returns one warning per failed publication.
    fn publish(&self, events: Vec<EngineEvent>) -> Vec<String> {
        let mut warnings = Vec::new();
        for event in &events {
            if let Err(e) = self.publisher.publish(event) {
                tracing::warn!(event = event.name(), error = %e, "event publication failed");
                warnings.push(format!("{} not published: {e}", event.name()));
            }
        }
        warnings
    }
}

fn canon_metadata(mut metadata: Map<String, Value>) -> Map<String, Value> {
    metadata
        .entry(meta::HASH_CANON)
        .or_insert_with(|| CANON_SAGA_V1.into());
    metadata
}

fn version_created_event(version: &Version) -> EngineEvent {
    EngineEvent::new(
        &version.campaign_id,
        EventKind::VersionCreated {
            branch_id: version.branch_id.clone(),
            version_id: version.id.clone(),
            version_hash: version.version_hash.clone(),
            parent_id: version.parent_id.clone(),
            version_type: version.version_type,
        },
    )
}

fn transition_event(transition: &StateTransition) -> EngineEvent {
    let changed_paths = match &transition.from_state {
        Some(from) => delta::delta(from, &transition.to_state)
            .into_iter()
            .map(|c| c.path.to_string())
            .collect(),
        None => Vec::new(),
    };
    EngineEvent::new(
        &transition.campaign_id,
        EventKind::StateTransition {
            transition_id: transition.id.clone(),
            version_id: transition.version_id.clone(),
            transition_type: transition.transition_type,
            changed_paths,
        },
    )
}
