//! Error taxonomy shared by every Saga crate.
//!
//! Each leaf error carries enough structure (rule name, entity id, expected
//! vs. actual head) for an outer API layer to build an actionable message
//! without inspecting engine state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A proposed state violated one of the validator's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("theme_changed: theme is immutable ({from} -> {to})")]
    ThemeChanged { from: Value, to: Value },
    #[error("missing_field: `{field}` must be present")]
    MissingField { field: String },
    #[error("entity_removed: {collection} entity `{entity_id}` was removed without a delete transition")]
    EntityRemoved {
        collection: String,
        entity_id: String,
    },
    #[error("dangling_reference: {field} points at unknown id `{target_id}`")]
    DanglingReference { field: String, target_id: String },
}

impl ValidationError {
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::ThemeChanged { .. } => "theme_changed",
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::EntityRemoved { .. } => "entity_removed",
            ValidationError::DanglingReference { .. } => "dangling_reference",
        }
    }
}

/// A path both branches changed to different values since their common ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub path: String,
    /// Value on the source branch; `None` when the source removed the path.
    pub source_value: Option<Value>,
    /// Value on the target branch; `None` when the target removed the path.
    pub target_value: Option<Value>,
}

/// Graph and head-pointer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionControlError {
    #[error("version_not_found: {0}")]
    VersionNotFound(String),
    #[error("branch_not_found: {0}")]
    BranchNotFound(String),
    #[error("already_initialized: campaign {0} already has version history")]
    AlreadyInitialized(String),
    #[error("branch_exists: `{name}` already exists in campaign {campaign_id}")]
    BranchExists { campaign_id: String, name: String },
    #[error("invalid_branch_name: {0}")]
    InvalidBranchName(String),
    #[error("branch_deleted: {0}")]
    BranchDeleted(String),
    #[error("protected_branch: `{0}` cannot be deleted")]
    ProtectedBranch(String),
    #[error("version_in_use: {version_id} is the head of branch {branch_id}")]
    VersionInUse {
        version_id: String,
        branch_id: String,
    },
    #[error("stale_head: branch {branch_id} expected head {expected}, found {actual}")]
    StaleHead {
        branch_id: String,
        expected: String,
        actual: String,
    },
    #[error("duplicate_hash: branch {branch_id} already has a live child of {parent_id}")]
    DuplicateHash {
        branch_id: String,
        parent_id: String,
    },
    #[error("no_common_ancestor: {left} and {right} share no history")]
    NoCommonAncestor { left: String, right: String },
    #[error("self_merge: branch {0} cannot be merged into itself")]
    SelfMerge(String),
    #[error("not_an_ancestor: {target} is not in the history of {head}")]
    NotAnAncestor { target: String, head: String },
    #[error("commit_conflict: branch {branch_id} kept moving; gave up after {attempts} attempts")]
    CommitConflict { branch_id: String, attempts: u32 },
}

impl VersionControlError {
    pub fn rule(&self) -> &'static str {
        match self {
            VersionControlError::VersionNotFound(_) => "version_not_found",
            VersionControlError::BranchNotFound(_) => "branch_not_found",
            VersionControlError::AlreadyInitialized(_) => "already_initialized",
            VersionControlError::BranchExists { .. } => "branch_exists",
            VersionControlError::InvalidBranchName(_) => "invalid_branch_name",
            VersionControlError::BranchDeleted(_) => "branch_deleted",
            VersionControlError::ProtectedBranch(_) => "protected_branch",
            VersionControlError::VersionInUse { .. } => "version_in_use",
            VersionControlError::StaleHead { .. } => "stale_head",
            VersionControlError::DuplicateHash { .. } => "duplicate_hash",
            VersionControlError::NoCommonAncestor { .. } => "no_common_ancestor",
            VersionControlError::SelfMerge(_) => "self_merge",
            VersionControlError::NotAnAncestor { .. } => "not_an_ancestor",
            VersionControlError::CommitConflict { .. } => "commit_conflict",
        }
    }
}

/// Malformed transition metadata or content shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("unknown transition_type `{0}`")]
    UnknownTransitionType(String),
    #[error("unknown version_type `{0}`")]
    UnknownVersionType(String),
    #[error("unknown branch_type `{0}`")]
    UnknownBranchType(String),
    #[error("malformed content: {0}")]
    MalformedContent(String),
}

/// Top-level error returned by every engine operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("merge conflict on {} path(s): {}", .0.len(), conflict_paths(.0))]
    MergeConflict(Vec<Conflict>),
    #[error(transparent)]
    VersionControl(#[from] VersionControlError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("operation cancelled before commit")]
    Cancelled,
}

impl Error {
    /// Wrap any persistence-layer failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    /// Stable machine-readable name of the violated rule.
    pub fn rule(&self) -> &'static str {
        match self {
            Error::Validation(e) => e.rule(),
            Error::MergeConflict(_) => "merge_conflict",
            Error::VersionControl(e) => e.rule(),
            Error::State(_) => "state_error",
            Error::Storage(_) => "storage",
            Error::Cancelled => "cancelled",
        }
    }

    pub fn is_stale_head(&self) -> bool {
        matches!(
            self,
            Error::VersionControl(VersionControlError::StaleHead { .. })
        )
    }
}

fn conflict_paths(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
