use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Canonicalization scheme name recorded alongside content hashes.
pub const CANON_SAGA_V1: &str = "saga-canon-v1";

/// Name of the branch created by `initialize`.
pub const MAIN_BRANCH: &str = "main";

/// Metadata keys written on merge versions.
pub mod meta {
    pub const SOURCE_BRANCH_ID: &str = "source_branch_id";
    pub const SOURCE_HEAD_HASH: &str = "source_head_hash";
    pub const SOURCE_HEAD_ID: &str = "source_head_id";
    pub const ANCESTOR_ID: &str = "ancestor_id";
    pub const REVERTED_TO: &str = "reverted_to";
    pub const HASH_CANON: &str = "hash_canon";
}

/// Kind of commit a `Version` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Snapshot,
    Merge,
    Revert,
}

impl VersionType {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionType::Snapshot => "snapshot",
            VersionType::Merge => "merge",
            VersionType::Revert => "revert",
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionType {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(VersionType::Snapshot),
            "merge" => Ok(VersionType::Merge),
            "revert" => Ok(VersionType::Revert),
            other => Err(StateError::UnknownVersionType(other.to_string())),
        }
    }
}

/// Purpose of a line of development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    Main,
    PlayerChoice,
    Alternate,
    Experimental,
}

impl BranchType {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchType::Main => "main",
            BranchType::PlayerChoice => "player_choice",
            BranchType::Alternate => "alternate",
            BranchType::Experimental => "experimental",
        }
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchType {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(BranchType::Main),
            "player_choice" => Ok(BranchType::PlayerChoice),
            "alternate" => Ok(BranchType::Alternate),
            "experimental" => Ok(BranchType::Experimental),
            other => Err(StateError::UnknownBranchType(other.to_string())),
        }
    }
}

/// Why a state changed. Recorded on every `StateTransition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Initialize,
    Create,
    Update,
    Delete,
    Merge,
    Revert,
}

impl TransitionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Initialize => "initialize",
            TransitionType::Create => "create",
            TransitionType::Update => "update",
            TransitionType::Delete => "delete",
            TransitionType::Merge => "merge",
            TransitionType::Revert => "revert",
        }
    }

    /// Whether entities present in the current state may disappear.
    ///
    /// `merge` and `revert` replay content that was already validated on
    /// another line of history, so they carry removals through as well.
    pub fn permits_removal(self) -> bool {
        matches!(
            self,
            TransitionType::Delete | TransitionType::Merge | TransitionType::Revert
        )
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionType {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialize" => Ok(TransitionType::Initialize),
            "create" => Ok(TransitionType::Create),
            "update" => Ok(TransitionType::Update),
            "delete" => Ok(TransitionType::Delete),
            "merge" => Ok(TransitionType::Merge),
            "revert" => Ok(TransitionType::Revert),
            other => Err(StateError::UnknownTransitionType(other.to_string())),
        }
    }
}

/// A single immutable commit of campaign state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub id: String,
    pub campaign_id: String,
    pub branch_id: String,
    pub parent_id: Option<String>,
    pub version_hash: String,
    pub version_type: VersionType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: String,
    pub content: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: String,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Version {
    pub fn head(&self) -> Head {
        Head {
            version_id: self.id.clone(),
            version_hash: self.version_hash.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Branch id recorded by a merge version, if this is one.
    pub fn merge_source_branch(&self) -> Option<&str> {
        self.metadata
            .get(meta::SOURCE_BRANCH_ID)
            .and_then(|v| v.as_str())
    }
}

/// Summary row for listings (content omitted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionSummary {
    pub id: String,
    pub branch_id: String,
    pub parent_id: Option<String>,
    pub version_hash: String,
    pub version_type: VersionType,
    pub title: String,
    pub author: String,
    pub created_at: String,
}

impl From<&Version> for VersionSummary {
    fn from(v: &Version) -> Self {
        Self {
            id: v.id.clone(),
            branch_id: v.branch_id.clone(),
            parent_id: v.parent_id.clone(),
            version_hash: v.version_hash.clone(),
            version_type: v.version_type,
            title: v.title.clone(),
            author: v.author.clone(),
            created_at: v.created_at.clone(),
        }
    }
}

/// A named, mutable pointer to the head of a line of development.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub branch_type: BranchType,
    #[serde(default)]
    pub description: String,
    pub base_version_hash: String,
    pub created_at: String,
    #[serde(default)]
    pub is_deleted: bool,
}

/// The version a branch currently points at.
///
/// `version_hash` is the content hash; `version_id` disambiguates versions
/// whose content happens to be identical, and is what compare-and-swap
/// compares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Head {
    pub version_id: String,
    pub version_hash: String,
}

/// Audit record written alongside every committed version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub id: String,
    pub campaign_id: String,
    pub version_id: String,
    pub from_state: Option<Value>,
    pub to_state: Value,
    pub transition_type: TransitionType,
    #[serde(default)]
    pub reason: String,
    pub created_at: String,
}

// ── Identity and time ──

/// Generate a prefixed id: `<prefix>_<lowercase ulid>`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn new_version_id() -> String {
    new_id("ver")
}

pub fn new_branch_id() -> String {
    new_id("br")
}

pub fn new_transition_id() -> String {
    new_id("stx")
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_version_id();
        let b = new_version_id();
        assert!(a.starts_with("ver_"));
        assert_eq!(a.len(), 4 + 26);
        assert_ne!(a, b);
        assert!(new_branch_id().starts_with("br_"));
        assert!(new_transition_id().starts_with("stx_"));
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for t in [
            TransitionType::Initialize,
            TransitionType::Create,
            TransitionType::Update,
            TransitionType::Delete,
            TransitionType::Merge,
            TransitionType::Revert,
        ] {
            assert_eq!(t.as_str().parse::<TransitionType>().unwrap(), t);
        }
        assert_eq!("player_choice".parse::<BranchType>().unwrap(), BranchType::PlayerChoice);
        assert_eq!("merge".parse::<VersionType>().unwrap(), VersionType::Merge);
    }

    #[test]
    fn unknown_transition_type_is_state_error() {
        let err = "teleport".parse::<TransitionType>().unwrap_err();
        assert_eq!(err, StateError::UnknownTransitionType("teleport".into()));
        assert!("nope".parse::<BranchType>().is_err());
        assert!("nope".parse::<VersionType>().is_err());
    }

    #[test]
    fn only_delete_merge_revert_permit_removal() {
        assert!(TransitionType::Delete.permits_removal());
        assert!(TransitionType::Merge.permits_removal());
        assert!(TransitionType::Revert.permits_removal());
        assert!(!TransitionType::Update.permits_removal());
        assert!(!TransitionType::Create.permits_removal());
        assert!(!TransitionType::Initialize.permits_removal());
    }

    #[test]
    fn version_serializes_snake_case_type() {
        let v = Version {
            id: "ver_x".into(),
            campaign_id: "c1".into(),
            branch_id: "br_x".into(),
            parent_id: None,
            version_hash: "abc".into(),
            version_type: VersionType::Snapshot,
            title: String::new(),
            message: String::new(),
            author: String::new(),
            content: serde_json::json!({}),
            metadata: Map::new(),
            created_at: "2026-01-01T00:00:00Z".into(),
            is_deleted: false,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["version_type"], "snapshot");
        assert!(v.is_root());
        assert_eq!(v.head().version_hash, "abc");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let ts = now_rfc3339();
        assert!(time::OffsetDateTime::parse(
            &ts,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
    }
}
