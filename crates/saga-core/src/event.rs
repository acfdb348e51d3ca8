use crate::error::ValidationError;
use crate::types::{now_rfc3339, TransitionType, VersionType};
use serde::{Deserialize, Serialize};

/// Outbound notification names.
pub mod event_name {
    pub const VERSION_CONTROL_INITIALIZED: &str = "version_control_initialized";
    pub const VERSION_CREATED: &str = "version_created";
    pub const BRANCHES_MERGED: &str = "branches_merged";
    pub const STATE_TRANSITION: &str = "state_transition";
    pub const STATE_VALIDATION_FAILED: &str = "state_validation_failed";
}

/// What happened. Serialized with a `"type"` tag matching `event_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    VersionControlInitialized {
        branch_id: String,
        version_id: String,
        version_hash: String,
    },
    VersionCreated {
        branch_id: String,
        version_id: String,
        version_hash: String,
        parent_id: Option<String>,
        version_type: VersionType,
    },
    BranchesMerged {
        source_branch_id: String,
        target_branch_id: String,
        source_head_hash: String,
        version_id: String,
        version_hash: String,
    },
    StateTransition {
        transition_id: String,
        version_id: String,
        transition_type: TransitionType,
        changed_paths: Vec<String>,
    },
    StateValidationFailed {
        branch_id: Option<String>,
        operation: String,
        reason: ValidationError,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::VersionControlInitialized { .. } => event_name::VERSION_CONTROL_INITIALIZED,
            EventKind::VersionCreated { .. } => event_name::VERSION_CREATED,
            EventKind::BranchesMerged { .. } => event_name::BRANCHES_MERGED,
            EventKind::StateTransition { .. } => event_name::STATE_TRANSITION,
            EventKind::StateValidationFailed { .. } => event_name::STATE_VALIDATION_FAILED,
        }
    }
}

/// An event as handed to publishers: the campaign, a timestamp, and the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub campaign_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn new(campaign_id: &str, kind: EventKind) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            ts: now_rfc3339(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_flat_with_type_tag() {
        let ev = EngineEvent::new(
            "c1",
            EventKind::VersionCreated {
                branch_id: "br_1".into(),
                version_id: "ver_1".into(),
                version_hash: "abc".into(),
                parent_id: None,
                version_type: VersionType::Snapshot,
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "version_created");
        assert_eq!(json["campaign_id"], "c1");
        assert_eq!(json["version_type"], "snapshot");
        assert!(json["ts"].as_str().is_some());
        assert_eq!(ev.name(), event_name::VERSION_CREATED);
    }

    #[test]
    fn validation_failure_carries_rule() {
        let ev = EngineEvent::new(
            "c1",
            EventKind::StateValidationFailed {
                branch_id: Some("br_1".into()),
                operation: "create_version".into(),
                reason: ValidationError::ThemeChanged {
                    from: "fantasy".into(),
                    to: "sci-fi".into(),
                },
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "state_validation_failed");
        assert_eq!(json["reason"]["rule"], "theme_changed");
        assert_eq!(json["reason"]["to"], "sci-fi");
    }

    #[test]
    fn event_round_trips() {
        let ev = EngineEvent::new(
            "c1",
            EventKind::BranchesMerged {
                source_branch_id: "br_a".into(),
                target_branch_id: "br_b".into(),
                source_head_hash: "h1".into(),
                version_id: "ver_m".into(),
                version_hash: "h2".into(),
            },
        );
        let s = serde_json::to_string(&ev).unwrap();
        let back: EngineEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ev);
    }
}
