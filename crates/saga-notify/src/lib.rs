use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use saga_core::event::{EngineEvent, EventKind};
use saga_engine::EventPublisher;
use saga_ledger::config_file::read_config;
use saga_ledger::SagaPaths;
use serde::{Deserialize, Serialize};

// ── Config ──

/// Event channel configuration, stored in `.saga/config.json` under key `notify_channels`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Channel {
    #[serde(rename = "ntfy")]
    Ntfy { url: String, events: Vec<String> },
    #[serde(rename = "webhook")]
    Webhook { url: String, events: Vec<String> },
    /// Appends one JSON object per line. Relative paths resolve against `.saga/`.
    #[serde(rename = "jsonl")]
    Jsonl { path: PathBuf, events: Vec<String> },
}

impl Channel {
    fn events(&self) -> &[String] {
        match self {
            Channel::Ntfy { events, .. } => events,
            Channel::Webhook { events, .. } => events,
            Channel::Jsonl { events, .. } => events,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Channel::Ntfy { url, .. } => format!("ntfy({url})"),
            Channel::Webhook { url, .. } => format!("webhook({url})"),
            Channel::Jsonl { path, .. } => format!("jsonl({})", path.display()),
        }
    }

    fn matches(&self, event_name: &str) -> bool {
        self.events().iter().any(|e| e == event_name || e == "*")
    }

    fn resolve(self, base: &Path) -> Self {
        match self {
            Channel::Jsonl { path, events } if path.is_relative() => Channel::Jsonl {
                path: base.join(path),
                events,
            },
            other => other,
        }
    }
}

/// The channel every fresh workspace starts with: all events to `.saga/events.jsonl`.
pub fn default_channels() -> Vec<Channel> {
    vec![Channel::Jsonl {
        path: PathBuf::from("events.jsonl"),
        events: vec!["*".to_string()],
    }]
}

/// Top-level notify configuration.
#[derive(Clone, Debug, Default)]
pub struct NotifyConfig {
    pub channels: Vec<Channel>,
}

impl NotifyConfig {
    /// Load from `.saga/config.json` key `notify_channels`.
    /// Returns an empty config if the key is missing or unparseable.
    pub fn load(paths: &SagaPaths) -> Self {
        let config = match read_config(&paths.config_json) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "config unreadable, no event channels");
                return Self::default();
            }
        };
        let Some(channels_val) = config.get("notify_channels") else {
            return Self::default();
        };
        let channels: Vec<Channel> = match serde_json::from_value(channels_val.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "notify_channels is malformed, ignoring");
                return Self::default();
            }
        };
        Self {
            channels: channels
                .into_iter()
                .map(|c| c.resolve(&paths.saga_dir))
                .collect(),
        }
    }
}

// ── Publisher ──

const TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers engine events to every configured channel that subscribes to them.
pub struct ChannelPublisher {
    config: NotifyConfig,
    agent: ureq::Agent,
}

impl ChannelPublisher {
    pub fn new(config: NotifyConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .build()
            .new_agent();
        Self { config, agent }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.config.channels
    }
}

impl EventPublisher for ChannelPublisher {
    /// Tries every matching channel; the first failure is returned after all
    /// channels have been attempted.
    fn publish(&self, event: &EngineEvent) -> anyhow::Result<()> {
        let mut first_err = None;
        for channel in &self.config.channels {
            if !channel.matches(event.name()) {
                continue;
            }
            if let Err(e) = send(&self.agent, channel, event) {
                let name = channel.display_name();
                tracing::warn!(channel = %name, event = event.name(), error = %e, "event delivery failed");
                if first_err.is_none() {
                    first_err = Some(e.context(format!("failed to send to {name}")));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Send a test event to all configured channels.
/// Returns per-channel results for CLI display.
pub fn test_channels(config: &NotifyConfig) -> Vec<(String, Result<(), String>)> {
    let publisher = ChannelPublisher::new(config.clone());
    let test_event = EngineEvent::new(
        "saga-notify-test",
        EventKind::VersionControlInitialized {
            branch_id: "br_test".to_string(),
            version_id: "ver_test".to_string(),
            version_hash: String::new(),
        },
    );
    config
        .channels
        .iter()
        .map(|ch| {
            let name = ch.display_name();
            let result = send(&publisher.agent, ch, &test_event).map_err(|e| e.to_string());
            (name, result)
        })
        .collect()
}

fn send(agent: &ureq::Agent, channel: &Channel, event: &EngineEvent) -> anyhow::Result<()> {
    match channel {
        Channel::Ntfy { url, .. } => send_ntfy(agent, url, event),
        Channel::Webhook { url, .. } => send_webhook(agent, url, event),
        Channel::Jsonl { path, .. } => append_jsonl(path, event),
    }
}

// ── ntfy ──

fn send_ntfy(agent: &ureq::Agent, url: &str, event: &EngineEvent) -> anyhow::Result<()> {
    let (title, body, priority) = format_ntfy(event);
    agent
        .post(url)
        .header("Title", &title)
        .header("Priority", priority)
        .send(&body)?;
    Ok(())
}

fn format_ntfy(event: &EngineEvent) -> (String, String, &'static str) {
    let campaign = &event.campaign_id;
    match &event.kind {
        EventKind::VersionControlInitialized { branch_id, .. } => (
            format!("{campaign}: version control initialized"),
            format!("Root version committed on {branch_id}"),
            "low",
        ),
        EventKind::VersionCreated {
            branch_id,
            version_id,
            version_type,
            ..
        } => (
            format!("{campaign}: new {version_type} version"),
            format!("{version_id} on {branch_id}"),
            "low",
        ),
        EventKind::BranchesMerged {
            source_branch_id,
            target_branch_id,
            version_id,
            ..
        } => (
            format!("{campaign}: merged {source_branch_id} -> {target_branch_id}"),
            format!("Merge version {version_id}"),
            "default",
        ),
        EventKind::StateTransition {
            transition_type,
            changed_paths,
            ..
        } => (
            format!("{campaign}: {transition_type} transition"),
            if changed_paths.is_empty() {
                "No field changes".to_string()
            } else {
                changed_paths.join(", ")
            },
            "min",
        ),
        EventKind::StateValidationFailed {
            operation, reason, ..
        } => (
            format!("{campaign}: {operation} rejected ({})", reason.rule()),
            reason.to_string(),
            "high",
        ),
    }
}

// ── Webhook (generic JSON POST) ──

fn send_webhook(agent: &ureq::Agent, url: &str, event: &EngineEvent) -> anyhow::Result<()> {
    let payload = format_webhook(event)?;
    agent
        .post(url)
        .header("Content-Type", "application/json")
        .send(payload.to_string())?;
    Ok(())
}

fn format_webhook(event: &EngineEvent) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::json!({
        "event_type": event.name(),
        "data": serde_json::to_value(event)?,
    }))
}

// ── JSONL ──

fn append_jsonl(path: &Path, event: &EngineEvent) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use saga_core::{TransitionType, ValidationError, VersionType};

    fn created() -> EngineEvent {
        EngineEvent::new(
            "c1",
            EventKind::VersionCreated {
                branch_id: "br_main".into(),
                version_id: "ver_1".into(),
                version_hash: "abc".into(),
                parent_id: Some("ver_0".into()),
                version_type: VersionType::Merge,
            },
        )
    }

    #[test]
    fn config_deserialize_all_types() {
        let json = r#"[
            {"type":"ntfy","url":"https://ntfy.sh/t","events":["branches_merged"]},
            {"type":"webhook","url":"https://hooks.example.com/x","events":["*"]},
            {"type":"jsonl","path":"events.jsonl","events":["version_created"]}
        ]"#;
        let channels: Vec<Channel> = serde_json::from_str(json).unwrap();
        assert_eq!(channels.len(), 3);
        assert!(matches!(&channels[0], Channel::Ntfy { .. }));
        assert!(matches!(&channels[1], Channel::Webhook { .. }));
        assert!(matches!(&channels[2], Channel::Jsonl { .. }));
    }

    #[test]
    fn config_load_missing_file() {
        let paths = SagaPaths::discover("/nonexistent");
        assert!(NotifyConfig::load(&paths).channels.is_empty());
    }

    #[test]
    fn config_load_resolves_relative_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SagaPaths::discover(tmp.path());
        paths.ensure_layout().unwrap();
        let mut map = serde_json::Map::new();
        map.insert(
            "notify_channels".into(),
            serde_json::to_value(default_channels()).unwrap(),
        );
        saga_ledger::config_file::write_config(&paths.config_json, &map).unwrap();

        let config = NotifyConfig::load(&paths);
        assert_eq!(
            config.channels,
            vec![Channel::Jsonl {
                path: paths.events_jsonl.clone(),
                events: vec!["*".into()],
            }]
        );
    }

    #[test]
    fn malformed_channels_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SagaPaths::discover(tmp.path());
        paths.ensure_layout().unwrap();
        std::fs::write(&paths.config_json, r#"{"notify_channels":[{"type":"pigeon"}]}"#).unwrap();
        assert!(NotifyConfig::load(&paths).channels.is_empty());
    }

    #[test]
    fn event_matches_channel() {
        let ch: Channel = serde_json::from_value(serde_json::json!({
            "type": "ntfy",
            "url": "https://ntfy.sh/test",
            "events": ["branches_merged", "state_validation_failed"]
        }))
        .unwrap();
        assert!(ch.matches("branches_merged"));
        assert!(!ch.matches("version_created"));

        let all: Channel = serde_json::from_value(serde_json::json!({
            "type": "webhook", "url": "https://example.com/hook", "events": ["*"]
        }))
        .unwrap();
        assert!(all.matches("state_transition"));
    }

    #[test]
    fn jsonl_channel_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out").join("events.jsonl");
        let publisher = ChannelPublisher::new(NotifyConfig {
            channels: vec![Channel::Jsonl {
                path: path.clone(),
                events: vec!["version_created".into()],
            }],
        });

        publisher.publish(&created()).unwrap();
        publisher
            .publish(&EngineEvent::new(
                "c1",
                EventKind::StateTransition {
                    transition_id: "stx_1".into(),
                    version_id: "ver_1".into(),
                    transition_type: TransitionType::Update,
                    changed_paths: vec![],
                },
            ))
            .unwrap();
        publisher.publish(&created()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "version_created");
        assert_eq!(lines[0]["version_type"], "merge");
    }

    #[test]
    fn unreachable_channel_reports_error_after_trying_all() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("ok.jsonl");
        let publisher = ChannelPublisher::new(NotifyConfig {
            channels: vec![
                Channel::Jsonl {
                    // A directory cannot be opened for append.
                    path: tmp.path().to_path_buf(),
                    events: vec!["*".into()],
                },
                Channel::Jsonl {
                    path: good.clone(),
                    events: vec!["*".into()],
                },
            ],
        });
        let err = publisher.publish(&created()).unwrap_err();
        assert!(err.to_string().contains("jsonl("));
        assert_eq!(std::fs::read_to_string(&good).unwrap().lines().count(), 1);
    }

    #[test]
    fn format_ntfy_validation_failure() {
        let event = EngineEvent::new(
            "c1",
            EventKind::StateValidationFailed {
                branch_id: Some("br_main".into()),
                operation: "create_version".into(),
                reason: ValidationError::ThemeChanged {
                    from: "fantasy".into(),
                    to: "noir".into(),
                },
            },
        );
        let (title, body, priority) = format_ntfy(&event);
        assert!(title.contains("create_version rejected"));
        assert!(title.contains("theme_changed"));
        assert!(body.contains("noir"));
        assert_eq!(priority, "high");
    }

    #[test]
    fn format_webhook_payload() {
        let payload = format_webhook(&created()).unwrap();
        assert_eq!(payload["event_type"], "version_created");
        assert_eq!(payload["data"]["version_id"], "ver_1");
        assert_eq!(payload["data"]["campaign_id"], "c1");
    }
}
