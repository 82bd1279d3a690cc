use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Starting,
    Live,
    Partial,
    Ended,
    Error,
}

impl SessionStatus {
    /// Relays are expected to be running
    pub fn is_running(self) -> bool {
        matches!(self, SessionStatus::Live | SessionStatus::Partial)
    }

    /// Holds the owner's destinations, a second session must not start
    pub fn is_open(self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Live | SessionStatus::Partial
        )
    }

    pub fn can_transition(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Starting, Live | Partial | Error | Ended) => true,
            (Live, Partial | Error | Ended) => true,
            (Partial, Live | Error | Ended) => true,
            (Error, Ended) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Live => "live",
            SessionStatus::Partial => "partial",
            SessionStatus::Ended => "ended",
            SessionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    #[default]
    Idle,
    Active,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub app: Option<String>,
    pub stream_key: String,
}

impl StreamConfig {
    pub fn app_or<'a>(&'a self, default: &'a str) -> &'a str {
        match &self.app {
            Some(app) if !app.trim().is_empty() => app,
            _ => default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub owner: String,
    #[serde(default = "default_platform", deserialize_with = "lowercase")]
    pub platform: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub stream_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub status: RelayStatus,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_platform() -> String {
    "custom".to_string()
}

fn default_true() -> bool {
    true
}

fn lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(String::deserialize(deserializer)?.trim().to_lowercase())
}

impl Destination {
    /// Only enabled destinations with a full endpoint take part in a session
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.url.trim().is_empty() && !self.stream_key.trim().is_empty()
    }

    /// Full outbound RTMP target
    pub fn target(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.stream_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub correlation_id: String,
    pub config_id: String,
    pub owner: String,
    pub app: String,
    pub stream_key: String,
    pub status: SessionStatus,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub error: Option<String>,
    #[serde(default)]
    pub stats: Option<SessionStats>,
}

/// Last ingest stats seen for a running session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub viewers: u64,
    pub kbps: u64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(config: &StreamConfig, app: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().simple().to_string(),
            config_id: config.id.clone(),
            owner: config.owner.clone(),
            app: app.to_string(),
            stream_key: config.stream_key.clone(),
            status: SessionStatus::Starting,
            started_at: Utc::now().timestamp_millis(),
            ended_at: None,
            error: None,
            stats: None,
        }
    }
}
