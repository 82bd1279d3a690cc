use serde::{Deserialize, Serialize};

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

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    #[default]
    Idle,
    Active,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub correlation_id: String,
    pub config_id: String,
    pub app: String,
    pub stream: String,
    pub status: SessionStatus,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kbps: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Relay {
    pub destination: String,
    pub platform: String,
    pub status: RelayStatus,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartResult {
    #[default]
    Established,
    Failed,
    AlreadyActive,
    Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Restart {
    pub destination: String,
    pub result: RestartResult,
}

/// Reply understood by the ingest server, `code == 0` accepts the client
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HookAck {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl HookAck {
    pub fn ok(session: Option<String>) -> Self {
        Self {
            code: 0,
            session,
            msg: None,
        }
    }

    pub fn reject<T: ToString>(msg: T) -> Self {
        Self {
            code: 1,
            session: None,
            msg: Some(msg.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IngestKbps {
    #[serde(default)]
    pub recv_30s: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IngestPublish {
    #[serde(default)]
    pub active: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IngestStream {
    #[serde(default)]
    pub clients: u64,
    #[serde(default)]
    pub kbps: IngestKbps,
    #[serde(default)]
    pub publish: IngestPublish,
}

/// Stats reply of the ingest server HTTP API
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IngestStat {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub stream: Option<IngestStream>,
}
