use serde::{Deserialize, Serialize};

/// Body of the ingest server `on_publish` / `on_unpublish` HTTP callbacks
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IngestHook {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub app: String,
    pub stream: String,
    #[serde(default)]
    pub param: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub config_id: String,
}
