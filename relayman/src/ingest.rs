use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, warn};

use api::response::IngestStat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub kbps: u64,
    pub clients: u64,
}

/// Stats interface of the ingest server
#[async_trait]
pub trait IngestStats: Send + Sync {
    /// `Ok(None)` when the ingest server does not know the stream
    async fn stream_stats(&self, app: &str, stream: &str) -> Result<Option<StreamStats>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Alive(StreamStats),
    Gone,
    Unreachable(String),
}

/// Ask the ingest server whether the source is still published,
/// transport errors are retried `attempts` times before giving up.
pub async fn probe_source(
    stats: &dyn IngestStats,
    app: &str,
    stream: &str,
    attempts: u8,
    interval: Duration,
) -> SourceState {
    let attempts = attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match stats.stream_stats(app, stream).await {
            Ok(Some(s)) => return SourceState::Alive(s),
            Ok(None) => return SourceState::Gone,
            Err(e) => {
                warn!(
                    app,
                    stream,
                    attempt,
                    attempts,
                    "ingest stats query failed: {:?}",
                    e
                );
                last_error = e.to_string();
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    SourceState::Unreachable(last_error)
}

/// SRS compatible HTTP API client
#[derive(Clone)]
pub struct SrsClient {
    api: String,
    client: reqwest::Client,
}

impl SrsClient {
    pub fn new(api: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: api.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(timeout)
                .timeout(timeout)
                .build()?,
        })
    }
}

#[async_trait]
impl IngestStats for SrsClient {
    async fn stream_stats(&self, app: &str, stream: &str) -> Result<Option<StreamStats>> {
        let url = format!("{}{}", self.api, api::path::ingest_stream_stat(app, stream));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "ingest stream not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("HTTP {} from ingest: {}", status, body));
        }

        let stat: IngestStat = response.json().await?;
        Ok(stream_stats_from(stat))
    }
}

fn stream_stats_from(stat: IngestStat) -> Option<StreamStats> {
    if stat.code != 0 {
        return None;
    }
    match stat.stream {
        Some(stream) if stream.publish.active => Some(StreamStats {
            kbps: stream.kbps.recv_30s,
            clients: stream.clients,
        }),
        _ => None,
    }
}
