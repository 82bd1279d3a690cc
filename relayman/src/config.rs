use std::collections::HashSet;
use std::time::Duration;
use std::{env, fs, net::SocketAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::model::{Destination, StreamConfig};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub ingest: Ingest,
    #[serde(default)]
    pub relay: Relay,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub health: Health,
    /// Streaming configurations, one per ingest stream key
    #[serde(default)]
    pub configs: Vec<StreamConfig>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth {
    /// Bearer tokens for the management API, empty disables auth
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingest {
    /// Application used when a streaming configuration names none
    #[serde(default = "default_ingest_app")]
    pub app: String,
    /// RTMP base the relays pull from, `{pull}/{app}/{stream}`
    #[serde(default = "default_ingest_pull")]
    pub pull: String,
    /// HTTP API base of the ingest server
    #[serde(default = "default_ingest_api")]
    pub api: String,
    #[serde(default)]
    pub stats_attempts: StatsAttempts,
    #[serde(default = "default_stats_retry_interval")]
    pub stats_retry_interval: u64,
    #[serde(default = "default_stats_timeout")]
    pub stats_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsAttempts(pub u8);

impl Default for StatsAttempts {
    fn default() -> Self {
        StatsAttempts(3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relay {
    #[serde(default = "default_relay_program")]
    pub program: String,
    /// `{input}` and `{output}` are replaced by the pull and push urls
    #[serde(default = "default_relay_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub grace_window: GraceWindow,
    /// Time between SIGTERM and SIGKILL when stopping a relay
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    /// Number of output lines kept as diagnostic
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
    #[serde(default = "default_log_line_max")]
    pub log_line_max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraceWindow(pub u64);

impl Default for GraceWindow {
    fn default() -> Self {
        GraceWindow(5000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retry {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(default = "default_backoff")]
    pub backoff: u64,
    /// 1.0 keeps the delay fixed
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub check_tick_time: HealthCheckTickTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckTickTime(pub u64);

impl Default for HealthCheckTickTime {
    fn default() -> Self {
        HealthCheckTickTime(30 * 1000)
    }
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8877"))
    ))
    .expect("invalid listen address")
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_ingest_app() -> String {
    "live".to_string()
}

fn default_ingest_pull() -> String {
    "rtmp://127.0.0.1:1935".to_string()
}

fn default_ingest_api() -> String {
    "http://127.0.0.1:1985".to_string()
}

fn default_stats_retry_interval() -> u64 {
    1000
}

fn default_stats_timeout() -> u64 {
    5000
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            app: default_ingest_app(),
            pull: default_ingest_pull(),
            api: default_ingest_api(),
            stats_attempts: Default::default(),
            stats_retry_interval: default_stats_retry_interval(),
            stats_timeout: default_stats_timeout(),
        }
    }
}

impl Ingest {
    pub fn pull_url(&self, app: &str, stream: &str) -> String {
        format!("{}/{}/{}", self.pull.trim_end_matches('/'), app, stream)
    }
}

fn default_relay_program() -> String {
    "ffmpeg".to_string()
}

fn default_relay_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "warning",
        "-i",
        "{input}",
        "-c",
        "copy",
        "-f",
        "flv",
        "{output}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_stop_timeout() -> u64 {
    5000
}

fn default_log_lines() -> usize {
    20
}

fn default_log_line_max() -> usize {
    512
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            program: default_relay_program(),
            args: default_relay_args(),
            grace_window: Default::default(),
            stop_timeout: default_stop_timeout(),
            log_lines: default_log_lines(),
            log_line_max: default_log_line_max(),
        }
    }
}

impl Relay {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window.0)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> u64 {
    10 * 1000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_backoff() -> u64 {
    60 * 1000
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for Health {
    fn default() -> Self {
        Self {
            enabled: true,
            check_tick_time: Default::default(),
        }
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Config {
    pub fn parse(path: Option<String>) -> anyhow::Result<Self> {
        let result = match path {
            Some(path) => fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?,
            None => fs::read_to_string("liverelay.toml")
                .or(fs::read_to_string("/etc/liverelay/liverelay.toml"))
                .unwrap_or("".to_string()),
        };
        result.parse()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.relay.program.trim().is_empty() {
            anyhow::bail!("relay.program cannot be empty");
        }
        if !self.relay.args.iter().any(|a| a.contains("{output}")) {
            anyhow::bail!("relay.args must contain {{output}}");
        }
        if self.relay.grace_window.0 == 0 {
            anyhow::bail!("relay.grace_window must be greater than 0");
        }
        if self.relay.log_lines == 0 || self.relay.log_line_max == 0 {
            anyhow::bail!("relay.log_lines and relay.log_line_max must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("retry.backoff_multiplier must be >= 1.0");
        }
        if self.retry.max_backoff < self.retry.backoff {
            anyhow::bail!("retry.max_backoff must be >= retry.backoff");
        }
        if self.ingest.stats_attempts.0 == 0 {
            anyhow::bail!("ingest.stats_attempts must be at least 1");
        }

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for c in self.configs.iter() {
            if c.id.trim().is_empty() || c.stream_key.trim().is_empty() {
                anyhow::bail!("config id and stream_key cannot be empty");
            }
            if !ids.insert(c.id.as_str()) {
                anyhow::bail!("duplicate config id: {}", c.id);
            }
            if !keys.insert((c.app_or(&self.ingest.app), c.stream_key.as_str())) {
                anyhow::bail!("duplicate stream_key: {}", c.stream_key);
            }
        }

        let mut ids = HashSet::new();
        for d in self.destinations.iter() {
            if d.id.trim().is_empty() {
                anyhow::bail!("destination id cannot be empty");
            }
            if !ids.insert(d.id.as_str()) {
                anyhow::bail!("duplicate destination id: {}", d.id);
            }
        }
        Ok(())
    }
}
