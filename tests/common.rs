use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use relayman::config::{Config, GraceWindow};
use relayman::model::{Destination, RelayStatus, StreamConfig};

/// Stand-in for ffmpeg: endpoints named `unreachable` refuse the connection
/// and count the attempt, every other endpoint keeps streaming
const RELAY_SCRIPT: &str = r#"case "$1" in
*unreachable*) echo attempt >> "$2"; echo "[tcp @ 0x1] Connection to $1 failed: Connection refused" >&2; exit 1;;
*) exec sleep 60;;
esac"#;

pub fn destination(id: &str, owner: &str, url: &str) -> Destination {
    Destination {
        id: id.to_string(),
        owner: owner.to_string(),
        platform: "custom".to_string(),
        url: url.to_string(),
        stream_key: format!("{id}-key"),
        enabled: true,
        status: RelayStatus::Idle,
        updated_at: 0,
        last_error: None,
    }
}

pub fn stream_config(id: &str, owner: &str, stream_key: &str) -> StreamConfig {
    StreamConfig {
        id: id.to_string(),
        owner: owner.to_string(),
        title: String::new(),
        app: None,
        stream_key: stream_key.to_string(),
    }
}

/// Fast relay timings, health checks off, attempts of refused relays counted in `counter`
pub fn config(counter: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.relay.program = "sh".to_string();
    cfg.relay.args = vec![
        "-c".to_string(),
        RELAY_SCRIPT.to_string(),
        "relay".to_string(),
        "{output}".to_string(),
        counter.to_string_lossy().to_string(),
    ];
    cfg.relay.grace_window = GraceWindow(300);
    cfg.relay.stop_timeout = 1000;
    cfg.retry.max_attempts = 3;
    cfg.retry.backoff = 50;
    cfg.retry.max_backoff = 50;
    cfg.health.enabled = false;
    cfg.ingest.api = "http://127.0.0.1:9".to_string();
    cfg
}

pub struct Server {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Server {
    pub async fn start(cfg: Config) -> Self {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(relayman::serve(cfg, listener, async move {
            let _ = rx.await;
        }));
        Self {
            addr,
            stop: Some(tx),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.task)
            .await
            .expect("server did not shut down")
            .unwrap();
    }
}

pub async fn session(server: &Server, id: &str) -> api::response::Session {
    reqwest::get(server.url(&api::path::session(id)))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

pub async fn relays(server: &Server, id: &str) -> Vec<api::response::Relay> {
    reqwest::get(server.url(&api::path::session_relays(id)))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll the session until it leaves `starting`
pub async fn settled(server: &Server, id: &str) -> api::response::Session {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let s = session(server, id).await;
        if s.status != api::response::SessionStatus::Starting {
            return s;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session {id} still starting"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn attempts(counter: &Path) -> usize {
    std::fs::read_to_string(counter)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
