use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::ingest::StreamStats;
use crate::metrics;
use crate::model::{Destination, RelayStatus, Session, SessionStats, SessionStatus, StreamConfig};
use crate::relay::{AggregateResult, RelayCoordinator, RestartOutcome};
use crate::result::Result;
use crate::store::{AccountStore, SessionStore};

/// Relay view of one destination within a session
#[derive(Debug, Clone)]
pub struct RelayState {
    pub destination: Destination,
    pub pid: Option<u32>,
}

/// Lifecycle of sessions: starting, live/partial, then ended or error.
///
/// Every mutation of a session happens under its own lock, so a stop racing a
/// start or a health restart observes a consistent status. Relay outcomes are
/// awaited outside the lock.
#[derive(Clone)]
pub struct SessionStateMachine {
    sessions: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountStore>,
    coordinator: RelayCoordinator,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    default_app: String,
}

impl SessionStateMachine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        accounts: Arc<dyn AccountStore>,
        coordinator: RelayCoordinator,
        default_app: String,
    ) -> Self {
        Self {
            sessions,
            accounts,
            coordinator,
            locks: Arc::new(Mutex::new(HashMap::new())),
            default_app,
        }
    }

    pub fn coordinator(&self) -> &RelayCoordinator {
        &self.coordinator
    }

    /// Lock for a session or owner key. Entries nobody holds any more are
    /// dropped on the way.
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }

    async fn load(&self, id: &str) -> Result<Session> {
        self.sessions
            .get(id)
            .await?
            .ok_or_else(|| AppError::session_not_found(id))
    }

    async fn transition(
        &self,
        session: &mut Session,
        to: SessionStatus,
        error: Option<String>,
    ) -> Result<()> {
        let from = session.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition(to) {
            return Err(AppError::InvalidTransition(format!(
                "{} {} -> {}",
                session.id, from, to
            )));
        }

        session.status = to;
        if matches!(to, SessionStatus::Ended | SessionStatus::Error) && session.ended_at.is_none()
        {
            session.ended_at = Some(Utc::now().timestamp_millis());
        }
        if error.is_some() {
            session.error = error;
        }
        self.sessions.update(session.clone()).await?;

        match (from.is_running(), to.is_running()) {
            (false, true) => metrics::SESSION.inc(),
            (true, false) => metrics::SESSION.dec(),
            _ => {}
        }
        info!(
            session = session.id,
            correlation = session.correlation_id,
            "session {} -> {}",
            from,
            to
        );
        Ok(())
    }

    /// New starting session, or the open one when it streams the same config
    async fn open(&self, config: &StreamConfig) -> Result<(Session, bool)> {
        let lock = self.lock_for(&format!("owner:{}", config.owner));
        let _guard = lock.lock().await;

        if let Some(open) = self.sessions.open_for_owner(&config.owner).await? {
            if open.config_id == config.id {
                return Ok((open, false));
            }
            return Err(AppError::SessionAlreadyActive(open.id));
        }

        let session = Session::new(config, config.app_or(&self.default_app));
        self.sessions.create(session.clone()).await?;
        info!(
            session = session.id,
            correlation = session.correlation_id,
            owner = session.owner,
            stream = session.stream_key,
            "session created"
        );
        Ok((session, true))
    }

    async fn config(&self, config_id: &str) -> Result<StreamConfig> {
        self.accounts
            .stream_config(config_id)
            .await?
            .ok_or_else(|| AppError::config_not_found(config_id))
    }

    /// Ingest accepted a publish, the session starts in the background
    pub async fn on_publish(&self, app: &str, stream: &str) -> Result<Session> {
        let config = self
            .accounts
            .stream_config_by_key(app, stream)
            .await?
            .ok_or_else(|| AppError::config_not_found(format!("{}/{}", app, stream)))?;
        let (session, created) = self.open(&config).await?;
        if created {
            self.spawn_run(session.id.clone());
        }
        Ok(session)
    }

    /// Create a session and start its relays in the background
    pub async fn launch_session(&self, config_id: &str) -> Result<Session> {
        let config = self.config(config_id).await?;
        let (session, created) = self.open(&config).await?;
        if created {
            self.spawn_run(session.id.clone());
        }
        Ok(session)
    }

    /// Create a session and wait until its relays settled
    pub async fn start_session(&self, config_id: &str) -> Result<Session> {
        let config = self.config(config_id).await?;
        let (session, created) = self.open(&config).await?;
        if !created {
            return Ok(session);
        }
        self.run(&session.id).await?;
        self.load(&session.id).await
    }

    fn spawn_run(&self, session_id: String) -> JoinHandle<()> {
        let machine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = machine.run(&session_id).await {
                warn!(session = session_id, "session start failed: {}", e);
            }
        })
    }

    /// Move a starting session to live, partial or error
    pub async fn run(&self, session_id: &str) -> Result<AggregateResult> {
        let lock = self.lock_for(session_id);
        let pending = {
            let _guard = lock.lock().await;
            let mut session = self.load(session_id).await?;
            if session.status != SessionStatus::Starting {
                return Err(AppError::InvalidTransition(format!(
                    "{} is {}, not starting",
                    session.id, session.status
                )));
            }
            match self.coordinator.launch_relays(&session).await {
                Ok(pending) => pending,
                Err(e) => {
                    self.transition(&mut session, SessionStatus::Error, Some(e.to_string()))
                        .await?;
                    return Err(e);
                }
            }
        };

        let result = pending.join().await;

        let _guard = lock.lock().await;
        let mut session = self.load(session_id).await?;
        if session.status != SessionStatus::Starting {
            debug!(
                session = session_id,
                "session left starting while relays settled: {}", session.status
            );
            return Ok(result);
        }
        match result.status {
            SessionStatus::Error => {
                self.coordinator.stop_relays(session_id).await;
                self.transition(&mut session, SessionStatus::Error, Some(result.summary()))
                    .await?;
            }
            status => self.transition(&mut session, status, None).await?,
        }
        Ok(result)
    }

    /// Stop relays and end the session, a no-op on an ended session
    pub async fn stop_session(&self, session_id: &str) -> Result<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        let mut session = self.load(session_id).await?;
        self.coordinator.stop_relays(session_id).await;
        if session.status != SessionStatus::Ended {
            self.transition(&mut session, SessionStatus::Ended, None)
                .await?;
        }
        Ok(session)
    }

    /// Ingest reported the publisher left
    pub async fn on_unpublish(&self, app: &str, stream: &str) -> Result<Option<Session>> {
        let Some(config) = self.accounts.stream_config_by_key(app, stream).await? else {
            return Err(AppError::config_not_found(format!("{}/{}", app, stream)));
        };
        match self.sessions.open_for_owner(&config.owner).await? {
            Some(open) if open.config_id == config.id => {
                Ok(Some(self.stop_session(&open.id).await?))
            }
            _ => Ok(None),
        }
    }

    /// Source lost, relays are torn down and the session is closed as error
    pub async fn fail(&self, session_id: &str, reason: String) -> Result<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        let mut session = self.load(session_id).await?;
        if !session.status.is_open() {
            return Ok(session);
        }
        self.coordinator.stop_relays(session_id).await;
        warn!(session = session_id, "session failed: {}", reason);
        self.transition(&mut session, SessionStatus::Error, Some(reason))
            .await?;
        Ok(session)
    }

    /// Recompute live/partial from the relay status of the session's destinations
    pub async fn reconcile(&self, session_id: &str) -> Result<SessionStatus> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        let mut session = self.load(session_id).await?;
        if !session.status.is_running() {
            return Ok(session.status);
        }

        let mut degraded = false;
        for id in self.coordinator.destinations(session_id).await {
            if let Some(d) = self.accounts.destination(&id).await? {
                if d.status == RelayStatus::Failed {
                    degraded = true;
                    break;
                }
            }
        }
        let status = if degraded {
            SessionStatus::Partial
        } else {
            SessionStatus::Live
        };
        self.transition(&mut session, status, None).await?;
        Ok(status)
    }

    /// Keep the latest ingest stats on a running session
    pub async fn record_stats(&self, session_id: &str, stats: &StreamStats) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        let mut session = self.load(session_id).await?;
        if !session.status.is_running() {
            return Ok(());
        }
        session.stats = Some(SessionStats {
            viewers: stats.clients,
            kbps: stats.kbps,
            updated_at: Utc::now().timestamp_millis(),
        });
        self.sessions.update(session).await?;
        Ok(())
    }

    /// Failed destinations of a running session with no supervisor behind them
    pub async fn failed_destinations(&self, session: &Session) -> Result<Vec<Destination>> {
        let mut failed = vec![];
        for id in self.coordinator.destinations(&session.id).await {
            let Some(d) = self.accounts.destination(&id).await? else {
                continue;
            };
            if d.status == RelayStatus::Failed
                && d.is_enabled()
                && !self.coordinator.is_active(&session.id, &id).await
            {
                failed.push(d);
            }
        }
        Ok(failed)
    }

    /// Relaunch the given destinations of a running session and reconcile once
    /// every restart settled
    pub async fn restart_relays(
        &self,
        session_id: &str,
        destinations: Vec<Destination>,
    ) -> Result<Vec<(String, RestartOutcome)>> {
        let lock = self.lock_for(session_id);
        let mut pending = vec![];
        {
            let _guard = lock.lock().await;
            let session = self.load(session_id).await?;
            if !session.status.is_running() {
                return Err(AppError::InvalidTransition(format!(
                    "{} is {}, relays cannot restart",
                    session.id, session.status
                )));
            }
            for d in destinations {
                let rx = self.coordinator.launch(&session, &d).await;
                pending.push((d.id, rx));
            }
        }

        let mut outcomes = vec![];
        for (id, rx) in pending {
            let outcome = match rx {
                Some(rx) => rx
                    .await
                    .map(RestartOutcome::from)
                    .unwrap_or(RestartOutcome::Cancelled),
                None => RestartOutcome::AlreadyActive,
            };
            info!(session = session_id, destination = id, ?outcome, "relay restarted");
            outcomes.push((id, outcome));
        }
        self.reconcile(session_id).await?;
        Ok(outcomes)
    }

    /// Manual restart of one destination within its owner's running session
    pub async fn restart_destination(&self, destination_id: &str) -> Result<RestartOutcome> {
        let destination = self
            .accounts
            .destination(destination_id)
            .await?
            .ok_or_else(|| AppError::destination_not_found(destination_id))?;
        if !destination.is_enabled() {
            return Err(AppError::InvalidTransition(format!(
                "destination {} is disabled",
                destination_id
            )));
        }
        let session = match self.sessions.open_for_owner(&destination.owner).await? {
            Some(s) if s.status.is_running() => s,
            _ => {
                return Err(AppError::InvalidTransition(format!(
                    "no running session for destination {}",
                    destination_id
                )))
            }
        };

        let mut outcomes = self.restart_relays(&session.id, vec![destination]).await?;
        Ok(outcomes
            .pop()
            .map(|(_, outcome)| outcome)
            .unwrap_or(RestartOutcome::Cancelled))
    }

    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.load(session_id).await
    }

    pub async fn list(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>> {
        Ok(self.sessions.list(statuses).await?)
    }

    /// Per destination relay status of a session
    pub async fn relay_status(&self, session_id: &str) -> Result<Vec<RelayState>> {
        let session = self.load(session_id).await?;
        let mut ids = self.coordinator.destinations(session_id).await;
        if ids.is_empty() {
            ids = self
                .accounts
                .list_enabled_destinations(&session.owner)
                .await?
                .into_iter()
                .map(|d| d.id)
                .collect();
        }
        let pids = self.coordinator.relay_pids(session_id).await;

        let mut relays = vec![];
        for id in ids {
            if let Some(destination) = self.accounts.destination(&id).await? {
                relays.push(RelayState {
                    pid: pids.get(&id).copied(),
                    destination,
                });
            }
        }
        Ok(relays)
    }

    /// Follow relay status changes and keep live/partial in step
    pub fn watch_relays(&self) -> JoinHandle<()> {
        let mut events = self.coordinator.subscribe();
        let machine = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = machine.reconcile(&event.session).await {
                            debug!(session = event.session, "reconcile skipped: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("relay events lagged by {}, reconciling all sessions", n);
                        let running = machine
                            .list(&[SessionStatus::Live, SessionStatus::Partial])
                            .await
                            .unwrap_or_default();
                        for s in running {
                            let _ = machine.reconcile(&s.id).await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// End every open session, used on shutdown
    pub async fn shutdown(&self) {
        let open = self
            .list(&[
                SessionStatus::Starting,
                SessionStatus::Live,
                SessionStatus::Partial,
            ])
            .await
            .unwrap_or_default();
        for s in open {
            if let Err(e) = self.stop_session(&s.id).await {
                error!(session = s.id, "session stop error: {}", e);
            }
        }
        self.coordinator.shutdown().await;
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::config::{self, Config};
    use crate::store::MemStorage;

    // a crashing endpoint runs once for 0.5s, then refuses while "$2" exists
    const SCRIPT: &str = "case \"$1\" in \
        *unreachable*) echo 'Connection refused' >&2; exit 1;; \
        *crash*) if [ -e \"$2\" ]; then echo refused >&2; exit 1; fi; touch \"$2\"; sleep 0.5; exit 1;; \
        *) exec sleep 30;; esac";

    fn destination(id: &str, owner: &str, url: &str) -> Destination {
        Destination {
            id: id.to_string(),
            owner: owner.to_string(),
            platform: "custom".to_string(),
            url: url.to_string(),
            stream_key: "key".to_string(),
            enabled: true,
            status: RelayStatus::Idle,
            updated_at: 0,
            last_error: None,
        }
    }

    fn stream_config(id: &str, owner: &str, key: &str) -> StreamConfig {
        StreamConfig {
            id: id.to_string(),
            owner: owner.to_string(),
            title: String::new(),
            app: None,
            stream_key: key.to_string(),
        }
    }

    fn machine(destinations: Vec<Destination>) -> (Arc<MemStorage>, SessionStateMachine) {
        machine_with_marker(destinations, "")
    }

    fn machine_with_marker(
        destinations: Vec<Destination>,
        marker: &str,
    ) -> (Arc<MemStorage>, SessionStateMachine) {
        let store = Arc::new(MemStorage::with_accounts(
            "live".to_string(),
            vec![
                stream_config("c1", "alice", "k1"),
                stream_config("c2", "alice", "k2"),
                stream_config("c3", "bob", "k3"),
            ],
            destinations,
        ));
        let mut cfg = Config::default();
        cfg.relay.program = "sh".to_string();
        cfg.relay.args = vec![
            "-c".to_string(),
            SCRIPT.to_string(),
            "relay".to_string(),
            "{output}".to_string(),
            marker.to_string(),
        ];
        cfg.relay.grace_window = config::GraceWindow(200);
        cfg.relay.stop_timeout = 500;
        cfg.retry.backoff = 20;
        cfg.retry.max_backoff = 20;
        let coordinator = RelayCoordinator::new(store.clone(), &cfg);
        let machine =
            SessionStateMachine::new(store.clone(), store.clone(), coordinator, "live".to_string());
        (store, machine)
    }

    #[tokio::test]
    async fn test_start_live_and_stop() {
        let (store, machine) = machine(vec![
            destination("d1", "alice", "rtmp://a.example.com/app"),
            destination("d2", "alice", "rtmp://b.example.com/app"),
        ]);
        let session = machine.start_session("c1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Live);
        assert!(session.ended_at.is_none());

        let relays = machine.relay_status(&session.id).await.unwrap();
        assert_eq!(relays.len(), 2);
        let pids: Vec<u32> = relays.iter().filter_map(|r| r.pid).collect();
        assert_eq!(pids.len(), 2);

        let ended = machine.stop_session(&session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.ended_at.is_some());
        for pid in pids {
            assert!(!signal::is_running(pid));
        }
        for id in ["d1", "d2"] {
            assert_eq!(
                store.destination(id).await.unwrap().unwrap().status,
                RelayStatus::Idle
            );
        }

        // stop is idempotent
        let again = machine.stop_session(&session.id).await.unwrap();
        assert_eq!(again.status, SessionStatus::Ended);
        assert_eq!(again.ended_at, ended.ended_at);
    }

    #[tokio::test]
    async fn test_partial_and_reconcile() {
        let (store, machine) = machine(vec![
            destination("d1", "alice", "rtmp://a.example.com/app"),
            destination("d2", "alice", "rtmp://unreachable.example.com/app"),
        ]);
        let session = machine.start_session("c1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Partial);
        let d2 = store.destination("d2").await.unwrap().unwrap();
        assert_eq!(d2.status, RelayStatus::Failed);
        assert_eq!(d2.last_error.as_deref(), Some("Connection refused"));

        // the endpoint is fixed, a manual restart brings the session back to live
        store.put_destination(destination("d2", "alice", "rtmp://b.example.com/app"));
        let outcome = machine.restart_destination("d2").await.unwrap();
        assert_eq!(outcome, RestartOutcome::Established);
        assert_eq!(
            machine.get(&session.id).await.unwrap().status,
            SessionStatus::Live
        );
        assert_eq!(
            machine.restart_destination("d2").await.unwrap(),
            RestartOutcome::AlreadyActive
        );

        machine.stop_session(&session.id).await.unwrap();
        assert!(matches!(
            machine.restart_destination("d2").await,
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_all_failed_is_error() {
        let (_store, machine) = machine(vec![destination(
            "d1",
            "alice",
            "rtmp://unreachable.example.com/app",
        )]);
        let session = machine.start_session("c1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.error.as_deref(), Some("d1: Connection refused"));
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_no_destinations_is_error() {
        let (store, machine) = machine(vec![destination("d1", "bob", "")]);
        assert!(matches!(
            machine.start_session("c3").await,
            Err(AppError::NoDestinations(_))
        ));
        let sessions = store.list(&[SessionStatus::Error]).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(machine.coordinator().active_relays().await, 0);
    }

    #[tokio::test]
    async fn test_one_open_session_per_owner() {
        let (_store, machine) = machine(vec![destination(
            "d1",
            "alice",
            "rtmp://a.example.com/app",
        )]);
        let first = machine.on_publish("live", "k1").await.unwrap();
        let again = machine.on_publish("live", "k1").await.unwrap();
        assert_eq!(first.id, again.id);
        assert!(matches!(
            machine.on_publish("live", "k2").await,
            Err(AppError::SessionAlreadyActive(_))
        ));
        assert!(matches!(
            machine.on_publish("live", "nope").await,
            Err(AppError::ConfigNotFound(_))
        ));

        let stopped = machine.on_unpublish("live", "k1").await.unwrap().unwrap();
        assert_eq!(stopped.id, first.id);
        assert_eq!(stopped.status, SessionStatus::Ended);
        assert!(machine.on_unpublish("live", "k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_while_starting() {
        let (_store, machine) = machine(vec![destination(
            "d1",
            "alice",
            "rtmp://a.example.com/app",
        )]);
        let session = machine.launch_session("c1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Starting);

        let ended = machine.stop_session(&session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        assert_eq!(
            machine.get(&session.id).await.unwrap().status,
            SessionStatus::Ended
        );
        assert_eq!(machine.coordinator().active_relays().await, 0);
    }

    #[tokio::test]
    async fn test_fail_closes_session() {
        let (_store, machine) = machine(vec![destination(
            "d1",
            "alice",
            "rtmp://a.example.com/app",
        )]);
        let session = machine.start_session("c1").await.unwrap();
        let pid = machine.coordinator().relay_pids(&session.id).await["d1"];

        let failed = machine
            .fail(&session.id, "source stream is gone".to_string())
            .await
            .unwrap();
        assert_eq!(failed.status, SessionStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("source stream is gone"));
        assert!(!signal::is_running(pid));

        let ended = machine.stop_session(&session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(matches!(
            machine.reconcile(&session.id).await,
            Ok(SessionStatus::Ended)
        ));
    }

    #[tokio::test]
    async fn test_crash_then_failed_retries_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("crashed");
        let (store, machine) = machine_with_marker(
            vec![
                destination("d1", "alice", "rtmp://a.example.com/app"),
                destination("d2", "alice", "rtmp://crash.example.com/app"),
            ],
            marker.to_str().unwrap(),
        );
        machine.watch_relays();

        let session = machine.start_session("c1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Live);

        let mut status = session.status;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            status = machine.get(&session.id).await.unwrap().status;
            if status == SessionStatus::Partial {
                break;
            }
        }
        assert_eq!(status, SessionStatus::Partial);
        let d2 = store.destination("d2").await.unwrap().unwrap();
        assert_eq!(d2.status, RelayStatus::Failed);
        assert_eq!(d2.last_error.as_deref(), Some("refused"));
        assert_eq!(
            store.destination("d1").await.unwrap().unwrap().status,
            RelayStatus::Active
        );

        machine.stop_session(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_session_resets_relay_status() {
        let (store, machine) = machine(vec![
            destination("d1", "alice", "rtmp://a.example.com/app"),
            destination("d2", "alice", "rtmp://unreachable.example.com/app"),
        ]);
        let first = machine.start_session("c1").await.unwrap();
        assert_eq!(first.status, SessionStatus::Partial);
        machine.stop_session(&first.id).await.unwrap();
        assert_eq!(
            store.destination("d2").await.unwrap().unwrap().status,
            RelayStatus::Failed
        );

        store.put_destination(destination("d2", "alice", "rtmp://b.example.com/app"));
        let second = machine.launch_session("c1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let relays = machine.relay_status(&second.id).await.unwrap();
        assert_eq!(relays.len(), 2);
        for relay in relays {
            assert_eq!(relay.destination.status, RelayStatus::Idle);
            assert!(relay.destination.last_error.is_none());
        }

        machine.stop_session(&second.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_locks_released_after_sessions_close() {
        let (_store, machine) = machine(vec![destination(
            "d1",
            "alice",
            "rtmp://a.example.com/app",
        )]);
        for _ in 0..3 {
            let session = machine.start_session("c1").await.unwrap();
            assert_eq!(session.status, SessionStatus::Live);
            machine.stop_session(&session.id).await.unwrap();
        }
        let _lock = machine.lock_for("other");
        assert_eq!(machine.locks.lock().unwrap().len(), 1);
    }
}
