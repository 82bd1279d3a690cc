use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, RwLock};
use tracing::{debug, info, warn};

use super::backoff::RetryPolicy;
use super::supervisor::{Outcome, RelayEvent, RetrySupervisor, SupervisorHandle};
use super::worker::{RelayOptions, RelayWorker};
use crate::config::{self, Config};
use crate::error::AppError;
use crate::model::{Destination, Session, SessionStatus};
use crate::new_broadcast_channel;
use crate::result::Result;
use crate::store::AccountStore;

/// Slack on top of the stop timeout before a supervisor task is aborted
const STOP_SLACK: Duration = Duration::from_secs(1);

/// Combined first outcome of every relay of a session
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub status: SessionStatus,
    pub established: Vec<String>,
    /// Destination id and diagnostic
    pub failed: Vec<(String, String)>,
    pub cancelled: Vec<String>,
}

impl AggregateResult {
    fn settle(&mut self) {
        let total = self.established.len() + self.failed.len() + self.cancelled.len();
        self.status = if total > 0 && self.established.len() == total {
            SessionStatus::Live
        } else if !self.established.is_empty() {
            SessionStatus::Partial
        } else {
            SessionStatus::Error
        };
    }

    /// Human readable reason when no relay came up
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            return "no relay established".to_string();
        }
        self.failed
            .iter()
            .map(|(id, diagnostic)| format!("{}: {}", id, diagnostic))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Established,
    Failed(String),
    AlreadyActive,
    Cancelled,
}

impl From<Outcome> for RestartOutcome {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Established => RestartOutcome::Established,
            Outcome::Exhausted { diagnostic } => RestartOutcome::Failed(diagnostic),
            Outcome::Cancelled => RestartOutcome::Cancelled,
        }
    }
}

/// Relays launched for a session whose first outcomes are still pending
pub struct PendingRelays {
    session: String,
    running: Vec<String>,
    pending: Vec<(String, oneshot::Receiver<Outcome>)>,
}

impl PendingRelays {
    pub async fn join(self) -> AggregateResult {
        let mut result = AggregateResult {
            established: self.running,
            ..Default::default()
        };
        // Supervisors run concurrently, awaiting in order costs no extra time
        for (destination, rx) in self.pending {
            match rx.await.unwrap_or(Outcome::Cancelled) {
                Outcome::Established => result.established.push(destination),
                Outcome::Exhausted { diagnostic } => result.failed.push((destination, diagnostic)),
                Outcome::Cancelled => result.cancelled.push(destination),
            }
        }
        result.settle();
        info!(
            session = self.session,
            status = %result.status,
            established = result.established.len(),
            failed = result.failed.len(),
            "relays settled"
        );
        result
    }
}

type Registry = HashMap<String, HashMap<String, SupervisorHandle>>;

/// Owns every relay supervisor, keyed by session then destination.
/// At most one active supervisor exists per pair.
#[derive(Clone)]
pub struct RelayCoordinator {
    accounts: Arc<dyn AccountStore>,
    ingest: config::Ingest,
    options: RelayOptions,
    policy: RetryPolicy,
    registry: Arc<RwLock<Registry>>,
    events: broadcast::Sender<RelayEvent>,
}

impl RelayCoordinator {
    pub fn new(accounts: Arc<dyn AccountStore>, cfg: &Config) -> Self {
        Self {
            accounts,
            ingest: cfg.ingest.clone(),
            options: RelayOptions::from(&cfg.relay),
            policy: RetryPolicy::from(&cfg.retry),
            registry: Arc::new(RwLock::new(HashMap::new())),
            events: new_broadcast_channel!(64),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Upper bound of one start for a relay that never comes up
    pub fn worst_case(&self) -> Duration {
        self.policy.worst_case(self.options.grace_window)
    }

    /// Launch one supervisor per enabled destination of the session owner
    pub async fn launch_relays(&self, session: &Session) -> Result<PendingRelays> {
        let destinations = self.accounts.list_enabled_destinations(&session.owner).await?;
        if destinations.is_empty() {
            return Err(AppError::no_destinations(&session.owner));
        }

        let mut relays = PendingRelays {
            session: session.id.clone(),
            running: vec![],
            pending: vec![],
        };
        // relay fields still describe the owner's previous session
        for destination in destinations.iter() {
            if !self.is_active(&session.id, &destination.id).await {
                self.accounts.reset_relay_status(&destination.id).await?;
            }
        }
        for destination in destinations.iter() {
            match self.launch(session, destination).await {
                Some(rx) => relays.pending.push((destination.id.clone(), rx)),
                None => relays.running.push(destination.id.clone()),
            }
        }
        info!(
            session = session.id,
            destinations = destinations.len(),
            bound = ?self.worst_case(),
            "relays launched"
        );
        Ok(relays)
    }

    pub async fn start_relays(&self, session: &Session) -> Result<AggregateResult> {
        Ok(self.launch_relays(session).await?.join().await)
    }

    /// Start a supervisor for the pair, `None` when one is already active
    pub async fn launch(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> Option<oneshot::Receiver<Outcome>> {
        let mut registry = self.registry.write().await;
        let relays = registry.entry(session.id.clone()).or_default();
        if relays.get(&destination.id).is_some_and(|h| h.is_active()) {
            debug!(
                session = session.id,
                destination = destination.id,
                "relay already active"
            );
            return None;
        }

        let worker = RelayWorker::new(
            session.id.clone(),
            destination.id.clone(),
            self.ingest.pull_url(&session.app, &session.stream_key),
            destination.target(),
            self.options.clone(),
        );
        let (handle, rx) = RetrySupervisor::new(
            worker,
            self.policy.clone(),
            self.accounts.clone(),
            self.events.clone(),
        )
        .spawn();
        relays.insert(destination.id.clone(), handle);
        Some(rx)
    }

    pub async fn restart_destination(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> RestartOutcome {
        match self.launch(session, destination).await {
            Some(rx) => rx.await.unwrap_or(Outcome::Cancelled).into(),
            None => RestartOutcome::AlreadyActive,
        }
    }

    /// Stop every relay of the session and forget them, idempotent
    pub async fn stop_relays(&self, session_id: &str) -> usize {
        let relays = self.registry.write().await.remove(session_id);
        let Some(relays) = relays else {
            return 0;
        };

        for handle in relays.values() {
            handle.cancel();
        }
        let bound = self.options.stop_timeout + STOP_SLACK;
        let mut stopped = 0;
        for (destination, handle) in relays {
            if !handle.stop(bound).await {
                warn!(session = session_id, destination, "relay aborted");
            }
            stopped += 1;
        }
        info!(session = session_id, stopped, "relays stopped");
        stopped
    }

    pub async fn is_active(&self, session_id: &str, destination_id: &str) -> bool {
        self.registry
            .read()
            .await
            .get(session_id)
            .and_then(|relays| relays.get(destination_id))
            .is_some_and(|h| h.is_active())
    }

    /// Destinations that took part in the session, active or not
    pub async fn destinations(&self, session_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .read()
            .await
            .get(session_id)
            .map(|relays| relays.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn relay_pids(&self, session_id: &str) -> HashMap<String, u32> {
        self.registry
            .read()
            .await
            .get(session_id)
            .map(|relays| {
                relays
                    .iter()
                    .filter_map(|(id, h)| h.pid().map(|pid| (id.clone(), pid)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn active_relays(&self) -> usize {
        self.registry
            .read()
            .await
            .values()
            .flat_map(|relays| relays.values())
            .filter(|h| h.is_active())
            .count()
    }

    pub async fn shutdown(&self) {
        let sessions: Vec<String> = self.registry.read().await.keys().cloned().collect();
        for session in sessions {
            self.stop_relays(&session).await;
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::model::{RelayStatus, StreamConfig};
    use crate::store::MemStorage;

    const SCRIPT: &str =
        "case \"$1\" in *unreachable*) echo 'Connection refused' >&2; exit 1;; *) exec sleep 30;; esac";

    fn destination(id: &str, url: &str) -> Destination {
        Destination {
            id: id.to_string(),
            owner: "alice".to_string(),
            platform: "custom".to_string(),
            url: url.to_string(),
            stream_key: "key".to_string(),
            enabled: true,
            status: RelayStatus::Idle,
            updated_at: 0,
            last_error: None,
        }
    }

    fn setup(destinations: Vec<Destination>) -> (Arc<MemStorage>, RelayCoordinator, Session) {
        let config = StreamConfig {
            id: "c1".to_string(),
            owner: "alice".to_string(),
            title: String::new(),
            app: None,
            stream_key: "k1".to_string(),
        };
        let store = Arc::new(MemStorage::with_accounts(
            "live".to_string(),
            vec![config.clone()],
            destinations,
        ));
        let mut cfg = Config::default();
        cfg.relay.program = "sh".to_string();
        cfg.relay.args = vec![
            "-c".to_string(),
            SCRIPT.to_string(),
            "relay".to_string(),
            "{output}".to_string(),
        ];
        cfg.relay.grace_window = config::GraceWindow(200);
        cfg.relay.stop_timeout = 500;
        cfg.retry.backoff = 20;
        cfg.retry.max_backoff = 20;
        let coordinator = RelayCoordinator::new(store.clone(), &cfg);
        let session = Session::new(&config, "live");
        (store, coordinator, session)
    }

    #[tokio::test]
    async fn test_no_destinations() {
        let (_store, coordinator, session) =
            setup(vec![destination("d1", "")]);
        assert!(matches!(
            coordinator.start_relays(&session).await,
            Err(AppError::NoDestinations(_))
        ));
        assert_eq!(coordinator.active_relays().await, 0);
    }

    #[tokio::test]
    async fn test_partial_then_stop() {
        let (store, coordinator, session) = setup(vec![
            destination("d1", "rtmp://ok.example.com/app"),
            destination("d2", "rtmp://unreachable.example.com/app"),
        ]);

        let result = coordinator.start_relays(&session).await.unwrap();
        assert_eq!(result.status, SessionStatus::Partial);
        assert_eq!(result.established, vec!["d1"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "d2");
        assert_eq!(result.summary(), "d2: Connection refused");

        let d2 = store.destination("d2").await.unwrap().unwrap();
        assert_eq!(d2.status, RelayStatus::Failed);
        assert!(coordinator.is_active(&session.id, "d1").await);
        assert!(!coordinator.is_active(&session.id, "d2").await);

        let pids = coordinator.relay_pids(&session.id).await;
        let pid = pids["d1"];
        assert!(signal::is_running(pid));

        assert_eq!(coordinator.stop_relays(&session.id).await, 2);
        assert!(!signal::is_running(pid));
        assert_eq!(coordinator.stop_relays(&session.id).await, 0);
        assert_eq!(
            store.destination("d1").await.unwrap().unwrap().status,
            RelayStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_concurrent_restart_single_supervisor() {
        let (_store, coordinator, session) =
            setup(vec![destination("d1", "rtmp://ok.example.com/app")]);
        let d1 = destination("d1", "rtmp://ok.example.com/app");

        let (a, b) = tokio::join!(
            coordinator.restart_destination(&session, &d1),
            coordinator.restart_destination(&session, &d1)
        );
        let mut outcomes = vec![a, b];
        outcomes.sort_by_key(|o| format!("{:?}", o));
        assert_eq!(
            outcomes,
            vec![RestartOutcome::AlreadyActive, RestartOutcome::Established]
        );
        assert_eq!(coordinator.active_relays().await, 1);

        assert_eq!(
            coordinator.restart_destination(&session, &d1).await,
            RestartOutcome::AlreadyActive
        );
        coordinator.shutdown().await;
        assert_eq!(coordinator.active_relays().await, 0);
    }

    #[test]
    fn test_aggregate() {
        let mut r = AggregateResult {
            established: vec!["a".to_string()],
            ..Default::default()
        };
        r.settle();
        assert_eq!(r.status, SessionStatus::Live);

        r.failed.push(("b".to_string(), "x".to_string()));
        r.settle();
        assert_eq!(r.status, SessionStatus::Partial);

        r.established.clear();
        r.settle();
        assert_eq!(r.status, SessionStatus::Error);

        let mut empty = AggregateResult::default();
        empty.settle();
        assert_eq!(empty.status, SessionStatus::Error);
    }
}
