use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::RetryPolicy;
use super::worker::{Exit, RelayWorker, Verdict};
use crate::metrics;
use crate::model::RelayStatus;
use crate::store::AccountStore;

/// First settled result of a supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Established,
    Exhausted { diagnostic: String },
    Cancelled,
}

/// Emitted on every relay status write, the session status is derived from them
#[derive(Debug, Clone)]
pub struct RelayEvent {
    pub session: String,
    pub destination: String,
    pub status: RelayStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Established,
    Failed,
    Cancelled,
}

/// One launch of one relay, kept in the logs
#[derive(Debug)]
pub struct RelayAttempt {
    pub session: String,
    pub destination: String,
    pub attempt: u32,
    pub started_at: i64,
    pub outcome: AttemptOutcome,
    pub code: Option<i32>,
    pub diagnostic: Option<String>,
}

enum Attempts {
    Established(super::worker::RunningRelay),
    Exhausted(String),
    Cancelled,
}

/// Runs a [`RelayWorker`] under a bounded retry loop and keeps the
/// destination's relay status in step with it
pub struct RetrySupervisor {
    worker: RelayWorker,
    policy: RetryPolicy,
    accounts: Arc<dyn AccountStore>,
    events: broadcast::Sender<RelayEvent>,
    cancel: CancellationToken,
    pid: Arc<AtomicU32>,
}

/// Registry side of a running supervisor
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    pid: Arc<AtomicU32>,
}

impl SupervisorHandle {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Pid of the relay process while one is established
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait up to `bound`, the task is aborted past it.
    /// Aborting drops the child, which is then killed on drop.
    pub async fn stop(mut self, bound: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(bound, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                warn!("relay supervisor did not stop in {:?}, aborting", bound);
                self.task.abort();
                let _ = self.task.await;
                false
            }
        }
    }
}

impl RetrySupervisor {
    pub fn new(
        worker: RelayWorker,
        policy: RetryPolicy,
        accounts: Arc<dyn AccountStore>,
        events: broadcast::Sender<RelayEvent>,
    ) -> Self {
        Self {
            worker,
            policy,
            accounts,
            events,
            cancel: CancellationToken::new(),
            pid: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn spawn(self) -> (SupervisorHandle, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let cancel = self.cancel.clone();
        let pid = self.pid.clone();
        let task = tokio::spawn(self.run(tx));
        (SupervisorHandle { cancel, task, pid }, rx)
    }

    async fn run(self, first: oneshot::Sender<Outcome>) {
        let mut first = Some(first);
        loop {
            match self.attempts().await {
                Attempts::Established(running) => {
                    self.pid.store(running.pid().unwrap_or(0), Ordering::SeqCst);
                    self.set_status(RelayStatus::Active, None).await;
                    report(&mut first, Outcome::Established);
                    metrics::RELAY.inc();

                    let exit = running.supervise(&self.cancel).await;

                    metrics::RELAY.dec();
                    self.pid.store(0, Ordering::SeqCst);
                    match exit {
                        Exit::Stopped => {
                            self.set_status(RelayStatus::Idle, None).await;
                            return;
                        }
                        Exit::Finished => {
                            info!(
                                session = self.worker.session,
                                destination = self.worker.destination,
                                "relay finished"
                            );
                            self.set_status(RelayStatus::Idle, None).await;
                            return;
                        }
                        Exit::Crashed { code, diagnostic } => {
                            metrics::RELAY_FAILURE.inc();
                            warn!(
                                session = self.worker.session,
                                destination = self.worker.destination,
                                ?code,
                                "relay crashed, retrying: {}",
                                diagnostic
                            );
                            self.set_status(RelayStatus::Idle, None).await;
                        }
                    }
                }
                Attempts::Exhausted(diagnostic) => {
                    error!(
                        session = self.worker.session,
                        destination = self.worker.destination,
                        attempts = self.policy.max_attempts,
                        "relay failed: {}",
                        diagnostic
                    );
                    self.set_status(RelayStatus::Failed, Some(diagnostic.clone()))
                        .await;
                    report(&mut first, Outcome::Exhausted { diagnostic });
                    return;
                }
                Attempts::Cancelled => {
                    self.set_status(RelayStatus::Idle, None).await;
                    report(&mut first, Outcome::Cancelled);
                    return;
                }
            }
        }
    }

    async fn attempts(&self) -> Attempts {
        let mut last = String::new();
        for attempt in 1..=self.policy.max_attempts {
            let started_at = Utc::now().timestamp_millis();
            metrics::RELAY_ATTEMPT.inc();
            let verdict = self.worker.launch(&self.cancel).await;

            let mut record = RelayAttempt {
                session: self.worker.session.clone(),
                destination: self.worker.destination.clone(),
                attempt,
                started_at,
                outcome: AttemptOutcome::Cancelled,
                code: None,
                diagnostic: None,
            };
            match verdict {
                Verdict::Established(running) => {
                    record.outcome = AttemptOutcome::Established;
                    info!(?record, pid = ?running.pid(), "relay established");
                    return Attempts::Established(running);
                }
                Verdict::Cancelled => {
                    debug!(?record, "relay cancelled");
                    return Attempts::Cancelled;
                }
                Verdict::Failed { code, diagnostic } => {
                    metrics::RELAY_FAILURE.inc();
                    record.outcome = AttemptOutcome::Failed;
                    record.code = code;
                    record.diagnostic = Some(diagnostic.clone());
                    warn!(?record, "relay attempt failed");
                    last = diagnostic;
                }
            }

            if let Some(delay) = self.policy.delay(attempt) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => return Attempts::Cancelled,
                }
            }
        }
        Attempts::Exhausted(last)
    }

    async fn set_status(&self, status: RelayStatus, last_error: Option<String>) {
        if let Err(e) = self
            .accounts
            .update_relay_status(&self.worker.destination, status, last_error)
            .await
        {
            error!(
                destination = self.worker.destination,
                "relay status update error: {:?}", e
            );
        }
        let _ = self.events.send(RelayEvent {
            session: self.worker.session.clone(),
            destination: self.worker.destination.clone(),
            status,
        });
    }
}

fn report(first: &mut Option<oneshot::Sender<Outcome>>, outcome: Outcome) {
    if let Some(tx) = first.take() {
        let _ = tx.send(outcome);
    }
}
