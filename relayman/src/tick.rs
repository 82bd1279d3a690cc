use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ingest::{probe_source, IngestStats, SourceState};
use crate::model::{Session, SessionStatus};
use crate::relay::RestartOutcome;
use crate::result::Result;
use crate::session::SessionStateMachine;

/// What one sweep did to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepAction {
    Restarted(Vec<(String, RestartOutcome)>),
    Failed(String),
}

/// Periodic check of running sessions: ingest stats are recorded, failed
/// relays come back while the source is alive, sessions whose source is gone
/// are closed
#[derive(Clone)]
pub struct HealthMonitor {
    machine: SessionStateMachine,
    ingest: Arc<dyn IngestStats>,
    interval: Duration,
    stats_attempts: u8,
    stats_retry_interval: Duration,
}

impl HealthMonitor {
    pub fn new(machine: SessionStateMachine, ingest: Arc<dyn IngestStats>, cfg: &Config) -> Self {
        Self {
            machine,
            ingest,
            interval: Duration::from_millis(cfg.health.check_tick_time.0),
            stats_attempts: cfg.ingest.stats_attempts.0,
            stats_retry_interval: Duration::from_millis(cfg.ingest.stats_retry_interval),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("health check every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return,
            }
            match self.sweep().await {
                Ok(actions) if !actions.is_empty() => debug!(?actions, "health sweep"),
                Ok(_) => {}
                Err(e) => error!("health sweep error: {}", e),
            }
        }
    }

    /// One pass over live and partial sessions, sessions are checked concurrently
    pub async fn sweep(&self) -> Result<Vec<(String, SweepAction)>> {
        let sessions = self
            .machine
            .list(&[SessionStatus::Live, SessionStatus::Partial])
            .await?;

        let mut checks = JoinSet::new();
        for session in sessions {
            let monitor = self.clone();
            checks.spawn(async move {
                let id = session.id.clone();
                (id, monitor.check(session).await)
            });
        }

        let mut actions = vec![];
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((id, Ok(Some(action)))) => actions.push((id, action)),
                Ok((_, Ok(None))) => {}
                Ok((id, Err(e))) => warn!(session = id, "health check error: {}", e),
                Err(e) => error!("health check task error: {}", e),
            }
        }
        actions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(actions)
    }

    async fn check(&self, session: Session) -> Result<Option<SweepAction>> {
        let failed = self.machine.failed_destinations(&session).await?;
        let state = probe_source(
            self.ingest.as_ref(),
            &session.app,
            &session.stream_key,
            self.stats_attempts,
            self.stats_retry_interval,
        )
        .await;

        let reason = match state {
            SourceState::Alive(stats) => {
                self.machine.record_stats(&session.id, &stats).await?;
                if failed.is_empty() {
                    return Ok(None);
                }
                info!(
                    session = session.id,
                    kbps = stats.kbps,
                    failed = failed.len(),
                    "source alive, restarting failed relays"
                );
                let outcomes = self.machine.restart_relays(&session.id, failed).await?;
                return Ok(Some(SweepAction::Restarted(outcomes)));
            }
            // healthy relays end on their own once the source goes away
            _ if failed.is_empty() => return Ok(None),
            SourceState::Gone => "source stream is gone".to_string(),
            SourceState::Unreachable(e) => format!("ingest unreachable: {}", e),
        };
        self.machine.fail(&session.id, reason.clone()).await?;
        Ok(Some(SweepAction::Failed(reason)))
    }
}
