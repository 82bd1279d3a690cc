use crate::model::{RelayStatus, Session, SessionStatus};
use crate::relay::RestartOutcome;
use crate::session::RelayState;

impl From<SessionStatus> for api::response::SessionStatus {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Starting => api::response::SessionStatus::Starting,
            SessionStatus::Live => api::response::SessionStatus::Live,
            SessionStatus::Partial => api::response::SessionStatus::Partial,
            SessionStatus::Ended => api::response::SessionStatus::Ended,
            SessionStatus::Error => api::response::SessionStatus::Error,
        }
    }
}

impl From<RelayStatus> for api::response::RelayStatus {
    fn from(value: RelayStatus) -> Self {
        match value {
            RelayStatus::Idle => api::response::RelayStatus::Idle,
            RelayStatus::Active => api::response::RelayStatus::Active,
            RelayStatus::Failed => api::response::RelayStatus::Failed,
        }
    }
}

impl From<Session> for api::response::Session {
    fn from(value: Session) -> Self {
        api::response::Session {
            id: value.id,
            correlation_id: value.correlation_id,
            config_id: value.config_id,
            app: value.app,
            stream: value.stream_key,
            status: value.status.into(),
            started_at: value.started_at,
            ended_at: value.ended_at,
            error: value.error,
            viewers: value.stats.map(|s| s.viewers),
            kbps: value.stats.map(|s| s.kbps),
        }
    }
}

impl From<RelayState> for api::response::Relay {
    fn from(value: RelayState) -> Self {
        api::response::Relay {
            destination: value.destination.id,
            platform: value.destination.platform,
            status: value.destination.status.into(),
            updated_at: value.destination.updated_at,
            last_error: value.destination.last_error,
            pid: value.pid,
        }
    }
}

impl From<RestartOutcome> for api::response::RestartResult {
    fn from(value: RestartOutcome) -> Self {
        match value {
            RestartOutcome::Established => api::response::RestartResult::Established,
            RestartOutcome::Failed(_) => api::response::RestartResult::Failed,
            RestartOutcome::AlreadyActive => api::response::RestartResult::AlreadyActive,
            RestartOutcome::Cancelled => api::response::RestartResult::Cancelled,
        }
    }
}
