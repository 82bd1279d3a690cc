use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::model::{Destination, RelayStatus, Session, SessionStatus, StreamConfig};

/// Streaming configurations and destination accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn stream_config(&self, id: &str) -> Result<Option<StreamConfig>>;

    async fn stream_config_by_key(&self, app: &str, stream_key: &str)
        -> Result<Option<StreamConfig>>;

    async fn destination(&self, id: &str) -> Result<Option<Destination>>;

    async fn list_enabled_destinations(&self, owner: &str) -> Result<Vec<Destination>>;

    /// Relay fields only, endpoint and enabled flag belong to account management
    async fn update_relay_status(
        &self,
        id: &str,
        status: RelayStatus,
        last_error: Option<String>,
    ) -> Result<()>;

    /// Back to idle with no diagnostic, before a session's first attempt
    async fn reset_relay_status(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Session>>;

    async fn update(&self, session: Session) -> Result<()>;

    async fn list(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>>;

    /// Session still holding the owner's destinations
    async fn open_for_owner(&self, owner: &str) -> Result<Option<Session>>;
}

/// In process store seeded from the config file
#[derive(Clone, Default)]
pub struct MemStorage {
    configs: Arc<RwLock<HashMap<String, StreamConfig>>>,
    destinations: Arc<RwLock<HashMap<String, Destination>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    default_app: String,
}

impl MemStorage {
    pub fn new(default_app: String) -> Self {
        Self {
            default_app,
            ..Default::default()
        }
    }

    pub fn with_accounts(
        default_app: String,
        configs: Vec<StreamConfig>,
        destinations: Vec<Destination>,
    ) -> Self {
        let store = Self::new(default_app);
        for c in configs {
            store.put_config(c);
        }
        for d in destinations {
            store.put_destination(d);
        }
        store
    }

    pub fn put_config(&self, config: StreamConfig) {
        self.configs
            .write()
            .unwrap()
            .insert(config.id.clone(), config);
    }

    /// Upsert of the account side of a destination, relay fields survive
    pub fn put_destination(&self, mut destination: Destination) {
        let mut destinations = self.destinations.write().unwrap();
        if let Some(old) = destinations.get(&destination.id) {
            destination.status = old.status;
            destination.updated_at = old.updated_at;
            destination.last_error = old.last_error.clone();
        }
        destinations.insert(destination.id.clone(), destination);
    }
}

#[async_trait]
impl AccountStore for MemStorage {
    async fn stream_config(&self, id: &str) -> Result<Option<StreamConfig>> {
        Ok(self.configs.read().unwrap().get(id).cloned())
    }

    async fn stream_config_by_key(
        &self,
        app: &str,
        stream_key: &str,
    ) -> Result<Option<StreamConfig>> {
        Ok(self
            .configs
            .read()
            .unwrap()
            .values()
            .find(|c| c.stream_key == stream_key && c.app_or(&self.default_app) == app)
            .cloned())
    }

    async fn destination(&self, id: &str) -> Result<Option<Destination>> {
        Ok(self.destinations.read().unwrap().get(id).cloned())
    }

    async fn list_enabled_destinations(&self, owner: &str) -> Result<Vec<Destination>> {
        let mut destinations: Vec<Destination> = self
            .destinations
            .read()
            .unwrap()
            .values()
            .filter(|d| d.owner == owner && d.is_enabled())
            .cloned()
            .collect();
        destinations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(destinations)
    }

    async fn update_relay_status(
        &self,
        id: &str,
        status: RelayStatus,
        last_error: Option<String>,
    ) -> Result<()> {
        let mut destinations = self.destinations.write().unwrap();
        let destination = destinations
            .get_mut(id)
            .ok_or_else(|| anyhow!("destination not found: {}", id))?;
        destination.status = status;
        destination.updated_at = Utc::now().timestamp_millis();
        if last_error.is_some() {
            destination.last_error = last_error;
        }
        Ok(())
    }

    async fn reset_relay_status(&self, id: &str) -> Result<()> {
        let mut destinations = self.destinations.write().unwrap();
        let destination = destinations
            .get_mut(id)
            .ok_or_else(|| anyhow!("destination not found: {}", id))?;
        destination.status = RelayStatus::Idle;
        destination.last_error = None;
        destination.updated_at = Utc::now().timestamp_millis();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemStorage {
    async fn create(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(&session.id) {
            return Err(anyhow!("session already exists: {}", session.id));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(id).cloned())
    }

    async fn update(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&session.id) {
            Some(s) => {
                *s = session;
                Ok(())
            }
            None => Err(anyhow!("session not found: {}", session.id)),
        }
    }

    async fn list(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| statuses.is_empty() || statuses.contains(&s.status))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn open_for_owner(&self, owner: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .unwrap()
            .values()
            .find(|s| s.owner == owner && s.status.is_open())
            .cloned())
    }
}
