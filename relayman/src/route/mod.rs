use crate::config::Config;
use crate::session::SessionStateMachine;

pub mod destination;
pub mod hook;
pub mod session;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub machine: SessionStateMachine,
}
