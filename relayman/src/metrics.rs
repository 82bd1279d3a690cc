use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Gauge, IntCounter, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref SESSION: Gauge = Gauge::new("session", "running session number").unwrap();
    pub static ref RELAY: Gauge = Gauge::new("relay", "active relay number").unwrap();
    pub static ref RELAY_ATTEMPT: IntCounter =
        IntCounter::new("relay_attempt", "relay launch attempts").unwrap();
    pub static ref RELAY_FAILURE: IntCounter =
        IntCounter::new("relay_failure", "relay launch failures and crashes").unwrap();
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("liverelay".to_string()), None).unwrap();
    pub static ref ENCODER: TextEncoder = TextEncoder::new();
}

static REGISTER: Once = Once::new();

pub fn register() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SESSION.clone()),
            Box::new(RELAY.clone()),
            Box::new(RELAY_ATTEMPT.clone()),
            Box::new(RELAY_FAILURE.clone()),
        ];
        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                error!("metrics register error: {}", e);
            }
        }
    });
}
