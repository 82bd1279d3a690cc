use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_http::validate_request::ValidateRequestHeaderLayer;
use tracing::{error, info, info_span, Level};

use auth::TokenValidate;

use crate::config::Config;
use crate::ingest::{IngestStats, SrsClient};
use crate::relay::RelayCoordinator;
use crate::route::{destination, hook, session as session_route, AppState};
use crate::session::SessionStateMachine;
use crate::store::MemStorage;
use crate::tick::HealthMonitor;

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod relay;
pub mod result;
pub mod session;
pub mod store;
pub mod tick;

mod convert;
mod r#macro;
mod metrics;
mod route;

pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let ingest = match SrsClient::new(
        cfg.ingest.api.clone(),
        Duration::from_millis(cfg.ingest.stats_timeout),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("ingest client error: {:?}", e);
            return;
        }
    };
    serve_with(cfg, listener, signal, Arc::new(ingest)).await
}

/// [`serve`] with the ingest stats source supplied by the caller
pub async fn serve_with<F>(
    cfg: Config,
    listener: TcpListener,
    signal: F,
    ingest: Arc<dyn IngestStats>,
) where
    F: Future<Output = ()> + Send + 'static,
{
    match listener.local_addr() {
        Ok(addr) => info!("Server listening on {}", addr),
        Err(e) => error!("listener address error: {}", e),
    }
    metrics_register();

    let store = Arc::new(MemStorage::with_accounts(
        cfg.ingest.app.clone(),
        cfg.configs.clone(),
        cfg.destinations.clone(),
    ));
    let coordinator = RelayCoordinator::new(store.clone(), &cfg);
    let machine = SessionStateMachine::new(
        store.clone(),
        store.clone(),
        coordinator,
        cfg.ingest.app.clone(),
    );
    machine.watch_relays();

    let cancel = CancellationToken::new();
    if cfg.health.enabled {
        let monitor = HealthMonitor::new(machine.clone(), ingest, &cfg);
        tokio::spawn(monitor.run(cancel.clone()));
    }

    let app_state = AppState {
        config: cfg.clone(),
        machine: machine.clone(),
    };

    let auth_layer = ValidateRequestHeaderLayer::custom(
        TokenValidate::<axum::body::Body>::new(cfg.auth.tokens.clone()),
    );
    let app = Router::new()
        .merge(
            session_route::route()
                .merge(destination::route())
                .layer(auth_layer),
        )
        .merge(hook::route())
        .route(api::path::METRICS, get(metrics))
        .with_state(app_state)
        .layer(if cfg.http.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let span = info_span!(
                        "http_request",
                        uri = ?request.uri(),
                        method = ?request.method(),
                        span_id = tracing::field::Empty,
                    );
                    span.record(
                        "span_id",
                        span.id().unwrap_or(tracing::Id::from_u64(42)).into_u64(),
                    );
                    span
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO))
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::INFO)),
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap_or_else(|e| error!("Application error: {e}"));

    cancel.cancel();
    machine.shutdown().await;
}

pub fn metrics_register() {
    metrics::register();
}

async fn metrics() -> String {
    match metrics::ENCODER.encode_to_string(&metrics::REGISTRY.gather()) {
        Ok(text) => text,
        Err(e) => {
            error!("metrics encode error: {}", e);
            String::new()
        }
    }
}
