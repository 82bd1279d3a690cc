use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::StatusCode;
use tracing::{info, warn};

use api::request::IngestHook;
use api::response::HookAck;

use crate::error::AppError;
use crate::route::AppState;

/// Callbacks of the ingest server, they are not behind the API token
pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::HOOK_ON_PUBLISH, post(on_publish))
        .route(api::path::HOOK_ON_UNPUBLISH, post(on_unpublish))
}

fn app_of(state: &AppState, hook: &IngestHook) -> String {
    if hook.app.trim().is_empty() {
        state.config.ingest.app.clone()
    } else {
        hook.app.clone()
    }
}

async fn on_publish(State(state): State<AppState>, Json(hook): Json<IngestHook>) -> Response {
    let app = app_of(&state, &hook);
    info!(app, stream = hook.stream, client = hook.client_id, ip = hook.ip, "on_publish");
    match state.machine.on_publish(&app, &hook.stream).await {
        Ok(session) => Json(HookAck::ok(Some(session.id))).into_response(),
        Err(e) => reject(e),
    }
}

async fn on_unpublish(State(state): State<AppState>, Json(hook): Json<IngestHook>) -> Response {
    let app = app_of(&state, &hook);
    info!(app, stream = hook.stream, client = hook.client_id, "on_unpublish");
    match state.machine.on_unpublish(&app, &hook.stream).await {
        Ok(session) => Json(HookAck::ok(session.map(|s| s.id))).into_response(),
        Err(e) => reject(e),
    }
}

/// Any non-zero code refuses the publisher
fn reject(e: AppError) -> Response {
    let status = match e {
        AppError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
        AppError::SessionAlreadyActive(_) | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("hook rejected: {}", e);
    (status, Json(HookAck::reject(e))).into_response()
}
