use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;

use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::SESSIONS, get(index).post(create))
        .route(&api::path::session(":session"), get(show).delete(destroy))
        .route(&api::path::session_relays(":session"), get(relays))
}

async fn index(
    State(state): State<AppState>,
) -> crate::result::Result<Json<Vec<api::response::Session>>> {
    Ok(Json(
        state
            .machine
            .list(&[])
            .await?
            .into_iter()
            .map(|session| session.into())
            .collect(),
    ))
}

async fn create(
    State(state): State<AppState>,
    Json(req): Json<api::request::StartSession>,
) -> crate::result::Result<(StatusCode, Json<api::response::Session>)> {
    let session = state.machine.launch_session(&req.config_id).await?;
    Ok((StatusCode::ACCEPTED, Json(session.into())))
}

async fn show(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> crate::result::Result<Json<api::response::Session>> {
    Ok(Json(state.machine.get(&session).await?.into()))
}

async fn destroy(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> crate::result::Result<Json<api::response::Session>> {
    Ok(Json(state.machine.stop_session(&session).await?.into()))
}

async fn relays(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> crate::result::Result<Json<Vec<api::response::Relay>>> {
    Ok(Json(
        state
            .machine
            .relay_status(&session)
            .await?
            .into_iter()
            .map(|relay| relay.into())
            .collect(),
    ))
}
