use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new().route(
        &api::path::destination_restart(":destination"),
        post(restart),
    )
}

async fn restart(
    State(state): State<AppState>,
    Path(destination): Path<String>,
) -> crate::result::Result<Json<api::response::Restart>> {
    let outcome = state.machine.restart_destination(&destination).await?;
    Ok(Json(api::response::Restart {
        destination,
        result: outcome.into(),
    }))
}
