//! Conflict inspection and resolution routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use stockpile_engine::{
    BatchResult, ConflictDetails, ConflictResolution, DetectionInput, EntitySnapshot, Error,
    ResolutionOutcome, SyncConflict,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/detect", post(detect_conflict))
        .route("/conflicts/resolve-all", post(resolve_all))
        .route("/conflicts/resolve-all/cancel", post(cancel_resolve_all))
        .route("/conflicts/{id}", get(get_conflict))
        .route("/conflicts/{id}/details", get(conflict_details))
        .route("/conflicts/{id}/outcome", get(conflict_outcome))
        .route("/conflicts/{id}/resolve", post(resolve_conflict))
        .route("/conflicts/{id}/reopen", post(reopen_conflict))
}

/// Unresolved conflicts, oldest first.
async fn list_conflicts(State(state): State<AppState>) -> Json<Vec<SyncConflict>> {
    Json(state.engine.active_conflicts())
}

/// Run detection on a pair of versions and register the result.
async fn detect_conflict(
    State(state): State<AppState>,
    Json(input): Json<DetectionInput>,
) -> Result<Json<Option<SyncConflict>>> {
    let conflict = state.engine.detect_and_register(input)?;
    Ok(Json(conflict))
}

async fn get_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncConflict>> {
    find_conflict(&state, id).map(Json)
}

async fn conflict_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConflictDetails>> {
    let conflict = find_conflict(&state, id)?;
    Ok(Json(state.engine.conflict_details(&conflict)))
}

async fn conflict_outcome(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolutionOutcome>> {
    state
        .engine
        .history(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no resolution recorded for {id}")))
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(resolution): Json<ConflictResolution>,
) -> Result<Json<EntitySnapshot>> {
    let merged = state.engine.resolve(id, resolution).await?;
    Ok(Json(merged))
}

async fn reopen_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncConflict>> {
    let conflict = state.engine.reopen(id)?;
    Ok(Json(conflict))
}

/// Resolve every unresolved conflict with one strategy.
///
/// Only one batch runs at a time; `/conflicts/resolve-all/cancel` stops it
/// between items.
async fn resolve_all(
    State(state): State<AppState>,
    Json(strategy): Json<ConflictResolution>,
) -> Result<Json<BatchResult>> {
    let ticket = state.batch.start()?;
    let result = state
        .engine
        .resolve_all_conflicts(&strategy, ticket.token())
        .await;
    Ok(Json(result))
}

async fn cancel_resolve_all(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.batch.cancel(),
    })
}

fn find_conflict(state: &AppState, id: Uuid) -> Result<SyncConflict> {
    state.engine.conflict(id).ok_or_else(|| {
        if state.engine.history(id).is_some() {
            Error::AlreadyResolved(id).into()
        } else {
            Error::ConflictNotFound(id).into()
        }
    })
}
