//! Direct access to the repositories conflicts resolve into.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use stockpile_engine::{EntityId, EntitySnapshot, EntityType, Error, InMemoryRepository, Repository};

use crate::error::{AppError, Result};
use crate::AppState;

/// Body of `PUT /entities/{type}/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBody {
    pub payload: Value,
    #[serde(default)]
    pub deleted: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/entities/{entity_type}/{id}", get(get_entity).put(put_entity))
}

async fn get_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(EntityType, EntityId)>,
) -> Result<Json<EntitySnapshot>> {
    repository(&state, entity_type)?
        .fetch(&id)
        .await
        .map_err(Error::from)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{entity_type} '{id}' not found")))
}

/// Store a record, validating active payloads against the entity schema.
async fn put_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(EntityType, EntityId)>,
    Json(body): Json<EntityBody>,
) -> Result<Json<EntitySnapshot>> {
    let repository = repository(&state, entity_type)?;

    if !body.payload.is_object() {
        return Err(AppError::BadRequest("payload must be a JSON object".into()));
    }
    if let Some(schema) = state.engine.merger().schema().get(entity_type) {
        if !body.deleted {
            schema.validate_payload(&body.payload)?;
        }
    }

    let snapshot = EntitySnapshot {
        id,
        entity_type,
        payload: body.payload,
        deleted: body.deleted,
    };
    repository.save(snapshot.clone()).await.map_err(Error::from)?;

    tracing::debug!(entity_type = %entity_type, entity_id = %snapshot.id, "Stored entity");
    Ok(Json(snapshot))
}

fn repository(state: &AppState, entity_type: EntityType) -> Result<Arc<InMemoryRepository>> {
    state
        .repositories
        .get(&entity_type)
        .cloned()
        .ok_or_else(|| Error::UnsupportedEntityType(entity_type).into())
}
