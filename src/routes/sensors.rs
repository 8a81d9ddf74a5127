use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::{ApiResult, SharedContext};
use crate::models::{Sensor, SensorUpdate, Stored};
use crate::store::DocumentStore;

// ---

#[derive(Debug, Deserialize)]
struct OwnerParams {
    user_id: String,
}

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    // ---
    Router::new()
        .route("/sensors", get(list::<S>).post(create::<S>))
        .route(
            "/sensors/{id}",
            get(show::<S>).patch(update::<S>).delete(remove::<S>),
        )
}

async fn create<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Json(sensor): Json<Sensor>,
) -> ApiResult<(StatusCode, Json<Stored<Sensor>>)> {
    info!("POST /sensors - {}", sensor.name);
    let stored = ctx.create_sensor(sensor).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn list<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Query(params): Query<OwnerParams>,
) -> ApiResult<Json<Vec<Stored<Sensor>>>> {
    Ok(Json(ctx.list_sensors(&params.user_id).await?))
}

async fn show<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Stored<Sensor>>> {
    Ok(Json(ctx.get_sensor(&id).await?))
}

async fn update<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Json(update): Json<SensorUpdate>,
) -> ApiResult<Json<Stored<Sensor>>> {
    info!("PATCH /sensors/{}", id);
    Ok(Json(ctx.update_sensor(&id, update).await?))
}

async fn remove<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.delete_sensor(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
