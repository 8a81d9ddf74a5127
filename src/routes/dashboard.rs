use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use super::{ApiResult, SharedContext};
use crate::service::SensorOverview;
use crate::store::DocumentStore;

#[derive(Debug, Deserialize)]
struct OwnerParams {
    user_id: String,
}

/// Per-sensor summary: latest reading, its WQI band, open alerts, offline flag.
async fn overview<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Query(params): Query<OwnerParams>,
) -> ApiResult<Json<Vec<SensorOverview>>> {
    Ok(Json(ctx.overview(&params.user_id, Utc::now()).await?))
}

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    Router::new().route("/dashboard", get(overview::<S>))
}
