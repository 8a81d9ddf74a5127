use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::{page_size, ApiResult, SharedContext};
use crate::models::{Prediction, Stored, TaskKind};
use crate::service::PredictionOutcome;
use crate::store::DocumentStore;

// ---

#[derive(Debug, Deserialize)]
struct PredictBody {
    task: TaskKind,
    #[serde(default)]
    horizon: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    Router::new().route(
        "/sensors/{id}/predictions",
        get(history::<S>).post(predict::<S>),
    )
}

/// A fallback is still a 200: the body's `prediction.status` tells the
/// client whether the score is a real model output.
async fn predict<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Json(body): Json<PredictBody>,
) -> ApiResult<Json<PredictionOutcome>> {
    // ---
    info!("POST /sensors/{}/predictions - {}", id, body.task);
    let outcome = ctx.predict(&id, body.task, body.horizon).await?;
    Ok(Json(outcome))
}

async fn history<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<Stored<Prediction>>>> {
    Ok(Json(
        ctx.recent_predictions(&id, page_size(params.limit)).await?,
    ))
}
