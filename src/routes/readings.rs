//! Reading ingest, history and CSV transfer.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{page_size, ApiResult, SharedContext};
use crate::models::{Reading, Stored};
use crate::service::IngestOutcome;
use crate::store::DocumentStore;

// ---

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    // ---
    Router::new()
        .route("/readings", post(ingest::<S>))
        .route("/sensors/{id}/readings", get(recent::<S>))
        .route(
            "/sensors/{id}/readings.csv",
            get(export_csv::<S>).post(import_csv::<S>),
        )
}

async fn ingest<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Json(reading): Json<Reading>,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    // ---
    debug!("POST /readings - sensor {}", reading.sensor_id);
    let outcome = ctx.ingest_reading(reading).await?;
    if !outcome.alerts.is_empty() {
        info!(
            "Reading {} raised {} alert(s)",
            outcome.reading.id,
            outcome.alerts.len()
        );
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn recent<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<Stored<Reading>>>> {
    let readings = ctx.recent_readings(&id, page_size(params.limit)).await?;
    Ok(Json(readings))
}

async fn export_csv<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    // ---
    // No limit means the full history
    let body = ctx.export_readings_csv(&id, params.limit).await?;
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{id}-readings.csv\""),
        ),
    ];
    Ok((headers, body))
}

async fn import_csv<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<(StatusCode, Json<Vec<IngestOutcome>>)> {
    // ---
    let outcomes = ctx.import_readings_csv(&id, &body).await?;
    info!("Imported {} reading(s) for sensor {}", outcomes.len(), id);
    Ok((StatusCode::CREATED, Json(outcomes)))
}
