//! Liveness endpoints.
//!
//! `/health` answers without touching the store or the ML service, for
//! container orchestrators. `/ml/health` checks the inference service and
//! reports 503 when it is unreachable.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::SharedContext;
use crate::gateway::ServiceHealth;
use crate::store::DocumentStore;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ml_health<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
) -> (StatusCode, Json<ServiceHealth>) {
    // ---
    let health = ctx.ml_health().await;
    let status = match health {
        ServiceHealth::Up(_) => StatusCode::OK,
        ServiceHealth::Down { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    Router::new()
        .route("/health", get(health))
        .route("/ml/health", get(ml_health::<S>))
}
