//! Alert listing, lifecycle actions, the offline sweep and the live stream.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::{ApiResult, SharedContext};
use crate::models::{Alert, AlertStatus, Stored};
use crate::store::DocumentStore;

// ---

#[derive(Debug, Deserialize)]
struct ListParams {
    user_id: String,
    status: Option<AlertStatus>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UserParams {
    user_id: String,
}

/// Snapshots buffered per stream before slow clients start missing updates.
const STREAM_BUFFER: usize = 16;

pub fn router<S: DocumentStore>() -> Router<SharedContext<S>> {
    // ---
    Router::new()
        .route("/alerts", get(list::<S>))
        .route("/alerts/stream", get(stream::<S>))
        .route("/alerts/offline-check", post(offline_check::<S>))
        .route("/alerts/{id}/acknowledge", post(acknowledge::<S>))
        .route("/alerts/{id}/resolve", post(resolve::<S>))
}

async fn list<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Stored<Alert>>>> {
    Ok(Json(ctx.list_alerts(&params.user_id, params.status).await?))
}

async fn acknowledge<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<Stored<Alert>>> {
    info!("Alert {} acknowledged by {}", id, body.user_id);
    Ok(Json(ctx.acknowledge_alert(&id, &body.user_id).await?))
}

async fn resolve<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Stored<Alert>>> {
    info!("Alert {} resolved", id);
    Ok(Json(ctx.resolve_alert(&id, Utc::now()).await?))
}

async fn offline_check<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<Vec<Stored<Alert>>>> {
    // ---
    let raised = ctx.check_offline_sensors(&body.user_id, Utc::now()).await?;
    debug!(
        "Offline check for {} raised {} alert(s)",
        body.user_id,
        raised.len()
    );
    Ok(Json(raised))
}

/// Server-sent events carrying the full list of active alerts each time it
/// changes. The store subscription lives until the client disconnects.
async fn stream<S: DocumentStore>(
    State(ctx): State<SharedContext<S>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // ---
    let (tx, rx) = mpsc::channel::<Vec<Stored<Alert>>>(STREAM_BUFFER);
    let watcher = tx.clone();
    let user_id = params.user_id.clone();

    let subscription = ctx
        .watch_alerts(&params.user_id, move |alerts| {
            if let Err(e) = tx.try_send(alerts) {
                warn!("dropping alert snapshot for {}: {}", user_id, e);
            }
        })
        .await?;

    tokio::spawn(async move {
        watcher.closed().await;
        subscription.unsubscribe();
    });

    let events = ReceiverStream::new(rx).map(|alerts| {
        let data = serde_json::to_string(&alerts).unwrap_or_else(|_| "[]".to_string());
        Ok(Event::default().event("alerts").data(data))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
