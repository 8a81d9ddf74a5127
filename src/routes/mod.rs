//! HTTP API gateway.
//!
//! Each sibling module exports a subrouter over the shared
//! `Arc<AppContext<S>>` state; this module merges them and owns the mapping
//! from library errors to HTTP responses.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, error};

use crate::error::Error;
use crate::service::AppContext;
use crate::store::DocumentStore;

mod alerts;
mod dashboard;
mod health;
mod predictions;
mod readings;
mod sensors;

// ---

pub type SharedContext<S> = Arc<AppContext<S>>;

/// Library error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Store(_) | Error::Decode { .. } | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        } else {
            debug!("request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Default and maximum page size for list endpoints.
pub(crate) const DEFAULT_LIMIT: usize = 50;
pub(crate) const MAX_LIMIT: usize = 1000;

pub(crate) fn page_size(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub fn router<S: DocumentStore>(ctx: SharedContext<S>) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(sensors::router())
        .merge(readings::router())
        .merge(predictions::router())
        .merge(alerts::router())
        .merge(dashboard::router())
        .with_state(ctx)
}
