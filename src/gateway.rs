//! Client for the external ML inference service.
//!
//! The gateway owns three concerns:
//! - Pre-flight validation: an empty batch or a reading without a sensor id
//!   fails with [`Error::Validation`] before any request is sent.
//! - Request normalization: one body keyed by the first reading's sensor id,
//!   carrying every reading in order with ISO-8601 timestamps, plus the
//!   horizon for forecasts.
//! - Failure isolation: network errors, timeouts, non-2xx responses and
//!   unparseable bodies become a [`Prediction`] with
//!   [`PredictionStatus::Fallback`]. Callers must check the status before
//!   treating the score as a model output.
//!
//! There is no caching or deduplication: the same request issued twice
//! reaches the service twice and yields two independent predictions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::models::{ModelInfo, Prediction, PredictionStatus, Reading, TaskKind};

// ---

/// Placeholder score carried by fallback predictions.
pub const FALLBACK_WQI: f64 = 0.0;
/// Placeholder class carried by fallback predictions.
pub const FALLBACK_CLASS: &str = "unavailable";

/// Where the ML service lives and how long each call may take.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub health_timeout: Duration,
    pub inference_timeout: Duration,
    pub forecast_timeout: Duration,
    /// Horizon sent with forecasts that do not specify one.
    pub default_horizon: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: "http://localhost:8000".to_string(),
            health_timeout: Duration::from_secs(10),
            inference_timeout: Duration::from_secs(30),
            forecast_timeout: Duration::from_secs(45),
            default_horizon: 365,
        }
    }
}

// ---

/// Body posted to `/nowcast`, `/forecast` and `/classification`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest<'a> {
    pub sensor_id: &'a str,
    pub readings: &'a [Reading],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    prediction: InferenceBody,
    model_info: ModelInfo,
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    explanations: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct InferenceBody {
    wqi: f64,
    quality_class: String,
    confidence: f64,
    #[serde(default)]
    horizon: Option<u32>,
}

/// Body returned by `/healthz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub models_loaded: serde_json::Value,
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Result of probing the ML service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ServiceHealth {
    Up(HealthStatus),
    Down { reason: String },
}

// ---

pub struct PredictionGateway {
    http: reqwest::Client,
    base_url: Url,
    config: GatewayConfig,
}

impl PredictionGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Self::with_client(http, config)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: GatewayConfig) -> Result<Self> {
        let base_url = Self::normalize_base_url(&config.base_url)?;
        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Ensure the base path ends in `/` so endpoint names join beneath it.
    fn normalize_base_url(raw: &str) -> Result<Url> {
        let mut url =
            Url::parse(raw).map_err(|e| Error::Config(format!("invalid ML_API_URL {raw:?}: {e}")))?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    fn timeout_for(&self, task: TaskKind) -> Duration {
        match task {
            TaskKind::Forecast => self.config.forecast_timeout,
            TaskKind::Nowcast | TaskKind::Classification => self.config.inference_timeout,
        }
    }

    /// Validate a batch and shape it into the service's request body.
    pub fn build_request<'a>(
        &self,
        task: TaskKind,
        readings: &'a [Reading],
        horizon: Option<u32>,
    ) -> Result<PredictionRequest<'a>> {
        // ---
        let first = readings
            .first()
            .ok_or_else(|| Error::validation("prediction needs at least one reading"))?;

        if let Some(pos) = readings.iter().position(|r| r.sensor_id.trim().is_empty()) {
            return Err(Error::validation(format!(
                "reading {pos} in the prediction batch has no sensor_id"
            )));
        }

        let horizon = match task {
            TaskKind::Forecast => {
                let h = horizon.unwrap_or(self.config.default_horizon);
                if h == 0 {
                    return Err(Error::validation("forecast horizon must be positive"));
                }
                Some(h)
            }
            TaskKind::Nowcast | TaskKind::Classification => None,
        };

        Ok(PredictionRequest {
            sensor_id: &first.sensor_id,
            readings,
            horizon,
        })
    }

    /// Ask the ML service for a prediction.
    ///
    /// Only validation failures are returned as errors. Every transport
    /// problem yields a fallback prediction instead.
    pub async fn request_prediction(
        &self,
        task: TaskKind,
        readings: &[Reading],
        horizon: Option<u32>,
    ) -> Result<Prediction> {
        // ---
        let request = self.build_request(task, readings, horizon)?;
        let timeout = self.timeout_for(task);

        let outcome = self
            .post_json::<_, InferenceResponse>(task.as_str(), &request, timeout)
            .await
            .and_then(|resp| Self::to_prediction(&request, task, resp));

        match outcome {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                warn!(
                    sensor_id = %request.sensor_id,
                    task = %task,
                    error = %err,
                    "ML service unavailable, returning fallback prediction"
                );
                Ok(Self::fallback(&request, task, &err, Utc::now()))
            }
        }
    }

    /// Check `/healthz` with the short timeout. Never fails.
    pub async fn health(&self) -> ServiceHealth {
        // ---
        let body = serde_json::json!({});
        match self
            .post_json::<_, HealthStatus>("healthz", &body, self.config.health_timeout)
            .await
        {
            Ok(status) => ServiceHealth::Up(status),
            Err(err) => {
                warn!("ML service health check failed: {}", err);
                ServiceHealth::Down {
                    reason: err.to_string(),
                }
            }
        }
    }

    // ---

    async fn post_json<B, T>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TransportError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        // ---
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| TransportError::Network(format!("invalid endpoint {endpoint}: {e}")))?;
        debug!("POST {url} (timeout {timeout:?})");

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Network(e.to_string())
            }
        };

        // The per-request timeout covers connect through body read and drops
        // the connection when it fires
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    // ---

    fn to_prediction(
        request: &PredictionRequest<'_>,
        task: TaskKind,
        resp: InferenceResponse,
    ) -> Result<Prediction, TransportError> {
        // ---
        if !resp.status.eq_ignore_ascii_case("success") {
            return Err(TransportError::Rejected(resp.status));
        }
        let body = resp.prediction;
        if !body.wqi.is_finite() || !body.confidence.is_finite() {
            return Err(TransportError::Malformed(
                "prediction scores must be finite".to_string(),
            ));
        }

        let timestamp = resp
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Prediction {
            sensor_id: request.sensor_id.to_string(),
            task,
            wqi: body.wqi,
            quality_class: body.quality_class,
            confidence: body.confidence,
            horizon: body.horizon.or(request.horizon),
            model: resp.model_info,
            status: PredictionStatus::Success,
            timestamp,
            explanations: resp.explanations,
            error: None,
        })
    }

    fn fallback(
        request: &PredictionRequest<'_>,
        task: TaskKind,
        err: &TransportError,
        now: DateTime<Utc>,
    ) -> Prediction {
        Prediction {
            sensor_id: request.sensor_id.to_string(),
            task,
            wqi: FALLBACK_WQI,
            quality_class: FALLBACK_CLASS.to_string(),
            confidence: 0.0,
            horizon: request.horizon,
            model: ModelInfo {
                name: "none".to_string(),
                model_type: "fallback".to_string(),
                version: "0".to_string(),
            },
            status: PredictionStatus::Fallback,
            timestamp: now,
            explanations: None,
            error: Some(err.to_string()),
        }
    }
}
