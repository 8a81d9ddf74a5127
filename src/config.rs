//! Configuration loader for the `hydrowatch` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, bail, Result};
use url::Url;

use crate::gateway::GatewayConfig;
use crate::models::Region;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional `u64` environment variable with a default value.
macro_rules! parse_env_u64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional floating point environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP API binds to.
    pub bind_port: u16,

    /// ML inference service endpoint and timeouts.
    pub gateway: GatewayConfig,

    /// Valid geolocation bounds for sensors and readings.
    pub region: Region,

    /// Number of most recent readings sent with each prediction request.
    pub prediction_window: u32,

    /// A sensor with no reading for longer than this is reported offline.
    pub stale_after_minutes: u64,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `ML_API_URL` – ML inference service base URL
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_PORT` – HTTP port (default: 8080)
/// - `ML_HEALTH_TIMEOUT_SECS` – health check timeout (default: 10)
/// - `ML_INFERENCE_TIMEOUT_SECS` – nowcast/classification timeout (default: 30)
/// - `ML_FORECAST_TIMEOUT_SECS` – forecast timeout (default: 45)
/// - `ML_DEFAULT_HORIZON` – forecast horizon when none is given (default: 365)
/// - `REGION_LAT_MIN` / `REGION_LAT_MAX` – latitude bounds (default: 6.0 / 38.0)
/// - `REGION_LON_MIN` / `REGION_LON_MAX` – longitude bounds (default: 68.0 / 98.0)
/// - `PREDICTION_WINDOW` – readings per prediction request (default: 10)
/// - `STALE_AFTER_MINUTES` – offline threshold (default: 60)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let ml_api_url = require_env!("ML_API_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_port = u16::try_from(parse_env_u32!("BIND_PORT", 8080))
        .map_err(|e| anyhow!("Invalid BIND_PORT: {}", e))?;

    let defaults = GatewayConfig::default();
    let gateway = GatewayConfig {
        base_url: ml_api_url,
        health_timeout: Duration::from_secs(parse_env_u64!(
            "ML_HEALTH_TIMEOUT_SECS",
            defaults.health_timeout.as_secs()
        )),
        inference_timeout: Duration::from_secs(parse_env_u64!(
            "ML_INFERENCE_TIMEOUT_SECS",
            defaults.inference_timeout.as_secs()
        )),
        forecast_timeout: Duration::from_secs(parse_env_u64!(
            "ML_FORECAST_TIMEOUT_SECS",
            defaults.forecast_timeout.as_secs()
        )),
        default_horizon: parse_env_u32!("ML_DEFAULT_HORIZON", defaults.default_horizon),
    };

    let region_defaults = Region::default();
    let region = Region {
        lat_min: parse_env_f64!("REGION_LAT_MIN", region_defaults.lat_min),
        lat_max: parse_env_f64!("REGION_LAT_MAX", region_defaults.lat_max),
        lon_min: parse_env_f64!("REGION_LON_MIN", region_defaults.lon_min),
        lon_max: parse_env_f64!("REGION_LON_MAX", region_defaults.lon_max),
    };
    if region.lat_min >= region.lat_max || region.lon_min >= region.lon_max {
        bail!("Invalid region bounds: {:?}", region);
    }

    let prediction_window = parse_env_u32!("PREDICTION_WINDOW", 10);
    if prediction_window == 0 {
        bail!("PREDICTION_WINDOW must be at least 1");
    }
    let stale_after_minutes = parse_env_u64!("STALE_AFTER_MINUTES", 60);

    Ok(Config {
        db_url,
        db_pool_max,
        bind_port,
        gateway,
        region,
        prediction_window,
        stale_after_minutes,
    })
}

/// Replace the password component of a connection URL with `****`.
///
/// Strings that do not parse as a URL, or carry no password, come back
/// unchanged.
pub fn mask_password(raw: &str) -> String {
    // ---
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return raw.to_string();
            }
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", mask_password(&self.db_url));
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  BIND_PORT           : {}", self.bind_port);
        tracing::info!("  ML_API_URL          : {}", self.gateway.base_url);
        tracing::info!(
            "  ML timeouts         : health={:?} inference={:?} forecast={:?}",
            self.gateway.health_timeout,
            self.gateway.inference_timeout,
            self.gateway.forecast_timeout
        );
        tracing::info!("  ML_DEFAULT_HORIZON  : {}", self.gateway.default_horizon);
        tracing::info!("  REGION              : {:?}", self.region);
        tracing::info!("  PREDICTION_WINDOW   : {}", self.prediction_window);
        tracing::info!("  STALE_AFTER_MINUTES : {}", self.stale_after_minutes);
    }
}
