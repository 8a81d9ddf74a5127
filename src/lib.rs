//! Core of the water quality monitoring dashboard.
//!
//! - [`metrics`]: Water Quality Index from pH, TDS, turbidity and dissolved
//!   oxygen.
//! - [`alerts`]: threshold alerts derived from readings, offline detection and
//!   the alert lifecycle.
//! - [`gateway`]: client for the ML inference service with fallback
//!   predictions on failure.
//! - [`store`]: the document store boundary, with in-memory and PostgreSQL
//!   backends.
//! - [`service`]: the dashboard operations over an explicit [`AppContext`].
//! - [`routes`]: the HTTP API.

pub mod alerts;
pub mod config;
pub mod csv_export;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod schema;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{GatewayConfig, PredictionGateway, ServiceHealth};
pub use metrics::{compute_wqi, WqiCategory, WqiInputs};
pub use service::AppContext;
pub use store::{DocumentStore, MemoryStore, PgStore};
