//! Dashboard operations.
//!
//! [`AppContext`] bundles the document store, the prediction gateway and the
//! settings they need. It is built once at startup and passed by reference
//! into every operation; there is no ambient global state. Call
//! [`AppContext::shutdown`] before exit to release the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::alerts;
use crate::config::Config;
use crate::csv_export;
use crate::error::{Error, Result};
use crate::gateway::{PredictionGateway, ServiceHealth};
use crate::metrics::{reading_wqi, WqiCategory, WqiInputs};
use crate::models::{
    Alert, AlertStatus, Prediction, Reading, Record, Region, Sensor, SensorStatus, SensorUpdate,
    Stored, TaskKind,
};
use crate::store::{Callback, Direction, DocumentStore, Query, Subscription};

// ---

/// Result of ingesting one reading.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub reading: Stored<Reading>,
    /// `None` when the reading had no parameter that feeds the index.
    pub wqi: Option<f64>,
    pub category: Option<WqiCategory>,
    /// Display form of `category`, e.g. "Very Poor".
    pub category_label: Option<&'static str>,
    pub alerts: Vec<Stored<Alert>>,
}

/// A prediction and, when it was a real model output, its stored id.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub prediction: Prediction,
    pub record_id: Option<String>,
}

/// One row of the dashboard's sensor list.
#[derive(Debug, Clone, Serialize)]
pub struct SensorOverview {
    pub sensor: Stored<Sensor>,
    pub latest_reading: Option<Stored<Reading>>,
    pub wqi: Option<f64>,
    pub category: Option<WqiCategory>,
    pub category_label: Option<&'static str>,
    pub active_alerts: usize,
    pub offline: bool,
}

pub struct AppContext<S> {
    pub store: S,
    pub gateway: PredictionGateway,
    pub region: Region,
    pub prediction_window: u32,
    pub stale_after_minutes: u64,
}

impl<S: DocumentStore> AppContext<S> {
    pub fn new(store: S, gateway: PredictionGateway, config: &Config) -> Self {
        AppContext {
            store,
            gateway,
            region: config.region,
            prediction_window: config.prediction_window,
            stale_after_minutes: config.stale_after_minutes,
        }
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
    }

    // ---

    async fn insert<T: Record>(&self, record: &T) -> Result<Stored<T>> {
        let doc = self.store.create(T::COLLECTION, record.to_document()?).await?;
        Stored::decode(doc)
    }

    async fn load<T: Record>(&self, id: &str) -> Result<Stored<T>> {
        let doc = self
            .store
            .get(T::COLLECTION, id)
            .await?
            .ok_or_else(|| Error::NotFound {
                collection: T::COLLECTION.to_string(),
                id: id.to_string(),
            })?;
        Stored::decode(doc)
    }

    async fn replace<T: Record>(&self, id: &str, record: &T) -> Result<Stored<T>> {
        let doc = self
            .store
            .update(T::COLLECTION, id, record.to_document()?)
            .await?;
        Stored::decode(doc)
    }

    async fn find<T: Record>(&self, query: &Query) -> Result<Vec<Stored<T>>> {
        Stored::decode_all(self.store.query(query).await?)
    }

    // ---

    pub async fn create_sensor(&self, sensor: Sensor) -> Result<Stored<Sensor>> {
        sensor.validate(&self.region)?;
        let stored = self.insert(&sensor).await?;
        info!("Registered sensor {} ({})", stored.id, stored.record.name);
        Ok(stored)
    }

    pub async fn get_sensor(&self, id: &str) -> Result<Stored<Sensor>> {
        self.load(id).await
    }

    pub async fn list_sensors(&self, user_id: &str) -> Result<Vec<Stored<Sensor>>> {
        let query = Query::collection(Sensor::COLLECTION)
            .where_eq("user_id", user_id)
            .order_by("name", Direction::Asc);
        self.find(&query).await
    }

    /// Apply a partial edit (rename, relocate, status change).
    pub async fn update_sensor(&self, id: &str, update: SensorUpdate) -> Result<Stored<Sensor>> {
        // ---
        if update.is_empty() {
            return Err(Error::validation("sensor update has no fields set"));
        }
        let current: Stored<Sensor> = self.load(id).await?;
        update.apply_to(&current.record).validate(&self.region)?;

        let patch = serde_json::to_value(&update).map_err(|e| Error::Store(e.into()))?;
        let doc = self.store.update(Sensor::COLLECTION, id, patch).await?;
        Stored::decode(doc)
    }

    pub async fn delete_sensor(&self, id: &str) -> Result<()> {
        self.store.delete(Sensor::COLLECTION, id).await?;
        info!("Deleted sensor {}", id);
        Ok(())
    }

    // ---

    /// Validate, score, derive alerts and persist a reading.
    ///
    /// The reading must belong to a registered sensor; the sensor supplies
    /// the alert location label and the owning user.
    pub async fn ingest_reading(&self, reading: Reading) -> Result<IngestOutcome> {
        self.ingest_reading_at(reading, Utc::now()).await
    }

    pub async fn ingest_reading_at(
        &self,
        reading: Reading,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        // ---
        reading.validate(&self.region)?;
        let sensor: Stored<Sensor> = self.load(&reading.sensor_id).await?;

        let wqi = WqiInputs::from(&reading)
            .any_usable()
            .then(|| reading_wqi(&reading));
        let category = wqi.map(WqiCategory::from_score);

        let derived = alerts::generate_alerts_with_wqi(&reading, sensor.record.label(), wqi, now);
        let stored_reading = self.insert(&reading).await?;

        let mut stored_alerts = Vec::with_capacity(derived.len());
        for mut alert in derived {
            alert.user_id = sensor.record.user_id.clone();
            info!(
                sensor_id = %alert.sensor_id,
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                "{}",
                alert.message
            );
            stored_alerts.push(self.insert(&alert).await?);
        }

        Ok(IngestOutcome {
            reading: stored_reading,
            wqi,
            category,
            category_label: category.map(|c| c.label()),
            alerts: stored_alerts,
        })
    }

    /// Ingest every row of an uploaded CSV for one sensor.
    ///
    /// All rows are parsed and validated before the first one is written.
    pub async fn import_readings_csv(
        &self,
        sensor_id: &str,
        text: &str,
    ) -> Result<Vec<IngestOutcome>> {
        // ---
        let readings = csv_export::parse_readings(text)?;
        for (idx, reading) in readings.iter().enumerate() {
            if reading.sensor_id != sensor_id {
                return Err(Error::validation(format!(
                    "row {} belongs to sensor {}, not {}",
                    idx + 1,
                    reading.sensor_id,
                    sensor_id
                )));
            }
            reading.validate(&self.region)?;
        }

        let mut outcomes = Vec::with_capacity(readings.len());
        for reading in readings {
            outcomes.push(self.ingest_reading(reading).await?);
        }
        Ok(outcomes)
    }

    /// Newest first.
    pub async fn recent_readings(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<Stored<Reading>>> {
        let query = Query::collection(Reading::COLLECTION)
            .where_eq("sensor_id", sensor_id)
            .order_by("timestamp", Direction::Desc)
            .limit(limit);
        self.find(&query).await
    }

    /// CSV of the sensor's readings, oldest first.
    ///
    /// With `limit` only the most recent `limit` readings are written;
    /// without it the whole history is.
    pub async fn export_readings_csv(
        &self,
        sensor_id: &str,
        limit: Option<usize>,
    ) -> Result<String> {
        // ---
        let mut query = Query::collection(Reading::COLLECTION)
            .where_eq("sensor_id", sensor_id)
            .order_by("timestamp", Direction::Desc);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let mut readings: Vec<Reading> = self
            .find(&query)
            .await?
            .into_iter()
            .map(|stored: Stored<Reading>| stored.record)
            .collect();
        readings.reverse();
        Ok(csv_export::export_readings(&readings))
    }

    // ---

    /// Send the sensor's latest readings to the ML service and store the
    /// result if it is a real model output.
    pub async fn predict(
        &self,
        sensor_id: &str,
        task: TaskKind,
        horizon: Option<u32>,
    ) -> Result<PredictionOutcome> {
        // ---
        self.get_sensor(sensor_id).await?;

        let window = usize::try_from(self.prediction_window).unwrap_or(usize::MAX);
        let mut readings: Vec<Reading> = self
            .recent_readings(sensor_id, window)
            .await?
            .into_iter()
            .map(|stored| stored.record)
            .collect();
        readings.reverse();

        let prediction = self
            .gateway
            .request_prediction(task, &readings, horizon)
            .await?;
        let record_id = self.record_prediction(&prediction).await?.map(|s| s.id);

        Ok(PredictionOutcome {
            prediction,
            record_id,
        })
    }

    /// Persist a successful prediction. Fallback predictions are refused and
    /// `None` is returned, so placeholders never enter history.
    pub async fn record_prediction(
        &self,
        prediction: &Prediction,
    ) -> Result<Option<Stored<Prediction>>> {
        // ---
        if prediction.is_fallback() {
            warn!(
                sensor_id = %prediction.sensor_id,
                task = %prediction.task,
                "not storing fallback prediction"
            );
            return Ok(None);
        }
        self.insert(prediction).await.map(Some)
    }

    /// Newest first.
    pub async fn recent_predictions(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<Stored<Prediction>>> {
        let query = Query::collection(Prediction::COLLECTION)
            .where_eq("sensor_id", sensor_id)
            .order_by("timestamp", Direction::Desc)
            .limit(limit);
        self.find(&query).await
    }

    pub async fn ml_health(&self) -> ServiceHealth {
        self.gateway.health().await
    }

    // ---

    fn alerts_query(user_id: &str, status: Option<AlertStatus>) -> Query {
        let mut query = Query::collection(Alert::COLLECTION)
            .where_eq("user_id", user_id)
            .order_by("triggered_at", Direction::Desc);
        if let Some(status) = status {
            query = query.where_eq("status", status.as_str());
        }
        query
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_alerts(
        &self,
        user_id: &str,
        status: Option<AlertStatus>,
    ) -> Result<Vec<Stored<Alert>>> {
        self.find(&Self::alerts_query(user_id, status)).await
    }

    pub async fn acknowledge_alert(&self, id: &str, user_id: &str) -> Result<Stored<Alert>> {
        let current: Stored<Alert> = self.load(id).await?;
        let next = alerts::acknowledge(&current.record, user_id)?;
        self.replace(id, &next).await
    }

    pub async fn resolve_alert(&self, id: &str, now: DateTime<Utc>) -> Result<Stored<Alert>> {
        let current: Stored<Alert> = self.load(id).await?;
        let next = alerts::resolve(&current.record, now)?;
        self.replace(id, &next).await
    }

    /// Raise `sensor_offline` for each of the user's active sensors that has
    /// been silent longer than the configured threshold.
    pub async fn check_offline_sensors(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Stored<Alert>>> {
        // ---
        let mut raised = Vec::new();
        for sensor in self.list_sensors(user_id).await? {
            if sensor.record.status != SensorStatus::Active {
                continue;
            }
            let last_seen = self
                .recent_readings(&sensor.id, 1)
                .await?
                .first()
                .map_or(sensor.created_at, |r| r.record.timestamp);

            if let Some(mut alert) = alerts::offline_alert(
                &sensor.id,
                sensor.record.label(),
                last_seen,
                self.stale_after_minutes,
                now,
            ) {
                alert.user_id = sensor.record.user_id.clone();
                warn!(sensor_id = %sensor.id, "{}", alert.message);
                raised.push(self.insert(&alert).await?);
            }
        }
        Ok(raised)
    }

    /// Live view of the user's active alerts, newest first.
    ///
    /// Documents that fail to decode are logged and left out.
    pub async fn watch_alerts<F>(&self, user_id: &str, on_change: F) -> Result<Subscription>
    where
        F: Fn(Vec<Stored<Alert>>) + Send + Sync + 'static,
    {
        // ---
        let callback: Callback = Box::new(move |docs| {
            let alerts = docs
                .into_iter()
                .filter_map(|doc| match Stored::<Alert>::decode(doc) {
                    Ok(alert) => Some(alert),
                    Err(e) => {
                        warn!("skipping alert document: {}", e);
                        None
                    }
                })
                .collect();
            on_change(alerts);
        });

        let query = Self::alerts_query(user_id, Some(AlertStatus::Active));
        Ok(self.store.subscribe(query, callback).await?)
    }

    // ---

    /// Per-sensor summary for the map and sensor list.
    pub async fn overview(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<SensorOverview>> {
        // ---
        let mut rows = Vec::new();
        for sensor in self.list_sensors(user_id).await? {
            let latest_reading = self.recent_readings(&sensor.id, 1).await?.into_iter().next();

            let wqi = latest_reading.as_ref().and_then(|r| {
                WqiInputs::from(&r.record)
                    .any_usable()
                    .then(|| reading_wqi(&r.record))
            });

            let active_query = Query::collection(Alert::COLLECTION)
                .where_eq("sensor_id", sensor.id.as_str())
                .where_eq("status", AlertStatus::Active.as_str());
            let active_alerts = self.store.query(&active_query).await?.len();

            let last_seen = latest_reading
                .as_ref()
                .map_or(sensor.created_at, |r| r.record.timestamp);
            let offline = sensor.record.status == SensorStatus::Active
                && alerts::is_stale_at(last_seen, self.stale_after_minutes, now);

            rows.push(SensorOverview {
                sensor,
                latest_reading,
                wqi,
                category: wqi.map(WqiCategory::from_score),
                category_label: wqi.map(|w| WqiCategory::from_score(w).label()),
                active_alerts,
                offline,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::gateway::GatewayConfig;
    use crate::models::{AlertType, Severity};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn config() -> Config {
        Config {
            db_url: String::new(),
            db_pool_max: 1,
            bind_port: 0,
            gateway: GatewayConfig {
                // Nothing listens here; predictions fall back
                base_url: "http://127.0.0.1:9".to_string(),
                ..GatewayConfig::default()
            },
            region: Region::default(),
            prediction_window: 5,
            stale_after_minutes: 60,
        }
    }

    fn context() -> AppContext<MemoryStore> {
        let cfg = config();
        let gateway = PredictionGateway::new(cfg.gateway.clone()).unwrap();
        AppContext::new(MemoryStore::new(), gateway, &cfg)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap()
    }

    fn well(user_id: &str) -> Sensor {
        Sensor {
            name: "Well 4".to_string(),
            latitude: 18.52,
            longitude: 73.85,
            location: Some("Mula River".to_string()),
            status: SensorStatus::Active,
            user_id: user_id.to_string(),
            auto_sync: true,
        }
    }

    #[tokio::test]
    async fn test_ingest_scores_alerts_and_persists() {
        let ctx = context();
        let sensor = ctx.create_sensor(well("u1")).await.unwrap();

        let reading = Reading {
            ph: Some(9.6),
            tds: Some(1200.0),
            ..Reading::new(sensor.id.clone(), t0())
        };
        let outcome = ctx.ingest_reading_at(reading, t0()).await.unwrap();

        // pH 67 (w .25), TDS 0 (w .20): 16.75 / .45 = 37.2
        assert_eq!(outcome.wqi, Some(37.0));
        assert_eq!(outcome.category, Some(WqiCategory::Poor));
        assert_eq!(outcome.category_label, Some("Poor"));

        let kinds: Vec<_> = outcome
            .alerts
            .iter()
            .map(|a| (a.record.alert_type, a.record.severity))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (AlertType::PhAnomaly, Severity::High),
                (AlertType::TdsHigh, Severity::High),
                (AlertType::WqiLow, Severity::High),
            ]
        );
        assert!(outcome.alerts.iter().all(|a| a.record.user_id == "u1"));
        assert!(outcome.alerts.iter().all(|a| a.record.location == "Mula River"));

        let stored = ctx.list_alerts("u1", Some(AlertStatus::Active)).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(ctx.recent_readings(&sensor.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_without_scored_fields_has_no_wqi_or_alerts() {
        let ctx = context();
        let sensor = ctx.create_sensor(well("u1")).await.unwrap();

        let reading = Reading {
            chloride: Some(40.0),
            ..Reading::new(sensor.id.clone(), t0())
        };
        let outcome = ctx.ingest_reading_at(reading, t0()).await.unwrap();
        assert_eq!(outcome.wqi, None);
        assert!(outcome.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_sensor_and_invalid_values() {
        let ctx = context();
        let unknown = ctx.ingest_reading(Reading::new("nope", t0())).await;
        assert!(matches!(unknown, Err(Error::NotFound { .. })));

        let sensor = ctx.create_sensor(well("u1")).await.unwrap();
        let bad = Reading {
            ph: Some(15.0),
            ..Reading::new(sensor.id.clone(), t0())
        };
        assert!(matches!(ctx.ingest_reading(bad).await, Err(Error::Validation(_))));
        assert!(ctx.recent_readings(&sensor.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_crud() {
        let ctx = context();

        let mut outside = well("u1");
        outside.latitude = 60.0;
        assert!(ctx.create_sensor(outside).await.is_err());

        let sensor = ctx.create_sensor(well("u1")).await.unwrap();
        ctx.create_sensor(Sensor {
            name: "Aquifer 1".to_string(),
            ..well("u1")
        })
        .await
        .unwrap();
        ctx.create_sensor(well("u2")).await.unwrap();

        let names: Vec<_> = ctx
            .list_sensors("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.record.name)
            .collect();
        assert_eq!(names, vec!["Aquifer 1", "Well 4"]);

        let updated = ctx
            .update_sensor(
                &sensor.id,
                SensorUpdate {
                    status: Some(SensorStatus::Maintenance),
                    name: Some("Well 4b".to_string()),
                    ..SensorUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.record.status, SensorStatus::Maintenance);
        assert_eq!(updated.record.name, "Well 4b");
        assert_eq!(updated.record.latitude, 18.52);

        let relocate_out = SensorUpdate {
            longitude: Some(120.0),
            ..SensorUpdate::default()
        };
        assert!(ctx.update_sensor(&sensor.id, relocate_out).await.is_err());
        assert!(ctx.update_sensor(&sensor.id, SensorUpdate::default()).await.is_err());

        ctx.delete_sensor(&sensor.id).await.unwrap();
        assert!(matches!(
            ctx.get_sensor(&sensor.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            ctx.delete_sensor(&sensor.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_alert_acknowledge_and_resolve() {
        let ctx = context();
        let sensor = ctx.create_sensor(well("u1")).await.unwrap();
        let reading = Reading {
            ph: Some(5.9),
            ..Reading::new(sensor.id.clone(), t0())
        };
        let outcome = ctx.ingest_reading_at(reading, t0()).await.unwrap();
        assert_eq!(outcome.alerts.len(), 1);
        let alert_id = outcome.alerts[0].id.clone();

        let acked = ctx.acknowledge_alert(&alert_id, "u1").await.unwrap();
        assert_eq!(acked.record.status, AlertStatus::Acknowledged);
        assert!(ctx.list_alerts("u1", Some(AlertStatus::Active)).await.unwrap().is_empty());

        let resolved = ctx.resolve_alert(&alert_id, t0()).await.unwrap();
        assert_eq!(resolved.record.status, AlertStatus::Resolved);
        assert_eq!(resolved.record.resolved_at, Some(t0()));
        assert_eq!(resolved.record.acknowledged_by.as_deref(), Some("u1"));

        assert!(matches!(
            ctx.resolve_alert(&alert_id, t0()).await,
            Err(Error::InvalidTransition { .. })
        ));
        // Alerts are never deleted
        assert_eq!(ctx.list_alerts("u1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_sweep_and_overview() {
        let ctx = context();
        let fresh = ctx.create_sensor(well("u1")).await.unwrap();
        let stale = ctx
            .create_sensor(Sensor {
                name: "Aquifer 1".to_string(),
                ..well("u1")
            })
            .await
            .unwrap();
        ctx.create_sensor(Sensor {
            name: "Spare".to_string(),
            status: SensorStatus::Inactive,
            ..well("u1")
        })
        .await
        .unwrap();

        let now = Utc::now();
        let recent = Reading {
            ph: Some(7.0),
            ..Reading::new(fresh.id.clone(), now - Duration::minutes(5))
        };
        ctx.ingest_reading_at(recent, now).await.unwrap();
        let old = Reading {
            ph: Some(7.0),
            ..Reading::new(stale.id.clone(), now - Duration::hours(5))
        };
        ctx.ingest_reading_at(old, now).await.unwrap();

        let raised = ctx.check_offline_sensors("u1", now).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].record.sensor_id, stale.id);
        assert_eq!(raised[0].record.alert_type, AlertType::SensorOffline);

        let overview = ctx.overview("u1", now).await.unwrap();
        assert_eq!(overview.len(), 3);
        let row = |id: &str| overview.iter().find(|o| o.sensor.id == id).unwrap();

        assert!(!row(&fresh.id).offline);
        assert_eq!(row(&fresh.id).wqi, Some(100.0));
        assert_eq!(row(&fresh.id).category_label, Some("Excellent"));
        assert_eq!(row(&fresh.id).active_alerts, 0);

        assert!(row(&stale.id).offline);
        assert_eq!(row(&stale.id).active_alerts, 1);
    }

    #[test]
    fn test_prediction_falls_back_and_is_not_stored() {
        tokio_test::block_on(async {
            let ctx = context();
            let sensor = ctx.create_sensor(well("u1")).await.unwrap();
            let reading = Reading {
                ph: Some(7.0),
                ..Reading::new(sensor.id.clone(), t0())
            };
            ctx.ingest_reading_at(reading, t0()).await.unwrap();

            let outcome = ctx.predict(&sensor.id, TaskKind::Nowcast, None).await.unwrap();
            assert!(outcome.prediction.is_fallback());
            assert!(outcome.record_id.is_none());
            assert!(ctx.recent_predictions(&sensor.id, 10).await.unwrap().is_empty());
        });
    }

    #[tokio::test]
    async fn test_predict_without_readings_is_a_validation_error() {
        let ctx = context();
        let sensor = ctx.create_sensor(well("u1")).await.unwrap();
        let result = ctx.predict(&sensor.id, TaskKind::Forecast, None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_csv_export_and_import() {
        let ctx = context();
        let sensor = ctx.create_sensor(well("u1")).await.unwrap();

        let upload = format!(
            "sensor_id,timestamp,ph,district\n\
             {id},2025-03-26T10:00:00Z,7.1,\"Pune, Haveli\"\n\
             {id},2025-03-26T11:00:00Z,5.5,\n",
            id = sensor.id
        );
        let outcomes = ctx.import_readings_csv(&sensor.id, &upload).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].alerts.len(), 1);

        let csv = ctx.export_readings_csv(&sensor.id, None).await.unwrap();
        let records = csv_export::parse_records(&csv);
        assert_eq!(records.len(), 3);
        // Oldest first
        assert_eq!(records[1][1], "2025-03-26T10:00:00.000Z");
        assert_eq!(records[1][22], "Pune, Haveli");
        assert_eq!(records[2][2], "5.5");

        let newest = ctx.export_readings_csv(&sensor.id, Some(1)).await.unwrap();
        let newest = csv_export::parse_records(&newest);
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[1][1], "2025-03-26T11:00:00.000Z");

        let wrong_sensor = "sensor_id,timestamp\nother,2025-03-26T10:00:00Z\n";
        assert!(ctx.import_readings_csv(&sensor.id, wrong_sensor).await.is_err());
    }
}
