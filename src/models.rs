//! Data models for the water quality dashboard.
//!
//! Every record that is persisted implements [`Record`], which names its
//! collection and relies on the serde derive as the reviewed list of
//! persisted fields. Optional fields are skipped when absent rather than
//! written as `null`. Documents read back from the store go through
//! [`Stored::decode`], which reports shape mismatches as
//! [`Error::Decode`] instead of trusting the payload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Document;

// ---

/// Serde helpers that write instants as ISO-8601 strings and accept either an
/// ISO-8601 string (any offset) or epoch milliseconds when reading.
pub mod iso8601 {
    // ---
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        d.deserialize_any(InstantVisitor)
    }

    struct InstantVisitor;

    impl<'de> Visitor<'de> for InstantVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an ISO-8601 timestamp or epoch milliseconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp {v:?}: {e}")))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Utc.timestamp_millis_opt(v)
                .single()
                .ok_or_else(|| E::custom(format!("epoch millis out of range: {v}")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            let millis = i64::try_from(v).map_err(E::custom)?;
            self.visit_i64(millis)
        }
    }

    /// Same conventions for `Option<DateTime<Utc>>` fields.
    pub mod option {
        // ---
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] DateTime<Utc>);

            Ok(Option::<Wrapper>::deserialize(d)?.map(|Wrapper(ts)| ts))
        }
    }
}

// ---

/// Geographic bounds inside which sensors and readings are accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for Region {
    fn default() -> Self {
        Region {
            lat_min: 6.0,
            lat_max: 38.0,
            lon_min: 68.0,
            lon_max: 98.0,
        }
    }
}

impl Region {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&latitude)
            && (self.lon_min..=self.lon_max).contains(&longitude)
    }

    fn check(&self, latitude: Option<f64>, longitude: Option<f64>) -> Result<()> {
        match (latitude, longitude) {
            (None, None) => Ok(()),
            (Some(lat), Some(lon)) if self.contains(lat, lon) => Ok(()),
            (Some(lat), Some(lon)) => Err(Error::validation(format!(
                "coordinate ({lat}, {lon}) is outside the monitored region"
            ))),
            _ => Err(Error::validation(
                "latitude and longitude must be given together",
            )),
        }
    }
}

// ---

/// Persisted record types and the collection each one lives in.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    /// Serialize to the document body written to the store.
    fn to_document(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Store(e.into()))
    }
}

/// A record together with the metadata the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<T> {
    pub id: String,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: T,
}

impl<T: Record> Stored<T> {
    /// Decode a raw store document into a typed record.
    pub fn decode(doc: Document) -> Result<Self> {
        // ---
        let record = serde_json::from_value(doc.data).map_err(|e| Error::Decode {
            collection: T::COLLECTION.to_string(),
            id: doc.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(Stored {
            id: doc.id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            record,
        })
    }

    pub fn decode_all(docs: Vec<Document>) -> Result<Vec<Self>> {
        docs.into_iter().map(Self::decode).collect()
    }
}

// ---

/// One timestamped observation from a sensor.
///
/// All chemistry fields are optional: devices and manual entry report
/// whatever subset they measured, and downstream scoring skips absent
/// values instead of reading them as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    /// Electrical conductivity, µS/cm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbonate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bicarbonate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chloride: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sulfate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nitrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calcium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnesium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potassium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluoride: Option<f64>,
    /// Total dissolved solids, ppm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tds: Option<f64>,

    /// Turbidity, NTU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbidity: Option<f64>,
    /// Water temperature, °C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Dissolved oxygen, mg/L.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissolved_oxygen: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

impl Record for Reading {
    const COLLECTION: &'static str = "readings";
}

impl Reading {
    /// A reading with no measurements filled in.
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        // ---
        Reading {
            sensor_id: sensor_id.into(),
            timestamp,
            ph: None,
            ec: None,
            carbonate: None,
            bicarbonate: None,
            chloride: None,
            sulfate: None,
            nitrate: None,
            hardness: None,
            calcium: None,
            magnesium: None,
            sodium: None,
            potassium: None,
            fluoride: None,
            tds: None,
            turbidity: None,
            temperature: None,
            dissolved_oxygen: None,
            latitude: None,
            longitude: None,
            state: None,
            district: None,
        }
    }

    /// Check the physical invariants before the reading is persisted.
    pub fn validate(&self, region: &Region) -> Result<()> {
        // ---
        if self.sensor_id.trim().is_empty() {
            return Err(Error::validation("reading has an empty sensor_id"));
        }
        if let Some(ph) = self.ph {
            if !(0.0..=14.0).contains(&ph) {
                return Err(Error::validation(format!("pH {ph} is outside 0-14")));
            }
        }
        let non_negative = [
            ("tds", self.tds),
            ("ec", self.ec),
            ("turbidity", self.turbidity),
            ("dissolved_oxygen", self.dissolved_oxygen),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                // NaN fails this check too
                if !(v >= 0.0) {
                    return Err(Error::validation(format!("{name} must be >= 0, got {v}")));
                }
            }
        }
        region.check(self.latitude, self.longitude)
    }
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Active,
    Inactive,
    Maintenance,
}

/// A monitoring device and its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// River or site label shown on the map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub status: SensorStatus,
    pub user_id: String,
    #[serde(default)]
    pub auto_sync: bool,
}

impl Record for Sensor {
    const COLLECTION: &'static str = "sensors";
}

impl Sensor {
    /// Label used in alert messages: the location when set, otherwise the name.
    pub fn label(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self, region: &Region) -> Result<()> {
        // ---
        if self.name.trim().is_empty() {
            return Err(Error::validation("sensor name must not be empty"));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::validation("sensor must have an owning user_id"));
        }
        region.check(Some(self.latitude), Some(self.longitude))
    }
}

/// Partial update to a sensor. Only the fields that are set are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SensorStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<bool>,
}

impl SensorUpdate {
    pub fn is_empty(&self) -> bool {
        *self == SensorUpdate::default()
    }

    /// Apply to a copy of `sensor`, used to validate the result before writing.
    pub fn apply_to(&self, sensor: &Sensor) -> Sensor {
        // ---
        let mut next = sensor.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(lat) = self.latitude {
            next.latitude = lat;
        }
        if let Some(lon) = self.longitude {
            next.longitude = lon;
        }
        if let Some(location) = &self.location {
            next.location = Some(location.clone());
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(auto_sync) = self.auto_sync {
            next.auto_sync = auto_sync;
        }
        next
    }
}

// ---

/// Kind of inference requested from the ML service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Nowcast,
    Forecast,
    Classification,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Nowcast => "nowcast",
            TaskKind::Forecast => "forecast",
            TaskKind::Classification => "classification",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a prediction came from the model or is a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Success,
    /// The ML service could not be reached or answered badly. The score is a
    /// fixed placeholder and must not be shown as a model output.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub version: String,
}

/// Normalized result of one ML inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub sensor_id: String,
    pub task: TaskKind,
    pub wqi: f64,
    pub quality_class: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon: Option<u32>,
    pub model: ModelInfo,
    pub status: PredictionStatus,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanations: Option<serde_json::Value>,
    /// Why the prediction is a fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Record for Prediction {
    const COLLECTION: &'static str = "predictions";
}

impl Prediction {
    pub fn is_fallback(&self) -> bool {
        self.status == PredictionStatus::Fallback
    }
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PhAnomaly,
    TdsHigh,
    TurbidityHigh,
    WqiLow,
    SensorOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived warning about a sensor.
///
/// `user_id` is empty until the caller attaches the owning user; the store
/// boundary refuses to persist an alert without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub sensor_id: String,
    #[serde(default)]
    pub user_id: String,
    pub location: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub status: AlertStatus,
    #[serde(with = "iso8601")]
    pub triggered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso8601::option")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
}

impl Record for Alert {
    const COLLECTION: &'static str = "alerts";
}

// ---
