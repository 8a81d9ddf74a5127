//! Alert generation and alert lifecycle.
//!
//! Reading rules (pH, TDS, turbidity) are evaluated independently, so one
//! reading can raise several alerts. A NaN or missing field skips its rule.
//! Nothing here reads the clock or any shared state: callers pass `now`,
//! which keeps the output a pure function of the inputs.
//!
//! Alerts come back unpersisted with an empty `user_id`; the caller attaches
//! the owning user before writing them to the store.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::metrics::{usable, PH_SAFE_MAX, PH_SAFE_MIN};
use crate::models::{Alert, AlertStatus, AlertType, Reading, Severity};

// ---

const PH_SEVERE_LOW: f64 = 6.0;
const PH_SEVERE_HIGH: f64 = 9.0;

const TDS_LIMIT_PPM: f64 = 500.0;
const TDS_SEVERE_PPM: f64 = 1000.0;

const TURBIDITY_LIMIT_NTU: f64 = 25.0;
const TURBIDITY_SEVERE_NTU: f64 = 50.0;

const WQI_LOW: f64 = 50.0;
const WQI_CRITICAL: f64 = 25.0;

fn new_alert(
    sensor_id: &str,
    location: &str,
    alert_type: AlertType,
    severity: Severity,
    message: String,
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        sensor_id: sensor_id.to_string(),
        user_id: String::new(),
        location: location.to_string(),
        alert_type,
        severity,
        message,
        status: AlertStatus::Active,
        triggered_at: now,
        resolved_at: None,
        acknowledged_by: None,
    }
}

fn ph_alert(reading: &Reading, location: &str, now: DateTime<Utc>) -> Option<Alert> {
    let ph = usable(reading.ph)?;
    if (PH_SAFE_MIN..=PH_SAFE_MAX).contains(&ph) {
        return None;
    }
    let severity = if ph < PH_SEVERE_LOW || ph > PH_SEVERE_HIGH {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(new_alert(
        &reading.sensor_id,
        location,
        AlertType::PhAnomaly,
        severity,
        format!(
            "pH level {ph:.2} at {location} is outside the safe range ({PH_SAFE_MIN}-{PH_SAFE_MAX})"
        ),
        now,
    ))
}

fn tds_alert(reading: &Reading, location: &str, now: DateTime<Utc>) -> Option<Alert> {
    let tds = usable(reading.tds)?;
    if tds <= TDS_LIMIT_PPM {
        return None;
    }
    let severity = if tds > TDS_SEVERE_PPM {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(new_alert(
        &reading.sensor_id,
        location,
        AlertType::TdsHigh,
        severity,
        format!("TDS of {tds:.0} ppm at {location} exceeds the {TDS_LIMIT_PPM:.0} ppm limit"),
        now,
    ))
}

fn turbidity_alert(reading: &Reading, location: &str, now: DateTime<Utc>) -> Option<Alert> {
    let ntu = usable(reading.turbidity)?;
    if ntu <= TURBIDITY_LIMIT_NTU {
        return None;
    }
    let severity = if ntu > TURBIDITY_SEVERE_NTU {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(new_alert(
        &reading.sensor_id,
        location,
        AlertType::TurbidityHigh,
        severity,
        format!(
            "Turbidity of {ntu:.1} NTU at {location} exceeds the {TURBIDITY_LIMIT_NTU:.0} NTU limit"
        ),
        now,
    ))
}

/// Evaluate the reading rules at a given instant.
pub fn generate_alerts_at(reading: &Reading, location: &str, now: DateTime<Utc>) -> Vec<Alert> {
    // ---
    [
        ph_alert(reading, location, now),
        tds_alert(reading, location, now),
        turbidity_alert(reading, location, now),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Evaluate the reading rules, stamping alerts with the current time.
pub fn generate_alerts(reading: &Reading, location: &str) -> Vec<Alert> {
    generate_alerts_at(reading, location, Utc::now())
}

/// Reading rules plus the low-WQI rule when a WQI is available.
pub fn generate_alerts_with_wqi(
    reading: &Reading,
    location: &str,
    wqi: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    // ---
    let mut alerts = generate_alerts_at(reading, location, now);
    if let Some(alert) = wqi.and_then(|w| wqi_alert(&reading.sensor_id, location, w, now)) {
        alerts.push(alert);
    }
    alerts
}

/// Raise `wqi_low` when the index drops below 50 (`critical` below 25).
pub fn wqi_alert(sensor_id: &str, location: &str, wqi: f64, now: DateTime<Utc>) -> Option<Alert> {
    // ---
    if wqi.is_nan() || wqi >= WQI_LOW {
        return None;
    }
    let severity = if wqi < WQI_CRITICAL {
        Severity::Critical
    } else {
        Severity::High
    };
    Some(new_alert(
        sensor_id,
        location,
        AlertType::WqiLow,
        severity,
        format!("Water quality index at {location} dropped to {wqi:.0}"),
        now,
    ))
}

// ---

/// Returns `true` if `last_seen` is more than `max_age_minutes` before `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_stale_at(last_seen: DateTime<Utc>, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let age_minutes = (now - last_seen).num_minutes();
    u64::try_from(age_minutes).is_ok_and(|age| age > max_age_minutes)
}

/// Raise `sensor_offline` when the last sign of life is stale.
///
/// `last_seen` is the newest reading timestamp, or the sensor's creation time
/// if it never reported.
pub fn offline_alert(
    sensor_id: &str,
    location: &str,
    last_seen: DateTime<Utc>,
    max_age_minutes: u64,
    now: DateTime<Utc>,
) -> Option<Alert> {
    // ---
    if !is_stale_at(last_seen, max_age_minutes, now) {
        return None;
    }
    let age = (now - last_seen).num_minutes();
    Some(new_alert(
        sensor_id,
        location,
        AlertType::SensorOffline,
        Severity::Medium,
        format!("No readings from {location} for {age} minutes"),
        now,
    ))
}

// ---

/// active → acknowledged, recording who acknowledged it.
pub fn acknowledge(alert: &Alert, user_id: &str) -> Result<Alert> {
    // ---
    if alert.status != AlertStatus::Active {
        return Err(Error::InvalidTransition {
            from: alert.status.to_string(),
            to: AlertStatus::Acknowledged.to_string(),
        });
    }
    if user_id.trim().is_empty() {
        return Err(Error::validation("acknowledging user_id must not be empty"));
    }
    Ok(Alert {
        status: AlertStatus::Acknowledged,
        acknowledged_by: Some(user_id.to_string()),
        ..alert.clone()
    })
}

/// active | acknowledged → resolved. Resolved is terminal.
pub fn resolve(alert: &Alert, now: DateTime<Utc>) -> Result<Alert> {
    // ---
    if alert.status == AlertStatus::Resolved {
        return Err(Error::InvalidTransition {
            from: alert.status.to_string(),
            to: AlertStatus::Resolved.to_string(),
        });
    }
    Ok(Alert {
        status: AlertStatus::Resolved,
        resolved_at: Some(now),
        ..alert.clone()
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    /// A fixed "now" used across all tests: 2025-03-26 18:45:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    fn reading(ph: Option<f64>, tds: Option<f64>, turbidity: Option<f64>) -> Reading {
        Reading {
            ph,
            tds,
            turbidity,
            ..Reading::new("S1", fixed_now())
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<(AlertType, Severity)> {
        alerts.iter().map(|a| (a.alert_type, a.severity)).collect()
    }

    // ---

    #[test]
    fn test_high_ph_and_tds_yield_exactly_two_high_alerts() {
        let alerts = generate_alerts_at(
            &reading(Some(9.6), Some(1200.0), None),
            "Mula",
            fixed_now(),
        );
        assert_eq!(
            kinds(&alerts),
            vec![
                (AlertType::PhAnomaly, Severity::High),
                (AlertType::TdsHigh, Severity::High),
            ]
        );
        assert!(alerts.iter().all(|a| a.status == AlertStatus::Active));
        assert!(alerts.iter().all(|a| a.user_id.is_empty()));
        assert!(alerts.iter().all(|a| a.triggered_at == fixed_now()));
    }

    #[test]
    fn test_all_missing_fields_yield_no_alerts() {
        let alerts = generate_alerts_at(&Reading::new("S1", fixed_now()), "Mula", fixed_now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_nan_fields_yield_no_alerts() {
        let alerts = generate_alerts_at(
            &reading(Some(f64::NAN), Some(f64::NAN), Some(f64::NAN)),
            "Mula",
            fixed_now(),
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_ph_severity_bands() {
        let cases = [
            (6.5, None),
            (7.0, None),
            (8.5, None),
            (6.4, Some(Severity::Medium)),
            (6.0, Some(Severity::Medium)),
            (5.99, Some(Severity::High)),
            (8.6, Some(Severity::Medium)),
            (9.0, Some(Severity::Medium)),
            (9.01, Some(Severity::High)),
            (0.0, Some(Severity::High)),
            (14.0, Some(Severity::High)),
        ];
        for (ph, expected) in cases {
            let alerts = generate_alerts_at(&reading(Some(ph), None, None), "Mula", fixed_now());
            let got = alerts
                .iter()
                .find(|a| a.alert_type == AlertType::PhAnomaly)
                .map(|a| a.severity);
            assert_eq!(got, expected, "pH {ph}");
        }
    }

    #[test]
    fn test_ph_message_has_two_decimals() {
        let alerts = generate_alerts_at(&reading(Some(5.5), None, None), "Mula River", fixed_now());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("5.50"), "{}", alerts[0].message);
        assert!(alerts[0].message.contains("Mula River"));
    }

    #[test]
    fn test_tds_thresholds() {
        let at_limit = generate_alerts_at(&reading(None, Some(500.0), None), "Mula", fixed_now());
        assert!(at_limit.is_empty());

        let medium = generate_alerts_at(&reading(None, Some(1000.0), None), "Mula", fixed_now());
        assert_eq!(kinds(&medium), vec![(AlertType::TdsHigh, Severity::Medium)]);

        let high = generate_alerts_at(&reading(None, Some(1000.5), None), "Mula", fixed_now());
        assert_eq!(kinds(&high), vec![(AlertType::TdsHigh, Severity::High)]);
    }

    #[test]
    fn test_turbidity_thresholds() {
        let clear = generate_alerts_at(&reading(None, None, Some(25.0)), "Mula", fixed_now());
        assert!(clear.is_empty());

        let medium = generate_alerts_at(&reading(None, None, Some(30.0)), "Mula", fixed_now());
        assert_eq!(kinds(&medium), vec![(AlertType::TurbidityHigh, Severity::Medium)]);

        let high = generate_alerts_at(&reading(None, None, Some(51.0)), "Mula", fixed_now());
        assert_eq!(kinds(&high), vec![(AlertType::TurbidityHigh, Severity::High)]);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let r = reading(Some(5.2), Some(700.0), Some(60.0));
        let first = generate_alerts_at(&r, "Mula", fixed_now());
        let second = generate_alerts_at(&r, "Mula", fixed_now());
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);

        // Timestamps aside, wall-clock calls agree as well
        let strip = |alerts: Vec<Alert>| {
            alerts
                .into_iter()
                .map(|a| (a.alert_type, a.severity, a.message))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            strip(generate_alerts(&r, "Mula")),
            strip(generate_alerts(&r, "Mula"))
        );
    }

    // ---

    #[test]
    fn test_wqi_alert_levels() {
        assert!(wqi_alert("S1", "Mula", 50.0, fixed_now()).is_none());
        assert!(wqi_alert("S1", "Mula", f64::NAN, fixed_now()).is_none());
        assert_eq!(
            wqi_alert("S1", "Mula", 49.0, fixed_now()).map(|a| a.severity),
            Some(Severity::High)
        );
        assert_eq!(
            wqi_alert("S1", "Mula", 10.0, fixed_now()).map(|a| a.severity),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_with_wqi_appends_wqi_low() {
        let r = reading(Some(9.6), Some(1200.0), None);
        let alerts = generate_alerts_with_wqi(&r, "Mula", Some(37.0), fixed_now());
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[2].alert_type, AlertType::WqiLow);

        let without = generate_alerts_with_wqi(&r, "Mula", None, fixed_now());
        assert_eq!(without.len(), 2);
    }

    // ---

    #[test]
    fn test_staleness_is_strictly_greater_than() {
        let now = fixed_now();
        assert!(!is_stale_at(now - Duration::minutes(60), 60, now));
        assert!(is_stale_at(now - Duration::minutes(61), 60, now));
        // Future timestamps (clock skew) are never stale
        assert!(!is_stale_at(now + Duration::minutes(5), 60, now));
    }

    #[test]
    fn test_offline_alert() {
        let now = fixed_now();
        let alert = offline_alert("S1", "Mula", now - Duration::hours(3), 60, now)
            .expect("3 hours of silence should raise an alert");
        assert_eq!(alert.alert_type, AlertType::SensorOffline);
        assert_eq!(alert.severity, Severity::Medium);
        assert!(alert.message.contains("180 minutes"));

        assert!(offline_alert("S1", "Mula", now - Duration::minutes(5), 60, now).is_none());
    }

    // ---

    #[test]
    fn test_lifecycle_transitions() {
        let alert = generate_alerts_at(&reading(Some(4.0), None, None), "Mula", fixed_now())
            .pop()
            .unwrap();

        let acked = acknowledge(&alert, "u1").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("u1"));
        assert!(matches!(
            acknowledge(&acked, "u1"),
            Err(Error::InvalidTransition { .. })
        ));

        let later = fixed_now() + Duration::minutes(30);
        let resolved = resolve(&acked, later).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(later));
        assert!(resolve(&resolved, later).is_err());
        assert!(acknowledge(&resolved, "u1").is_err());

        // Active alerts may be resolved directly
        assert!(resolve(&alert, later).is_ok());
        assert!(acknowledge(&alert, " ").is_err());
    }
}
