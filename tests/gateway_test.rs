//! Prediction gateway against a mock ML service.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hydrowatch::gateway::{FALLBACK_CLASS, FALLBACK_WQI};
use hydrowatch::models::{PredictionStatus, Reading, TaskKind};
use hydrowatch::{Error, GatewayConfig, PredictionGateway, ServiceHealth};

// ---

fn gateway(base_url: &str) -> PredictionGateway {
    PredictionGateway::new(GatewayConfig {
        base_url: base_url.to_string(),
        health_timeout: Duration::from_millis(300),
        inference_timeout: Duration::from_millis(300),
        forecast_timeout: Duration::from_millis(300),
        default_horizon: 365,
    })
    .unwrap()
}

fn readings() -> Vec<Reading> {
    let t = |h| Utc.with_ymd_and_hms(2025, 3, 26, h, 0, 0).unwrap();
    vec![
        Reading {
            ph: Some(7.2),
            tds: Some(300.0),
            ..Reading::new("S1", t(10))
        },
        Reading {
            ph: Some(7.4),
            tds: Some(320.0),
            ..Reading::new("S1", t(11))
        },
    ]
}

fn success_body() -> serde_json::Value {
    json!({
        "prediction": { "wqi": 81.5, "quality_class": "Good", "confidence": 0.92 },
        "model_info": { "name": "wqi-gbm", "type": "gradient_boosting", "version": "1.3.0" },
        "status": "success",
        "timestamp": "2025-03-26T18:45:00Z",
        "explanations": { "ph": 0.4 }
    })
}

#[tokio::test]
async fn nowcast_success_maps_the_response() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nowcast"))
        .and(body_partial_json(json!({
            "sensor_id": "S1",
            "readings": [
                { "sensor_id": "S1", "timestamp": "2025-03-26T10:00:00.000Z", "ph": 7.2 },
                { "sensor_id": "S1", "timestamp": "2025-03-26T11:00:00.000Z", "ph": 7.4 }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let prediction = gateway(&server.uri())
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();

    assert_eq!(prediction.status, PredictionStatus::Success);
    assert_eq!(prediction.sensor_id, "S1");
    assert_eq!(prediction.wqi, 81.5);
    assert_eq!(prediction.quality_class, "Good");
    assert_eq!(prediction.confidence, 0.92);
    assert_eq!(prediction.model.model_type, "gradient_boosting");
    assert_eq!(prediction.horizon, None);
    assert_eq!(
        prediction.timestamp,
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    );
    assert!(prediction.error.is_none());
}

#[tokio::test]
async fn forecast_sends_default_horizon() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forecast"))
        .and(body_partial_json(json!({ "horizon": 365 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let prediction = gateway(&server.uri())
        .request_prediction(TaskKind::Forecast, &readings(), None)
        .await
        .unwrap();
    assert_eq!(prediction.status, PredictionStatus::Success);
    assert_eq!(prediction.horizon, Some(365));
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ml/classification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let prediction = gateway(&format!("{}/ml", server.uri()))
        .request_prediction(TaskKind::Classification, &readings(), None)
        .await
        .unwrap();
    assert_eq!(prediction.status, PredictionStatus::Success);
}

#[tokio::test]
async fn empty_batch_never_reaches_the_service() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(0)
        .mount(&server)
        .await;

    let result = gateway(&server.uri())
        .request_prediction(TaskKind::Nowcast, &[], None)
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn server_error_yields_fallback() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nowcast"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let prediction = gateway(&server.uri())
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();

    assert!(prediction.is_fallback());
    assert_eq!(prediction.status, PredictionStatus::Fallback);
    assert_eq!(prediction.wqi, FALLBACK_WQI);
    assert_eq!(prediction.quality_class, FALLBACK_CLASS);
    assert_eq!(prediction.confidence, 0.0);
    assert!(prediction.error.unwrap().contains("503"));
}

#[tokio::test]
async fn slow_service_times_out_into_fallback() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nowcast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let prediction = gateway(&server.uri())
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();

    assert!(prediction.is_fallback());
    assert!(prediction.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn malformed_or_rejected_responses_yield_fallback() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nowcast"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/classification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prediction": { "wqi": 50.0, "quality_class": "Fair", "confidence": 0.5 },
            "model_info": { "name": "m", "type": "t", "version": "1" },
            "status": "error"
        })))
        .mount(&server)
        .await;

    let gw = gateway(&server.uri());
    let malformed = gw
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();
    assert!(malformed.is_fallback());

    let rejected = gw
        .request_prediction(TaskKind::Classification, &readings(), None)
        .await
        .unwrap();
    assert!(rejected.is_fallback());
    assert!(rejected.error.unwrap().contains("error"));
}

#[tokio::test]
async fn identical_requests_are_not_deduplicated() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nowcast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(2)
        .mount(&server)
        .await;

    let gw = gateway(&server.uri());
    let first = gw
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();
    let second = gw
        .request_prediction(TaskKind::Nowcast, &readings(), None)
        .await
        .unwrap();
    assert_eq!(first.status, PredictionStatus::Success);
    assert_eq!(second.status, PredictionStatus::Success);
}

#[tokio::test]
async fn health_reports_up_and_down() {
    // ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "version": "2.1.0",
            "models_loaded": { "nowcast": true },
            "uptime": 1234.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    match gateway(&server.uri()).health().await {
        ServiceHealth::Up(status) => {
            assert_eq!(status.status, "healthy");
            assert_eq!(status.version.as_deref(), Some("2.1.0"));
        }
        other => panic!("expected Up, got {other:?}"),
    }

    // Nothing listens on the discard port
    match gateway("http://127.0.0.1:9").health().await {
        ServiceHealth::Down { reason } => assert!(!reason.is_empty()),
        other => panic!("expected Down, got {other:?}"),
    }
}
