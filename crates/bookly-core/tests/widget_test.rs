#![allow(clippy::unwrap_used)]
// Integration tests for the widget composition root using wiremock.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookly_api::BackendClient;
use bookly_core::{
    BookingWidget, ConnectionState, FixedClock, MemoryBackend, StorageBackend, WidgetConfig,
};

// ── Fixtures ────────────────────────────────────────────────────────

fn config() -> WidgetConfig {
    WidgetConfig {
        venue_id: "ven_1".into(),
        organization_id: "org_1".into(),
        // Background tasks off: these tests drive the widget directly.
        refresh_interval_secs: 0,
        live_enabled: false,
        polling_interval_secs: 0,
        ..WidgetConfig::default()
    }
}

fn widget_over(server: &MockServer, backend: Arc<MemoryBackend>) -> BookingWidget {
    let client = BackendClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
    );
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap(),
    ));
    BookingWidget::with_clock(config(), client, backend as Arc<dyn StorageBackend>, clock)
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/widget/v1/venues/ven_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "ven_1",
                "name": "Puzzled Escape Rooms",
                "organization_id": "org_1",
                "utc_offset_minutes": 0,
                "currency": "USD",
                "fee_rate": 0.06
            },
            "error": null
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/widget/v1/venues/ven_1/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "act_1",
                "name": "The Vault",
                "capacity": 8,
                "base_price_cents": 3500,
                "duration_minutes": 60,
                "operating_days": [0, 1, 2, 3, 4, 5, 6],
                "start_time": "10:00",
                "end_time": "14:00",
                "slot_interval_minutes": 60
            }],
            "error": null
        })))
        .mount(server)
        .await;
}

// ── Connect tests ───────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_catalog_into_store() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let widget = widget_over(&server, Arc::new(MemoryBackend::new()));

    widget.connect().await.unwrap();

    assert_eq!(*widget.connection_state().borrow(), ConnectionState::Connected);
    assert_eq!(widget.venue().unwrap().name, "Puzzled Escape Rooms");
    assert!((widget.fee_rate() - 0.06).abs() < f64::EPSILON);

    let activities = widget.store().activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].name, "The Vault");

    widget.disconnect().await;
    assert_eq!(
        *widget.connection_state().borrow(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn connect_with_no_backend_and_no_cache_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let widget = widget_over(&server, Arc::new(MemoryBackend::new()));

    assert!(widget.connect().await.is_err());
    assert_eq!(*widget.connection_state().borrow(), ConnectionState::Failed);
}

#[tokio::test]
async fn connect_falls_back_to_cached_catalog() {
    let healthy = MockServer::start().await;
    mount_catalog(&healthy).await;
    let backend = Arc::new(MemoryBackend::new());

    // First instance populates the shared local cache.
    let first = widget_over(&healthy, Arc::clone(&backend));
    first.connect().await.unwrap();
    first.disconnect().await;

    // Second instance starts against a dead backend.
    let dead = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&dead)
        .await;

    let second = widget_over(&dead, backend);
    second.connect().await.unwrap();

    assert_eq!(*second.connection_state().borrow(), ConnectionState::Degraded);
    assert_eq!(second.store().activities().len(), 1);
}

// ── Availability tests ──────────────────────────────────────────────

#[tokio::test]
async fn slots_prefer_live_sessions() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("GET"))
        .and(path("/widget/v1/activities/act_1/sessions"))
        .and(query_param("from", "2025-11-20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "sess_1",
                "activity_id": "act_1",
                "start_time": "2025-11-20T16:00:00Z",
                "capacity_remaining": 3,
                "capacity_total": 8
            }],
            "error": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let widget = widget_over(&server, Arc::new(MemoryBackend::new()));
    widget.connect().await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
    let slots = widget.slots("act_1", date).await.unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].session_id.as_deref(), Some("sess_1"));
    assert_eq!(slots[0].spots, 3);

    // Second query hits the session cache, not the backend (expect(1)).
    let again = widget.slots("act_1", date).await.unwrap();
    assert_eq!(again.len(), 1);
}

#[tokio::test]
async fn session_fetch_failure_falls_back_to_procedural_slots() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("GET"))
        .and(path("/widget/v1/activities/act_1/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let widget = widget_over(&server, Arc::new(MemoryBackend::new()));
    widget.connect().await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
    let slots = widget.slots("act_1", date).await.unwrap();

    // 10:00–14:00 hourly with 60-minute duration → four generated slots.
    assert_eq!(slots.len(), 4);
    assert!(slots.iter().all(|s| s.session_id.is_none()));
    assert_eq!(slots[0].time, "10:00 AM");
}

#[tokio::test]
async fn slots_for_unknown_activity_is_not_found() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let widget = widget_over(&server, Arc::new(MemoryBackend::new()));
    widget.connect().await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
    let err = widget.slots("ghost", date).await.unwrap_err();
    assert!(matches!(err, bookly_core::CoreError::NotFound { .. }));
}
