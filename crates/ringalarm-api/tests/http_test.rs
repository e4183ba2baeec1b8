#![allow(clippy::unwrap_used)]
// Integration tests for the authenticated REST dispatcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{mount_oauth, requests_to, session_config};
use ringalarm_api::{ApiRequest, Body, Error, MemoryCache, RingClient, Session, SessionConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const DEVICES: &str = "/clients_api/ring_devices";

async fn setup_with(configure: impl FnOnce(SessionConfig) -> SessionConfig) -> (MockServer, Arc<Session>) {
    let server = MockServer::start().await;
    mount_oauth(&server, "access-1").await;
    let config = configure(session_config(&server));
    let session = Session::start(config, Arc::new(MemoryCache::default())).unwrap();
    (server, session)
}

async fn setup() -> (MockServer, Arc<Session>) {
    setup_with(|config| config).await
}

// ── Request shape ───────────────────────────────────────────────────

#[tokio::test]
async fn test_get_carries_bearer_and_api_version() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("api_version", "11"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"base_stations": []})))
        .expect(1)
        .mount(&server)
        .await;

    let response = session.request(&ApiRequest::get("/ring_devices")).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body, Body::Json(json!({"base_stations": []})));
}

#[tokio::test]
async fn test_form_body_includes_api_version() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/clients_api/thing"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("name=porch"))
        .and(body_string_contains("api_version=11"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let response = session
        .request(&ApiRequest::post("/thing").form_field("name", "porch"))
        .await
        .unwrap();
    assert_eq!(response.body, Body::Raw("ok".into()));
}

// ── 401 retry budget ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_is_retried_once_with_fresh_token() {
    let (server, session) = setup_with(|config| config.with_retries(1)).await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"base_stations": []})))
        .mount(&server)
        .await;

    session.request(&ApiRequest::get("/ring_devices")).await.unwrap();

    assert_eq!(requests_to(&server, DEVICES).await, 2);
    // Initial acquisition plus the forced one after the 401.
    assert_eq!(requests_to(&server, "/oauth/token").await, 2);
}

#[tokio::test]
async fn test_unauthorized_without_budget_surfaces() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = session.request(&ApiRequest::get("/ring_devices")).await;
    assert!(
        matches!(result, Err(Error::HttpStatus { status: 401, .. })),
        "got: {result:?}"
    );
    assert_eq!(requests_to(&server, DEVICES).await, 1);
    assert_eq!(requests_to(&server, "/oauth/token").await, 1);
}

#[tokio::test]
async fn test_retry_budget_is_bounded_and_resets() {
    let (server, session) = setup_with(|config| config.with_retries(1)).await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clients_api/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let result = session.request(&ApiRequest::get("/ring_devices")).await;
    assert!(result.unwrap_err().is_unauthorized());
    assert_eq!(requests_to(&server, DEVICES).await, 2);

    // A success resets the budget, so the next 401 is retried again.
    session.request(&ApiRequest::get("/ok")).await.unwrap();
    let _ = session.request(&ApiRequest::get("/ring_devices")).await;
    assert_eq!(requests_to(&server, DEVICES).await, 4);
}

// ── Failure mapping ─────────────────────────────────────────────────

#[tokio::test]
async fn test_slow_response_times_out() {
    let (server, session) = setup_with(|config| config.with_timeout(Duration::from_millis(200))).await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let result = session.request(&ApiRequest::get("/ring_devices")).await;
    assert!(matches!(result, Err(Error::Timeout { .. })), "got: {result:?}");
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = session.request(&ApiRequest::get("/ring_devices")).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.to_string(), "API returned Status Code 503");
}

#[tokio::test]
async fn test_error_envelope_on_success_status() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "location not found",
            "status": "404",
        })))
        .mount(&server)
        .await;

    let result = session.request(&ApiRequest::get("/ring_devices")).await;
    assert!(
        matches!(&result, Err(Error::Api { status: Some(404), message }) if message == "location not found"),
        "got: {result:?}"
    );
}

// ── Body decoding ───────────────────────────────────────────────────

#[tokio::test]
async fn test_stations_keep_large_ids_and_revive_dates() {
    let server = MockServer::start().await;
    mount_oauth(&server, "access-1").await;

    let raw = r#"{"base_stations":[{"id":123456789012345678901,"created_at":"2023-05-06T07:08:09.000Z","location_id":"loc-1","description":"Home","kind":"base_station_v1","alerts":{"connection":"online"}}],"doorbots":[]}"#;
    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_raw(raw, "application/json"))
        .mount(&server)
        .await;

    let client = RingClient::new(session_config(&server), Arc::new(MemoryCache::default())).unwrap();
    let stations = client.stations().await.unwrap();

    assert_eq!(stations.len(), 1);
    let station = &stations[0];
    assert_eq!(station.id.as_deref(), Some("123456789012345678901"));
    assert_eq!(station.location().unwrap(), "loc-1");
    assert_eq!(
        station.created_at.unwrap().to_rfc3339(),
        "2023-05-06T07:08:09+00:00"
    );
    assert_eq!(station.extra["alerts"]["connection"], "online");
}

#[tokio::test]
async fn test_stations_rejects_non_json() {
    let server = MockServer::start().await;
    mount_oauth(&server, "access-1").await;
    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = RingClient::new(session_config(&server), Arc::new(MemoryCache::default())).unwrap();
    let result = client.stations().await;
    assert!(
        matches!(&result, Err(Error::Deserialization { body, .. }) if body.contains("oops")),
        "got: {result:?}"
    );
}
