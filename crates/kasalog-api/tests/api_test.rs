//! HTTP-level tests: the full router served on a local port against
//! in-memory backends (and a mock Nominatim for one browse scenario).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use kasalog_api::AppState;
use kasalog_core::memory::StoreCall;
use kasalog_core::{
    Address, AddressResolver, Coordinate, InMemoryLocationRepository, LocationRecord,
    PositionError,
};
use kasalog_geo::{NominatimConfig, NominatimGeocoder};
use kasalog_workflow::testing::{ScriptedPositionSource, ScriptedResolver};
use kasalog_workflow::{
    EMPTY_LIST_MESSAGE, INSECURE_CONTEXT_NOTICE, MISSING_IDENTIFIER_MESSAGE,
    POSITION_FAILED_NOTICE,
};

struct TestServer {
    base: String,
    client: reqwest::Client,
    store: InMemoryLocationRepository,
    positions: ScriptedPositionSource,
}

impl TestServer {
    async fn start(
        store: InMemoryLocationRepository,
        positions: ScriptedPositionSource,
        resolver: ScriptedResolver,
    ) -> Self {
        Self::start_with_resolver(store, positions, Arc::new(resolver)).await
    }

    async fn start_with_resolver(
        store: InMemoryLocationRepository,
        positions: ScriptedPositionSource,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(positions.clone()),
            resolver,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, kasalog_api::app(state)).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            store,
            positions,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status(), resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (reqwest::StatusCode, Value) {
        let mut req = self.client.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        (resp.status(), resp.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        (resp.status(), resp.json().await.unwrap_or(Value::Null))
    }

    /// Poll a browse session until every address has resolved.
    async fn wait_for_addresses(&self, session: &str) -> Value {
        for _ in 0..100 {
            let (_, view) = self.get(&format!("/locations/sessions/{}", session)).await;
            if view["pending_addresses"] == 0 {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("addresses never resolved");
    }
}

fn coord(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).unwrap()
}

fn record(umbrella_id: &str, lat: f64, lng: f64, minutes_ago: i64) -> LocationRecord {
    LocationRecord {
        id: Uuid::now_v7(),
        umbrella_id: umbrella_id.to_string(),
        latitude: lat,
        longitude: lng,
        scanned_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
    }
}

fn session_id(body: &Value) -> String {
    body["session_id"].as_str().unwrap().to_string()
}

// =============================================================================
// CAPTURE
// =============================================================================

#[tokio::test]
async fn test_scan_records_location_automatically() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new().then_fix(coord(35.0, 139.0)),
        ScriptedResolver::new(),
    )
    .await;

    let (status, body) = server.get("/scan?umbrellaId=UMB-042").await;
    assert_eq!(status, 200);
    assert_eq!(body["umbrella_id"], "UMB-042");
    assert_eq!(body["secure_context"], true);
    assert_eq!(body["status"]["state"], "succeeded");
    assert_eq!(body["status"]["latitude"], "35.000000");
    assert_eq!(body["status"]["longitude"], "139.000000");
    assert_eq!(body["actions"], json!(["view_locations", "home"]));

    assert_eq!(server.store.insert_count(), 1);
    assert_eq!(
        server.store.calls()[0],
        StoreCall::Insert("UMB-042".to_string())
    );

    // The session stays readable after the flow ends.
    let (status, again) = server
        .get(&format!("/scan/{}", session_id(&body)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(again["status"]["state"], "succeeded");
}

#[tokio::test]
async fn test_scan_without_identifier_fails_before_positioning() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new().then_fix(coord(35.0, 139.0)),
        ScriptedResolver::new(),
    )
    .await;

    for path in ["/scan", "/scan?umbrellaId=", "/scan?umbrellaId=%20%20"] {
        let (status, body) = server.get(path).await;
        assert_eq!(status, 200, "{}", path);
        assert_eq!(body["status"]["state"], "failed");
        assert_eq!(body["status"]["kind"], "missing_identifier");
        assert_eq!(body["status"]["message"], MISSING_IDENTIFIER_MESSAGE);
        assert_eq!(body["actions"], json!(["home"]));
    }

    assert_eq!(server.positions.calls(), 0);
    assert!(server.store.calls().is_empty());
}

#[tokio::test]
async fn test_manual_entry_rejects_out_of_range_then_saves() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new().then_fail(PositionError::PermissionDenied),
        ScriptedResolver::new(),
    )
    .await;

    let (_, body) = server.get("/scan?umbrellaId=UMB-042").await;
    assert_eq!(body["status"]["state"], "manual_input");
    assert_eq!(body["status"]["notice"], POSITION_FAILED_NOTICE);
    let id = session_id(&body);

    let (status, body) = server
        .post(
            &format!("/scan/{}/manual", id),
            Some(json!({"latitude": "91", "longitude": "139"})),
        )
        .await;
    assert_eq!(status, 422);
    assert!(body["error"].is_string());
    assert_eq!(body["status"]["state"], "manual_input");
    assert!(body["status"]["validation_error"].is_string());
    assert_eq!(server.store.insert_count(), 0);

    let (status, body) = server
        .post(
            &format!("/scan/{}/manual", id),
            Some(json!({"latitude": 35.5, "longitude": "139.25"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"]["state"], "succeeded");
    assert_eq!(body["status"]["latitude"], "35.500000");
    assert_eq!(server.store.insert_count(), 1);
}

#[tokio::test]
async fn test_insecure_origin_gets_distinct_notice() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new().then_fail(PositionError::PermissionDenied),
        ScriptedResolver::new(),
    )
    .await;

    let resp = server
        .client
        .get(server.url("/scan?umbrellaId=UMB-042"))
        .header("x-forwarded-proto", "http")
        .header("x-forwarded-host", "kasa.example.net")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["secure_context"], false);
    assert_eq!(body["status"]["state"], "manual_input");
    assert_eq!(body["status"]["notice"], INSECURE_CONTEXT_NOTICE);
}

#[tokio::test]
async fn test_back_then_retry_from_idle() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new()
            .then_fail(PositionError::Timeout)
            .then_fix(coord(35.0, 139.0)),
        ScriptedResolver::new(),
    )
    .await;

    let (_, body) = server.get("/scan?umbrellaId=UMB-042").await;
    let id = session_id(&body);

    let (status, body) = server.post(&format!("/scan/{}/back", id), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"]["state"], "idle");
    assert_eq!(body["actions"], json!(["retry", "enter_manually", "home"]));

    // Submitting is not an action of the idle state.
    let (status, body) = server
        .post(
            &format!("/scan/{}/manual", id),
            Some(json!({"latitude": "35", "longitude": "139"})),
        )
        .await;
    assert_eq!(status, 409);
    assert!(body["error"].is_string());

    let (status, body) = server.post(&format!("/scan/{}/retry", id), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"]["state"], "succeeded");
    assert_eq!(server.positions.calls(), 2);
}

#[tokio::test]
async fn test_locate_prefills_manual_form() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new()
            .then_fail(PositionError::PositionUnavailable)
            .then_fix(coord(34.5, 135.25)),
        ScriptedResolver::new(),
    )
    .await;

    let (_, body) = server.get("/scan?umbrellaId=UMB-7").await;
    let id = session_id(&body);

    let (status, body) = server.post(&format!("/scan/{}/locate", id), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"]["state"], "manual_input");
    assert_eq!(body["status"]["latitude"], "34.500000");
    assert_eq!(body["status"]["longitude"], "135.250000");
    assert_eq!(server.store.insert_count(), 0);
}

#[tokio::test]
async fn test_unknown_scan_session_is_not_found() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new(),
        ScriptedResolver::new(),
    )
    .await;

    let (status, body) = server.get(&format!("/scan/{}", Uuid::now_v7())).await;
    assert_eq!(status, 404);
    assert!(body["error"].is_string());
}

// =============================================================================
// BROWSE
// =============================================================================

#[tokio::test]
async fn test_browse_empty_store() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new(),
        ScriptedResolver::new(),
    )
    .await;

    let (status, body) = server.post("/locations/sessions", None).await;
    assert_eq!(status, 201);
    assert_eq!(body["mode"], "list");
    assert_eq!(body["list"]["count"], 0);
    assert_eq!(body["list"]["empty_message"], EMPTY_LIST_MESSAGE);
    assert!(body.get("map").is_none());

    let id = session_id(&body);
    let (status, body) = server
        .put(
            &format!("/locations/sessions/{}/mode", id),
            json!({"mode": "map"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["mode"], "map");
    assert!(body.get("list").is_none());
    assert_eq!(body["map"]["markers"], json!([]));
    assert_eq!(body["map"]["viewport"]["kind"], "default");
    assert_eq!(body["map"]["viewport"]["zoom"], 10);
}

#[tokio::test]
async fn test_browse_load_failure() {
    let store = InMemoryLocationRepository::new();
    store.fail_list(true);
    let server = TestServer::start(store, ScriptedPositionSource::new(), ScriptedResolver::new())
        .await;

    let (status, body) = server.post("/locations/sessions", None).await;
    assert_eq!(status, 500);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_browse_select_delete_close() {
    let store = InMemoryLocationRepository::new();
    let older = record("UMB-001", 35.0, 139.0, 30);
    let newer = record("UMB-002", 34.0, 135.0, 5);
    store.seed(older.clone()).await;
    store.seed(newer.clone()).await;

    let resolver = ScriptedResolver::new()
        .with_address(coord(35.0, 139.0), Address::Resolved("東京都千代田区".into()))
        .with_address(coord(34.0, 135.0), Address::LookupFailed);
    let server = TestServer::start(store, ScriptedPositionSource::new(), resolver).await;

    let (status, body) = server.post("/locations/sessions", None).await;
    assert_eq!(status, 201);
    assert_eq!(body["list"]["count"], 2);
    // Newest first
    assert_eq!(body["list"]["rows"][0]["umbrella_id"], "UMB-002");
    let id = session_id(&body);

    let view = server.wait_for_addresses(&id).await;
    assert_eq!(view["list"]["rows"][1]["address"], "東京都千代田区");
    assert_eq!(view["list"]["rows"][0]["address"], "Address lookup failed");

    let (status, body) = server
        .post(
            &format!("/locations/sessions/{}/select/{}", id, older.id),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["detail"]["umbrella_id"], "UMB-001");
    assert_eq!(body["detail"]["actions"], json!(["delete", "close"]));

    let (_, body) = server
        .put(
            &format!("/locations/sessions/{}/mode", id),
            json!({"mode": "map"}),
        )
        .await;
    let markers = body["map"]["markers"].as_array().unwrap();
    assert_eq!(markers.len(), 2);
    let selected: Vec<_> = markers.iter().filter(|m| m["selected"] == true).collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0]["id"], older.id.to_string());

    let (status, body) = server
        .delete(&format!("/locations/sessions/{}/records/{}", id, older.id))
        .await;
    assert_eq!(status, 200);
    assert!(body["detail"].is_null());
    assert_eq!(body["map"]["markers"].as_array().unwrap().len(), 1);
    assert!(server.store.calls().contains(&StoreCall::Delete(older.id)));

    let (status, _) = server
        .delete(&format!("/locations/sessions/{}", id))
        .await;
    assert_eq!(status, 204);
    let (status, _) = server.get(&format!("/locations/sessions/{}", id)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_browse_delete_failure_keeps_view() {
    let store = InMemoryLocationRepository::new();
    let target = record("UMB-001", 35.0, 139.0, 1);
    store.seed(target.clone()).await;
    store.seed(record("UMB-002", 34.0, 135.0, 2)).await;
    store.fail_deletes(true);

    let server = TestServer::start(store, ScriptedPositionSource::new(), ScriptedResolver::new())
        .await;
    let (_, body) = server.post("/locations/sessions", None).await;
    let id = session_id(&body);

    let (status, body) = server
        .delete(&format!("/locations/sessions/{}/records/{}", id, target.id))
        .await;
    assert_eq!(status, 500);
    assert!(body["error"].is_string());

    let (_, view) = server.get(&format!("/locations/sessions/{}", id)).await;
    assert_eq!(view["list"]["count"], 2);
}

#[tokio::test]
async fn test_browse_unknown_record_is_not_found() {
    let store = InMemoryLocationRepository::new();
    store.seed(record("UMB-001", 35.0, 139.0, 1)).await;
    let server = TestServer::start(store, ScriptedPositionSource::new(), ScriptedResolver::new())
        .await;

    let (_, body) = server.post("/locations/sessions", None).await;
    let id = session_id(&body);

    let (status, _) = server
        .post(
            &format!("/locations/sessions/{}/select/{}", id, Uuid::now_v7()),
            None,
        )
        .await;
    assert_eq!(status, 404);

    let (status, _) = server
        .delete(&format!(
            "/locations/sessions/{}/records/{}",
            id,
            Uuid::now_v7()
        ))
        .await;
    assert_eq!(status, 404);
    assert!(!server
        .store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::Delete(_))));
}

#[tokio::test]
async fn test_browse_resolves_addresses_through_nominatim() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let nominatim = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("lat", "35"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "display_name": "丸の内, 千代田区, 東京都, 日本",
            "address": {"state": "東京都", "city": "千代田区", "quarter": "丸の内"}
        })))
        .mount(&nominatim)
        .await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("lat", "34"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&nominatim)
        .await;

    let geocoder = NominatimGeocoder::new(
        NominatimConfig::default()
            .with_base_url(nominatim.uri())
            .with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let store = InMemoryLocationRepository::new();
    store.seed(record("UMB-001", 35.0, 139.0, 10)).await;
    store.seed(record("UMB-002", 34.0, 135.0, 20)).await;
    let server = TestServer::start_with_resolver(
        store,
        ScriptedPositionSource::new(),
        Arc::new(geocoder),
    )
    .await;

    let (_, body) = server.post("/locations/sessions", None).await;
    let view = server.wait_for_addresses(&session_id(&body)).await;

    let rows = view["list"]["rows"].as_array().unwrap();
    assert_eq!(rows[0]["address"], "東京都千代田区丸の内");
    assert_eq!(rows[0]["address_resolved"], true);
    assert_eq!(rows[1]["address"], "Address lookup failed");
    assert_eq!(rows[1]["address_resolved"], false);
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_health_and_request_id() {
    let server = TestServer::start(
        InMemoryLocationRepository::new(),
        ScriptedPositionSource::new(),
        ScriptedResolver::new(),
    )
    .await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("x-request-id"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["position_source"], "scripted");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
