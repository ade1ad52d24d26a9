//! End-to-end tests of the HTTP interface over the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use dcatd_api::{router, AppConfig, AppState};
use dcatd_core::{DcatApProfile, HookRegistry};
use dcatd_db::MemoryDatasetStore;

struct TestApp {
    router: Router,
    store: Arc<MemoryDatasetStore>,
}

struct TestResponse {
    status: StatusCode,
    etag: Option<String>,
    location: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }
}

fn test_app_with(vars: &[(&str, &str)]) -> TestApp {
    let mut env: HashMap<String, String> = HashMap::from([
        ("BASE_URL".to_string(), "http://catalog.test/".to_string()),
        ("STORAGE_BACKEND".to_string(), "memory".to_string()),
    ]);
    for (k, v) in vars {
        env.insert(k.to_string(), v.to_string());
    }
    let config = AppConfig::from_lookup(|key| env.get(key).cloned()).expect("valid config");

    let store = Arc::new(MemoryDatasetStore::new());
    let hooks = HookRegistry::builder()
        .profile(Arc::new(DcatApProfile::new()))
        .storage(store.clone())
        .search(store.clone())
        .build()
        .expect("registry");
    let state = AppState::new(Arc::new(hooks), config).expect("state");
    TestApp {
        router: router(state),
        store,
    }
}

fn test_app() -> TestApp {
    test_app_with(&[])
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(payload) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let header_str = |name: header::HeaderName| {
        response
            .headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let status = response.status();
    let etag = header_str(header::ETAG);
    let location = header_str(header::LOCATION);
    let content_type = header_str(header::CONTENT_TYPE);
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        etag,
        location,
        content_type,
        body,
    }
}

async fn create(app: &TestApp, id: &str, doc: Value) -> String {
    let response = send(
        app,
        Method::PUT,
        &format!("/datasets/{}", id),
        &[("if-none-match", "*")],
        Some(doc),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.etag.expect("created response carries an Etag")
}

// =============================================================================
// Conditional writes
// =============================================================================

#[tokio::test]
async fn test_create_then_duplicate_create_is_rejected() {
    let app = test_app();

    let etag = create(&app, "abc", json!({"title": "x"})).await;
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let again = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-none-match", "*")],
        Some(json!({"title": "x"})),
    )
    .await;
    assert!(
        again.status == StatusCode::BAD_REQUEST
            || again.status == StatusCode::PRECONDITION_FAILED,
        "got {}",
        again.status
    );
    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn test_update_with_current_etag_then_stale_etag() {
    let app = test_app();
    let h1 = create(&app, "abc", json!({"title": "x"})).await;

    let updated = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-match", h1.as_str())],
        Some(json!({"title": "y"})),
    )
    .await;
    assert_eq!(updated.status, StatusCode::NO_CONTENT);
    let h2 = updated.etag.expect("updated response carries an Etag");
    assert_ne!(h1, h2);

    let stale = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-match", h1.as_str())],
        Some(json!({"title": "z"})),
    )
    .await;
    assert_eq!(stale.status, StatusCode::PRECONDITION_FAILED);

    let current = send(&app, Method::GET, "/datasets/abc", &[], None).await;
    assert_eq!(current.etag.as_deref(), Some(h2.as_str()));
    assert_eq!(current.json()["title"], "y");
}

#[tokio::test]
async fn test_update_accepts_any_listed_etag() {
    let app = test_app();
    let h1 = create(&app, "abc", json!({"title": "x"})).await;

    let listed = format!("\"other\", {}", h1);
    let updated = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-match", listed.as_str())],
        Some(json!({"title": "y"})),
    )
    .await;
    assert_eq!(updated.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_update_of_missing_dataset_is_not_found() {
    let app = test_app();
    let response = send(
        &app,
        Method::PUT,
        "/datasets/missing",
        &[("if-match", "\"h1\"")],
        Some(json!({"title": "y"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_without_precondition_is_bad_request() {
    let app = test_app();
    let response = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[],
        Some(json!({"title": "x"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"].is_string());
}

#[tokio::test]
async fn test_create_with_non_wildcard_if_none_match_is_rejected_before_storage() {
    let app = test_app();

    for value in ["abc", "\"abc\""] {
        let response = send(
            &app,
            Method::PUT,
            "/datasets/abc",
            &[("if-none-match", value)],
            Some(json!({"title": "x"})),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "If-None-Match: {}", value);
    }
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_precondition_is_checked_before_body() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/datasets/abc")
        .header("if-none-match", "abc")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(!error["error"].as_str().unwrap().contains("invalid json"));
}

#[tokio::test]
async fn test_invalid_json_body_is_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/datasets/abc")
        .header("if-none-match", "*")
        .body(Body::from("[1, 2"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mismatched_identifier_is_bad_request() {
    let app = test_app();
    let response = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-none-match", "*")],
        Some(json!({"dct:title": "x", "dct:identifier": "other"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = test_app();
    let response = send(&app, Method::GET, "/datasets/a%20b", &[], None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_with_wrong_then_current_etag() {
    let app = test_app();
    let h1 = create(&app, "abc", json!({"title": "x"})).await;
    let updated = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-match", h1.as_str())],
        Some(json!({"title": "y"})),
    )
    .await;
    let h2 = updated.etag.unwrap();

    let wrong = send(
        &app,
        Method::DELETE,
        "/datasets/abc",
        &[("if-match", "\"wrong\"")],
        None,
    )
    .await;
    assert_eq!(wrong.status, StatusCode::PRECONDITION_FAILED);

    let deleted = send(
        &app,
        Method::DELETE,
        "/datasets/abc",
        &[("if-match", h2.as_str())],
        None,
    )
    .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = send(&app, Method::GET, "/datasets/abc", &[], None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert!(gone.json()["error"].is_string());
}

#[tokio::test]
async fn test_delete_without_if_match_is_bad_request() {
    let app = test_app();
    create(&app, "abc", json!({"title": "x"})).await;

    let response = send(&app, Method::DELETE, "/datasets/abc", &[], None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.len().await, 1);
}

// =============================================================================
// Conditional reads
// =============================================================================

#[tokio::test]
async fn test_get_returns_decorated_document() {
    let app = test_app();
    let etag = create(&app, "abc", json!({"dct:title": "Bomen"})).await;

    let response = send(&app, Method::GET, "/datasets/abc", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.etag.as_deref(), Some(etag.as_str()));
    assert_eq!(response.content_type.as_deref(), Some("application/ld+json"));

    let doc = response.json();
    assert_eq!(doc["dct:title"], "Bomen");
    assert_eq!(doc["@id"], "http://catalog.test/datasets/abc");
    assert_eq!(doc["dct:identifier"], "abc");
    assert!(doc["@context"].is_object());
}

#[tokio::test]
async fn test_conditional_get_is_not_modified_until_changed() {
    let app = test_app();
    let h1 = create(&app, "abc", json!({"title": "x"})).await;

    for _ in 0..3 {
        let response = send(
            &app,
            Method::GET,
            "/datasets/abc",
            &[("if-none-match", h1.as_str())],
            None,
        )
        .await;
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert_eq!(response.etag.as_deref(), Some(h1.as_str()));
        assert!(response.body.is_empty());
    }

    send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-match", h1.as_str())],
        Some(json!({"title": "y"})),
    )
    .await;

    let response = send(
        &app,
        Method::GET,
        "/datasets/abc",
        &[("if-none-match", h1.as_str())],
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_ne!(response.etag.as_deref(), Some(h1.as_str()));
}

#[tokio::test]
async fn test_get_with_failing_if_match_is_precondition_failed() {
    let app = test_app();
    create(&app, "abc", json!({"title": "x"})).await;

    let response = send(
        &app,
        Method::GET,
        "/datasets/abc",
        &[("if-match", "\"stale\"")],
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
}

// =============================================================================
// Collection
// =============================================================================

#[tokio::test]
async fn test_post_generates_id_and_location() {
    let app = test_app();
    let response = send(
        &app,
        Method::POST,
        "/datasets",
        &[],
        Some(json!({"dct:title": "Parkeerzones"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let location = response.location.expect("Location header");
    assert!(location.starts_with("http://catalog.test/datasets/"));

    let id = location.rsplit('/').next().unwrap();
    let fetched = send(&app, Method::GET, &format!("/datasets/{}", id), &[], None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.etag, response.etag);
    assert_eq!(fetched.json()["dct:title"], "Parkeerzones");
}

#[tokio::test]
async fn test_post_uses_declared_identifier_once() {
    let app = test_app();
    let doc = json!({"dct:title": "Bomen", "dct:identifier": "bomen"});

    let first = send(&app, Method::POST, "/datasets", &[], Some(doc.clone())).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(
        first.location.as_deref(),
        Some("http://catalog.test/datasets/bomen")
    );

    let second = send(&app, Method::POST, "/datasets", &[], Some(doc)).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        second.json()["error"],
        "Document with id bomen already exists"
    );
}

#[tokio::test]
async fn test_collection_shape_without_facets() {
    let app = test_app();
    create(&app, "a", json!({"dct:title": "A", "dcat:keyword": ["k"]})).await;
    create(&app, "b", json!({"dct:title": "B"})).await;

    let response = send(&app, Method::GET, "/datasets", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));

    let body = response.json();
    assert!(body["@context"].is_object());
    let entries = body["dcat:dataset"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["dct:identifier"], "a");
    assert_eq!(entries[0]["@id"], "http://catalog.test/datasets/a");
    assert_eq!(entries[0]["dcat:keyword"], json!(["k"]));
    assert_eq!(entries[1]["dct:description"], "");
    assert!(body.get("ams:facet_info").is_none());
}

#[tokio::test]
async fn test_empty_collection() {
    let app = test_app();
    let response = send(&app, Method::GET, "/datasets", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["dcat:dataset"], json!([]));
}

#[tokio::test]
async fn test_facet_counts_do_not_depend_on_limit() {
    let app = test_app();
    create(&app, "a", json!({"title": "a", "color": "red"})).await;
    create(&app, "b", json!({"title": "b", "color": "red"})).await;
    create(&app, "c", json!({"title": "c", "color": "blue"})).await;

    let expected = json!({"/properties/color": {"red": 2, "blue": 1}});
    for limit in ["1", "1000"] {
        let uri = format!("/datasets?facet=/properties/color&limit={}", limit);
        let body = send(&app, Method::GET, &uri, &[], None).await.json();
        assert_eq!(body["ams:facet_info"], expected, "limit={}", limit);
        assert_eq!(body["void:documents"], 3);
        let returned = body["dcat:dataset"].as_array().unwrap().len();
        assert_eq!(returned, if limit == "1" { 1 } else { 3 });
    }
}

#[tokio::test]
async fn test_collection_filter_and_paging() {
    let app = test_app();
    for (id, theme) in [("a", "water"), ("b", "natuur"), ("c", "water"), ("d", "verkeer")] {
        create(&app, id, json!({"title": id, "dcat:theme": [theme]})).await;
    }

    let body = send(
        &app,
        Method::GET,
        "/datasets?/properties/dcat:theme/items=in=water,natuur&offset=1&limit=1",
        &[],
        None,
    )
    .await
    .json();
    let entries = body["dcat:dataset"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["dct:identifier"], "b");
}

#[tokio::test]
async fn test_full_text_search_ranks_title_matches() {
    let app = test_app();
    create(&app, "a", json!({"dct:title": "Bomen in Amsterdam"})).await;
    create(&app, "b", json!({"dct:title": "Parkeren", "dct:description": "bomen"})).await;
    create(&app, "c", json!({"dct:title": "Verkeer"})).await;

    let body = send(&app, Method::GET, "/datasets?q=bomen", &[], None)
        .await
        .json();
    let ids: Vec<&str> = body["dcat:dataset"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["dct:identifier"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_collection_rejects_bad_query() {
    let app = test_app();

    let bad_limit = send(&app, Method::GET, "/datasets?limit=-1", &[], None).await;
    assert_eq!(bad_limit.status, StatusCode::BAD_REQUEST);

    let bad_comparator = send(
        &app,
        Method::GET,
        "/datasets?/properties/color=xx=red",
        &[],
        None,
    )
    .await;
    assert_eq!(bad_comparator.status, StatusCode::BAD_REQUEST);

    let duplicate = send(
        &app,
        Method::GET,
        "/datasets?/properties/color=eq=red&/properties/color=eq=blue",
        &[],
        None,
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Harvest, health, OpenAPI
// =============================================================================

#[tokio::test]
async fn test_harvest_returns_full_documents() {
    let app = test_app();
    create(&app, "a", json!({"dct:title": "A", "dct:description": "full text"})).await;
    create(&app, "b", json!({"dct:title": "B"})).await;

    let response = send(&app, Method::GET, "/harvest", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("application/ld+json"));

    let body = response.json();
    assert!(body["@context"].is_object());
    let entries = body["dcat:dataset"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["dct:description"], "full text");
    assert!(entries[0].get("@context").is_none());
    assert_eq!(entries[1]["@id"], "http://catalog.test/datasets/b");
}

#[tokio::test]
async fn test_health_ok() {
    let app = test_app();
    let response = send(&app, Method::GET, "/system/health", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"dcatd systemhealth is OK");
}

#[tokio::test]
async fn test_openapi_embeds_dataset_schema() {
    let app = test_app();
    let body = send(&app, Method::GET, "/openapi", &[], None).await.json();
    assert_eq!(body["openapi"], "3.0.3");
    assert!(body["paths"]["/datasets/{id}"]["put"].is_object());
    assert!(body["components"]["schemas"]["Dataset"].is_object());

    let yaml = send(&app, Method::GET, "/openapi.yaml", &[], None).await;
    assert_eq!(yaml.status, StatusCode::OK);
    assert!(String::from_utf8(yaml.body).unwrap().contains("openapi:"));
}

// =============================================================================
// Routing and middleware
// =============================================================================

#[tokio::test]
async fn test_routes_are_mounted_under_base_url_path() {
    let app = test_app_with(&[("BASE_URL", "http://catalog.test/dcatd/")]);

    let mounted = send(&app, Method::GET, "/dcatd/system/health", &[], None).await;
    assert_eq!(mounted.status, StatusCode::OK);

    let root = send(&app, Method::GET, "/system/health", &[], None).await;
    assert_eq!(root.status, StatusCode::NOT_FOUND);

    let post = send(
        &app,
        Method::POST,
        "/dcatd/datasets",
        &[],
        Some(json!({"dct:title": "x", "dct:identifier": "x"})),
    )
    .await;
    assert_eq!(
        post.location.as_deref(),
        Some("http://catalog.test/dcatd/datasets/x")
    );
}

#[tokio::test]
async fn test_request_id_is_set_and_propagated() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/system/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/system/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let app = test_app_with(&[
        ("RATE_LIMIT_ENABLED", "true"),
        ("RATE_LIMIT_REQUESTS", "2"),
        ("RATE_LIMIT_PERIOD_SECS", "3600"),
    ]);

    for _ in 0..2 {
        let ok = send(&app, Method::GET, "/system/health", &[], None).await;
        assert_eq!(ok.status, StatusCode::OK);
    }
    let limited = send(&app, Method::GET, "/system/health", &[], None).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.json()["error"].is_string());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = test_app_with(&[("MAX_BODY_BYTES", "64")]);
    let big = "x".repeat(256);
    let response = send(
        &app,
        Method::PUT,
        "/datasets/abc",
        &[("if-none-match", "*")],
        Some(json!({"title": big})),
    )
    .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.is_empty().await);
}
