//! End-to-end tests of the protocol adapter against a real on-disk store.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::BodyExt;
use md5::{Digest, Md5};
use tempfile::TempDir;
use tower::ServiceExt;

use stsv_core::Datastore;
use stsv_http::{BasicAuth, ServerConfig, StateServer};

fn test_app() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let server = StateServer::new(ServerConfig::default(), Datastore::new(tmp.path()));
    (tmp, server.router())
}

fn md5_b64(body: &[u8]) -> String {
    BASE64.encode(Md5::digest(body))
}

async fn send(app: &Router, method: &str, uri: &str, body: &[u8]) -> (StatusCode, Vec<u8>, String) {
    send_with_md5(app, method, uri, body, None).await
}

async fn send_with_md5(
    app: &Router,
    method: &str,
    uri: &str,
    body: &[u8],
    content_md5: Option<&str>,
) -> (StatusCode, Vec<u8>, String) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(digest) = content_md5 {
        request = request.header("content-md5", digest);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let response_md5 = response
        .headers()
        .get("content-md5")
        .expect("every response carries content-md5")
        .to_str()
        .unwrap()
        .to_owned();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec(), response_md5)
}

#[tokio::test]
async fn post_then_get_roundtrip() {
    let (_tmp, app) = test_app();

    let (status, _, _) =
        send_with_md5(&app, "POST", "/api/s", b"a", Some(&md5_b64(b"a"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, response_md5) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"a");
    assert_eq!(response_md5, "DMF1ucDxtqgxw5niaXcmYQ==");
}

#[tokio::test]
async fn post_with_wrong_md5_is_rejected() {
    let (_tmp, app) = test_app();
    let (status, _, _) =
        send_with_md5(&app, "POST", "/api/s", b"a", Some(&md5_b64(b"a"))).await;
    assert_eq!(status, StatusCode::OK);

    let wrong = BASE64.encode([0u8; 16]);
    let (status, _, _) = send_with_md5(&app, "POST", "/api/s", b"a", Some(&wrong)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The previous version is still live.
    let (status, body, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"a");
}

#[tokio::test]
async fn invalid_base64_md5_header_is_ignored() {
    let (_tmp, app) = test_app();
    let (status, _, _) =
        send_with_md5(&app, "POST", "/api/s", b"payload", Some("!!!not base64!!!")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"payload");
}

#[tokio::test]
async fn lock_protocol_flow() {
    let (_tmp, app) = test_app();

    let (status, _, _) = send(&app, "LOCK", "/api/s", br#"{"ID":"L1"}"#).await;
    assert_eq!(status, StatusCode::OK);

    // Second LOCK conflicts.
    let (status, _, _) = send(&app, "LOCK", "/api/s", br#"{"ID":"L2"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Writers without the right id are refused; the holder gets through.
    let (status, _, _) = send(&app, "POST", "/api/s?ID=L2", b"b").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _, _) = send(&app, "POST", "/api/s?ID=L1", b"b").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, "UNLOCK", "/api/s", br#"{"ID":"L1"}"#).await;
    assert_eq!(status, StatusCode::OK);

    // UNLOCK when nothing is held conflicts too.
    let (status, _, _) = send(&app, "UNLOCK", "/api/s", br#"{"ID":"L1"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unlock_with_wrong_id_is_refused() {
    let (_tmp, app) = test_app();
    let (status, _, _) = send(&app, "LOCK", "/api/s", br#"{"ID":"owner"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, "UNLOCK", "/api/s", br#"{"ID":"other"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The lock survives, so the holder can still release it.
    let (status, _, _) = send(&app, "UNLOCK", "/api/s", br#"{"ID":"owner"}"#).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn history_survives_writes_and_prune_spares_live() {
    let tmp = TempDir::new().unwrap();
    let server = StateServer::new(ServerConfig::default(), Datastore::new(tmp.path()));
    let app = server.router();

    for i in 0..5 {
        let body = format!("version-{i}");
        let (status, _, _) = send(&app, "POST", "/api/s", body.as_bytes()).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Inspect and prune through a second handle on the same root.
    let ds = Datastore::new(tmp.path());
    let hist = ds.history("s");
    assert!(hist.len() >= 5);
    for pair in hist.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }

    ds.prune("s", 2, false).unwrap();
    assert!(ds.history("s").len() <= 3);

    let (status, body, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"version-4");
}

#[tokio::test]
async fn rollback_restores_old_version_over_http() {
    let tmp = TempDir::new().unwrap();
    let server = StateServer::new(ServerConfig::default(), Datastore::new(tmp.path()));
    let app = server.router();

    let (status, _, _) = send(&app, "POST", "/api/s", b"v1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "POST", "/api/s", b"v2").await;
    assert_eq!(status, StatusCode::OK);

    let ds = Datastore::new(tmp.path());
    let hist = ds.history("s");
    assert_eq!(hist.len(), 2);
    let oldest = &hist[1].name;
    ds.rollback("s", oldest).unwrap();

    let (status, body, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"v1");
    assert_eq!(ds.history("s").len(), 2, "rollback keeps both versions");
}

#[tokio::test]
async fn delete_hides_state_but_keeps_history() {
    let tmp = TempDir::new().unwrap();
    let server = StateServer::new(ServerConfig::default(), Datastore::new(tmp.path()));
    let app = server.router();

    let (status, _, _) = send(&app, "POST", "/api/s", b"v1").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, "DELETE", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let ds = Datastore::new(tmp.path());
    assert!(!ds.history("s").is_empty());

    // A new POST recreates the live pointer.
    let (status, _, _) = send(&app, "POST", "/api/s", b"v2").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body, _) = send(&app, "GET", "/api/s", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"v2");
}

#[tokio::test]
async fn get_of_unknown_name_is_404_with_empty_body_md5() {
    let (_tmp, app) = test_app();
    let (status, body, response_md5) = send(&app, "GET", "/api/missing", b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
    // base64(md5("")); the header is present even for empty bodies.
    assert_eq!(response_md5, "1B2M2Y8AsgTpgAmY7PhCfg==");
}

#[tokio::test]
async fn nested_names_are_forwarded_unchanged() {
    let (_tmp, app) = test_app();
    let (status, _, _) = send(&app, "POST", "/api/project/env/state", b"deep").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body, _) = send(&app, "GET", "/api/project/env/state", b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"deep");
}

#[tokio::test]
async fn traversal_names_are_rejected() {
    let (_tmp, app) = test_app();
    let (status, _, _) = send(&app, "POST", "/api/..%2F..%2Fescape", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_method_is_internal_error() {
    let (_tmp, app) = test_app();
    let (status, body, _) = send(&app, "PATCH", "/api/s", b"ignored").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn basic_auth_guards_every_route() {
    let tmp = TempDir::new().unwrap();
    let config = ServerConfig {
        basic_auth: Some(BasicAuth::parse("operator:hunter2").unwrap()),
        ..ServerConfig::default()
    };
    let server = StateServer::new(config, Datastore::new(tmp.path()));
    let app = server.router();

    // The auth layer rejects before the adapter ever runs, so this
    // response carries no integrity headers.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/s")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let credentials = BASE64.encode("operator:hunter2");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/s")
                .header(header::AUTHORIZATION, format!("Basic {credentials}"))
                .body(Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn html_index_and_view_render() {
    let (_tmp, app) = test_app();
    let (status, _, _) = send(&app, "POST", "/api/s", br#"{"version": 4}"#).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/html/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("/html/view/s"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/html/view/s")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("&quot;version&quot;"));
    assert!(text.contains("(current)"));

    // The UI is read-only.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/html/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn html_view_of_missing_blob_is_404() {
    let (_tmp, app) = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/html/view/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
