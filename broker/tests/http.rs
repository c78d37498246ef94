//! Credential broker integration tests.
//!
//! The broker router is exercised through tower's service interface; the
//! upstream relay credential API is stubbed with a local axum listener.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use speedmark_broker::{AppState, app};
use speedmark_common::cors::AllowList;

fn test_state(cors: &str, upstream_base: &str) -> AppState {
    AppState {
        allow_list: AllowList::parse(cors),
        upstream_base: upstream_base.to_string(),
        token_id: "test-token".to_string(),
        token_secret: "test-secret".to_string(),
        ttl_seconds: 86_400,
        http: reqwest::Client::new(),
    }
}

fn credential_request(referer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/turn-credentials").method("GET");
    if let Some(referer) = referer {
        builder = builder.header("referer", referer);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Spawn a stub upstream that answers `credentials/generate` with a fixed
/// ICE server list. Returns its base URL.
async fn spawn_stub_upstream(status: StatusCode) -> String {
    let handler = move || async move {
        let body = Json(json!({
            "iceServers": {
                "urls": [
                    "turn:relay.example:3478?transport=udp",
                    "turn:relay.example:3478?transport=tcp",
                    "turns:relay.example:5349?transport=udp",
                ],
                "username": "u",
                "credential": "c",
            }
        }));
        (status, body)
    };
    let router = Router::new().route("/{token}/credentials/generate", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn missing_referrer_is_unauthorized() {
    let appst = test_state("*", "http://unused.invalid");
    let resp = app(appst).oneshot(credential_request(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "Unauthorized");
}

#[tokio::test]
async fn unparsable_referrer_is_unauthorized() {
    let appst = test_state("*", "http://unused.invalid");
    let resp = app(appst)
        .oneshot(credential_request(Some("not a url")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unlisted_referrer_origin_is_unauthorized() {
    let appst = test_state("https://speed.example", "http://unused.invalid");
    let resp = app(appst)
        .oneshot(credential_request(Some("https://evil.example/page")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn issued_urls_are_filtered_to_udp_relay_only() {
    let upstream = spawn_stub_upstream(StatusCode::CREATED).await;
    let appst = test_state("https://speed.example", &upstream);
    let resp = app(appst)
        .oneshot(credential_request(Some("https://speed.example/index.html")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["access-control-allow-origin"].to_str().unwrap(),
        "https://speed.example"
    );

    let body = json_body(resp).await;
    assert_eq!(
        body["urls"],
        json!(["turn:relay.example:3478?transport=udp"])
    );
    assert_eq!(body["username"], "u");
    assert_eq!(body["credential"], "c");
}

#[tokio::test]
async fn wildcard_allow_list_admits_any_referrer() {
    let upstream = spawn_stub_upstream(StatusCode::CREATED).await;
    let appst = test_state("*", &upstream);
    let resp = app(appst)
        .oneshot(credential_request(Some("https://anything.example/")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_failure_is_an_opaque_500() {
    let upstream = spawn_stub_upstream(StatusCode::FORBIDDEN).await;
    let appst = test_state("*", &upstream);
    let resp = app(appst)
        .oneshot(credential_request(Some("https://speed.example/")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // No upstream detail leaks to the client.
    assert_eq!(json_body(resp).await, json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn unmatched_path_is_not_found() {
    let appst = test_state("*", "http://unused.invalid");
    let resp = app(appst)
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preflight_short_circuits() {
    let appst = test_state("*", "http://unused.invalid");
    let resp = app(appst)
        .oneshot(
            Request::builder()
                .uri("/turn-credentials")
                .method("OPTIONS")
                .header("origin", "https://speed.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers()["access-control-allow-origin"].to_str().unwrap(),
        "https://speed.example"
    );
    assert_eq!(resp.headers()["access-control-max-age"].to_str().unwrap(), "86400");
}
