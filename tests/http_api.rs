mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use common::harness;
use social_graph::services::friendship_service::FriendshipManager;
use social_graph::services::identity_change_service::{IdentityChangeManager, VerificationSettings};
use social_graph::web::{self, AppState};

async fn app() -> Router {
    let h = harness().await;
    let settings = VerificationSettings {
        otp_max_attempts: 3,
        otp_ttl: chrono::Duration::minutes(10),
        token_ttl: chrono::Duration::hours(1),
        admin_alert_email: None,
    };
    web::router(AppState {
        pool: h.pool.clone(),
        friendships: Arc::new(FriendshipManager::new(h.pool.clone(), h.notifier.clone())),
        identity: Arc::new(IdentityChangeManager::new(
            h.pool.clone(),
            h.notifier.clone(),
            h.delivery.clone(),
            settings,
        )),
    })
}

fn bearer(user_id: &str) -> String {
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}"}}"#, user_id));
    format!("Bearer hdr.{}.sig", payload)
}

async fn send(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", bearer(user));
    }
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn friendship_routes_map_error_kinds_to_status_codes() {
    let app = app().await;

    let (status, _) = send(&app, "GET", "/api/friendships", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = send(
        &app,
        "POST",
        "/api/friendships",
        Some("alice"),
        Some(serde_json::json!({ "friend_id": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/friendships",
        Some("bob"),
        Some(serde_json::json!({ "friend_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let respond = format!("/api/friendships/{}/respond", id);
    let (status, body) = send(
        &app,
        "POST",
        &respond,
        Some("alice"),
        Some(serde_json::json!({ "decision": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = send(
        &app,
        "POST",
        &respond,
        Some("bob"),
        Some(serde_json::json!({ "decision": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert!(!body["accepted_at"].is_null());

    let (status, friends) = send(&app, "GET", "/api/friendships", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(friends[0]["friend_id"], "bob");
}

#[tokio::test]
async fn identity_routes_reject_bad_input() {
    let app = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/identity/gender-changes",
        Some("alice"),
        Some(serde_json::json!({ "requested_gender": "robot" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid");

    let (status, created) = send(
        &app,
        "POST",
        "/api/identity/gender-changes",
        Some("alice"),
        Some(serde_json::json!({ "requested_gender": "male" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created.get("verification_token").is_none());

    let (status, _) = send(&app, "GET", "/identity/confirm-email?token=nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/admin/alerts", Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
