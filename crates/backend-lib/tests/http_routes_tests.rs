//! REST routes exercised through the router with `tower::ServiceExt::oneshot`.

mod test_utils;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use backend_lib::{
    config::{RateLimitSettings, Settings},
    ws_router, AppState,
};
use roomsync_common::UserId;
use serde_json::{json, Value};
use test_utils::{configured, TestClient};
use tower::ServiceExt;

fn setup(settings: Settings) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(settings));
    let router = ws_router::create_router(state.clone());
    (state, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-real-ip", "127.0.0.1")
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-real-ip", "127.0.0.1")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_list_users() {
    let (state, router) = setup(Settings::default());
    let _a = configured(&state.coordinator, "a", "web");
    let _b = configured(&state.coordinator, "b", "ios");

    let (status, body) = send(&router, get("/socket/users")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["clients"].as_array().unwrap().len(), 2);

    let (status, body) = send(&router, get("/socket/users/web")).await;
    assert_eq!(status, StatusCode::OK);
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["name"], "a");
    assert_eq!(clients[0]["platform"], "web");
}

#[tokio::test]
async fn test_alert_reaches_every_connection() {
    let (state, router) = setup(Settings::default());
    let mut a = configured(&state.coordinator, "a", "web");
    let mut b = configured(&state.coordinator, "b", "ios");
    a.drain();

    let (status, body) = send(
        &router,
        post("/socket/alert", json!({"platform": "web", "message": "maintenance"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["message"], "maintenance");

    for client in [&mut a, &mut b] {
        let alerts = client.drain_event("alert-web");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].payload["message"], "maintenance");
    }
}

#[tokio::test]
async fn test_alert_without_platform_is_rejected() {
    let (_state, router) = setup(Settings::default());

    let (status, body) = send(&router, post("/socket/alert", json!({"message": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_notification_targets_matching_users() {
    let (state, router) = setup(Settings::default());
    let mut target = test_utils::connect(&state.coordinator);
    state
        .coordinator
        .configure_user(
            target.id,
            Some("t".into()),
            Some(UserId::Number(42)),
            Some("web".into()),
        )
        .unwrap();
    let mut bystander: TestClient = configured(&state.coordinator, "b", "web");
    target.drain();

    let (status, body) = send(
        &router,
        post(
            "/socket/notification",
            json!({"userIds": ["42"], "notification": {"title": "hi"}, "platform": "web"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["senders"].as_array().unwrap().len(), 1);
    assert_eq!(body["notification"]["title"], "hi");

    let pushed = target.drain_event("notifications");
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].payload["title"], "hi");
    assert!(bystander.drain_event("notifications").is_empty());
}

#[tokio::test]
async fn test_notification_without_sockets_is_not_found() {
    let (_state, router) = setup(Settings::default());

    let (status, body) = send(
        &router,
        post(
            "/socket/notification",
            json!({"userIds": [1], "notification": "x", "platform": "web"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "NO_ACTIVE_SOCKETS");
}

#[tokio::test]
async fn test_healthz() {
    let (state, router) = setup(Settings::default());
    let _a = configured(&state.coordinator, "a", "web");

    let (status, body) = send(&router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"], 1);
    assert_eq!(body["rooms"], 0);
}

#[tokio::test]
async fn test_socket_routes_are_rate_limited() {
    let settings = Settings {
        rate_limit: RateLimitSettings {
            max_requests: 2,
            window_secs: 60,
        },
        ..Settings::default()
    };
    let (_state, router) = setup(settings);

    for _ in 0..2 {
        let (status, _) = send(&router, get("/socket/users")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&router, get("/socket/users")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // health checks are not limited
    let (status, _) = send(&router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}
