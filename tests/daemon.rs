mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{harness, QueueLlmProvider};
use yellow_tracker::client::YellowTracker;
use yellow_tracker::daemon::{build_router, AppState};

fn app(replies: &[&str]) -> axum::Router {
    let h = harness(QueueLlmProvider::replies(replies));
    build_router(AppState {
        tracker: Arc::new(YellowTracker::from_parts(h.parts)),
        token: "token".to_string(),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", "Bearer token")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-api-key", "token")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn daemon_health_and_auth() {
    let app = app(&[]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/messages/text")
                .header("content-type", "application/json")
                .body(Body::from(json!({"user_id":"u","text":"hi"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get("/welcome")).await.unwrap();
    let body = body_json(response).await;
    assert!(body["text"].as_str().unwrap().contains("Yellow Tracker"));
}

#[tokio::test]
async fn text_message_updates_holdings() {
    let reply = json!({
        "actions": [{"type": "create_activity", "data": {
            "activity_type": "buy", "ticker": "NVDA", "shares": 4, "price_per_unit": 120
        }}],
        "response": "Bought 4 NVDA."
    })
    .to_string();
    let app = app(&[&reply]);

    let response = app
        .clone()
        .oneshot(post("/messages/text", json!({"user_id": "u", "text": "bought 4 nvda at 120"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text"], "Bought 4 NVDA.");
    assert_eq!(body["status"], "structured");
    assert_eq!(body["applied"], 1);

    let body = body_json(app.clone().oneshot(get("/holdings?user_id=u")).await.unwrap()).await;
    let holdings = body["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0]["ticker"], "NVDA");
    assert_eq!(holdings[0]["shares"], "4");

    let body = body_json(app.oneshot(get("/history?user_id=u&limit=10")).await.unwrap()).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn photo_and_voice_payloads_are_base64() {
    let app = app(&["{\"response\": \"Receipt logged.\"}"]);

    let response = app
        .clone()
        .oneshot(post(
            "/messages/photo",
            json!({"user_id": "u", "image": general_purpose::STANDARD.encode([0xFF, 0xD8]), "caption": "dinner"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["text"], "Receipt logged.");

    let response = app
        .clone()
        .oneshot(post("/messages/photo", json!({"user_id": "u", "image": "%%%"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The harness has no transcriber configured.
    let response = app
        .oneshot(post(
            "/messages/voice",
            json!({"user_id": "u", "audio": general_purpose::STANDARD.encode(b"OggS")}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "transcription_failed");
}

#[tokio::test]
async fn price_endpoint_reports_quote() {
    let app = app(&[]);
    let body = body_json(
        app.oneshot(get("/price?ticker=AAPL&asset_type=stock"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["ticker"], "AAPL");
    assert_eq!(body["price"], "200");
}
