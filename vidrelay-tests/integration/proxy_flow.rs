//! Proxy endpoint against a mock extraction API.

use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::support::{config, spawn_extraction_api, spawn_vidrelay};

async fn post_proxy(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/youtube"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_remote_json_is_passed_through() {
    let api = spawn_extraction_api().await;
    let base = spawn_vidrelay(config(
        "http://127.0.0.1:9/player",
        &format!("{api}/single_post"),
    ))
    .await;

    let response = post_proxy(&base, json!({"url": "https://youtu.be/dQw4w9WgXcQ"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["medias"][0]["resource_url"], "https://cdn.example/v.mp4");
    assert_eq!(
        body["received"],
        json!({
            "userId": "test-user",
            "secretKey": "test-secret",
            "url": "https://youtu.be/dQw4w9WgXcQ"
        })
    );
}

#[tokio::test]
async fn test_upstream_503_becomes_500_with_upstream_text() {
    let api = spawn_extraction_api().await;
    let base = spawn_vidrelay(config("http://127.0.0.1:9/player", &format!("{api}/down"))).await;

    let response = post_proxy(&base, json!({"url": "https://youtu.be/dQw4w9WgXcQ"})).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("503"), "unexpected error text: {message}");
}

#[tokio::test]
async fn test_upstream_text_can_be_withheld() {
    let api = spawn_extraction_api().await;
    let mut config = config("http://127.0.0.1:9/player", &format!("{api}/down"));
    config.forwarder.expose_upstream_errors = false;
    let base = spawn_vidrelay(config).await;

    let response = post_proxy(&base, json!({"url": "https://youtu.be/dQw4w9WgXcQ"})).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(!body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_missing_url_is_bad_request() {
    let api = spawn_extraction_api().await;
    let base = spawn_vidrelay(config(
        "http://127.0.0.1:9/player",
        &format!("{api}/single_post"),
    ))
    .await;

    let response = post_proxy(&base, json!({"link": "https://youtu.be/x"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_cors() {
    let api = spawn_extraction_api().await;
    let base = spawn_vidrelay(config(
        "http://127.0.0.1:9/player",
        &format!("{api}/single_post"),
    ))
    .await;

    let response = reqwest::Client::new()
        .get(format!("{base}/api/health"))
        .header("Origin", "https://ui.example")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
