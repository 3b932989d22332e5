//! Download endpoint against mock player and media servers.

use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde_json::{Value, json};

use crate::support::{
    MEDIA_LEN, MockPlayer, config, media_payload, spawn_extraction_api, spawn_media_server,
    spawn_player, spawn_vidrelay,
};

struct DownloadFixture {
    base: String,
    player: MockPlayer,
    client: reqwest::Client,
}

impl DownloadFixture {
    async fn new() -> Self {
        let media = spawn_media_server().await;
        let player = spawn_player(&media).await;
        let api = spawn_extraction_api().await;
        let base = spawn_vidrelay(config(&player.endpoint, &format!("{api}/single_post"))).await;
        Self {
            base,
            player,
            client: reqwest::Client::new(),
        }
    }

    async fn download(&self, url: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/youtube-download", self.base))
            .json(&json!({ "url": url }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_highest_quality_encoding_is_streamed() {
    let fixture = DownloadFixture::new().await;

    let response = fixture.download("https://video.example/watch?id=abc").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"abc.mp4\""
    );
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");

    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), MEDIA_LEN);
    assert_eq!(body.as_ref(), media_payload(1080).as_slice());
    assert_eq!(fixture.player.calls(), 1);
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_resolution() {
    let fixture = DownloadFixture::new().await;

    for url in [
        "",
        "not a url",
        "https://unknown.example/watch?id=abc",
        "https://www.youtube.com/watch?v=tooshort",
    ] {
        let response = fixture.download(url).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{url:?}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    assert_eq!(fixture.player.calls(), 0);
}

#[tokio::test]
async fn test_resolution_failures_are_json_errors() {
    let fixture = DownloadFixture::new().await;

    for id in ["empty", "private", "overload", "gone"] {
        let response = fixture
            .download(&format!("https://video.example/watch?id={id}"))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{id}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string(), "{id}");
    }

    assert_eq!(fixture.player.calls(), 4);
}

#[tokio::test]
async fn test_media_failure_after_headers_truncates_body() {
    let fixture = DownloadFixture::new().await;

    let response = fixture.download("https://video.example/watch?id=broken").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Either the connection errors or fewer bytes than the full payload arrive.
    if let Ok(body) = response.bytes().await {
        assert!(body.len() < MEDIA_LEN, "body was not truncated");
    }
}

#[tokio::test]
async fn test_concurrent_downloads_are_independent() {
    let fixture = DownloadFixture::new().await;

    let requests = (0..4).map(|_| fixture.download("https://video.example/watch?id=abc"));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap().len(), MEDIA_LEN);
    }
    assert_eq!(fixture.player.calls(), 4);
}
