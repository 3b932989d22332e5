//! `PlayerApiResolver` and `HttpSourceOpener` against mock servers.

use tokio_util::sync::CancellationToken;
use vidrelay_core::config::ResolverConfig;
use vidrelay_core::relay::{HttpSourceOpener, RelayOptions, WriterSink, relay};
use vidrelay_core::selection::select_highest;
use vidrelay_core::source::{ManifestResolver, PlayerApiResolver, ResolutionError, UrlValidator};

use crate::support::{MEDIA_LEN, config, media_payload, spawn_media_server, spawn_player};

async fn resolver() -> (PlayerApiResolver, crate::support::MockPlayer) {
    let media = spawn_media_server().await;
    let player = spawn_player(&media).await;
    let resolver = PlayerApiResolver::new(ResolverConfig {
        player_endpoint: player.endpoint.clone(),
        ..ResolverConfig::default()
    })
    .unwrap();
    (resolver, player)
}

fn video(id: &str) -> vidrelay_core::VideoUrl {
    UrlValidator::with_extra_hosts(["video.example"])
        .parse(&format!("https://video.example/watch?id={id}"))
        .unwrap()
}

#[tokio::test]
async fn test_manifest_lists_every_direct_format() {
    let (resolver, player) = resolver().await;

    let manifest = resolver
        .resolve(&video("abc"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.title(), Some("Mock clip"));
    let ranks: Vec<u32> = manifest.encodings().iter().map(|e| e.quality_rank).collect();
    assert_eq!(ranks, vec![480, 1080]);
    assert!(manifest.encodings().iter().all(|e| e.has_video && e.has_audio));
    assert_eq!(player.calls(), 1);
}

#[tokio::test]
async fn test_failures_map_to_resolution_errors() {
    let (resolver, _player) = resolver().await;
    let cancel = CancellationToken::new();

    assert_eq!(
        resolver.resolve(&video("empty"), &cancel).await,
        Err(ResolutionError::EmptyManifest)
    );
    assert_eq!(
        resolver.resolve(&video("private"), &cancel).await,
        Err(ResolutionError::Unsupported("This video is private".to_string()))
    );
    assert!(matches!(
        resolver.resolve(&video("overload"), &cancel).await,
        Err(ResolutionError::Unreachable(_))
    ));
    assert!(matches!(
        resolver.resolve(&video("unknown"), &cancel).await,
        Err(ResolutionError::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_unreachable_player_endpoint() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let resolver = PlayerApiResolver::new(ResolverConfig {
        player_endpoint: format!("http://{addr}/player"),
        ..ResolverConfig::default()
    })
    .unwrap();

    assert!(matches!(
        resolver.resolve(&video("abc"), &CancellationToken::new()).await,
        Err(ResolutionError::Unreachable(_))
    ));
}

#[tokio::test]
async fn test_resolved_encoding_relays_to_file() {
    let (resolver, _player) = resolver().await;
    let manifest = resolver
        .resolve(&video("abc"), &CancellationToken::new())
        .await
        .unwrap();
    let selected = select_highest(&manifest);

    let settings = config("http://127.0.0.1:9/player", "http://127.0.0.1:9/single_post");
    let opener = HttpSourceOpener::new(&settings.relay).unwrap();
    let dir = std::env::temp_dir().join(format!("vidrelay-it-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("abc.mp4");
    let file = tokio::fs::File::create(&path).await.unwrap();

    let report = relay(
        &selected,
        &opener,
        WriterSink::new(file),
        &RelayOptions::from(&settings.relay),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.bytes_written, MEDIA_LEN as u64);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), media_payload(1080));
    tokio::fs::remove_dir_all(&dir).await.ok();
}
