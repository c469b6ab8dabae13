//! Transcode route integration tests. The encoder is a stub that counts invocations.
//!
//! Run with: `cargo test -p mediavault-api --test transcode_test`

mod helpers;

use helpers::fakes::TRANSCODED_BYTES;
use helpers::{api_path, setup_test_app};
use mediavault_storage::Storage;
use serde_json::Value;

#[tokio::test]
async fn test_miss_encodes_then_hit_skips_encoder() {
    let app = setup_test_app().await;
    app.put_object("videos/c3/raw.mkv", b"matroska bytes").await;

    let first = app.client().get(&api_path("/transcode/videos/c3/raw.mkv")).await;
    assert_eq!(first.status_code(), 200);
    let body = first.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["cached"], false);
    assert_eq!(body["path"], "transcoded/videos/c3/raw.mkv.mp4");
    assert!(body["url"]
        .as_str()
        .unwrap()
        .ends_with("transcoded/videos/c3/raw.mkv.mp4"));

    let stored = app
        .storage
        .download("transcoded/videos/c3/raw.mkv.mp4")
        .await
        .unwrap();
    assert_eq!(stored.as_ref(), TRANSCODED_BYTES);

    let second = app.client().get(&api_path("/transcode/videos/c3/raw.mkv")).await;
    assert_eq!(second.json::<Value>()["cached"], true);
    assert_eq!(app.transcoder.calls(), 1);

    let updates = app.catalog.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].entity_id, "c3");
    assert_eq!(updates[0].field, "transcoded_path");
    assert_eq!(updates[0].path, "transcoded/videos/c3/raw.mkv.mp4");
}

#[tokio::test]
async fn test_concurrent_requests_encode_once() {
    let app = setup_test_app().await;
    app.put_object("videos/c4/raw.avi", b"avi bytes").await;

    let path = api_path("/transcode/videos/c4/raw.avi");
    let (a, b) = tokio::join!(app.client().get(&path), app.client().get(&path));

    assert_eq!(a.status_code(), 200);
    assert_eq!(b.status_code(), 200);
    assert_eq!(app.transcoder.calls(), 1);
}

#[tokio::test]
async fn test_playable_source_is_served_directly() {
    let app = setup_test_app().await;
    app.put_object("videos/c5/ready.mp4", b"mp4 bytes").await;

    let response = app.client().get(&api_path("/transcode/videos/c5/ready.mp4")).await;

    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["path"], "videos/c5/ready.mp4");
    assert_eq!(body["cached"], false);
    assert_eq!(app.transcoder.calls(), 0);
    assert!(app.catalog.updates().is_empty());
}

#[tokio::test]
async fn test_missing_source_is_404() {
    let app = setup_test_app().await;

    let response = app.client().get(&api_path("/transcode/videos/none/gone.mkv")).await;

    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["success"], false);
    assert_eq!(app.transcoder.calls(), 0);
}
