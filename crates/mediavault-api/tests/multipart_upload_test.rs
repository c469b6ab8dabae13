//! Multipart upload coordinator integration tests.
//!
//! Run with: `cargo test -p mediavault-api --test multipart_upload_test`

mod helpers;

use axum_test::TestServer;
use helpers::{api_path, setup_multipart_test_app, setup_test_app};
use mediavault_storage::Storage;
use serde_json::{json, Value};

const GIB: u64 = 1024 * 1024 * 1024;

async fn initiate(
    client: &TestServer,
    part_count: u32,
    total_size: u64,
) -> axum_test::TestResponse {
    client
        .post(&api_path("/uploads/multipart/init"))
        .json(&json!({
            "type": "video",
            "targetId": "c7",
            "filename": "feature.mov",
            "totalSize": total_size,
            "partCount": part_count,
        }))
        .await
}

#[tokio::test]
async fn test_initiate_issues_one_url_per_part() {
    let app = setup_multipart_test_app().await;

    let response = initiate(app.client(), 3, 300 * 1024 * 1024).await;

    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["storagePath"], "videos/c7/feature.mov");
    assert!(body["uploadId"].as_str().is_some_and(|id| !id.is_empty()));

    let urls = body["partUrls"].as_array().unwrap();
    assert_eq!(urls.len(), 3);
    for (i, part) in urls.iter().enumerate() {
        assert_eq!(part["partNumber"], (i + 1) as u64);
        assert!(part["url"].as_str().unwrap().contains(&format!("partNumber={}", i + 1)));
    }
}

#[tokio::test]
async fn test_initiate_limits() {
    let app = setup_multipart_test_app().await;

    assert_eq!(initiate(app.client(), 0, GIB).await.status_code(), 400);
    assert_eq!(initiate(app.client(), 10_001, GIB).await.status_code(), 400);
    assert_eq!(initiate(app.client(), 10_000, GIB).await.status_code(), 200);

    let too_big = initiate(app.client(), 10, 2 * GIB + 1).await;
    assert_eq!(too_big.status_code(), 413);
    assert_eq!(too_big.json::<Value>()["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_complete_stitches_parts_in_order_and_updates_catalog() {
    let app = setup_multipart_test_app().await;
    let client = app.client();

    let body = initiate(client, 3, 1024).await.json::<Value>();
    let upload_id = body["uploadId"].as_str().unwrap();
    let path = body["storagePath"].as_str().unwrap();

    let response = client
        .post(&api_path("/uploads/multipart/complete"))
        .json(&json!({
            "uploadId": upload_id,
            "storagePath": path,
            "parts": [
                { "partNumber": 3, "etag": "C" },
                { "partNumber": 1, "etag": "A" },
                { "partNumber": 2, "etag": "B" },
            ],
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["path"], "videos/c7/feature.mov");

    let stored = app.storage.download("videos/c7/feature.mov").await.unwrap();
    assert_eq!(stored.as_ref(), b"ABC");

    let updates = app.catalog.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].entity_id, "c7");
    assert_eq!(updates[0].field, "video_path");
}

#[tokio::test]
async fn test_complete_rejects_bad_part_lists() {
    let app = setup_multipart_test_app().await;
    let client = app.client();

    let body = initiate(client, 2, 1024).await.json::<Value>();
    let upload_id = body["uploadId"].as_str().unwrap();
    let path = body["storagePath"].as_str().unwrap();

    let bad_parts = [
        json!([]),
        json!([{ "partNumber": 1, "etag": "A" }, { "partNumber": 1, "etag": "B" }]),
        json!([{ "partNumber": 0, "etag": "A" }]),
        json!([{ "partNumber": 10001, "etag": "A" }]),
        json!([{ "partNumber": 1, "etag": "" }]),
    ];

    for parts in bad_parts {
        let response = client
            .post(&api_path("/uploads/multipart/complete"))
            .json(&json!({ "uploadId": upload_id, "storagePath": path, "parts": parts }))
            .await;
        assert_eq!(response.status_code(), 400, "parts {}", parts);
    }

    assert!(app.catalog.updates().is_empty());
}

#[tokio::test]
async fn test_abort_is_idempotent() {
    let app = setup_multipart_test_app().await;
    let client = app.client();

    let body = initiate(client, 2, 1024).await.json::<Value>();
    let request = json!({
        "uploadId": body["uploadId"],
        "storagePath": body["storagePath"],
    });

    for _ in 0..2 {
        let response = client
            .post(&api_path("/uploads/multipart/abort"))
            .json(&request)
            .await;
        assert_eq!(response.status_code(), 200);
    }

    // Parts of an aborted upload can no longer be completed.
    let response = client
        .post(&api_path("/uploads/multipart/complete"))
        .json(&json!({
            "uploadId": body["uploadId"],
            "storagePath": body["storagePath"],
            "parts": [{ "partNumber": 1, "etag": "A" }],
        }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_local_backend_points_to_chunked_upload() {
    let app = setup_test_app().await;

    let response = initiate(app.client(), 2, 1024).await;

    assert_eq!(response.status_code(), 400);
    let body = response.json::<Value>();
    assert!(body["error"].as_str().unwrap().contains("chunked upload"));
}
