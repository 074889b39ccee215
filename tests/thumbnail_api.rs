mod common;

use std::sync::Arc;

use common::{MockFileIndex, TEST_TOKEN, TestDirs, spawn_app, test_image, thumbnail_url};
use image::{GenericImageView, ImageFormat};
use reqwest::StatusCode;
use thumbkeep::services::fallback::Placeholder;

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn fit_keeps_aspect_ratio_and_serves_jpeg() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("abc.jpg", &test_image(800, 600, ImageFormat::Jpeg));
    index.register(&dirs.originals, "abc.jpg");
    let address = spawn_app(dirs.config(), index).await;

    let response = reqwest::get(thumbnail_url(
        &address,
        TEST_TOKEN,
        "abc.jpg",
        "w=300&h=300&flags=fit",
    ))
    .await
    .expect("Failed to fetch thumbnail");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("image/jpeg"));

    let bytes = response.bytes().await.unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    let (width, height) = image::load_from_memory(&bytes).unwrap().dimensions();
    assert_eq!((width, height), (300, 225));
}

#[tokio::test]
async fn fill_center_png_is_exactly_the_requested_box() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("2024/trip/abc.jpg", &test_image(800, 600, ImageFormat::Jpeg));
    index.register(&dirs.originals, "2024/trip/abc.jpg");
    let address = spawn_app(dirs.config(), index).await;

    let response = reqwest::get(thumbnail_url(
        &address,
        TEST_TOKEN,
        "2024/trip/abc.jpg",
        "w=100&h=100&flags=center,png",
    ))
    .await
    .expect("Failed to fetch thumbnail");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("image/png"));

    let bytes = response.bytes().await.unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    assert_eq!(
        image::load_from_memory(&bytes).unwrap().dimensions(),
        (100, 100)
    );
}

#[tokio::test]
async fn deleted_source_gets_broken_placeholder_and_is_flagged() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    let path = dirs.write_original("gone.jpg", &test_image(64, 64, ImageFormat::Jpeg));
    index.register(&dirs.originals, "gone.jpg");
    std::fs::remove_file(path).unwrap();
    let address = spawn_app(dirs.config(), index.clone()).await;

    let response = reqwest::get(thumbnail_url(&address, TEST_TOKEN, "gone.jpg", "w=50&h=50"))
        .await
        .expect("Failed to fetch thumbnail");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(content_type(&response).as_deref(), Some("image/svg+xml"));
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        Placeholder::BROKEN_FILE.bytes
    );
    assert!(index.wait_marked_missing("gone.jpg").await);
}

#[tokio::test]
async fn unknown_file_id_is_not_found() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    let address = spawn_app(dirs.config(), index.clone()).await;

    let response = reqwest::get(thumbnail_url(&address, TEST_TOKEN, "nope.jpg", "w=50&h=50"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(index.wait_marked_missing("nope.jpg").await);
}

#[tokio::test]
async fn wrong_token_gets_generic_placeholder() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("abc.jpg", &test_image(64, 64, ImageFormat::Jpeg));
    index.register(&dirs.originals, "abc.jpg");
    let address = spawn_app(dirs.config(), index.clone()).await;

    let response = reqwest::get(thumbnail_url(&address, "guess", "abc.jpg", "w=50&h=50"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        Placeholder::GENERIC_PHOTO.bytes
    );
    assert!(index.marked_missing().is_empty());
}

#[tokio::test]
async fn invalid_dimensions_are_bad_requests() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("abc.jpg", &test_image(64, 64, ImageFormat::Jpeg));
    index.register(&dirs.originals, "abc.jpg");
    let address = spawn_app(dirs.config(), index).await;

    // max_pixels is 1_000_000 in the test config
    for query in ["w=0&h=100", "w=100&h=0", "w=2000&h=2000", "w=abc&h=10", "h=10"] {
        let response = reqwest::get(thumbnail_url(&address, TEST_TOKEN, "abc.jpg", query))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(content_type(&response).as_deref(), Some("image/svg+xml"));
    }
}

#[tokio::test]
async fn corrupt_source_is_unprocessable() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("bad.jpg", b"this is not a jpeg");
    index.register(&dirs.originals, "bad.jpg");
    let address = spawn_app(dirs.config(), index.clone()).await;

    let response = reqwest::get(thumbnail_url(&address, TEST_TOKEN, "bad.jpg", "w=50&h=50"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        Placeholder::BROKEN_FILE.bytes
    );
    assert!(index.marked_missing().is_empty());
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let dirs = TestDirs::new();
    let index = Arc::new(MockFileIndex::new());
    dirs.write_original("abc.jpg", &test_image(320, 240, ImageFormat::Jpeg));
    index.register(&dirs.originals, "abc.jpg");
    let address = spawn_app(dirs.config(), index).await;
    let url = thumbnail_url(&address, TEST_TOKEN, "abc.jpg", "w=64&h=64&flags=left,png");

    let first = reqwest::get(&url).await.unwrap().bytes().await.unwrap();

    // Originals are no longer needed once the thumbnail exists
    std::fs::remove_file(dirs.originals.join("abc.jpg")).unwrap();
    let second = reqwest::get(&url).await.unwrap();

    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.bytes().await.unwrap(), first);
}
