//! End-to-end properties of a photo session over an in-memory row store.

use futures_util::future::join_all;
use image::ImageFormat;
use photodb_cache::WriterState;
use photodb_retrieval::{PhotoSession, PixelBuffer, RetrievalError, SessionConfig};
use photodb_source::{BlobSource, MemoryRowSource, RowData};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn encoded_image(w: u32, h: u32, seed: u8, format: ImageFormat) -> Vec<u8> {
    let img = PixelBuffer::ImageRgb8(image::RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([seed.wrapping_add(x as u8), seed.wrapping_mul(2).wrapping_add(y as u8), seed])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn png(w: u32, h: u32, seed: u8) -> Vec<u8> {
    encoded_image(w, h, seed, ImageFormat::Png)
}

async fn session_in(dir: &Path) -> PhotoSession<MemoryRowSource> {
    // Small chunks so streams span many chunks even for test-sized images
    let source = MemoryRowSource::with_default_schema().with_chunk_size(512);
    PhotoSession::connect(source, SessionConfig::with_cache_dir(dir.join("cache")))
        .await
        .unwrap()
}

fn raw_pixels(img: &PixelBuffer) -> Vec<u8> {
    img.to_rgb8().into_raw()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_of_distinct_keys_do_not_cross_write() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    let first = png(96, 48, 3);
    let second = png(48, 96, 200);
    session
        .insert_photo("1", "a.png", first.clone(), HashMap::new())
        .await
        .unwrap();
    session
        .insert_photo("2", "b.png", second.clone(), HashMap::new())
        .await
        .unwrap();

    let (img_a, img_b) = tokio::join!(session.photo("1"), session.photo("2"));
    img_a.unwrap();
    img_b.unwrap();
    session.wait_for_writers().await;

    // Each destination holds exactly its own upload, byte for byte
    assert_eq!(
        std::fs::read(session.cache_dir().join("a.png")).unwrap(),
        first
    );
    assert_eq!(
        std::fs::read(session.cache_dir().join("b.png")).unwrap(),
        second
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_spawn_exactly_one_writer() {
    let dir = tempdir().unwrap();
    let session = Arc::new(session_in(dir.path()).await);
    session
        .insert_photo("1", "a.png", png(64, 64, 9), HashMap::new())
        .await
        .unwrap();

    let calls = (0..8).map(|_| {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.photo("1").await.map(|img| (img.width(), img.height())) })
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap().unwrap(), (64, 64));
    }

    session.wait_for_writers().await;
    assert_eq!(session.stats().writers_spawned, 1);
}

#[tokio::test]
async fn repeated_reads_after_done_are_identical_and_spawn_nothing() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    session
        .insert_photo("1", "a.png", png(80, 40, 77), HashMap::new())
        .await
        .unwrap();

    let first = session.photo("1").await.unwrap();
    session.wait_for_writers().await;
    assert_eq!(session.stats().writers_spawned, 1);

    let second = session.photo("1").await.unwrap();
    let third = session.photo("1").await.unwrap();
    assert_eq!(raw_pixels(&first), raw_pixels(&second));
    assert_eq!(raw_pixels(&second), raw_pixels(&third));
    assert_eq!(session.stats().writers_spawned, 1);
}

#[tokio::test]
async fn round_trip_preserves_sizes_and_bytes() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    let upload = encoded_image(128, 64, 21, ImageFormat::Jpeg);
    session
        .insert_photo("1", "a.jpg", upload.clone(), HashMap::new())
        .await
        .unwrap();

    // Thumbnail short side is exactly 64, aspect preserved
    let thumbs = session.photo_thumbnails().await.unwrap();
    assert_eq!(thumbs.len(), 1);
    assert_eq!((thumbs[0].width(), thumbs[0].height()), (128, 64));

    // Full image comes back at its original size
    let img = session.photo("1").await.unwrap();
    assert_eq!((img.width(), img.height()), (128, 64));

    // And its cached file is byte-identical to the upload
    session.wait_for_writers().await;
    assert_eq!(
        std::fs::read(session.cache_dir().join("a.jpg")).unwrap(),
        upload
    );
}

#[tokio::test]
async fn bulk_retrieval_materializes_every_row_before_returning() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    let uploads = [png(32, 32, 1), png(40, 20, 2), png(20, 40, 3)];
    for (i, bytes) in uploads.iter().enumerate() {
        session
            .insert_photo(
                &i.to_string(),
                &format!("photo-{}.png", i),
                bytes.clone(),
                HashMap::new(),
            )
            .await
            .unwrap();
    }

    session.retrieve_photos().await.unwrap();

    let paths = session.retrieved_photo_paths();
    assert_eq!(paths.len(), 3);
    for (path, upload) in paths.iter().zip(&uploads) {
        let on_disk = std::fs::read(path).unwrap();
        assert!(!on_disk.is_empty());
        assert_eq!(&on_disk, upload);
    }

    // No partial file is left visible anywhere in the cache directory
    for entry in std::fs::read_dir(session.cache_dir()).unwrap() {
        let name = entry.unwrap().file_name();
        assert!(!name.to_string_lossy().ends_with(".partial"));
    }

    // And the materialized set decodes in row order
    let photos = session.retrieved_photos().await.unwrap();
    assert_eq!(photos.len(), 3);
    assert_eq!((photos[1].width(), photos[1].height()), (40, 20));
}

#[tokio::test]
async fn bulk_retrieval_reports_the_failing_row_index() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    session
        .insert_photo("0", "ok-0.png", png(16, 16, 4), HashMap::new())
        .await
        .unwrap();
    // Row with no image payload: its binary open fails
    session
        .source()
        .insert_row(RowData {
            key: "1".to_string(),
            filename: "broken.png".to_string(),
            properties: HashMap::new(),
            binaries: Vec::new(),
        })
        .await
        .unwrap();
    session
        .insert_photo("2", "ok-2.png", png(16, 16, 5), HashMap::new())
        .await
        .unwrap();

    let err = session.retrieve_photos().await.unwrap_err();
    match err {
        RetrievalError::BulkRow(index, _) => assert_eq!(index, 1),
        other => panic!("expected BulkRow, got {}", other),
    }
    // The aborted bulk call publishes no partial set
    assert!(session.retrieved_photo_paths().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_tears_down_directory_store_and_writers() {
    let dir = tempdir().unwrap();
    let session = session_in(dir.path()).await;
    for (key, name) in [("1", "a.png"), ("2", "b.png")] {
        session
            .insert_photo(key, name, png(64, 64, 11), HashMap::new())
            .await
            .unwrap();
    }

    session.retrieve_photos().await.unwrap();
    // A lazy fetch of a row outside the bulk set, so close() has a store
    // entry and a background writer to reap; deliberately not awaited
    session
        .insert_photo("3", "c.png", png(64, 64, 12), HashMap::new())
        .await
        .unwrap();
    session.photo("3").await.unwrap();

    session.close().await.unwrap();

    assert!(!session.cache_dir().exists());
    assert_eq!(session.stats().entries, 0);
    assert!(session
        .writer_states()
        .iter()
        .all(|state| *state == WriterState::Killed));

    // Closing an already-closed session is a no-op
    session.close().await.unwrap();
}
