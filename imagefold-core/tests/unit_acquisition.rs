//! Unit tests for dataset acquisition
//!
//! Serves archives from an in-process HTTP server and runs the full
//! download, extract, delete sequence against it.

use std::io::{Cursor, Write};
use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use imagefold_core::acquire::{acquire, acquire_if_missing, Acquirer, AcquisitionConfig};
use imagefold_core::data::{load_default, Split};
use imagefold_core::ImageFoldError;
use zip::write::FileOptions;
use zip::ZipWriter;

fn png_bytes() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(32, 24, Rgb([10, 120, 240]))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// `fowl_data/{train,val}/{chicken,turkey}/...`, root folder listed first
fn fowl_archive() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    let png = png_bytes();

    zip.add_directory("fowl_data/", options).unwrap();
    for (split, class, count) in [
        ("train", "chicken", 2),
        ("train", "turkey", 3),
        ("val", "chicken", 1),
        ("val", "turkey", 1),
    ] {
        zip.add_directory(format!("fowl_data/{split}/{class}/"), options)
            .unwrap();
        for i in 0..count {
            zip.start_file(format!("fowl_data/{split}/{class}/{i}.png"), options)
                .unwrap();
            zip.write_all(&png).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Archive whose first entry is a loose file
fn flat_archive() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    zip.start_file("README.txt", options).unwrap();
    zip.write_all(b"fowl images").unwrap();
    zip.add_directory("fowl_data/", options).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Start a server on an ephemeral port
async fn serve() -> SocketAddr {
    let fowl = fowl_archive();
    let flat = flat_archive();
    let app = Router::new()
        .route(
            "/fowl_data.zip",
            get(move || {
                let body = fowl.clone();
                async move { body }
            }),
        )
        .route(
            "/flat.zip",
            get(move || {
                let body = flat.clone();
                async move { body }
            }),
        )
        .route("/not_a_zip.zip", get(|| async { "<html>oops</html>" }))
        .route(
            "/broken.zip",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr, name: &str, dir: &std::path::Path) -> AcquisitionConfig {
    AcquisitionConfig::new(
        format!("http://{addr}/{name}"),
        dir.join("downloads").join(name),
        dir.join("data"),
    )
}

#[tokio::test]
async fn test_acquire_returns_archive_root_and_deletes_archive() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();
    let config = config(addr, "fowl_data.zip", tmp.path());

    let dataset_dir = acquire(&config).await.unwrap();

    assert_eq!(dataset_dir, tmp.path().join("data/fowl_data"));
    assert!(!config.archive_path.exists());
    assert!(dataset_dir.join("train/turkey/2.png").is_file());

    let data = load_default(&dataset_dir).unwrap();
    assert_eq!(data.class_names, vec!["chicken", "turkey"]);
    assert_eq!(data.size(Split::Train), 5);
    assert_eq!(data.size(Split::Val), 2);
}

#[tokio::test]
async fn test_report_carries_checksum() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();
    let archive = fowl_archive();
    let expected = crc32c::crc32c(&archive);

    let config = config(addr, "fowl_data.zip", tmp.path())
        .with_checksum(expected)
        .with_expected_root("fowl_data");
    let report = Acquirer::new(config).unwrap().acquire().await.unwrap();

    assert_eq!(report.archive_bytes, archive.len() as u64);
    assert_eq!(report.archive_crc32c, expected);
    assert_eq!(report.entries, 1 + 4 + 7);
}

#[tokio::test]
async fn test_checksum_mismatch_stops_before_extraction() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();
    let config = config(addr, "fowl_data.zip", tmp.path()).with_checksum(0xdead_beef);

    let err = acquire(&config).await.unwrap_err();
    assert!(matches!(err, ImageFoldError::Acquisition { ref message, .. } if message.contains("checksum")));
    assert!(config.archive_path.exists());
    assert!(!tmp.path().join("data/fowl_data").exists());
}

#[tokio::test]
async fn test_http_errors_are_acquisition_errors() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();

    for name in ["missing.zip", "broken.zip"] {
        let err = acquire(&config(addr, name, tmp.path())).await.unwrap_err();
        match err {
            ImageFoldError::Acquisition { url, .. } => assert!(url.ends_with(name)),
            other => panic!("expected Acquisition for {name}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_non_archive_is_extraction_error_and_archive_kept() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();
    let config = config(addr, "not_a_zip.zip", tmp.path());

    let err = acquire(&config).await.unwrap_err();
    assert!(matches!(err, ImageFoldError::Extraction { .. }), "{err:?}");
    assert!(config.archive_path.exists());
}

#[tokio::test]
async fn test_first_entry_must_be_a_folder() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();

    let err = acquire(&config(addr, "flat.zip", tmp.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageFoldError::ArchiveLayout { .. }), "{err:?}");

    // Naming the root explicitly resolves it
    let dir = acquire(&config(addr, "flat.zip", tmp.path()).with_expected_root("fowl_data"))
        .await
        .unwrap();
    assert_eq!(dir, tmp.path().join("data/fowl_data"));
}

#[tokio::test]
async fn test_acquire_if_missing_skips_download() {
    let addr = serve().await;
    let tmp = tempfile::tempdir().unwrap();

    let first = config(addr, "fowl_data.zip", tmp.path()).with_expected_root("fowl_data");
    let dir = acquire_if_missing(&first).await.unwrap();

    // A second run would fail if it hit the network
    let second = config(addr, "missing.zip", tmp.path()).with_expected_root("fowl_data");
    assert_eq!(acquire_if_missing(&second).await.unwrap(), dir);
    assert!(!second.archive_path.exists());
}
