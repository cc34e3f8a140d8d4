use std::sync::{Arc, Mutex};
use std::time::Duration;

use umd_client::ReqwestFetcher;
use umd_core::backoff::BackoffConfig;
use umd_core::{AppError, DownloadStatus, FetchConfig, Fetcher, ProgressCallback};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(retries: u32) -> FetchConfig {
    FetchConfig::new()
        .with_retries(retries)
        .with_backoff(BackoffConfig::new(Duration::from_millis(1)))
}

#[tokio::test]
async fn fetcher_retries_rate_limited_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_config(&fast_config(2)).unwrap();
    let body = fetcher
        .get_string(&format!("{}/feed", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "ok");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn fetcher_surfaces_429_after_exhausting_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_config(&fast_config(2)).unwrap();
    let err = fetcher
        .get_string(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();

    match err {
        AppError::Fetch { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected Fetch error, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn fetcher_does_not_retry_other_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_config(&fast_config(5)).unwrap();
    let err = fetcher
        .get_string(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch { status: 503, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn fetcher_sends_configured_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hdr"))
        .and(header("user-agent", "umd-test/1.0"))
        .and(header("x-requested-with", "umd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = FetchConfig::new()
        .with_header("User-Agent", "umd-test/1.0")
        .with_header("X-Requested-With", "umd");
    let fetcher = ReqwestFetcher::with_config(&config).unwrap();

    let body = fetcher
        .get_string(&format!("{}/hdr", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn fetcher_times_out_on_slow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let config = FetchConfig::new().with_timeout(Duration::from_millis(50));
    let fetcher = ReqwestFetcher::with_config(&config).unwrap();

    let err = fetcher
        .get_string(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn download_streams_to_file_with_progress() {
    let server = MockServer::start().await;
    let payload = vec![7u8; 150 * 1024];
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("clip.mp4");
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&statuses);
    let on_progress = move |status: DownloadStatus| recorder.lock().unwrap().push(status);
    let callback: &ProgressCallback<'_> = &on_progress;

    let fetcher = ReqwestFetcher::new().unwrap();
    let written = fetcher
        .download_file(
            &format!("{}/clip.mp4", server.uri()),
            &destination,
            Some(callback),
        )
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&destination).unwrap(), payload);

    let statuses = statuses.lock().unwrap();
    let total = payload.len() as u64;
    assert_eq!(statuses.last(), Some(&DownloadStatus::Complete { total }));

    let progress: Vec<u64> = statuses
        .iter()
        .filter_map(|s| match s {
            DownloadStatus::Progress { bytes, .. } => Some(*bytes),
            DownloadStatus::Complete { .. } => None,
        })
        .collect();
    assert!(progress.len() >= 3);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert!(progress.windows(2).all(|w| w[1] - w[0] <= 64 * 1024));
    assert_eq!(progress.last(), Some(&total));
}

#[tokio::test]
async fn failed_download_creates_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("gone.jpg");

    let fetcher = ReqwestFetcher::new().unwrap();
    let err = fetcher
        .download_file(&format!("{}/gone.jpg", server.uri()), &destination, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch { status: 404, .. }));
    assert!(!destination.exists());
}

fn recorder() -> (Arc<Mutex<Vec<DownloadStatus>>>, impl Fn(DownloadStatus) + Send + Sync) {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    (statuses, move |status| sink.lock().unwrap().push(status))
}

#[tokio::test]
async fn download_resumes_partial_file_with_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .and(header("range", "bytes=6-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 6-10/11")
                .set_body_string("world"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("clip.mp4");
    std::fs::write(&destination, "hello ").unwrap();
    let (statuses, on_progress) = recorder();
    let callback: &ProgressCallback<'_> = &on_progress;

    let fetcher = ReqwestFetcher::new().unwrap();
    let size = fetcher
        .download_file(
            &format!("{}/clip.mp4", server.uri()),
            &destination,
            Some(callback),
        )
        .await
        .unwrap();

    assert_eq!(size, 11);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), "hello world");
    let statuses = statuses.lock().unwrap();
    assert_eq!(
        statuses.first(),
        Some(&DownloadStatus::Progress {
            bytes: 11,
            total: 11
        })
    );
    assert_eq!(statuses.last(), Some(&DownloadStatus::Complete { total: 11 }));
}

#[tokio::test]
async fn download_restarts_when_range_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh body"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("clip.mp4");
    std::fs::write(&destination, "stale").unwrap();

    let fetcher = ReqwestFetcher::new().unwrap();
    let size = fetcher
        .download_file(&format!("{}/clip.mp4", server.uri()), &destination, None)
        .await
        .unwrap();

    assert_eq!(size, 10);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), "fresh body");
}

#[tokio::test]
async fn download_treats_unsatisfiable_range_as_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("clip.mp4");
    std::fs::write(&destination, "whole").unwrap();
    let (statuses, on_progress) = recorder();
    let callback: &ProgressCallback<'_> = &on_progress;

    let fetcher = ReqwestFetcher::new().unwrap();
    let size = fetcher
        .download_file(
            &format!("{}/clip.mp4", server.uri()),
            &destination,
            Some(callback),
        )
        .await
        .unwrap();

    assert_eq!(size, 5);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), "whole");
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![DownloadStatus::Complete { total: 5 }]
    );
}

#[tokio::test]
async fn download_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("clip.mp4");

    let fetcher = ReqwestFetcher::with_config(&fast_config(1)).unwrap();
    let size = fetcher
        .download_file(&format!("{}/clip.mp4", server.uri()), &destination, None)
        .await
        .unwrap();

    assert_eq!(size, 7);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), "payload");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn download_does_not_retry_missing_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("gone.jpg");

    let fetcher = ReqwestFetcher::with_config(&fast_config(3)).unwrap();
    let err = fetcher
        .download_file(&format!("{}/gone.jpg", server.uri()), &destination, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch { status: 404, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(!destination.exists());
}

#[tokio::test]
async fn download_accepts_borrowing_progress_callback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("abc"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("a.jpg");
    let seen = Mutex::new(Vec::new());
    let on_progress = |status: DownloadStatus| seen.lock().unwrap().push(status);

    let fetcher = ReqwestFetcher::new().unwrap();
    fetcher
        .download_file(
            &format!("{}/a.jpg", server.uri()),
            &destination,
            Some(&on_progress as &ProgressCallback<'_>),
        )
        .await
        .unwrap();

    assert_eq!(
        seen.into_inner().unwrap().last(),
        Some(&DownloadStatus::Complete { total: 3 })
    );
}
