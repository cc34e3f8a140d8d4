//! Bounded parallel downloads sharing one cancellation token.

use std::path::PathBuf;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use umd_core::{AppError, Fetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
}

#[derive(Debug)]
pub enum DownloadOutcome {
    /// Final size of the file on disk.
    Completed { bytes: u64 },
    Failed(AppError),
    /// Stopped or never started because the token fired. A partial file
    /// may remain and is resumed by the next run.
    Cancelled,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub request: DownloadRequest,
    pub outcome: DownloadOutcome,
}

/// Download `requests` with at most `parallel` transfers in flight.
///
/// Reports are yielded in completion order. Once `cancel` fires, running
/// transfers are dropped and requests not yet started report
/// [`DownloadOutcome::Cancelled`] without touching the network.
pub fn download_all<'a, F: Fetcher>(
    fetcher: &'a F,
    requests: Vec<DownloadRequest>,
    parallel: usize,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = DownloadReport> + 'a {
    stream::iter(requests)
        .map(move |request| async move {
            if cancel.is_cancelled() {
                return DownloadReport {
                    request,
                    outcome: DownloadOutcome::Cancelled,
                };
            }

            let outcome = tokio::select! {
                result = fetcher.download_file(&request.url, &request.destination, None) => {
                    match result {
                        Ok(bytes) => DownloadOutcome::Completed { bytes },
                        Err(e) => {
                            tracing::warn!(url = %request.url, error = %e, "Download failed");
                            DownloadOutcome::Failed(e)
                        }
                    }
                }
                () = cancel.cancelled() => DownloadOutcome::Cancelled,
            };
            DownloadReport { request, outcome }
        })
        .buffer_unordered(parallel.max(1))
}

#[cfg(test)]
mod tests {
    use umd_core::testutil::MockFetcher;

    use super::*;

    fn request(dir: &std::path::Path, name: &str) -> DownloadRequest {
        DownloadRequest {
            url: format!("https://files.test/{name}"),
            destination: dir.join(name),
        }
    }

    #[tokio::test]
    async fn test_download_all_reports_every_request() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .with_page("https://files.test/a.jpg", "aaa")
            .with_page("https://files.test/b.jpg", "bb")
            .with_status("https://files.test/c.jpg", 500);
        let requests = vec![
            request(dir.path(), "a.jpg"),
            request(dir.path(), "b.jpg"),
            request(dir.path(), "c.jpg"),
        ];
        let cancel = CancellationToken::new();

        let mut reports: Vec<DownloadReport> = download_all(&fetcher, requests, 2, &cancel)
            .collect()
            .await;
        reports.sort_by(|a, b| a.request.url.cmp(&b.request.url));

        assert!(matches!(
            reports[0].outcome,
            DownloadOutcome::Completed { bytes: 3 }
        ));
        assert!(matches!(
            reports[1].outcome,
            DownloadOutcome::Completed { bytes: 2 }
        ));
        assert!(matches!(
            reports[2].outcome,
            DownloadOutcome::Failed(AppError::Fetch { status: 500, .. })
        ));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.jpg")).unwrap(), "aaa");
        assert_eq!(fetcher.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_requests_never_start() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with_page("https://files.test/a.jpg", "aaa");
        let requests = vec![request(dir.path(), "a.jpg"), request(dir.path(), "b.jpg")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reports: Vec<DownloadReport> = download_all(&fetcher, requests, 4, &cancel)
            .collect()
            .await;

        assert_eq!(reports.len(), 2);
        assert!(
            reports
                .iter()
                .all(|r| matches!(r.outcome, DownloadOutcome::Cancelled))
        );
        assert!(fetcher.requests().is_empty());
        assert!(!dir.path().join("a.jpg").exists());
    }
}
