use std::path::Path;

use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Client, StatusCode, redirect};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use umd_core::backoff::BackoffConfig;
use umd_core::config::FetchConfig;
use umd_core::error::AppError;
use umd_core::models::DownloadStatus;
use umd_core::traits::{Fetcher, FetcherFactory, ProgressCallback};

/// Largest slice written to disk at once while downloading.
const CHUNK_SIZE: usize = 64 * 1024;

/// HTTP fetcher using reqwest.
///
/// Headers, redirect policy and timeout are baked into the client at
/// construction. Page requests answered with HTTP 429 are retried up to
/// `retries` times with exponential backoff.
///
/// Downloads resume from whatever is already on disk using a `Range`
/// request, and are retried on 429, 5xx and transport failures.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    retries: u32,
    backoff: BackoffConfig,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(&FetchConfig::default())
    }

    pub fn with_config(config: &FetchConfig) -> Result<Self, AppError> {
        let redirects = if config.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(config.user_agent())
            .default_headers(default_headers(config)?)
            .redirect(redirects)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retries: config.retries,
            backoff: config.backoff.clone(),
            timeout_secs: config.timeout.as_secs(),
        })
    }

    /// GET `url`, retrying on 429. Returns the first successful response.
    async fn send(&self, url: &str) -> Result<reqwest::Response, AppError> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retries {
                let delay = self.backoff.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    url,
                    attempt,
                    retries = self.retries,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(AppError::Fetch {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// One download attempt, continuing after the bytes already in
    /// `destination`. Returns the file size once the body is exhausted.
    async fn download_attempt(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64, AppError> {
        let offset = tokio::fs::metadata(destination)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            tracing::debug!(url, bytes = offset, "Nothing left to fetch");
            return Ok(offset);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Fetch {
                status: status.as_u16(),
                body,
            });
        }

        let resumed = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        let start = if resumed { offset } else { 0 };
        let total = announced_total(
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok()),
            response.content_length(),
            start,
        );

        let mut file = if resumed {
            tracing::debug!(url, offset, "Resuming download");
            OpenOptions::new().append(true).open(destination).await?
        } else {
            if offset > 0 {
                tracing::debug!(url, "Range ignored, restarting download");
            }
            File::create(destination).await?
        };

        let mut stream = response.bytes_stream();
        let mut written = start;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    file.flush().await?;
                    return Err(self.transport_error(e));
                }
            };
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece).await?;
                written += piece.len() as u64;
                if let Some(report) = on_progress {
                    report(DownloadStatus::Progress {
                        bytes: written,
                        total,
                    });
                }
            }
        }
        file.flush().await?;
        Ok(written)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::Network(format!("Connection failed: {e}"))
        } else {
            AppError::Network(e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn get_string(&self, url: &str) -> Result<String, AppError> {
        tracing::debug!(url, "GET");
        let response = self.send(url).await?;
        response
            .text()
            .await
            .map_err(|e| self.transport_error(e))
    }

    async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64, AppError> {
        let mut attempt = 0;
        loop {
            match self.download_attempt(url, destination, on_progress).await {
                Ok(size) => {
                    if let Some(report) = on_progress {
                        report(DownloadStatus::Complete { total: size });
                    }
                    tracing::debug!(url, bytes = size, "Download complete");
                    return Ok(size);
                }
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    let delay = self.backoff.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        url,
                        attempt,
                        retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Download interrupted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds a [`ReqwestFetcher`] per extractor config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestFetcherFactory;

impl FetcherFactory for ReqwestFetcherFactory {
    type Fetcher = ReqwestFetcher;

    fn create(&self, config: &FetchConfig) -> Result<ReqwestFetcher, AppError> {
        ReqwestFetcher::with_config(config)
    }
}

/// Failures worth another attempt: rate limiting, server errors and
/// dropped connections.
fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::Fetch { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        AppError::Network(_) | AppError::Timeout(_) => true,
        _ => false,
    }
}

/// Full size of the file being fetched: the `Content-Range` total, else the
/// body length past `start`, else 0 when the server announces neither.
fn announced_total(content_range: Option<&str>, content_length: Option<u64>, start: u64) -> u64 {
    content_range
        .and_then(|range| range.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok())
        .or_else(|| content_length.map(|length| start + length))
        .unwrap_or(0)
}

/// Extractor-provided headers, minus User-Agent which the builder sets.
fn default_headers(config: &FetchConfig) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        if name.eq_ignore_ascii_case("user-agent") {
            continue;
        }
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::Network(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::Network(format!("Invalid value for header '{name}': {e}")))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers_skip_user_agent() {
        let config = FetchConfig::new()
            .with_header("User-Agent", "umd-test/1.0")
            .with_header("Accept", "application/json");
        let headers = default_headers(&config).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept"], "application/json");
    }

    #[test]
    fn test_default_headers_reject_invalid_name() {
        let config = FetchConfig::new().with_header("bad header", "x");
        assert!(default_headers(&config).is_err());
    }

    #[test]
    fn test_announced_total() {
        assert_eq!(announced_total(Some("bytes 6-10/11"), Some(5), 6), 11);
        assert_eq!(announced_total(Some("bytes 6-10/*"), Some(5), 6), 11);
        assert_eq!(announced_total(None, Some(150), 0), 150);
        assert_eq!(announced_total(None, None, 40), 0);
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&AppError::Fetch {
            status: 503,
            body: String::new()
        }));
        assert!(is_transient(&AppError::Fetch {
            status: 429,
            body: String::new()
        }));
        assert!(is_transient(&AppError::Network("reset".into())));
        assert!(!is_transient(&AppError::Fetch {
            status: 404,
            body: String::new()
        }));
        assert!(!is_transient(&AppError::Parse("bad".into())));
    }

    #[test]
    fn test_factory_builds_fetcher() {
        let config = FetchConfig::new().with_retries(6);
        let fetcher = ReqwestFetcherFactory.create(&config).unwrap();
        assert_eq!(fetcher.retries, 6);
    }
}
