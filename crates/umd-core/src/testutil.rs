//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::FetchConfig;
use crate::error::AppError;
use crate::events::{Event, EventSink};
use crate::models::DownloadStatus;
use crate::traits::{Fetcher, FetcherFactory, ProgressCallback};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockResponse {
    Body(String),
    Status(u16),
}

/// Mock fetcher serving canned responses keyed by exact URL.
///
/// Unknown URLs answer HTTP 404. Every request is logged in order.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, MockResponse>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `url`.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), MockResponse::Body(body.into()));
        self
    }

    /// Answer `url` with a non-success `status`.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), MockResponse::Status(status));
        self
    }

    /// All requested URLs, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// How many times `url` was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    fn respond(&self, url: &str) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.routes.lock().unwrap().get(url) {
            Some(MockResponse::Body(body)) => Ok(body.clone()),
            Some(MockResponse::Status(status)) => Err(AppError::Fetch {
                status: *status,
                body: String::new(),
            }),
            None => Err(AppError::Fetch {
                status: 404,
                body: format!("no mock for {url}"),
            }),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn get_string(&self, url: &str) -> Result<String, AppError> {
        self.respond(url)
    }

    async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64, AppError> {
        let body = self.respond(url)?;
        tokio::fs::write(destination, body.as_bytes()).await?;

        let total = body.len() as u64;
        if let Some(report) = on_progress {
            report(DownloadStatus::Progress {
                bytes: total,
                total,
            });
            report(DownloadStatus::Complete { total });
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// MockFetcherFactory
// ---------------------------------------------------------------------------

/// Factory handing out clones of one shared [`MockFetcher`].
///
/// Records every [`FetchConfig`] it was asked to build from.
#[derive(Clone, Default)]
pub struct MockFetcherFactory {
    fetcher: MockFetcher,
    configs: Arc<Mutex<Vec<FetchConfig>>>,
}

impl MockFetcherFactory {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self {
            fetcher,
            configs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn configs(&self) -> Vec<FetchConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl FetcherFactory for MockFetcherFactory {
    type Fetcher = MockFetcher;

    fn create(&self, config: &FetchConfig) -> Result<MockFetcher, AppError> {
        self.configs.lock().unwrap().push(config.clone());
        Ok(self.fetcher.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Event sink that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Sum of all `MediaQueried` amounts.
    pub fn media_queried(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Event::MediaQueried { amount } => *amount,
                _ => 0,
            })
            .sum()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
