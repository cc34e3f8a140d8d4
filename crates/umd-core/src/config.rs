use std::collections::BTreeMap;
use std::time::Duration;

use crate::backoff::BackoffConfig;

/// Browser-like User-Agent sent unless an extractor overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// HTTP settings owned by one extractor's fetcher.
///
/// Fixed at construction and shared read-only for the extractor's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Default headers added to every request.
    pub headers: BTreeMap<String, String>,
    /// How many times a 429 response is retried.
    pub retries: u32,
    pub follow_redirects: bool,
    pub backoff: BackoffConfig,
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The User-Agent header value, falling back to [`DEFAULT_USER_AGENT`].
    pub fn user_agent(&self) -> &str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| value.as_str())
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            retries: 0,
            follow_redirects: true,
            backoff: BackoffConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }
}
