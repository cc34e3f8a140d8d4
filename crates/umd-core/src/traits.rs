use std::fmt;
use std::future::Future;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::FetchConfig;
use crate::error::AppError;
use crate::events::EventEmitter;
use crate::models::{DownloadStatus, ExtractorKind, Media, Metadata, QueryOptions, Response};

/// Callback receiving download progress.
pub type ProgressCallback<'a> = dyn Fn(DownloadStatus) + Send + Sync + 'a;

/// Issues HTTP requests on behalf of one extractor.
pub trait Fetcher: Send + Sync + Clone {
    /// GET `url` and return the body as text.
    ///
    /// Fails with [`AppError::Fetch`] on a non-success status.
    fn get_string(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;

    /// GET `url` and deserialize the JSON body. Unknown fields are ignored.
    fn get_json<T>(&self, url: &str) -> impl Future<Output = Result<T, AppError>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            let body = self.get_string(url).await?;
            serde_json::from_str(&body).map_err(|e| AppError::Parse(format!("{url}: {e}")))
        }
    }

    /// Stream `url` into `destination`, reporting progress after each chunk.
    ///
    /// Returns the size of the finished file.
    fn download_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Builds a [`Fetcher`] from an extractor's own [`FetchConfig`].
///
/// Lets the registry give each extractor its own headers and retry policy
/// while tests swap in a mock.
pub trait FetcherFactory: Send + Sync + Clone {
    type Fetcher: Fetcher;

    fn create(&self, config: &FetchConfig) -> Result<Self::Fetcher, AppError>;
}

/// What a URL points to within one host (a post, a user's feed, ...).
pub trait SourceType: fmt::Debug + Send + Sync {
    /// Lowercase variant tag, e.g. `"user"` or `"subreddit"`.
    fn kind(&self) -> &'static str;

    /// The owner identifier: user, subreddit or model name.
    fn name(&self) -> &str;
}

/// One supported content host.
pub trait Extractor: Send + Sync {
    type Source: SourceType;

    fn kind(&self) -> ExtractorKind;

    fn events(&self) -> &EventEmitter;

    /// Side-channel metadata supplied at construction, echoed in responses.
    fn metadata(&self) -> &Metadata;

    /// Classify `url`; first matching pattern wins.
    fn source_type(&self, url: &str) -> Result<Self::Source, AppError>;

    /// Collect media for `source`.
    ///
    /// Page and post failures are contained here, so this never fails; the
    /// extension filter is already applied to the result.
    fn fetch_media(
        &self,
        source: &Self::Source,
        options: &QueryOptions,
    ) -> impl Future<Output = Vec<Media>> + Send;

    /// Classify, crawl and finalize `url` into a [`Response`].
    fn query_media(
        &self,
        url: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<Response, AppError>> + Send
    where
        Self: Sized,
    {
        crate::query::query_media(self, url, options)
    }
}
