pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod expand;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::FetchConfig;
pub use error::AppError;
pub use events::{ChannelEventSink, Event, EventEmitter, EventSink, TracingEventSink};
pub use expand::MediaResolver;
pub use models::{
    DownloadStatus, ExtractorKind, Media, MediaType, Metadata, QueryOptions, Response,
};
pub use traits::{Extractor, Fetcher, FetcherFactory, ProgressCallback, SourceType};
