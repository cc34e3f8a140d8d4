pub mod download;
pub mod extractors;
pub mod fetcher;
pub mod registry;

pub use download::{DownloadOutcome, DownloadReport, DownloadRequest, download_all};
pub use fetcher::{ReqwestFetcher, ReqwestFetcherFactory};
pub use registry::{AnyExtractor, Registry};
