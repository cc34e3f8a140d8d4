use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::util::{clean_url, url_extension};

/// String→string metadata, ordered by key.
pub type Metadata = BTreeMap<String, String>;

/// The extractor that served a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractorKind {
    Coomer,
    Kemono,
    Reddit,
    Imaglr,
    Fapello,
    RedGifs,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractorKind::Coomer => "Coomer",
            ExtractorKind::Kemono => "Kemono",
            ExtractorKind::Reddit => "Reddit",
            ExtractorKind::Imaglr => "Imaglr",
            ExtractorKind::Fapello => "Fapello",
            ExtractorKind::RedGifs => "RedGifs",
        };
        f.write_str(name)
    }
}

/// Coarse media type, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Image,
    Video,
    Unknown,
}

impl MediaType {
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "jpg" | "jpeg" | "png" | "gif" | "avif" | "webp" => MediaType::Image,
            "gifv" | "mp4" | "m4v" | "webm" | "mkv" | "mov" => MediaType::Video,
            _ => MediaType::Unknown,
        }
    }
}

/// A single downloadable file discovered by an extractor.
///
/// Identity is the normalized `url`; `attributes` are metadata and take no
/// part in equality or hashing, which is what deduplication relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MediaRecord")]
pub struct Media {
    url: String,
    extension: String,
    media_type: MediaType,
    attributes: Metadata,
}

impl Media {
    /// Build a media item from an absolute link, normalizing it first.
    pub fn new(raw_url: &str, attributes: Metadata) -> Result<Self, AppError> {
        let url = clean_url(raw_url, None)?;
        Ok(Self::from_clean_url(url, attributes))
    }

    /// Build a media item from a link found on `page`, resolving it if it
    /// is relative.
    pub fn resolve(raw_url: &str, page: &url::Url, attributes: Metadata) -> Result<Self, AppError> {
        let url = clean_url(raw_url, Some(page))?;
        Ok(Self::from_clean_url(url, attributes))
    }

    fn from_clean_url(url: String, attributes: Metadata) -> Self {
        let extension = url_extension(&url);
        let media_type = MediaType::from_extension(&extension);
        Self {
            url,
            extension,
            media_type,
            attributes,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn attributes(&self) -> &Metadata {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Overlay `attributes` onto this item's own; keys in `attributes` win.
    pub fn with_attributes(mut self, attributes: &Metadata) -> Self {
        self.attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Serialized form of [`Media`]; the derived fields are recomputed on load.
#[derive(Deserialize)]
struct MediaRecord {
    url: String,
    #[serde(default)]
    attributes: Metadata,
}

impl TryFrom<MediaRecord> for Media {
    type Error = AppError;

    fn try_from(record: MediaRecord) -> Result<Self, AppError> {
        Media::new(&record.url, record.attributes)
    }
}

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Media {}

impl Hash for Media {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Result of one `query_media` call.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// The URL exactly as the caller supplied it.
    pub url: String,
    /// Media in discovery order, already filtered, deduplicated and limited.
    pub media: Vec<Media>,
    pub extractor: ExtractorKind,
    pub metadata: Metadata,
}

/// Caller-supplied knobs for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of media items to return.
    pub limit: usize,
    /// Lowercase extension allow-list; empty accepts everything.
    pub extensions: BTreeSet<String>,
    /// Resolve links to other supported hosts into their media.
    pub deep: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit of zero is treated as one; the contract asks for a positive cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Returns true if `extension` passes the allow-list.
    pub fn accepts(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.contains(extension)
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: usize::MAX,
            extensions: BTreeSet::new(),
            deep: false,
        }
    }
}

/// Progress notifications of a streaming download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Bytes written so far, and the announced total (0 when unknown).
    Progress { bytes: u64, total: u64 },
    /// Sent exactly once after the last chunk was written.
    Complete { total: u64 },
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn attrs(id: &str) -> Metadata {
        Metadata::from([("id".to_string(), id.to_string())])
    }

    #[test]
    fn test_media_is_normalized() {
        let media = Media::new("https://example.com/a/Clip.MP4?token=abc", Metadata::new()).unwrap();
        assert_eq!(media.url(), "https://example.com/a/Clip.MP4");
        assert_eq!(media.extension(), "mp4");
        assert_eq!(media.media_type(), MediaType::Video);
    }

    #[test]
    fn test_media_identity_ignores_attributes() {
        let a = Media::new("https://example.com/x.jpg", attrs("1")).unwrap();
        let b = Media::new("https://example.com/x.jpg?utm_source=feed", attrs("2")).unwrap();
        assert_eq!(a, b);

        let set: HashSet<Media> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_media_rejects_invalid_url() {
        assert!(Media::new("not a url", Metadata::new()).is_err());
    }

    #[test]
    fn test_media_deserialize_normalizes() {
        let media: Media = serde_json::from_str(
            r#"{"url":"https://example.com/a/B.JPG?sig=1","extension":"exe","media_type":"Video","attributes":{"id":"7"}}"#,
        )
        .unwrap();
        assert_eq!(media.url(), "https://example.com/a/B.JPG");
        assert_eq!(media.extension(), "jpg");
        assert_eq!(media.media_type(), MediaType::Image);
        assert_eq!(media.attribute("id"), Some("7"));

        assert!(serde_json::from_str::<Media>(r#"{"url":"ftp://example.com/a.jpg"}"#).is_err());
        assert!(serde_json::from_str::<Media>(r#"{"url":"relative/a.jpg"}"#).is_err());
    }

    #[test]
    fn test_with_attributes_overlays() {
        let media = Media::new("https://example.com/x.mp4", attrs("1"))
            .unwrap()
            .with_attributes(&Metadata::from([
                ("id".to_string(), "2".to_string()),
                ("author".to_string(), "ann".to_string()),
            ]));
        assert_eq!(media.attribute("id"), Some("2"));
        assert_eq!(media.attribute("author"), Some("ann"));
    }

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(MediaType::from_extension("jpg"), MediaType::Image);
        assert_eq!(MediaType::from_extension("avif"), MediaType::Image);
        assert_eq!(MediaType::from_extension("mkv"), MediaType::Video);
        assert_eq!(MediaType::from_extension("gifv"), MediaType::Video);
        assert_eq!(MediaType::from_extension("unknown"), MediaType::Unknown);
        assert_eq!(MediaType::from_extension(""), MediaType::Unknown);
    }

    #[test]
    fn test_query_options_normalize_extensions() {
        let options = QueryOptions::new().with_extensions([".MP4", " jpg ", ""]);
        assert_eq!(options.extensions.len(), 2);
        assert!(options.accepts("mp4"));
        assert!(options.accepts("jpg"));
        assert!(!options.accepts("gif"));
    }

    #[test]
    fn test_query_options_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.limit, usize::MAX);
        assert!(options.accepts("anything"));
        assert_eq!(QueryOptions::new().with_limit(0).limit, 1);
        assert!(!options.deep);
        assert!(QueryOptions::new().with_deep(true).deep);
    }

    #[test]
    fn test_extractor_kind_display() {
        assert_eq!(ExtractorKind::Coomer.to_string(), "Coomer");
        assert_eq!(ExtractorKind::Reddit.to_string(), "Reddit");
        assert_eq!(ExtractorKind::RedGifs.to_string(), "RedGifs");
    }
}
