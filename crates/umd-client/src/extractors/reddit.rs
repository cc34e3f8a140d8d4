use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use umd_core::expand::expand_links;
use umd_core::pipeline::{MediaAccumulator, filter_extensions};
use umd_core::util::epoch_timestamp;
use umd_core::{
    AppError, Event, EventEmitter, ExtractorKind, FetchConfig, Fetcher, Media, MediaResolver,
    Metadata, QueryOptions, SourceType,
};

use super::pattern;

const BASE_URL: &str = "https://www.reddit.com";
const HOST: &str = "reddit.com";

/// Links resolved at once during deep expansion.
const EXPAND_PARALLELISM: usize = 5;

/// Reddit throttles anonymous clients hard and rejects browser-like agents
/// on the JSON endpoints.
pub fn fetch_config() -> FetchConfig {
    FetchConfig::new().with_retries(10).with_header(
        "User-Agent",
        concat!("umd/", env!("CARGO_PKG_VERSION"), " (media downloader)"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedditSource {
    Submission { name: String, id: String },
    User { name: String },
    Subreddit { name: String },
}

impl SourceType for RedditSource {
    fn kind(&self) -> &'static str {
        match self {
            RedditSource::Submission { .. } => "submission",
            RedditSource::User { .. } => "user",
            RedditSource::Subreddit { .. } => "subreddit",
        }
    }

    fn name(&self) -> &str {
        match self {
            RedditSource::Submission { name, .. }
            | RedditSource::User { name }
            | RedditSource::Subreddit { name } => name,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingData {
    after: Option<String>,
    children: Vec<Child>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Child {
    data: Post,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Post {
    id: String,
    author: String,
    url: String,
    created: Option<f64>,
    is_gallery: bool,
    media_metadata: Option<BTreeMap<String, GalleryMedia>>,
    gallery_data: Option<GalleryData>,
    secure_media: Option<SecureMedia>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GalleryMedia {
    status: String,
    s: Option<GallerySource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GallerySource {
    u: Option<String>,
    gif: Option<String>,
    mp4: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GalleryData {
    items: Vec<GalleryItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GalleryItem {
    media_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecureMedia {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RedditVideo {
    fallback_url: String,
}

impl Post {
    /// Links to the post's media.
    fn media_urls(&self) -> Vec<&str> {
        if self.is_gallery {
            return self.gallery_urls();
        }

        let video = self
            .secure_media
            .as_ref()
            .and_then(|m| m.reddit_video.as_ref())
            .map(|v| v.fallback_url.as_str())
            .filter(|u| !u.is_empty());
        video
            .or(Some(self.url.as_str()).filter(|u| !u.is_empty()))
            .into_iter()
            .collect()
    }

    fn gallery_urls(&self) -> Vec<&str> {
        let Some(metadata) = &self.media_metadata else {
            return Vec::new();
        };

        let ordered: Vec<&GalleryMedia> = match &self.gallery_data {
            Some(gallery) if !gallery.items.is_empty() => gallery
                .items
                .iter()
                .filter_map(|item| metadata.get(&item.media_id))
                .collect(),
            _ => metadata.values().collect(),
        };

        ordered
            .into_iter()
            .filter(|media| media.status == "valid")
            .filter_map(|media| {
                // `mp4` is the gif path plus signed query parameters; only
                // the gif link keeps its extension once normalized.
                let s = media.s.as_ref()?;
                s.gif
                    .as_deref()
                    .or(s.u.as_deref())
                    .or(s.mp4.as_deref())
                    .filter(|u| !u.is_empty())
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct RedditExtractor<F> {
    fetcher: F,
    events: EventEmitter,
    metadata: Metadata,
    resolver: Option<Arc<dyn MediaResolver>>,
    submission_pattern: Regex,
    user_pattern: Regex,
    subreddit_pattern: Regex,
}

impl<F: Fetcher> RedditExtractor<F> {
    pub fn new(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Ok(Self {
            fetcher,
            events,
            metadata,
            resolver: None,
            submission_pattern: pattern(r"/(?:r|u|user)/([^/?#]+)/comments/([^/\n?#]+)")?,
            user_pattern: pattern(r"/(?:u|user)/([^/\n?#]+)")?,
            subreddit_pattern: pattern(r"/r/([^/\n?#]+)")?,
        })
    }

    /// Resolver used for deep queries; without one `deep` has no effect.
    pub fn with_resolver(mut self, resolver: Arc<dyn MediaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    async fn expand(&self, media: Vec<Media>, options: &QueryOptions) -> Vec<Media> {
        match &self.resolver {
            Some(resolver) if options.deep => {
                expand_links(media, HOST, resolver.as_ref(), EXPAND_PARALLELISM).await
            }
            _ => media,
        }
    }

    fn listing_url(source: &RedditSource, after: &str) -> Option<String> {
        match source {
            RedditSource::User { name } => Some(format!(
                "{BASE_URL}/user/{name}/submitted.json?sort=new&raw_json=1&after={after}&limit=100"
            )),
            RedditSource::Subreddit { name } => Some(format!(
                "{BASE_URL}/r/{name}/hot.json?raw_json=1&after={after}&limit=100"
            )),
            RedditSource::Submission { .. } => None,
        }
    }

    async fn fetch_submission(
        &self,
        source: &RedditSource,
        id: &str,
        options: &QueryOptions,
    ) -> Vec<Media> {
        let url = format!("{BASE_URL}/comments/{id}.json?raw_json=1");
        let listings: Vec<Listing> = match self.fetcher.get_json(&url).await {
            Ok(listings) => listings,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to load submission, skipping");
                return Vec::new();
            }
        };

        let media = listings
            .first()
            .map(|listing| self.listing_media(listing, source))
            .unwrap_or_default();
        let media = filter_extensions(self.expand(media, options).await, options);
        self.events.emit(Event::MediaQueried {
            amount: media.len(),
        });
        media
    }

    /// Follow the `after` cursor until the limit, the last page, or a
    /// failed page.
    async fn fetch_listing(&self, source: &RedditSource, options: &QueryOptions) -> Vec<Media> {
        let mut collected = MediaAccumulator::new(options.limit);
        let mut after = String::new();

        while let Some(url) = Self::listing_url(source, &after) {
            let listing: Listing = match self.fetcher.get_json(&url).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Failed to load listing page, stopping");
                    break;
                }
            };

            let media = self.expand(self.listing_media(&listing, source), options).await;
            let media = filter_extensions(media, options);
            let added = collected.add(media);
            tracing::debug!(url = %url, added, "Listing page parsed");
            self.events.emit(Event::MediaQueried { amount: added });

            if collected.is_full() {
                break;
            }
            match listing.data.after {
                Some(next) if !next.is_empty() && next != after => after = next,
                _ => break,
            }
        }

        collected.into_media()
    }

    fn listing_media(&self, listing: &Listing, source: &RedditSource) -> Vec<Media> {
        listing
            .data
            .children
            .iter()
            .flat_map(|child| self.post_media(&child.data, source))
            .collect()
    }

    fn post_media(&self, post: &Post, source: &RedditSource) -> Vec<Media> {
        let mut attributes = Metadata::from([
            ("source".to_string(), source.kind().to_string()),
            ("name".to_string(), source.name().to_string()),
            ("id".to_string(), post.id.clone()),
            ("author".to_string(), post.author.clone()),
        ]);
        if let Some(created) = post.created.and_then(epoch_timestamp) {
            attributes.insert("created".to_string(), created);
        }

        post.media_urls()
            .into_iter()
            .filter_map(|url| match Media::new(url, attributes.clone()) {
                Ok(media) => Some(media),
                Err(e) => {
                    tracing::debug!(url, error = %e, "Skipping link");
                    None
                }
            })
            .collect()
    }
}

impl<F: Fetcher> umd_core::Extractor for RedditExtractor<F> {
    type Source = RedditSource;

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Reddit
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn source_type(&self, url: &str) -> Result<RedditSource, AppError> {
        if let Some(caps) = self.submission_pattern.captures(url) {
            return Ok(RedditSource::Submission {
                name: caps[1].to_string(),
                id: caps[2].to_string(),
            });
        }
        if let Some(caps) = self.user_pattern.captures(url) {
            return Ok(RedditSource::User {
                name: caps[1].to_string(),
            });
        }
        if let Some(caps) = self.subreddit_pattern.captures(url) {
            return Ok(RedditSource::Subreddit {
                name: caps[1].to_string(),
            });
        }
        Err(AppError::UnsupportedSource {
            url: url.to_string(),
            extractor: ExtractorKind::Reddit,
        })
    }

    async fn fetch_media(&self, source: &RedditSource, options: &QueryOptions) -> Vec<Media> {
        match source {
            RedditSource::Submission { id, .. } => {
                self.fetch_submission(source, id, options).await
            }
            RedditSource::User { .. } | RedditSource::Subreddit { .. } => {
                self.fetch_listing(source, options).await
            }
        }
    }
}
