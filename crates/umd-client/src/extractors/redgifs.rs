//! RedGifs watch pages. The public page embeds the video as JSON-LD, so no
//! API token is needed; user feeds require one and are not supported.

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use umd_core::pipeline::filter_extensions;
use umd_core::util::canonical_timestamp;
use umd_core::{
    AppError, Event, EventEmitter, ExtractorKind, FetchConfig, Fetcher, Media, Metadata,
    QueryOptions, SourceType,
};

use super::{contain, pattern, selector};

const BASE_URL: &str = "https://www.redgifs.com";
const FILES_URL: &str = "https://files.redgifs.com";

pub fn fetch_config() -> FetchConfig {
    FetchConfig::new().with_retries(3)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedGifsSource {
    Video { id: String },
}

impl SourceType for RedGifsSource {
    fn kind(&self) -> &'static str {
        "video"
    }

    fn name(&self) -> &str {
        match self {
            RedGifsSource::Video { id } => id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkedData {
    video: VideoObject,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VideoObject {
    author: Option<Author>,
    content_url: String,
    upload_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Author {
    Name(String),
    Person { name: String },
}

impl Author {
    fn name(&self) -> &str {
        match self {
            Author::Name(name) | Author::Person { name } => name,
        }
    }
}

pub struct RedGifsExtractor<F> {
    fetcher: F,
    events: EventEmitter,
    metadata: Metadata,
    video_pattern: Regex,
}

impl<F: Fetcher> RedGifsExtractor<F> {
    pub fn new(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Ok(Self {
            fetcher,
            events,
            metadata,
            video_pattern: pattern(r"/(?:ifr|watch)/([^/\n?#]+)")?,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

/// The downloadable file described by a watch page's JSON-LD block.
fn parse_watch_page(html: &str, id: &str) -> Result<Vec<Media>, AppError> {
    let doc = Html::parse_document(html);
    let scripts = selector("script[type='application/ld+json']")?;
    let json: String = doc
        .select(&scripts)
        .next()
        .map(|script| script.text().collect())
        .ok_or_else(|| AppError::Parse(format!("no linked data on watch page {id}")))?;

    let data: LinkedData = serde_json::from_str(&json)
        .map_err(|e| AppError::Parse(format!("linked data of {id}: {e}")))?;
    let video = data.video;

    let file = video
        .content_url
        .rsplit('/')
        .next()
        .filter(|file| !file.is_empty())
        .ok_or_else(|| AppError::Parse(format!("no content URL for {id}")))?
        .replace("-silent", "");

    let mut attributes = Metadata::from([
        ("source".to_string(), "video".to_string()),
        (
            "name".to_string(),
            video
                .author
                .as_ref()
                .map(|author| author.name().to_string())
                .unwrap_or_default(),
        ),
        ("id".to_string(), id.to_string()),
    ]);
    if let Some(created) = upload_timestamp(&video.upload_date) {
        attributes.insert("created".to_string(), created);
    }

    Ok(vec![Media::new(&format!("{FILES_URL}/{file}"), attributes)?])
}

fn upload_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(canonical_timestamp)
}

impl<F: Fetcher> umd_core::Extractor for RedGifsExtractor<F> {
    type Source = RedGifsSource;

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::RedGifs
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn source_type(&self, url: &str) -> Result<RedGifsSource, AppError> {
        match self.video_pattern.captures(url) {
            Some(caps) => Ok(RedGifsSource::Video {
                id: caps[1].to_string(),
            }),
            None => Err(AppError::UnsupportedSource {
                url: url.to_string(),
                extractor: ExtractorKind::RedGifs,
            }),
        }
    }

    async fn fetch_media(&self, source: &RedGifsSource, options: &QueryOptions) -> Vec<Media> {
        let RedGifsSource::Video { id } = source;
        let url = format!("{BASE_URL}/watch/{id}");

        let media = contain(
            self.fetcher
                .get_string(&url)
                .await
                .and_then(|html| parse_watch_page(&html, id)),
            "load watch page",
            &url,
        );
        let media = filter_extensions(media, options);
        self.events.emit(Event::MediaQueried {
            amount: media.len(),
        });
        media
    }
}
