use regex::Regex;
use scraper::Html;
use umd_core::pipeline::filter_extensions;
use umd_core::util::epoch_timestamp;
use umd_core::{
    AppError, Event, EventEmitter, ExtractorKind, FetchConfig, Fetcher, Media, Metadata,
    QueryOptions, SourceType,
};

use super::{contain, first_attr, pattern};

const BASE_URL: &str = "https://imaglr.com";

pub fn fetch_config() -> FetchConfig {
    FetchConfig::new()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImaglrSource {
    Post { id: String },
}

impl SourceType for ImaglrSource {
    fn kind(&self) -> &'static str {
        "post"
    }

    fn name(&self) -> &str {
        match self {
            ImaglrSource::Post { id } => id,
        }
    }
}

pub struct ImaglrExtractor<F> {
    fetcher: F,
    events: EventEmitter,
    metadata: Metadata,
    post_pattern: Regex,
}

impl<F: Fetcher> ImaglrExtractor<F> {
    pub fn new(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Ok(Self {
            fetcher,
            events,
            metadata,
            post_pattern: pattern(r"/post/([^/\n?#]+)")?,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn parse_post(&self, html: &str, id: &str) -> Result<Vec<Media>, AppError> {
        let doc = Html::parse_document(html);

        let author = first_attr(&doc, "meta[name='author']", "content")?.unwrap_or_default();
        let og_type = first_attr(&doc, "meta[property='og:type']", "content")?;
        let image = first_attr(&doc, "meta[property='og:image']", "content")?;
        let video = first_attr(&doc, "meta[property='og:video']", "content")?;

        let link = if og_type.as_deref() == Some("video") || video.is_some() {
            video.or(image)
        } else {
            image
        }
        .ok_or_else(|| AppError::Parse(format!("post {id} has no media")))?;

        let mut attributes = Metadata::from([
            ("source".to_string(), "post".to_string()),
            ("name".to_string(), author),
            ("id".to_string(), id.to_string()),
        ]);
        if let Some(created) = first_attr(&doc, "div#app", "data-page")?
            .as_deref()
            .and_then(created_timestamp)
        {
            attributes.insert("created".to_string(), created);
        }

        Ok(vec![Media::new(&link, attributes)?])
    }
}

/// `props.post.data.created_at_timestamp` from the page's embedded state.
fn created_timestamp(page_state: &str) -> Option<String> {
    let state: serde_json::Value = serde_json::from_str(page_state).ok()?;
    state
        .pointer("/props/post/data/created_at_timestamp")
        .and_then(serde_json::Value::as_f64)
        .and_then(epoch_timestamp)
}

impl<F: Fetcher> umd_core::Extractor for ImaglrExtractor<F> {
    type Source = ImaglrSource;

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Imaglr
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn source_type(&self, url: &str) -> Result<ImaglrSource, AppError> {
        match self.post_pattern.captures(url) {
            Some(caps) => Ok(ImaglrSource::Post {
                id: caps[1].to_string(),
            }),
            None => Err(AppError::UnsupportedSource {
                url: url.to_string(),
                extractor: ExtractorKind::Imaglr,
            }),
        }
    }

    async fn fetch_media(&self, source: &ImaglrSource, options: &QueryOptions) -> Vec<Media> {
        let ImaglrSource::Post { id } = source;
        let url = format!("{BASE_URL}/post/{id}");

        let media = contain(
            self.fetcher
                .get_string(&url)
                .await
                .and_then(|html| self.parse_post(&html, id)),
            "load post",
            &url,
        );
        let media = filter_extensions(media, options);
        self.events.emit(Event::MediaQueried {
            amount: media.len(),
        });
        media
    }
}
