//! Coomer and Kemono: same site software, different service list and base URL.

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use url::Url;
use umd_core::pipeline::{MediaAccumulator, filter_extensions, page_count};
use umd_core::util::canonical_timestamp;
use umd_core::{
    AppError, Event, EventEmitter, ExtractorKind, FetchConfig, Fetcher, Media, Metadata,
    QueryOptions, SourceType,
};

use super::{contain, first_attr, pattern, selector, text_of};

const PAGE_SIZE: usize = 50;

/// Used when the queried URL has no usable origin.
const COOMER_BASE: &str = "https://coomer.st";
const COOMER_SERVICES: &str = "onlyfans|fansly|candfans";

const KEMONO_BASE: &str = "https://kemono.su";
const KEMONO_SERVICES: &str =
    "patreon|fanbox|discord|fantia|afdian|boosty|gumroad|subscribestar|dlsite";

/// Both hosts rate-limit aggressively.
pub fn fetch_config() -> FetchConfig {
    FetchConfig::new().with_retries(6)
}

/// `base` is the origin the URL was queried on; every page of the crawl is
/// fetched from the same mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoomerSource {
    User {
        base: String,
        service: String,
        user: String,
    },
    Post {
        base: String,
        service: String,
        user: String,
        id: String,
    },
}

impl SourceType for CoomerSource {
    fn kind(&self) -> &'static str {
        match self {
            CoomerSource::User { .. } => "user",
            CoomerSource::Post { .. } => "post",
        }
    }

    fn name(&self) -> &str {
        match self {
            CoomerSource::User { user, .. } | CoomerSource::Post { user, .. } => user,
        }
    }
}

pub struct CoomerExtractor<F> {
    kind: ExtractorKind,
    base_url: &'static str,
    fetcher: F,
    events: EventEmitter,
    metadata: Metadata,
    post_pattern: Regex,
    user_pattern: Regex,
    total_pattern: Regex,
    published_pattern: Regex,
}

impl<F: Fetcher> CoomerExtractor<F> {
    pub fn coomer(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Self::build(
            ExtractorKind::Coomer,
            COOMER_BASE,
            COOMER_SERVICES,
            fetcher,
            events,
            metadata,
        )
    }

    pub fn kemono(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Self::build(
            ExtractorKind::Kemono,
            KEMONO_BASE,
            KEMONO_SERVICES,
            fetcher,
            events,
            metadata,
        )
    }

    fn build(
        kind: ExtractorKind,
        base_url: &'static str,
        services: &str,
        fetcher: F,
        events: EventEmitter,
        metadata: Metadata,
    ) -> Result<Self, AppError> {
        Ok(Self {
            kind,
            base_url,
            fetcher,
            events,
            metadata,
            post_pattern: pattern(&format!(r"({services})/user/([^/]+)/post/([^/\n?#]+)"))?,
            user_pattern: pattern(&format!(r"({services})/user/([^/\n?#]+)"))?,
            total_pattern: pattern(r"of (\d+)")?,
            published_pattern: pattern(r"Published: (.+)")?,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Scheme, host and port of `url`, or the default mirror.
    fn base_of(&self, url: &str) -> String {
        match Url::parse(url.trim()).map(|url| url.origin()) {
            Ok(origin) if origin.is_tuple() => origin.ascii_serialization(),
            _ => self.base_url.to_string(),
        }
    }

    async fn fetch_user(
        &self,
        base: &str,
        service: &str,
        user: &str,
        options: &QueryOptions,
    ) -> Vec<Media> {
        let pages = self.count_pages(base, service, user).await;
        tracing::debug!(base, service, user, pages, "Crawling user");

        let mut collected = MediaAccumulator::new(options.limit);
        'pages: for page in 0..pages {
            let listing = format!("{}?o={}", user_url(base, service, user), page * PAGE_SIZE);
            let posts = contain(
                self.fetcher
                    .get_string(&listing)
                    .await
                    .and_then(|html| self.parse_listing(&html, base)),
                "load listing page",
                &listing,
            );

            for post in posts {
                let media = self.fetch_post(&post, service, user).await;
                let added = collected.add(filter_extensions(media, options));
                self.events.emit(Event::MediaQueried { amount: added });

                if collected.is_full() {
                    break 'pages;
                }
            }
        }

        collected.into_media()
    }

    /// Failed fetches and unreadable indicators both count as zero pages.
    async fn count_pages(&self, base: &str, service: &str, user: &str) -> usize {
        let url = user_url(base, service, user);
        match self
            .fetcher
            .get_string(&url)
            .await
            .and_then(|html| self.parse_total(&html))
        {
            Ok(total) => page_count(total, PAGE_SIZE),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not count pages");
                0
            }
        }
    }

    async fn fetch_post(&self, url: &str, service: &str, user: &str) -> Vec<Media> {
        contain(
            self.fetcher
                .get_string(url)
                .await
                .and_then(|html| self.parse_post(&html, url, service, user)),
            "load post",
            url,
        )
    }

    fn parse_total(&self, html: &str) -> Result<usize, AppError> {
        let doc = Html::parse_document(html);
        let text = text_of(&doc, "div#paginator-top small")?;

        self.total_pattern
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| AppError::Parse(format!("no post count in paginator: {text:?}")))
    }

    fn parse_listing(&self, html: &str, base: &str) -> Result<Vec<String>, AppError> {
        let doc = Html::parse_document(html);
        let articles = selector("article")?;

        Ok(doc
            .select(&articles)
            .filter_map(|article| {
                let el = article.value();
                Some(post_url(
                    base,
                    el.attr("data-service")?,
                    el.attr("data-user")?,
                    el.attr("data-id")?,
                ))
            })
            .collect())
    }

    fn parse_post(
        &self,
        html: &str,
        url: &str,
        service: &str,
        user: &str,
    ) -> Result<Vec<Media>, AppError> {
        let page = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
        let doc = Html::parse_document(html);

        let id = first_attr(&doc, "meta[name='id']", "content")?.unwrap_or_else(|| {
            url.rsplit('/').next().unwrap_or_default().to_string()
        });
        let published = text_of(&doc, "div.post__published")?;
        let created = self
            .published_pattern
            .captures(&published)
            .and_then(|caps| caps.get(1))
            .and_then(|m| NaiveDateTime::parse_from_str(m.as_str().trim(), "%Y-%m-%d %H:%M:%S").ok())
            .map(canonical_timestamp);

        let mut attributes = Metadata::from([
            ("source".to_string(), service.to_string()),
            ("name".to_string(), user.to_string()),
            ("id".to_string(), id),
        ]);
        if let Some(created) = created {
            attributes.insert("created".to_string(), created);
        }

        let images = selector("a.fileThumb")?;
        let videos = selector("a.post__attachment-link")?;
        let media = doc
            .select(&images)
            .chain(doc.select(&videos))
            .filter_map(|link| link.value().attr("href"))
            .filter_map(|href| match Media::resolve(href, &page, attributes.clone()) {
                Ok(media) => Some(media),
                Err(e) => {
                    tracing::debug!(href, error = %e, "Skipping link");
                    None
                }
            })
            .collect();

        Ok(media)
    }
}

fn user_url(base: &str, service: &str, user: &str) -> String {
    format!("{base}/{service}/user/{user}")
}

fn post_url(base: &str, service: &str, user: &str, id: &str) -> String {
    format!("{base}/{service}/user/{user}/post/{id}")
}

impl<F: Fetcher> umd_core::Extractor for CoomerExtractor<F> {
    type Source = CoomerSource;

    fn kind(&self) -> ExtractorKind {
        self.kind
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn source_type(&self, url: &str) -> Result<CoomerSource, AppError> {
        if let Some(caps) = self.post_pattern.captures(url) {
            return Ok(CoomerSource::Post {
                base: self.base_of(url),
                service: caps[1].to_string(),
                user: caps[2].to_string(),
                id: caps[3].to_string(),
            });
        }
        if let Some(caps) = self.user_pattern.captures(url) {
            return Ok(CoomerSource::User {
                base: self.base_of(url),
                service: caps[1].to_string(),
                user: caps[2].to_string(),
            });
        }
        Err(AppError::UnsupportedSource {
            url: url.to_string(),
            extractor: self.kind,
        })
    }

    async fn fetch_media(&self, source: &CoomerSource, options: &QueryOptions) -> Vec<Media> {
        match source {
            CoomerSource::User {
                base,
                service,
                user,
            } => self.fetch_user(base, service, user, options).await,
            CoomerSource::Post {
                base,
                service,
                user,
                id,
            } => {
                let url = post_url(base, service, user, id);
                let media = filter_extensions(self.fetch_post(&url, service, user).await, options);
                self.events.emit(Event::MediaQueried {
                    amount: media.len(),
                });
                media
            }
        }
    }
}
