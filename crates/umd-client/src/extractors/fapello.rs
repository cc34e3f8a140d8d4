use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;
use umd_core::pipeline::{MediaAccumulator, filter_extensions};
use umd_core::{
    AppError, Event, EventEmitter, ExtractorKind, FetchConfig, Fetcher, Media, Metadata,
    QueryOptions, SourceType,
};

use super::{contain, first_attr, pattern, selector};

const BASE_URL: &str = "https://fapello.com";

pub fn fetch_config() -> FetchConfig {
    FetchConfig::new()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FapelloSource {
    Post { name: String, id: String },
    Model { name: String },
}

impl SourceType for FapelloSource {
    fn kind(&self) -> &'static str {
        match self {
            FapelloSource::Post { .. } => "post",
            FapelloSource::Model { .. } => "model",
        }
    }

    fn name(&self) -> &str {
        match self {
            FapelloSource::Post { name, .. } | FapelloSource::Model { name } => name,
        }
    }
}

pub struct FapelloExtractor<F> {
    fetcher: F,
    events: EventEmitter,
    metadata: Metadata,
    post_pattern: Regex,
    model_pattern: Regex,
}

impl<F: Fetcher> FapelloExtractor<F> {
    pub fn new(fetcher: F, events: EventEmitter, metadata: Metadata) -> Result<Self, AppError> {
        Ok(Self {
            fetcher,
            events,
            metadata,
            post_pattern: pattern(r"^/([A-Za-z0-9_.-]+)/(\d+)/?$")?,
            model_pattern: pattern(r"^/([A-Za-z0-9_.-]+)/?$")?,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    async fn fetch_model(&self, source: &FapelloSource, options: &QueryOptions) -> Vec<Media> {
        let name = source.name();
        let pages = self.count_pages(name).await;
        tracing::debug!(name, pages, "Crawling model");

        let mut collected = MediaAccumulator::new(options.limit);
        'pages: for page in 1..=pages {
            let listing = format!("{BASE_URL}/ajax/model/{name}/page-{page}/");
            let posts = contain(
                self.fetcher
                    .get_string(&listing)
                    .await
                    .and_then(|html| parse_listing(&html, &listing)),
                "load listing page",
                &listing,
            );

            for post in posts {
                let media = self.fetch_post(&post, source).await;
                let added = collected.add(filter_extensions(media, options));
                self.events.emit(Event::MediaQueried { amount: added });

                if collected.is_full() {
                    break 'pages;
                }
            }
        }

        collected.into_media()
    }

    /// `data-max` of the "show more" button. A missing button means a
    /// single page; a failed fetch means none.
    async fn count_pages(&self, name: &str) -> usize {
        let url = format!("{BASE_URL}/{name}/");
        let max_pages = match self
            .fetcher
            .get_string(&url)
            .await
            .and_then(|html| parse_max_pages(&html))
        {
            Ok(max_pages) => max_pages,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not count pages");
                return 0;
            }
        };

        max_pages.unwrap_or(1)
    }

    async fn fetch_post(&self, url: &str, source: &FapelloSource) -> Vec<Media> {
        contain(
            self.fetcher
                .get_string(url)
                .await
                .and_then(|html| self.parse_post(&html, url, source)),
            "load post",
            url,
        )
    }

    fn parse_post(
        &self,
        html: &str,
        url: &str,
        source: &FapelloSource,
    ) -> Result<Vec<Media>, AppError> {
        let page = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
        let doc = Html::parse_document(html);

        let link = match first_attr(&doc, "video.uk-align-center source", "src")? {
            Some(video) => video,
            None => first_attr(&doc, "div.flex.justify-between.items-center > a", "href")?
                .ok_or_else(|| AppError::Parse(format!("no media on {url}")))?,
        };

        let id = self
            .post_pattern
            .captures(page.path())
            .map(|caps| caps[2].to_string())
            .unwrap_or_default();
        let attributes = Metadata::from([
            ("source".to_string(), source.kind().to_string()),
            ("name".to_string(), source.name().to_string()),
            ("id".to_string(), id),
        ]);

        Ok(vec![Media::resolve(&link, &page, attributes)?])
    }
}

/// `Ok(None)` when there is no "show more" button.
fn parse_max_pages(html: &str) -> Result<Option<usize>, AppError> {
    let doc = Html::parse_document(html);
    let show_more = selector("div#showmore")?;

    let Some(button) = doc.select(&show_more).next() else {
        return Ok(None);
    };
    let max = button.value().attr("data-max").unwrap_or_default().trim();
    max.parse::<usize>()
        .map(Some)
        .map_err(|_| AppError::Parse(format!("invalid page count: {max:?}")))
}

/// Post links: anchors wrapping a cover image.
fn parse_listing(html: &str, page_url: &str) -> Result<Vec<String>, AppError> {
    let page =
        Url::parse(page_url).map_err(|e| AppError::InvalidUrl(format!("{page_url}: {e}")))?;
    let doc = Html::parse_document(html);
    let covers = selector("img.object-cover")?;

    Ok(doc
        .select(&covers)
        .filter_map(|img| {
            img.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "a")
        })
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.join(href).ok())
        .map(String::from)
        .collect())
}

impl<F: Fetcher> umd_core::Extractor for FapelloExtractor<F> {
    type Source = FapelloSource;

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Fapello
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn source_type(&self, url: &str) -> Result<FapelloSource, AppError> {
        let unsupported = || AppError::UnsupportedSource {
            url: url.to_string(),
            extractor: ExtractorKind::Fapello,
        };
        let parsed = Url::parse(url.trim()).map_err(|_| unsupported())?;
        let path = parsed.path();

        if let Some(caps) = self.post_pattern.captures(path) {
            return Ok(FapelloSource::Post {
                name: caps[1].to_string(),
                id: caps[2].to_string(),
            });
        }
        if let Some(caps) = self.model_pattern.captures(path) {
            return Ok(FapelloSource::Model {
                name: caps[1].to_string(),
            });
        }
        Err(unsupported())
    }

    async fn fetch_media(&self, source: &FapelloSource, options: &QueryOptions) -> Vec<Media> {
        match source {
            FapelloSource::Model { .. } => self.fetch_model(source, options).await,
            FapelloSource::Post { name, id } => {
                let url = format!("{BASE_URL}/{name}/{id}/");
                let media = filter_extensions(self.fetch_post(&url, source).await, options);
                self.events.emit(Event::MediaQueried {
                    amount: media.len(),
                });
                media
            }
        }
    }
}
