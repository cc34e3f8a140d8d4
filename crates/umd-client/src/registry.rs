use std::sync::Arc;

use futures::future::BoxFuture;
use umd_core::util::has_host;
use umd_core::{
    AppError, Event, EventEmitter, Extractor, ExtractorKind, FetchConfig, Fetcher,
    FetcherFactory, Media, MediaResolver, Metadata, QueryOptions, Response,
};

use crate::extractors::{
    CoomerExtractor, FapelloExtractor, ImaglrExtractor, RedGifsExtractor, RedditExtractor, coomer,
    fapello, imaglr, reddit, redgifs,
};

/// The extractor chosen for a URL.
pub enum AnyExtractor<F: Fetcher> {
    /// Coomer or Kemono.
    Coomer(CoomerExtractor<F>),
    Reddit(RedditExtractor<F>),
    Imaglr(ImaglrExtractor<F>),
    Fapello(FapelloExtractor<F>),
    RedGifs(RedGifsExtractor<F>),
}

impl<F: Fetcher> AnyExtractor<F> {
    pub fn kind(&self) -> ExtractorKind {
        match self {
            AnyExtractor::Coomer(e) => e.kind(),
            AnyExtractor::Reddit(e) => e.kind(),
            AnyExtractor::Imaglr(e) => e.kind(),
            AnyExtractor::Fapello(e) => e.kind(),
            AnyExtractor::RedGifs(e) => e.kind(),
        }
    }

    /// The fetcher built from this extractor's config, for downloads.
    pub fn fetcher(&self) -> &F {
        match self {
            AnyExtractor::Coomer(e) => e.fetcher(),
            AnyExtractor::Reddit(e) => e.fetcher(),
            AnyExtractor::Imaglr(e) => e.fetcher(),
            AnyExtractor::Fapello(e) => e.fetcher(),
            AnyExtractor::RedGifs(e) => e.fetcher(),
        }
    }

    pub async fn query_media(&self, url: &str, options: &QueryOptions) -> Result<Response, AppError> {
        match self {
            AnyExtractor::Coomer(e) => e.query_media(url, options).await,
            AnyExtractor::Reddit(e) => e.query_media(url, options).await,
            AnyExtractor::Imaglr(e) => e.query_media(url, options).await,
            AnyExtractor::Fapello(e) => e.query_media(url, options).await,
            AnyExtractor::RedGifs(e) => e.query_media(url, options).await,
        }
    }

    /// Hand `resolver` to the extractors that expand links on deep queries.
    fn with_resolver(self, resolver: Arc<dyn MediaResolver>) -> Self {
        match self {
            AnyExtractor::Reddit(e) => AnyExtractor::Reddit(e.with_resolver(resolver)),
            other => other,
        }
    }
}

type Build<F> = fn(F, EventEmitter, Metadata) -> Result<AnyExtractor<F>, AppError>;

struct Registration<F: Fetcher> {
    kind: ExtractorKind,
    hosts: &'static [&'static str],
    config: fn() -> FetchConfig,
    build: Build<F>,
}

impl<F: Fetcher> Registration<F> {
    fn matches(&self, url: &str) -> bool {
        self.hosts.iter().any(|host| has_host(url, host))
    }
}

fn registrations<F: Fetcher>() -> Vec<Registration<F>> {
    vec![
        Registration {
            kind: ExtractorKind::Coomer,
            hosts: &["coomer.su", "coomer.st", "coomer.party"],
            config: coomer::fetch_config,
            build: |fetcher, events, metadata| {
                CoomerExtractor::coomer(fetcher, events, metadata).map(AnyExtractor::Coomer)
            },
        },
        Registration {
            kind: ExtractorKind::Kemono,
            hosts: &["kemono.su", "kemono.cr", "kemono.party"],
            config: coomer::fetch_config,
            build: |fetcher, events, metadata| {
                CoomerExtractor::kemono(fetcher, events, metadata).map(AnyExtractor::Coomer)
            },
        },
        Registration {
            kind: ExtractorKind::Reddit,
            hosts: &["reddit.com"],
            config: reddit::fetch_config,
            build: |fetcher, events, metadata| {
                RedditExtractor::new(fetcher, events, metadata).map(AnyExtractor::Reddit)
            },
        },
        Registration {
            kind: ExtractorKind::Imaglr,
            hosts: &["imaglr.com"],
            config: imaglr::fetch_config,
            build: |fetcher, events, metadata| {
                ImaglrExtractor::new(fetcher, events, metadata).map(AnyExtractor::Imaglr)
            },
        },
        Registration {
            kind: ExtractorKind::Fapello,
            hosts: &["fapello.com"],
            config: fapello::fetch_config,
            build: |fetcher, events, metadata| {
                FapelloExtractor::new(fetcher, events, metadata).map(AnyExtractor::Fapello)
            },
        },
        Registration {
            kind: ExtractorKind::RedGifs,
            hosts: &["redgifs.com"],
            config: redgifs::fetch_config,
            build: |fetcher, events, metadata| {
                RedGifsExtractor::new(fetcher, events, metadata).map(AnyExtractor::RedGifs)
            },
        },
    ]
}

/// Maps URLs to extractors, first matching host wins.
///
/// Each extractor gets its own fetcher, built by the factory from that
/// extractor's [`FetchConfig`].
pub struct Registry<FF: FetcherFactory> {
    factory: FF,
    events: EventEmitter,
    entries: Vec<Registration<FF::Fetcher>>,
}

impl<FF: FetcherFactory + 'static> Registry<FF> {
    pub fn new(factory: FF) -> Self {
        Self {
            factory,
            events: EventEmitter::none(),
            entries: registrations(),
        }
    }

    /// Send events of every query made through this registry to `events`.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Supported extractors, in matching order.
    pub fn kinds(&self) -> Vec<ExtractorKind> {
        self.entries.iter().map(|entry| entry.kind).collect()
    }

    /// Pick the extractor whose host accepts `url`.
    ///
    /// `metadata` is handed to the extractor and echoed in its responses.
    pub fn find_extractor(
        &self,
        url: &str,
        metadata: Metadata,
    ) -> Result<AnyExtractor<FF::Fetcher>, AppError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.matches(url))
            .ok_or_else(|| AppError::NoExtractorFound {
                url: url.to_string(),
            })?;

        let fetcher = self.factory.create(&(entry.config)())?;
        let extractor = (entry.build)(fetcher, self.events.clone(), metadata)?
            .with_resolver(Arc::new(LinkResolver {
                factory: self.factory.clone(),
            }));

        tracing::info!(extractor = %entry.kind, "Extractor found for {}", url);
        self.events.emit(Event::ExtractorFound {
            name: entry.kind.to_string(),
        });
        Ok(extractor)
    }

    /// Find the extractor for `url` and run the query.
    pub async fn query_media(
        &self,
        url: &str,
        options: &QueryOptions,
        metadata: Metadata,
    ) -> Result<Response, AppError> {
        self.find_extractor(url, metadata)?
            .query_media(url, options)
            .await
    }
}

/// Resolves links found by one extractor through a fresh registry, taking
/// the first media item of a limit-1, non-deep query.
struct LinkResolver<FF> {
    factory: FF,
}

impl<FF: FetcherFactory + 'static> MediaResolver for LinkResolver<FF> {
    fn resolve<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Option<Media>> {
        Box::pin(async move {
            let registry = Registry::new(self.factory.clone());
            let extractor = registry.find_extractor(url, Metadata::new()).ok()?;
            match extractor
                .query_media(url, &QueryOptions::new().with_limit(1))
                .await
            {
                Ok(response) => response.media.into_iter().next(),
                Err(e) => {
                    tracing::debug!(url, error = %e, "Link not expandable");
                    None
                }
            }
        })
    }
}
