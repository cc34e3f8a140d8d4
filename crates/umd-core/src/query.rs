use crate::error::AppError;
use crate::events::Event;
use crate::models::{QueryOptions, Response};
use crate::pipeline;
use crate::traits::{Extractor, SourceType};

/// Run a query end to end: classify → crawl → filter → dedup → limit.
///
/// Only classification errors escape; failures while crawling are contained
/// by the extractor and simply shrink the result.
pub async fn query_media<E: Extractor>(
    extractor: &E,
    url: &str,
    options: &QueryOptions,
) -> Result<Response, AppError> {
    let source = extractor.source_type(url)?;
    tracing::info!(
        extractor = %extractor.kind(),
        kind = source.kind(),
        name = source.name(),
        "Querying {}",
        url
    );
    extractor.events().emit(Event::SourceTypeFound {
        kind: source.kind().to_string(),
        name: source.name().to_string(),
    });

    let media = extractor.fetch_media(&source, options).await;
    let media = pipeline::finalize(media, options);

    tracing::info!(total = media.len(), "Query complete for {}", url);
    extractor.events().emit(Event::QueryCompleted { total: media.len() });

    Ok(Response {
        url: url.to_string(),
        media,
        extractor: extractor.kind(),
        metadata: extractor.metadata().clone(),
    })
}
