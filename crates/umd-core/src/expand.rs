//! Deep expansion: links pointing at another supported host are replaced by
//! the media found there.

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream;

use crate::models::{Media, MediaType};
use crate::util::has_host;

/// Resolves a link into the first media item behind it.
pub trait MediaResolver: Send + Sync {
    /// `None` when no extractor accepts the link or it yields nothing.
    fn resolve<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Option<Media>>;
}

/// Replace every `Unknown`-type item not hosted on `own_host` with what
/// `resolver` finds behind it, resolving at most `parallel` links at once.
///
/// Order is preserved. Unresolvable links are kept as they are. A resolved
/// item keeps its own attributes overlaid with the original item's.
pub async fn expand_links(
    media: Vec<Media>,
    own_host: &str,
    resolver: &dyn MediaResolver,
    parallel: usize,
) -> Vec<Media> {
    stream::iter(media)
        .map(|item| async move {
            if item.media_type() != MediaType::Unknown || has_host(item.url(), own_host) {
                return item;
            }
            match resolver.resolve(item.url()).await {
                Some(resolved) => {
                    tracing::debug!(from = item.url(), to = resolved.url(), "Link expanded");
                    resolved.with_attributes(item.attributes())
                }
                None => item,
            }
        })
        .buffered(parallel.max(1))
        .collect()
        .await
}
