//! Per-host extractors.
//!
//! Each extractor classifies URLs of its host, crawls listing pages and
//! parses single posts into [`Media`](umd_core::Media). HTML parsing happens
//! in synchronous helpers so no `scraper::Html` is held across an await.

pub mod coomer;
pub mod fapello;
pub mod imaglr;
pub mod reddit;
pub mod redgifs;

pub use coomer::{CoomerExtractor, CoomerSource};
pub use fapello::{FapelloExtractor, FapelloSource};
pub use imaglr::{ImaglrExtractor, ImaglrSource};
pub use reddit::{RedditExtractor, RedditSource};
pub use redgifs::{RedGifsExtractor, RedGifsSource};

use regex::Regex;
use scraper::{Html, Selector};
use umd_core::AppError;

pub(crate) fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Parse(format!("invalid selector '{css}': {e:?}")))
}

pub(crate) fn pattern(re: &str) -> Result<Regex, AppError> {
    Regex::new(re).map_err(|e| AppError::Parse(format!("invalid pattern '{re}': {e}")))
}

/// Attribute `attr` of the first element matching `css`, if non-empty.
pub(crate) fn first_attr(doc: &Html, css: &str, attr: &str) -> Result<Option<String>, AppError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .find_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string))
}

/// Concatenated text of every element matching `css`.
pub(crate) fn text_of(doc: &Html, css: &str) -> Result<String, AppError> {
    let sel = selector(css)?;
    Ok(doc.select(&sel).flat_map(|el| el.text()).collect())
}

/// Unwrap a page-level result, logging and substituting an empty value on
/// failure.
pub(crate) fn contain<T: Default>(result: Result<T, AppError>, what: &str, url: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(url, error = %e, "Failed to {what}, skipping");
            T::default()
        }
    }
}
