use chrono::{DateTime, NaiveDateTime};
use url::Url;

use crate::error::AppError;

/// Canonical text form of every `created` attribute.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Normalize a media link into an absolute http(s) URL with the query
/// string and fragment stripped.
///
/// Relative links are resolved against `base` when one is given.
/// Example: `"/data/ab/cd.jpg?f=x.jpg"` on `https://coomer.su/...` →
/// `"https://coomer.su/data/ab/cd.jpg"`
pub fn clean_url(raw: &str, base: Option<&Url>) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidUrl("empty URL".to_string()));
    }

    let parsed = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    let mut url = parsed.map_err(|e| AppError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::InvalidUrl(format!(
                "{raw}: scheme '{scheme}' is not allowed"
            )));
        }
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Lowercase file extension of the URL path's last segment, or `""`.
pub fn url_extension(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive host-suffix test on the URL's authority.
///
/// The suffix must match the whole host or end at a label boundary, so
/// `www.reddit.com` matches `reddit.com` but `notreddit.com` does not.
pub fn has_host(url: &str, suffix: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };

    let host = host.to_ascii_lowercase();
    let suffix = suffix.to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

pub fn canonical_timestamp(time: NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Canonical timestamp from a Unix epoch in seconds (UTC).
///
/// Negative or out-of-range epochs yield `None`.
pub fn epoch_timestamp(epoch: f64) -> Option<String> {
    if !epoch.is_finite() || epoch < 0.0 {
        return None;
    }
    DateTime::from_timestamp(epoch as i64, 0).map(|dt| canonical_timestamp(dt.naive_utc()))
}
