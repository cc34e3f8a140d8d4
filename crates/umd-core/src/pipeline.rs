//! Filter → dedup → limit pipeline shared by every extractor.

use std::collections::HashSet;

use crate::models::{Media, QueryOptions};

/// Keep only media whose extension passes the allow-list.
pub fn filter_extensions(media: Vec<Media>, options: &QueryOptions) -> Vec<Media> {
    media
        .into_iter()
        .filter(|m| options.accepts(m.extension()))
        .collect()
}

/// Drop media whose URL was already seen; first occurrence wins.
pub fn dedup(media: Vec<Media>) -> Vec<Media> {
    let mut seen = HashSet::new();
    media
        .into_iter()
        .filter(|m| seen.insert(m.url().to_string()))
        .collect()
}

/// Filter, deduplicate and truncate, preserving discovery order.
pub fn finalize(media: Vec<Media>, options: &QueryOptions) -> Vec<Media> {
    let mut media = dedup(filter_extensions(media, options));
    media.truncate(options.limit);
    media
}

/// Number of listing pages for `total` items: `max(ceil(total / page_size), 1)`.
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

/// Ordered, duplicate-resistant set of media collected during a crawl.
#[derive(Debug)]
pub struct MediaAccumulator {
    media: Vec<Media>,
    seen: HashSet<String>,
    limit: usize,
}

impl MediaAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            media: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    /// Add a batch, skipping URLs already present. Returns how many were new.
    pub fn add(&mut self, batch: impl IntoIterator<Item = Media>) -> usize {
        let before = self.media.len();
        for media in batch {
            if self.seen.insert(media.url().to_string()) {
                self.media.push(media);
            }
        }
        self.media.len() - before
    }

    /// Returns true once the limit has been reached.
    pub fn is_full(&self) -> bool {
        self.media.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    /// How many more items fit under the limit.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.media.len())
    }

    /// The collected media, truncated to the limit.
    pub fn into_media(mut self) -> Vec<Media> {
        self.media.truncate(self.limit);
        self.media
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn media(url: &str) -> Media {
        Media::new(url, Metadata::new()).unwrap()
    }

    fn urls(media: &[Media]) -> Vec<&str> {
        media.iter().map(Media::url).collect()
    }

    #[test]
    fn extension_filter_keeps_allowed_only() {
        let input = vec![
            media("https://h.com/a.jpg"),
            media("https://h.com/b.mp4"),
            media("https://h.com/c.gif"),
        ];
        let options = QueryOptions::new().with_extensions(["mp4"]);

        let output = finalize(input, &options);
        assert_eq!(urls(&output), vec!["https://h.com/b.mp4"]);
    }

    #[test]
    fn empty_allow_list_accepts_all() {
        let input = vec![media("https://h.com/a.jpg"), media("https://h.com/b")];
        let output = filter_extensions(input, &QueryOptions::default());
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let first = Media::new(
            "https://h.com/a.jpg",
            Metadata::from([("id".to_string(), "1".to_string())]),
        )
        .unwrap();
        let second = Media::new(
            "https://h.com/a.jpg?x=1",
            Metadata::from([("id".to_string(), "2".to_string())]),
        )
        .unwrap();

        let output = dedup(vec![first, media("https://h.com/b.jpg"), second]);
        assert_eq!(urls(&output), vec!["https://h.com/a.jpg", "https://h.com/b.jpg"]);
        assert_eq!(output[0].attribute("id"), Some("1"));
    }

    #[test]
    fn finalize_is_idempotent() {
        let input = vec![
            media("https://h.com/1.jpg"),
            media("https://h.com/2.mp4"),
            media("https://h.com/1.jpg"),
            media("https://h.com/3.png"),
            media("https://h.com/2.mp4"),
        ];
        let options = QueryOptions::new().with_limit(10);

        let once = finalize(input, &options);
        let twice = finalize(once.clone(), &options);
        assert_eq!(urls(&once), urls(&twice));
    }

    #[test]
    fn finalize_respects_limit_and_order() {
        let input: Vec<Media> = (0..20)
            .map(|i| media(&format!("https://h.com/{i}.jpg")))
            .collect();
        let output = finalize(input, &QueryOptions::new().with_limit(5));

        assert_eq!(output.len(), 5);
        assert_eq!(output[0].url(), "https://h.com/0.jpg");
        assert_eq!(output[4].url(), "https://h.com/4.jpg");

        let distinct: HashSet<&str> = output.iter().map(Media::url).collect();
        assert_eq!(distinct.len(), output.len());
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(120, 50), 3);
        assert_eq!(page_count(100, 50), 2);
        assert_eq!(page_count(1, 50), 1);
        assert_eq!(page_count(0, 50), 1);
        assert_eq!(page_count(10, 0), 1);
    }

    #[test]
    fn accumulator_counts_new_items_and_stops_at_limit() {
        let mut acc = MediaAccumulator::new(3);
        assert_eq!(
            acc.add(vec![media("https://h.com/1.jpg"), media("https://h.com/2.jpg")]),
            2
        );
        assert!(!acc.is_full());
        assert_eq!(acc.remaining(), 1);

        assert_eq!(acc.add(vec![media("https://h.com/2.jpg")]), 0);
        assert_eq!(
            acc.add(vec![media("https://h.com/3.jpg"), media("https://h.com/4.jpg")]),
            2
        );
        assert!(acc.is_full());
        assert_eq!(acc.len(), 4);

        let out = acc.into_media();
        assert_eq!(
            urls(&out),
            vec!["https://h.com/1.jpg", "https://h.com/2.jpg", "https://h.com/3.jpg"]
        );
    }
}
