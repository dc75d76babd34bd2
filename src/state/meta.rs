//! Run summary, written once at the end of a site crawl.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collect::CollectionLink;

/// A deduplicated, sorted set plus its count, used for the `freePages` /
/// `freeBlocks` summaries in `meta.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountedSet {
    pub count: usize,
    pub items: Vec<String>,
}

impl CountedSet {
    #[must_use]
    pub fn from_iter(items: impl IntoIterator<Item = String>) -> Self {
        let mut items: Vec<String> = items.into_iter().collect();
        items.sort();
        items.dedup();
        Self { count: items.len(), items }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMeta {
    pub start_url: String,
    pub collection_links: Vec<CollectionLink>,
    pub total_displayed: usize,
    pub total_actual: usize,
    pub free_pages: CountedSet,
    pub free_blocks: CountedSet,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub is_complete: bool,
}

impl Default for SiteMeta {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            collection_links: Vec::new(),
            total_displayed: 0,
            total_actual: 0,
            free_pages: CountedSet::default(),
            free_blocks: CountedSet::default(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            is_complete: false,
        }
    }
}

impl SiteMeta {
    #[must_use]
    pub fn started(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            started_at: Utc::now(),
            ..Self::default()
        }
    }

    pub fn finish(&mut self) {
        let ended_at = Utc::now();
        self.duration_ms = Some(
            (ended_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.ended_at = Some(ended_at);
        self.is_complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_set_dedups_and_sorts() {
        let set = CountedSet::from_iter(vec!["b".to_string(), "a".to_string(), "a".to_string()]);
        assert_eq!(set.count, 2);
        assert_eq!(set.items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn finish_sets_duration_and_completion() {
        let mut meta = SiteMeta::started("https://example.com");
        assert!(!meta.is_complete);
        meta.finish();
        assert!(meta.is_complete);
        assert!(meta.ended_at.is_some());
        assert!(meta.duration_ms.is_some());
    }
}
