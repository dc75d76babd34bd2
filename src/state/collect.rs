//! Collected listing-page links ("Collect").
//!
//! Persisted once per site and never regenerated on subsequent runs — the
//! idempotence guarantee treats `collect.json`'s mere existence as
//! proof the collect phase already ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionLink {
    pub link: String,
    pub name: Option<String>,
    pub block_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResult {
    pub collections: Vec<CollectionLink>,
    pub total_links: usize,
    pub total_blocks: usize,
    pub last_update: DateTime<Utc>,
}

impl Default for CollectResult {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CollectResult {
    #[must_use]
    pub fn new(collections: Vec<CollectionLink>) -> Self {
        let total_links = collections.len();
        let total_blocks = collections.iter().filter_map(|c| c.block_count).sum();
        Self {
            collections,
            total_links,
            total_blocks,
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_derived_from_collections() {
        let result = CollectResult::new(vec![
            CollectionLink { link: "/buttons".into(), name: Some("Buttons".into()), block_count: Some(5) },
            CollectionLink { link: "/cards".into(), name: Some("Cards".into()), block_count: None },
        ]);
        assert_eq!(result.total_links, 2);
        assert_eq!(result.total_blocks, 5);
    }
}
