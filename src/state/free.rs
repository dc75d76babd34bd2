//! Skip catalog for pages/blocks detected as free-tier-locked (
//! "FreeRecord").
//!
//! `blocksByPage` is a derived view, not separate state — it's recomputed
//! from `blocks` on every serialize so the wire document can't drift from the
//! sets that actually drive skip decisions.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone)]
pub struct FreeRecord {
    pub pages: HashSet<String>,
    pub blocks: HashSet<String>,
    pub last_update: DateTime<Utc>,
}

impl Default for FreeRecord {
    fn default() -> Self {
        Self {
            pages: HashSet::new(),
            blocks: HashSet::new(),
            last_update: Utc::now(),
        }
    }
}

impl FreeRecord {
    #[must_use]
    pub fn is_page_free(&self, page_path: &str) -> bool {
        self.pages.contains(page_path)
    }

    #[must_use]
    pub fn is_block_free(&self, block_path: &str) -> bool {
        self.blocks.contains(block_path)
    }

    pub fn mark_page_free(&mut self, page_path: impl Into<String>) {
        self.pages.insert(page_path.into());
        self.last_update = Utc::now();
    }

    pub fn mark_block_free(&mut self, block_path: impl Into<String>) {
        self.blocks.insert(block_path.into());
        self.last_update = Utc::now();
    }

    /// Group `blocks` (keyed `{page path}/{block name}`) by page path.
    #[must_use]
    pub fn blocks_by_page(&self) -> HashMap<String, Vec<String>> {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for block_path in &self.blocks {
            let (page, name) = match block_path.rsplit_once('/') {
                Some((page, name)) => (page.to_string(), name.to_string()),
                None => (String::new(), block_path.clone()),
            };
            grouped.entry(page).or_default().push(name);
        }
        for names in grouped.values_mut() {
            names.sort();
        }
        grouped
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FreeRecordWire {
    last_update: DateTime<Utc>,
    total_pages: usize,
    total_blocks: usize,
    pages: Vec<String>,
    blocks: Vec<String>,
    blocks_by_page: HashMap<String, Vec<String>>,
}

impl Serialize for FreeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pages: Vec<String> = self.pages.iter().cloned().collect();
        pages.sort();
        let mut blocks: Vec<String> = self.blocks.iter().cloned().collect();
        blocks.sort();
        let wire = FreeRecordWire {
            last_update: self.last_update,
            total_pages: self.pages.len(),
            total_blocks: self.blocks.len(),
            blocks_by_page: self.blocks_by_page(),
            pages,
            blocks,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FreeRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = FreeRecordWire::deserialize(deserializer)?;
        Ok(Self {
            pages: wire.pages.into_iter().collect(),
            blocks: wire.blocks.into_iter().collect(),
            last_update: wire.last_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_by_page_groups_by_prefix() {
        let mut record = FreeRecord::default();
        record.mark_block_free("buttons/primary");
        record.mark_block_free("buttons/secondary");
        record.mark_block_free("cards/hero");
        let grouped = record.blocks_by_page();
        assert_eq!(grouped["buttons"], vec!["primary".to_string(), "secondary".to_string()]);
        assert_eq!(grouped["cards"], vec!["hero".to_string()]);
    }

    #[test]
    fn wire_shape_includes_derived_grouping_and_totals() {
        let mut record = FreeRecord::default();
        record.mark_page_free("buttons");
        record.mark_block_free("buttons/primary");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["totalBlocks"], 1);
        assert!(json["blocksByPage"]["buttons"].is_array());
    }

    #[test]
    fn round_trips_through_json() {
        let mut record = FreeRecord::default();
        record.mark_page_free("x");
        let json = serde_json::to_string(&record).unwrap();
        let back: FreeRecord = serde_json::from_str(&json).unwrap();
        assert!(back.is_page_free("x"));
    }
}
