//! Resumable completion record ("Progress").
//!
//! Two disjoint sets of normalized string keys: `completedPages` and
//! `completedBlocks` (`{page path}/{block name}`). A page key is present only
//! once every block beneath it has been processed — the scheduler, not this
//! type, enforces that ordering; `Progress` itself just records what it's
//! told. Entries are added within a run, never removed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub completed_pages: HashSet<String>,
    pub completed_blocks: HashSet<String>,
    pub last_update: DateTime<Utc>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            completed_pages: HashSet::new(),
            completed_blocks: HashSet::new(),
            last_update: Utc::now(),
        }
    }
}

impl Progress {
    #[must_use]
    pub fn is_page_complete(&self, page_path: &str) -> bool {
        self.completed_pages.contains(page_path)
    }

    #[must_use]
    pub fn is_block_complete(&self, block_path: &str) -> bool {
        self.completed_blocks.contains(block_path)
    }

    pub fn mark_block_complete(&mut self, block_path: impl Into<String>) {
        self.completed_blocks.insert(block_path.into());
        self.last_update = Utc::now();
    }

    pub fn mark_page_complete(&mut self, page_path: impl Into<String>) {
        self.completed_pages.insert(page_path.into());
        self.last_update = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_has_nothing_complete() {
        let progress = Progress::default();
        assert!(!progress.is_page_complete("x"));
        assert!(!progress.is_block_complete("x/hero"));
    }

    #[test]
    fn marking_is_additive() {
        let mut progress = Progress::default();
        progress.mark_block_complete("x/hero");
        progress.mark_block_complete("x/footer");
        progress.mark_page_complete("x");
        assert!(progress.is_page_complete("x"));
        assert!(progress.is_block_complete("x/hero"));
        assert!(progress.is_block_complete("x/footer"));
        assert_eq!(progress.completed_blocks.len(), 2);
    }

    #[test]
    fn round_trips_through_json() {
        let mut progress = Progress::default();
        progress.mark_page_complete("x");
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("completedPages"));
        let back: Progress = serde_json::from_str(&json).unwrap();
        assert!(back.is_page_complete("x"));
    }
}
