//! Block-count mismatch log ("Completion verification").
//!
//! Recorded whenever a page's declared block count (from `CollectResult`)
//! disagrees with what the DOM actually exposes, regardless of whether
//! `ignoreMismatch` lets the run continue past it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchRecord {
    pub page_path: String,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MismatchLog(pub Vec<MismatchRecord>);

impl MismatchLog {
    pub fn record(&mut self, page_path: impl Into<String>, expected: usize, actual: usize) {
        self.0.push(MismatchRecord {
            page_path: page_path.into(),
            expected,
            actual,
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_in_order() {
        let mut log = MismatchLog::default();
        log.record("buttons", 7, 6);
        log.record("cards", 3, 3);
        assert_eq!(log.0.len(), 2);
        assert_eq!(log.0[0].page_path, "buttons");
        assert_eq!(log.0[0].expected, 7);
        assert_eq!(log.0[0].actual, 6);
    }
}
