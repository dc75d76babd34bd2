//! One-way requested-filename → filesystem-safe-filename mapping (
//! "FilenameMapping").
//!
//! Keyed by block path so the same logical block resolves to the same file
//! on disk on every run, even when its requested name contains characters
//! the filesystem can't carry verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilenameMapping(pub HashMap<String, String>);

impl FilenameMapping {
    #[must_use]
    pub fn get(&self, block_path: &str) -> Option<&str> {
        self.0.get(block_path).map(String::as_str)
    }

    pub fn insert(&mut self, block_path: impl Into<String>, filename: impl Into<String>) {
        self.0.insert(block_path.into(), filename.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_mapped_filename() {
        let mut mapping = FilenameMapping::default();
        mapping.insert("buttons/primary", "primary.tsx");
        assert_eq!(mapping.get("buttons/primary"), Some("primary.tsx"));
        assert_eq!(mapping.get("buttons/missing"), None);
    }
}
