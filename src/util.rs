//! Small helpers shared across the extraction modules.
//!
//! `js_string` and `scoped_locator` are the two seams every in-page
//! evaluation or relative-selector query goes through; kept here instead of
//! duplicated in `collect`, `block`, and `free`.

use crate::driver::{Locator, PageHandle};

/// JSON-encode a string for splicing into a JS template literal/expression.
#[must_use]
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "null".to_string())
}

/// Build a page-level locator scoped to `relative_selector` inside `scope`,
/// by concatenating CSS selectors with a descendant combinator. The driver
/// traits have no element-scoped query primitive, so every "relative to this
/// element" lookup in this crate goes through the same selector-string
/// composition `collect::extract_links` already uses for click-through
/// panels.
#[must_use]
pub fn scoped_locator(page: &dyn PageHandle, scope: &dyn Locator, relative_selector: &str) -> Box<dyn Locator> {
    page.locator(&format!("{} {}", scope.selector(), relative_selector))
}

/// Normalize a collection link into the key form used throughout
/// `Progress`/`FreeRecord` (`"/a"` -> `"a"`), so a link read from
/// `collect.json` and the same path later recorded as complete always agree.
#[must_use]
pub fn normalize_link(link: &str) -> String {
    link.trim_start_matches('/').trim_end_matches('/').to_string()
}
