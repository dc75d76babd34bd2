//! Block name resolution.
//!
//! Resolution order: (1) configured `getBlockName(block)`, (2) configured
//! `blockNameLocator`, (3) default in-page heading heuristic. The whole
//! chain retries up to three times, 200ms apart, if every strategy comes up
//! empty; a complex heading (multiple children, no link) fails the page
//! immediately without retrying.

use std::time::Duration;

use crate::driver::{Locator, PageHandle};
use crate::errors::{CrawlError, Result};
use crate::util::{js_string, scoped_locator};

use super::config::BlockNameConfig;

const RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_ATTEMPTS: u32 = 3;

enum NameOutcome {
    Found(String),
    NotFound,
    ComplexHeading,
}

/// Resolve a block's name, retrying the whole strategy chain up to three
/// times. Returns `Ok(None)` if every attempt comes up empty (caller treats
/// this as a name-extraction failure); returns `Err(ComplexHeading)`
/// immediately on a heading with multiple children and no anchor.
pub async fn resolve_block_name(
    page: &dyn PageHandle,
    block: &dyn Locator,
    config: &BlockNameConfig,
    page_path: &str,
) -> Result<Option<String>> {
    for attempt in 0..MAX_ATTEMPTS {
        match try_once(page, block, config).await? {
            NameOutcome::Found(name) => return Ok(Some(name)),
            NameOutcome::ComplexHeading => {
                return Err(CrawlError::ComplexHeading {
                    page_path: page_path.to_string(),
                });
            }
            NameOutcome::NotFound => {}
        }
        if attempt + 1 < MAX_ATTEMPTS {
            page.wait_timeout(RETRY_DELAY).await.map_err(CrawlError::DriverError)?;
        }
    }
    Ok(None)
}

async fn try_once(page: &dyn PageHandle, block: &dyn Locator, config: &BlockNameConfig) -> Result<NameOutcome> {
    if let Some(get_block_name) = &config.get_block_name {
        let name = get_block_name.name(page, block).await.map_err(CrawlError::HandlerError)?;
        return Ok(non_empty(name));
    }

    if let Some(locator_selector) = &config.block_name_locator {
        let loc = scoped_locator(page, block, locator_selector);
        let text = loc.text_content().await.map_err(CrawlError::DriverError)?;
        return Ok(non_empty(Some(text)));
    }

    default_name_via_heading(page, block).await
}

fn non_empty(name: Option<String>) -> NameOutcome {
    match name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        Some(name) => NameOutcome::Found(name),
        None => NameOutcome::NotFound,
    }
}

const HEADING_SELECTOR: &str = "h1,h2,h3,h4,h5,h6";

/// Default resolution: locate the first heading inside the block. If it has
/// multiple element children, take the first `<a>` child's text; if it has
/// no link, that's a complex heading (fatal for the page). Otherwise take
/// the heading's own text.
async fn default_name_via_heading(page: &dyn PageHandle, block: &dyn Locator) -> Result<NameOutcome> {
    let script = format!(
        r#"(() => {{
            const scope = document.querySelector({block_sel});
            if (!scope) return {{ status: 'none' }};
            const heading = scope.querySelector({heading_sel});
            if (!heading) return {{ status: 'none' }};
            if (heading.children.length > 1) {{
                const link = heading.querySelector('a');
                if (!link) return {{ status: 'complex' }};
                return {{ status: 'found', name: link.textContent.trim() }};
            }}
            return {{ status: 'found', name: heading.textContent.trim() }};
        }})()"#,
        block_sel = js_string(block.selector()),
        heading_sel = js_string(HEADING_SELECTOR),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    let status = value.get("status").and_then(|v| v.as_str()).unwrap_or("none");
    Ok(match status {
        "found" => {
            let name = value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            if name.is_empty() { NameOutcome::NotFound } else { NameOutcome::Found(name) }
        }
        "complex" => NameOutcome::ComplexHeading,
        _ => NameOutcome::NotFound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::{FakeLocator, ScriptedPage};

    #[tokio::test]
    async fn resolves_simple_heading_text() {
        let page = ScriptedPage::new();
        page.on_contains("heading.children.length", serde_json::json!({"status": "found", "name": "Hero Block"}));
        let block = FakeLocator::new(".block");
        let config = BlockNameConfig::default();
        let name = resolve_block_name(&page, &block, &config, "buttons").await.unwrap();
        assert_eq!(name, Some("Hero Block".to_string()));
    }

    #[tokio::test]
    async fn complex_heading_without_link_fails_the_page() {
        let page = ScriptedPage::new();
        page.on_contains("heading.children.length", serde_json::json!({"status": "complex"}));
        let block = FakeLocator::new(".block");
        let config = BlockNameConfig::default();
        let result = resolve_block_name(&page, &block, &config, "buttons").await;
        assert!(matches!(result, Err(CrawlError::ComplexHeading { page_path }) if page_path == "buttons"));
    }

    #[tokio::test]
    async fn no_heading_found_after_retries_returns_none() {
        let page = ScriptedPage::new();
        let block = FakeLocator::new(".block");
        let config = BlockNameConfig::default();
        let name = resolve_block_name(&page, &block, &config, "buttons").await.unwrap();
        assert_eq!(name, None);
    }

    #[tokio::test]
    async fn configured_locator_takes_precedence_over_default_heading() {
        let page = ScriptedPage::new();
        let block = FakeLocator::new(".block");
        let mut config = BlockNameConfig::default();
        config.block_name_locator = Some("[data-name]".to_string());
        // scoped_locator builds a FakeLocator via page.locator(...), which
        // ScriptedPage answers with an empty FakeLocator (empty text) -
        // exercising the "falls through to retry" path rather than a match.
        let name = resolve_block_name(&page, &block, &config, "buttons").await.unwrap();
        assert_eq!(name, None);
    }
}
