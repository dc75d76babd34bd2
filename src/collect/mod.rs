//! Link collector: gathers listing-page links into a persisted collect.json.
//!
//! Visits the start URL, extracts section → link tuples, and persists the
//! result as `collect.json`. If that file already exists the whole phase is
//! skipped — `collect.json`'s mere presence is the idempotence signal.

mod config;

pub use config::{LinkCollectorConfig, SectionStrategy};

use std::path::Path;
use std::time::Duration;

use regex::Regex;

use crate::driver::{PageHandle, WaitUntil};
use crate::errors::{CrawlError, Result};
use crate::state::{CollectResult, CollectionLink};
use crate::util::js_string;

const TAB_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, serde::Deserialize)]
struct RawLink {
    href: Option<String>,
    name: Option<String>,
    #[serde(rename = "countText")]
    count_text: Option<String>,
}

/// Run the collect phase, or skip it if `collect_file` already exists.
pub async fn collect(
    page: &dyn PageHandle,
    config: &LinkCollectorConfig,
    collect_file: &Path,
) -> Result<CollectResult> {
    if tokio::fs::try_exists(collect_file).await.unwrap_or(false) {
        return Err(CrawlError::CollectExists);
    }

    page.goto(&config.start_url, WaitUntil::Load, Duration::from_secs(30))
        .await
        .map_err(CrawlError::DriverError)?;

    let raw_links = match &config.strategy {
        SectionStrategy::Static { sections_selector } => {
            extract_links(page, sections_selector, config).await?
        }
        SectionStrategy::ClickThrough {
            tablist_selector,
            tab_selector,
            panel_selector,
        } => {
            collect_click_through(page, tablist_selector, tab_selector, panel_selector, config).await?
        }
    };

    let links = raw_links
        .into_iter()
        .filter_map(|raw| {
            let link = raw.href?;
            Some(CollectionLink {
                link,
                name: raw.name,
                block_count: raw.count_text.as_deref().map(sum_digit_runs).filter(|n| *n > 0),
            })
        })
        .collect();

    let result = CollectResult::new(links);
    crate::state::save_atomic(collect_file, &result)
        .await
        .map_err(CrawlError::Other)?;
    Ok(result)
}

async fn collect_click_through(
    page: &dyn PageHandle,
    tablist_selector: &str,
    tab_selector: &str,
    panel_selector: &str,
    config: &LinkCollectorConfig,
) -> Result<Vec<RawLink>> {
    let tabs = page
        .locator(&format!("{tablist_selector} {tab_selector}"))
        .all()
        .await
        .map_err(CrawlError::DriverError)?;

    let mut all_links = Vec::new();
    for tab in tabs {
        tab.click().await.map_err(CrawlError::DriverError)?;
        page.wait_timeout(TAB_SETTLE_DELAY)
            .await
            .map_err(CrawlError::DriverError)?;
        let mut links = extract_links(page, &visible_panel_script(panel_selector), config).await?;
        all_links.append(&mut links);
    }
    Ok(all_links)
}

fn visible_panel_script(panel_selector: &str) -> String {
    // Encoded as a CSS selector string is not enough to express "currently
    // visible" — extract_links's evaluate call special-cases this by
    // detecting the synthetic prefix and switching query strategy.
    format!("__visible__:{panel_selector}")
}

async fn extract_links(
    page: &dyn PageHandle,
    container_selector: &str,
    config: &LinkCollectorConfig,
) -> Result<Vec<RawLink>> {
    let name_sel = config.name_selector.as_deref().map(js_string).unwrap_or_else(|| "null".to_string());
    let count_sel = config.count_selector.as_deref().map(js_string).unwrap_or_else(|| "null".to_string());

    let containers_js = if let Some(panel_selector) = container_selector.strip_prefix("__visible__:") {
        format!(
            "Array.from(document.querySelectorAll({sel})).filter(el => el.offsetParent !== null).slice(0, 1)",
            sel = js_string(panel_selector)
        )
    } else {
        format!("Array.from(document.querySelectorAll({sel}))", sel = js_string(container_selector))
    };

    let script = format!(
        r#"(() => {{
            const containers = {containers_js};
            const nameSel = {name_sel};
            const countSel = {count_sel};
            const out = [];
            for (const container of containers) {{
                for (const a of Array.from(container.querySelectorAll('a'))) {{
                    const href = a.getAttribute('href');
                    let name = null;
                    if (nameSel) {{
                        const el = a.querySelector(nameSel);
                        name = el ? el.textContent.trim() : null;
                    }} else {{
                        for (const node of a.childNodes) {{
                            if (node.nodeType === 3 && node.textContent.trim()) {{
                                name = node.textContent.trim();
                                break;
                            }}
                        }}
                        if (!name) {{
                            const text = a.textContent.trim();
                            name = text.length > 0 ? text : null;
                        }}
                    }}
                    let countText = null;
                    if (countSel) {{
                        const el = a.querySelector(countSel);
                        countText = el ? el.textContent.trim() : null;
                    }}
                    out.push({{ href, name, countText }});
                }}
            }}
            return out;
        }})()"#
    );

    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    let links: Vec<RawLink> = serde_json::from_value(value).map_err(|e| CrawlError::Other(e.into()))?;
    Ok(links)
}

/// Sum every run of consecutive digits in `text`: a block count badge like
/// "12 of 34" falls back to summing all digit runs in the count text.
fn sum_digit_runs(text: &str) -> usize {
    static DIGITS: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid digit regex"));
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_multiple_digit_runs() {
        assert_eq!(sum_digit_runs("5 blocks"), 5);
        assert_eq!(sum_digit_runs("no blocks"), 0);
        assert_eq!(sum_digit_runs("12 of 34"), 46);
    }
}
