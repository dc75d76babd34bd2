//! Free-text matching for both a page-level check and a block-scoped check.
//!
//! Two layers for both page- and block-scoped checks: a user-supplied
//! predicate, or a built-in text matcher (`"default"` → `/free/i`, any other
//! string → exact match) applied within a search region. Block-scoped
//! matching additionally resolves and caches a region strategy per page, so
//! repeated blocks on the same listing page don't re-derive DOM shape from
//! scratch.

mod region;

pub use region::FreeRegionStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::driver::{Locator, PageHandle};
use crate::errors::{CrawlError, Result};

/// User-supplied `skipFree(block)` / `skipFree(page)` predicate.
#[async_trait]
pub trait FreePredicate: Send + Sync {
    async fn is_free(&self, page: &dyn PageHandle, block: Option<&dyn Locator>) -> anyhow::Result<bool>;
}

/// The free-text matcher configuration a page or block can declare.
#[derive(Clone)]
pub enum FreeMatcher {
    /// `skipFree(block)` / `skipFree(page)` function form.
    Predicate(Arc<dyn FreePredicate>),
    /// `"default"` string form: case-insensitive `/free/i`.
    Default,
    /// Any other string form: exact (case-sensitive) match.
    Exact(String),
}

impl std::fmt::Debug for FreeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Predicate(_) => write!(f, "FreeMatcher::Predicate(..)"),
            Self::Default => write!(f, "FreeMatcher::Default"),
            Self::Exact(s) => write!(f, "FreeMatcher::Exact({s:?})"),
        }
    }
}

fn count_matches(text: &str, matcher: &FreeMatcher) -> usize {
    match matcher {
        FreeMatcher::Predicate(_) => 0,
        FreeMatcher::Default => {
            static FREE_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
            let re = FREE_RE.get_or_init(|| Regex::new(r"(?i)free").expect("valid free regex"));
            re.find_iter(text).count()
        }
        FreeMatcher::Exact(needle) => text.matches(needle.as_str()).count(),
    }
}

/// Page-level free check (step 5). The whole page body is the
/// search region; there is no per-page region-strategy caching because a
/// page is checked at most once.
pub async fn check_page_free(page: &dyn PageHandle, matcher: &FreeMatcher) -> Result<bool> {
    if let FreeMatcher::Predicate(predicate) = matcher {
        return predicate
            .is_free(page, None)
            .await
            .map_err(CrawlError::HandlerError);
    }

    let text = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .map_err(CrawlError::DriverError)?;
    let text = text.as_str().unwrap_or_default();
    resolve_count(count_matches(text, matcher))
}

/// Block-level free check ("Free checker (block-scoped)").
///
/// `region_cache` is populated on first use for a given page and reused for
/// every subsequent block on that page.
pub async fn check_block_free(
    page: &dyn PageHandle,
    block: &dyn Locator,
    matcher: &FreeMatcher,
    region_cache: &mut Option<FreeRegionStrategy>,
) -> Result<bool> {
    if let FreeMatcher::Predicate(predicate) = matcher {
        return predicate
            .is_free(page, Some(block))
            .await
            .map_err(CrawlError::HandlerError);
    }

    let strategy = match region_cache {
        Some(s) => *s,
        None => {
            let detected = region::detect_strategy(page, block).await?;
            *region_cache = Some(detected);
            detected
        }
    };

    let text = region::region_text(page, block, strategy).await?;
    resolve_count(count_matches(&text, matcher))
}

fn resolve_count(count: usize) -> Result<bool> {
    match count {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(CrawlError::FreeAmbiguous { count: n }),
    }
}
