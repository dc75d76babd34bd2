//! Block-scoped search-region resolution ("Free checker
//! (block-scoped)").
//!
//! ```text
//! (i)   heading has >1 element children  -> search in the heading
//! (ii)  heading's parent has only that one child -> search in the grandparent
//! (iii) otherwise -> search in the heading's parent
//! no heading at all -> search the whole block
//! ```

use crate::driver::{Locator, PageHandle};
use crate::errors::{CrawlError, Result};
use crate::util::js_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeRegionStrategy {
    Heading,
    Grandparent,
    Parent,
    WholeBlock,
}

const HEADING_SELECTOR: &str = "h1,h2,h3,h4,h5,h6";

pub async fn detect_strategy(page: &dyn PageHandle, block: &dyn Locator) -> Result<FreeRegionStrategy> {
    let script = format!(
        r#"(() => {{
            const scope = document.querySelector({block_sel});
            if (!scope) return 'whole';
            const heading = scope.querySelector({heading_sel});
            if (!heading) return 'whole';
            if (heading.children.length > 1) return 'heading';
            const parent = heading.parentElement;
            if (parent && parent.children.length === 1) return 'grandparent';
            return 'parent';
        }})()"#,
        block_sel = js_string(block.selector()),
        heading_sel = js_string(HEADING_SELECTOR),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(match value.as_str().unwrap_or("whole") {
        "heading" => FreeRegionStrategy::Heading,
        "grandparent" => FreeRegionStrategy::Grandparent,
        "parent" => FreeRegionStrategy::Parent,
        _ => FreeRegionStrategy::WholeBlock,
    })
}

pub async fn region_text(page: &dyn PageHandle, block: &dyn Locator, strategy: FreeRegionStrategy) -> Result<String> {
    let strategy_tag = match strategy {
        FreeRegionStrategy::Heading => "heading",
        FreeRegionStrategy::Grandparent => "grandparent",
        FreeRegionStrategy::Parent => "parent",
        FreeRegionStrategy::WholeBlock => "whole",
    };
    let script = format!(
        r#"(() => {{
            const scope = document.querySelector({block_sel});
            if (!scope) return '';
            const strategy = {strategy};
            if (strategy === 'whole') return scope.innerText || '';
            const heading = scope.querySelector({heading_sel});
            if (!heading) return scope.innerText || '';
            let region = heading;
            if (strategy === 'grandparent') region = heading.parentElement?.parentElement ?? heading;
            if (strategy === 'parent') region = heading.parentElement ?? heading;
            return region.innerText || '';
        }})()"#,
        block_sel = js_string(block.selector()),
        heading_sel = js_string(HEADING_SELECTOR),
        strategy = js_string(strategy_tag),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}
