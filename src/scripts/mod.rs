//! Script injector: loads per-site user scripts and injects them, with the
//! user-script API shim (`GM_xmlhttpRequest`, `GM_{get,set,delete,list}Value`,
//! `GM_info`) spliced ahead of any script carrying a `// ==UserScript==`
//! header.

use std::path::Path;

use crate::driver::PageHandle;
use crate::errors::{CrawlError, Result};

/// Loaded once at startup as a static resource, never generated per-injection.
pub const GM_SHIM_JS: &str = include_str!("gm_shim.js");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTiming {
    BeforePageLoad,
    AfterPageLoad,
}

/// One configured script: its filename under the site's `scripts/`
/// directory, and an optional explicit timing that overrides whatever
/// `@run-at` directive the file itself carries.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub filename: String,
    pub timing: Option<ScriptTiming>,
}

impl ScriptEntry {
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            timing: None,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: ScriptTiming) -> Self {
        self.timing = Some(timing);
        self
    }
}

/// Read every entry's file under `scripts_dir`, resolve its effective timing
/// (explicit config beats a parsed `@run-at` directive beats the
/// `afterPageLoad` default), prepend the GM shim to user scripts, and split
/// the result into before/after buckets ready for
/// `LinkExecutorConfig::{before_open_scripts, after_open_scripts}`.
pub async fn load_scripts(scripts_dir: &Path, entries: &[ScriptEntry]) -> Result<(Vec<String>, Vec<String>)> {
    let mut before = Vec::new();
    let mut after = Vec::new();

    for entry in entries {
        let path = scripts_dir.join(&entry.filename);
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| CrawlError::Other(e.into()))?;
        let timing = entry.timing.unwrap_or_else(|| parse_run_at(&source).unwrap_or(ScriptTiming::AfterPageLoad));
        let injected = if is_user_script(&source) { format!("{GM_SHIM_JS}\n{source}") } else { source };
        match timing {
            ScriptTiming::BeforePageLoad => before.push(injected),
            ScriptTiming::AfterPageLoad => after.push(injected),
        }
    }

    Ok((before, after))
}

/// True if `source` carries a Greasemonkey-style header.
#[must_use]
pub fn is_user_script(source: &str) -> bool {
    source.contains("==UserScript==")
}

/// Parse a `// @run-at document-start|document-end|document-idle` directive,
/// mapping `document-end`/`document-idle` onto `afterPageLoad` since this
/// injector only distinguishes pre- from post-navigation.
#[must_use]
pub fn parse_run_at(source: &str) -> Option<ScriptTiming> {
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(directive) = trimmed.strip_prefix("// @run-at") {
            return match directive.trim() {
                "document-start" => Some(ScriptTiming::BeforePageLoad),
                "document-end" | "document-idle" => Some(ScriptTiming::AfterPageLoad),
                _ => None,
            };
        }
    }
    None
}

/// Inject already-resolved before/after buckets directly, bypassing the
/// link executor's config plumbing — used by callers that load scripts
/// outside the normal per-site config path.
pub async fn inject(page: &dyn PageHandle, before: &[String], after: &[String]) -> Result<()> {
    for script in before {
        page.add_init_script(script).await.map_err(CrawlError::DriverError)?;
    }
    for script in after {
        page.evaluate(script).await.map_err(CrawlError::DriverError)?;
    }
    Ok(())
}
