//! Auto-extractor: per-block variant/tab walking and code extraction.
//!
//! For declarative block configs, walks variant switchers and file tabs and
//! pulls code text out of a declared code region, writing one file per tab
//! per variant to disk. All DOM work happens via `PageHandle::evaluate`
//! in-page JS, never server-side HTML parsing (Non-goal: "does not parse
//! syntax trees of extracted code").

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::driver::PageHandle;
use crate::errors::{CrawlError, Result};
use crate::state::FilenameMapping;
use crate::util::js_string;

/// Declarative config for one block's code extraction.
///
/// Open Question resolved in DESIGN.md: when more than one variant is
/// present, files are nested under a sanitized variant subdirectory so
/// same-named tabs across variants (e.g. both labelled `"index.tsx"`) don't
/// collide; a single (or absent) variant writes directly under the block
/// directory.
#[derive(Debug, Clone)]
pub struct AutoExtractConfig {
    /// Selector (relative to the block) for the control that switches
    /// variants. `None` means the block has exactly one variant.
    pub variant_switcher: Option<String>,
    /// Selector (relative to the switcher) for each selectable option.
    pub variant_option_selector: String,
    /// Selector (relative to the block) containing file tabs. `None` means
    /// the block exposes a single file with no tab UI.
    pub tab_container: Option<String>,
    /// Selector (relative to `tab_container`) for one file tab.
    pub tab_selector: String,
    /// Selector (relative to the block) scoping the code extraction: the
    /// *last* `pre` element found inside it wins, to avoid duplicates when
    /// a region contains a hidden "before" snippet alongside the live one.
    pub code_region: String,
}

impl AutoExtractConfig {
    #[must_use]
    pub fn new(code_region: impl Into<String>) -> Self {
        Self {
            variant_switcher: None,
            variant_option_selector: "[role=option], option".to_string(),
            tab_container: None,
            tab_selector: "[role=tab]".to_string(),
            code_region: code_region.into(),
        }
    }

    #[must_use]
    pub fn with_variants(mut self, switcher_selector: impl Into<String>) -> Self {
        self.variant_switcher = Some(switcher_selector.into());
        self
    }

    #[must_use]
    pub fn with_tabs(mut self, tab_container_selector: impl Into<String>) -> Self {
        self.tab_container = Some(tab_container_selector.into());
        self
    }
}

/// Process one block: walk variants and file tabs, writing extracted code
/// under `output_dir/block_name/...`.
pub async fn process_block(
    page: &dyn PageHandle,
    block_selector: &str,
    block_name: &str,
    config: &AutoExtractConfig,
    output_dir: &Path,
    filename_mapping: &Mutex<FilenameMapping>,
    block_path: &str,
) -> Result<()> {
    let block_dir = output_dir.join(sanitize_component(block_name));

    let variants = match &config.variant_switcher {
        Some(switcher_selector) => read_variant_options(page, block_selector, switcher_selector, &config.variant_option_selector).await?,
        None => vec![None],
    };

    let multi_variant = variants.len() > 1;

    for (index, variant_label) in variants.into_iter().enumerate() {
        if let (Some(switcher_selector), Some(label)) = (&config.variant_switcher, &variant_label) {
            select_variant(page, block_selector, switcher_selector, index, label).await?;
        }

        let variant_dir = match (&variant_label, multi_variant) {
            (Some(label), true) => block_dir.join(sanitize_component(label)),
            _ => block_dir.clone(),
        };

        match &config.tab_container {
            Some(tab_container) => {
                let tab_texts = read_tab_texts(page, block_selector, tab_container, &config.tab_selector).await?;
                for (tab_index, tab_text) in tab_texts.into_iter().enumerate() {
                    click_tab(page, block_selector, tab_container, &config.tab_selector, tab_index).await?;
                    let code = extract_code(page, block_selector, &config.code_region).await?;
                    write_file(&variant_dir, &tab_text, &code, filename_mapping, block_path, tab_index).await?;
                }
            }
            None => {
                let code = extract_code(page, block_selector, &config.code_region).await?;
                write_single_file(&variant_dir, block_name, &code, filename_mapping, block_path).await?;
            }
        }
    }

    Ok(())
}

async fn read_variant_options(
    page: &dyn PageHandle,
    block_selector: &str,
    switcher_selector: &str,
    option_selector: &str,
) -> Result<Vec<Option<String>>> {
    let script = format!(
        r#"(() => {{
            const block = document.querySelector({block_sel});
            if (!block) return [];
            const switcher = block.querySelector({switcher_sel});
            if (!switcher) return [];
            return Array.from(switcher.querySelectorAll({opt_sel})).map(el => el.textContent.trim());
        }})()"#,
        block_sel = js_string(block_selector),
        switcher_sel = js_string(switcher_selector),
        opt_sel = js_string(option_selector),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    let labels: Vec<String> = serde_json::from_value(value).unwrap_or_default();
    if labels.is_empty() {
        return Ok(vec![None]);
    }
    Ok(labels.into_iter().map(Some).collect())
}

async fn select_variant(
    page: &dyn PageHandle,
    block_selector: &str,
    switcher_selector: &str,
    index: usize,
    _label: &str,
) -> Result<()> {
    let script = format!(
        r#"(() => {{
            const block = document.querySelector({block_sel});
            if (!block) return false;
            const switcher = block.querySelector({switcher_sel});
            if (!switcher) return false;
            const options = switcher.querySelectorAll('[role=option], option');
            const target = options[{index}];
            if (target) target.click();
            return !!target;
        }})()"#,
        block_sel = js_string(block_selector),
        switcher_sel = js_string(switcher_selector),
    );
    page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(())
}

async fn read_tab_texts(
    page: &dyn PageHandle,
    block_selector: &str,
    tab_container: &str,
    tab_selector: &str,
) -> Result<Vec<String>> {
    let script = format!(
        r#"(() => {{
            const block = document.querySelector({block_sel});
            if (!block) return [];
            const container = block.querySelector({container_sel});
            if (!container) return [];
            return Array.from(container.querySelectorAll({tab_sel})).map(el => el.textContent.trim());
        }})()"#,
        block_sel = js_string(block_selector),
        container_sel = js_string(tab_container),
        tab_sel = js_string(tab_selector),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

async fn click_tab(
    page: &dyn PageHandle,
    block_selector: &str,
    tab_container: &str,
    tab_selector: &str,
    tab_index: usize,
) -> Result<()> {
    let script = format!(
        r#"(() => {{
            const block = document.querySelector({block_sel});
            if (!block) return false;
            const container = block.querySelector({container_sel});
            if (!container) return false;
            const tabs = container.querySelectorAll({tab_sel});
            const target = tabs[{tab_index}];
            if (target) target.click();
            return !!target;
        }})()"#,
        block_sel = js_string(block_selector),
        container_sel = js_string(tab_container),
        tab_sel = js_string(tab_selector),
    );
    page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(())
}

/// Extract code from the last `pre` inside `code_region` (scoped to the
/// block). Falls back to plain text content; reconstructs from
/// `.token-line` children when the page uses a syntax-highlighter, stripping
/// copy-button/ellipsis decoration ("default code extractor").
async fn extract_code(page: &dyn PageHandle, block_selector: &str, code_region: &str) -> Result<String> {
    let script = format!(
        r#"(() => {{
            const block = document.querySelector({block_sel});
            if (!block) return '';
            const region = block.querySelector({region_sel});
            if (!region) return '';
            const pres = region.querySelectorAll('pre');
            if (pres.length === 0) return '';
            const pre = pres[pres.length - 1];
            const tokenLines = pre.querySelectorAll('.token-line');
            if (tokenLines.length > 0) {{
                return Array.from(tokenLines).map(line => {{
                    const clone = line.cloneNode(true);
                    clone.querySelectorAll('[class*="copy"], [class*="ellipsis"]').forEach(el => el.remove());
                    return clone.textContent;
                }}).join('\n');
            }}
            return pre.textContent || '';
        }})()"#,
        block_sel = js_string(block_selector),
        region_sel = js_string(code_region),
    );
    let value = page.evaluate(&script).await.map_err(CrawlError::DriverError)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Map a bare language-name tab (`"TypeScript"`) to its default file.
/// Path-shaped tab text (contains `/` or `.`) is preserved verbatim.
#[must_use]
fn resolve_filename(tab_text: &str) -> String {
    let trimmed = tab_text.trim();
    if trimmed.contains('/') || trimmed.contains('.') {
        return trimmed.to_string();
    }
    format!("index.{}", extension_for_language(trimmed))
}

fn extension_for_language(lang: &str) -> &'static str {
    match lang.to_lowercase().as_str() {
        "typescript" | "tsx" => "tsx",
        "javascript" | "jsx" => "jsx",
        "ts" => "ts",
        "js" => "js",
        "css" => "css",
        "html" => "html",
        "json" => "json",
        "vue" => "vue",
        "svelte" => "svelte",
        "markdown" | "md" => "md",
        _ => "tsx",
    }
}

fn sanitize_component(name: &str) -> String {
    sanitize_filename::sanitize(name)
}

/// Sanitize every path component of `name` independently, so a preserved
/// `"sub/dir/file.tsx"` keeps its directory structure instead of collapsing
/// into one illegal-character-stripped segment.
fn sanitize_relative_path(name: &str) -> PathBuf {
    name.split('/').map(sanitize_component).collect::<Vec<_>>().into_iter().collect()
}

async fn write_file(
    dir: &Path,
    tab_text: &str,
    code: &str,
    filename_mapping: &Mutex<FilenameMapping>,
    block_path: &str,
    tab_index: usize,
) -> Result<()> {
    let requested = resolve_filename(tab_text);
    let sanitized = sanitize_relative_path(&requested);
    let mapping_key = format!("{block_path}#{tab_index}");
    filename_mapping
        .lock()
        .expect("filename_mapping lock poisoned")
        .insert(mapping_key, sanitized.to_string_lossy().to_string());

    let full_path = dir.join(&sanitized);
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| CrawlError::Other(e.into()))?;
    }
    tokio::fs::write(&full_path, code).await.map_err(|e| CrawlError::Other(e.into()))?;
    Ok(())
}

/// Write the single file for a block with no `tabContainer`: the basename is
/// always `blockName`, never routed through [`resolve_filename`] (that
/// function's bare-language-name handling only applies to tab text).
async fn write_single_file(
    dir: &Path,
    block_name: &str,
    code: &str,
    filename_mapping: &Mutex<FilenameMapping>,
    block_path: &str,
) -> Result<()> {
    let filename = format!("{}.tsx", sanitize_component(block_name));
    let mapping_key = format!("{block_path}#0");
    filename_mapping
        .lock()
        .expect("filename_mapping lock poisoned")
        .insert(mapping_key, filename.clone());

    tokio::fs::create_dir_all(dir).await.map_err(|e| CrawlError::Other(e.into()))?;
    let full_path = dir.join(&filename);
    tokio::fs::write(&full_path, code).await.map_err(|e| CrawlError::Other(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_path_shaped_tab_names() {
        assert_eq!(resolve_filename("sub/dir/file.tsx"), "sub/dir/file.tsx");
        assert_eq!(resolve_filename("Button.tsx"), "Button.tsx");
    }

    #[test]
    fn maps_bare_language_names_to_index_file() {
        assert_eq!(resolve_filename("TypeScript"), "index.tsx");
        assert_eq!(resolve_filename("CSS"), "index.css");
    }

    #[test]
    fn sanitizes_each_path_component_independently() {
        let path = sanitize_relative_path("sub/dir:bad/file?.tsx");
        assert_eq!(path, PathBuf::from("sub/dir_bad/file_.tsx"));
    }

    #[tokio::test]
    async fn extracts_code_from_last_pre_in_region() {
        use crate::driver::test_support::ScriptedPage;
        let page = ScriptedPage::new();
        page.on_contains("querySelectorAll('pre')", serde_json::json!("const x = 1;"));
        let code = extract_code(&page, ".block", ".code-region").await.unwrap();
        assert_eq!(code, "const x = 1;");
    }

    #[tokio::test]
    async fn missing_variant_switcher_yields_single_unlabeled_variant() {
        use crate::driver::test_support::ScriptedPage;
        let page = ScriptedPage::new();
        let variants = read_variant_options(&page, ".block", ".switcher", "[role=option]")
            .await
            .unwrap();
        assert_eq!(variants, vec![None]);
    }

    #[tokio::test]
    async fn no_tab_container_writes_block_name_dot_tsx_not_index() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = Mutex::new(FilenameMapping::default());
        write_single_file(dir.path(), "Hero", "const x = 1;", &mapping, "a/Hero").await.unwrap();

        assert!(tokio::fs::try_exists(dir.path().join("Hero.tsx")).await.unwrap());
        assert!(!tokio::fs::try_exists(dir.path().join("index.tsx")).await.unwrap());
        assert_eq!(mapping.lock().unwrap().get("a/Hero#0"), Some("Hero.tsx"));
    }
}
