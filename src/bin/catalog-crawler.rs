//! Thin CLI shell around the orchestration core.
//!
//! Reads a JSON site-config file, resolves it into a [`catalog_crawler::orchestrator::SitePipeline`],
//! launches a chromium session, and runs the pipeline. This is the
//! "declarative fluent API" Non-goal's thin shell, not the core's only entry
//! point — anything expressible here is equally reachable by constructing
//! the same types directly as a library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use catalog_crawler::auth::AutoLoginHandler;
use catalog_crawler::block::{BlockHandlerKind, BlockLocatorMode, BlockNameConfig, BlockProcessorConfig};
use catalog_crawler::collect::{LinkCollectorConfig, SectionStrategy};
use catalog_crawler::config::{LogLevel, ProgressPolicy, RuntimeConfig};
use catalog_crawler::driver;
use catalog_crawler::extract::AutoExtractConfig;
use catalog_crawler::free::FreeMatcher;
use catalog_crawler::link_executor::{AutoScrollConfig, LinkExecutorConfig};
use catalog_crawler::mode::ModeConfig;
use catalog_crawler::orchestrator::{run_site, SitePipeline};
use catalog_crawler::scripts::{ScriptEntry, ScriptTiming};

#[derive(Parser, Debug)]
#[command(name = "catalog-crawler", about = "Declarative, resumable crawler for component-library catalog sites")]
struct Cli {
    /// Path to the site config JSON file.
    config: PathBuf,

    /// Run the browser with a visible window instead of headless.
    #[arg(long)]
    headed: bool,

    /// Discard any existing progress.json before this run.
    #[arg(long)]
    rebuild_progress: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileFreeMatcher {
    Default,
    Exact(String),
}

impl From<FileFreeMatcher> for FreeMatcher {
    fn from(value: FileFreeMatcher) -> Self {
        match value {
            FileFreeMatcher::Default => FreeMatcher::Default,
            FileFreeMatcher::Exact(s) => FreeMatcher::Exact(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
enum FileCollectorStrategy {
    Static {
        sections_selector: String,
    },
    ClickThrough {
        tablist_selector: String,
        tab_selector: String,
        panel_selector: String,
    },
}

#[derive(Debug, Deserialize)]
struct FileCollectorConfig {
    #[serde(flatten)]
    strategy: FileCollectorStrategy,
    name_selector: Option<String>,
    count_selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileAutoExtractConfig {
    variant_switcher: Option<String>,
    variant_option_selector: Option<String>,
    tab_container: Option<String>,
    tab_selector: Option<String>,
    code_region: String,
}

impl From<FileAutoExtractConfig> for AutoExtractConfig {
    fn from(f: FileAutoExtractConfig) -> Self {
        let mut config = AutoExtractConfig::new(f.code_region);
        if let Some(switcher) = f.variant_switcher {
            config = config.with_variants(switcher);
        }
        if let Some(option_selector) = f.variant_option_selector {
            config.variant_option_selector = option_selector;
        }
        if let Some(tab_container) = f.tab_container {
            config = config.with_tabs(tab_container);
        }
        if let Some(tab_selector) = f.tab_selector {
            config.tab_selector = tab_selector;
        }
        config
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileBlockMode {
    Traditional,
    Progressive,
}

#[derive(Debug, Deserialize)]
struct FileBlockConfig {
    blocks_selector: String,
    #[serde(default)]
    mode: Option<FileBlockMode>,
    #[serde(default = "default_true")]
    verify_block_completion: bool,
    skip_free: Option<FileFreeMatcher>,
    block_name_locator: Option<String>,
    auto: FileAutoExtractConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileWaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl From<FileWaitUntil> for driver::WaitUntil {
    fn from(value: FileWaitUntil) -> Self {
        match value {
            FileWaitUntil::Load => driver::WaitUntil::Load,
            FileWaitUntil::DomContentLoaded => driver::WaitUntil::DomContentLoaded,
            FileWaitUntil::NetworkIdle => driver::WaitUntil::NetworkIdle,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileAutoScroll {
    #[serde(default = "default_step_px")]
    step_px: f64,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_step_px() -> f64 {
    800.0
}
fn default_interval_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
struct FileLinkConfig {
    #[serde(default)]
    use_independent_context: bool,
    #[serde(default)]
    wait_until: Option<FileWaitUntil>,
    #[serde(default = "default_goto_timeout_secs")]
    goto_timeout_secs: u64,
    page_skip_free: Option<FileFreeMatcher>,
    auto_scroll: Option<FileAutoScroll>,
}

fn default_goto_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileScriptTiming {
    Before,
    After,
}

#[derive(Debug, Deserialize)]
struct FileScriptEntry {
    filename: String,
    timing: Option<FileScriptTiming>,
}

#[derive(Debug, Deserialize)]
struct FileAuthConfig {
    login_url: String,
    text_input_selector: Option<String>,
    sign_in_button_selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SiteFileConfig {
    start_url: String,
    #[serde(default = "default_output_dir")]
    output_base_dir: PathBuf,
    #[serde(default = "default_state_dir")]
    state_base_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_true")]
    pause_on_error: bool,
    #[serde(default)]
    ignore_mismatch: bool,
    #[serde(default)]
    progress_enable: bool,
    #[serde(default)]
    log_level: Option<FileLogLevel>,
    collector: FileCollectorConfig,
    blocks: FileBlockConfig,
    #[serde(default)]
    link: Option<FileLinkConfig>,
    #[serde(default)]
    scripts: Vec<FileScriptEntry>,
    #[serde(default)]
    auth: Option<FileAuthConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".crawler")
}
fn default_concurrency() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FileLogLevel {
    Info,
    Debug,
    Silent,
}

impl From<FileLogLevel> for LogLevel {
    fn from(value: FileLogLevel) -> Self {
        match value {
            FileLogLevel::Info => LogLevel::Info,
            FileLogLevel::Debug => LogLevel::Debug,
            FileLogLevel::Silent => LogLevel::Silent,
        }
    }
}

/// Maps the configured `log_level` onto the `log` crate's level filter. An
/// explicit `RUST_LOG` in the environment still wins for whatever module
/// directives it names, per `env_logger`'s usual precedence - this only sets
/// the default applied where `RUST_LOG` is silent.
fn init_logger(log_level: LogLevel) {
    let default_filter = match log_level {
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Debug => log::LevelFilter::Debug,
        LogLevel::Silent => log::LevelFilter::Off,
    };
    env_logger::Builder::new().filter_level(default_filter).parse_default_env().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("reading site config {}", cli.config.display()))?;
    let file_config: SiteFileConfig = serde_json::from_str(&raw).context("parsing site config JSON")?;

    let log_level = file_config.log_level.map(LogLevel::from).unwrap_or_default();
    init_logger(log_level);
    let runtime = RuntimeConfig {
        output_base_dir: file_config.output_base_dir,
        state_base_dir: file_config.state_base_dir,
        max_concurrency: file_config.max_concurrency,
        pause_on_error: file_config.pause_on_error,
        log_level,
        ignore_mismatch: file_config.ignore_mismatch,
        progress: ProgressPolicy {
            enable: file_config.progress_enable,
            rebuild: cli.rebuild_progress,
        },
        ..RuntimeConfig::default()
    };

    let strategy = match file_config.collector.strategy {
        FileCollectorStrategy::Static { sections_selector } => SectionStrategy::Static { sections_selector },
        FileCollectorStrategy::ClickThrough {
            tablist_selector,
            tab_selector,
            panel_selector,
        } => SectionStrategy::ClickThrough {
            tablist_selector,
            tab_selector,
            panel_selector,
        },
    };
    let collector = LinkCollectorConfig {
        start_url: file_config.start_url.clone(),
        strategy,
        name_selector: file_config.collector.name_selector,
        count_selector: file_config.collector.count_selector,
    };

    let auto = AutoExtractConfig::from(file_config.blocks.auto);
    let mut block_config = BlockProcessorConfig::new(file_config.blocks.blocks_selector, BlockHandlerKind::Auto(auto), runtime.output_base_dir.clone());
    block_config.mode = match file_config.blocks.mode {
        Some(FileBlockMode::Progressive) => BlockLocatorMode::Progressive,
        _ => BlockLocatorMode::Traditional,
    };
    block_config.verify_block_completion = file_config.blocks.verify_block_completion;
    block_config.skip_free = file_config.blocks.skip_free.map(FreeMatcher::from);
    block_config.name = BlockNameConfig {
        get_block_name: None,
        block_name_locator: file_config.blocks.block_name_locator,
    };

    let mut link_executor = LinkExecutorConfig::new();
    if let Some(link) = file_config.link {
        link_executor.use_independent_context = link.use_independent_context;
        link_executor.wait_until = link.wait_until.map(driver::WaitUntil::from).unwrap_or_default();
        link_executor.goto_timeout = std::time::Duration::from_secs(link.goto_timeout_secs);
        link_executor.page_skip_free = link.page_skip_free.map(FreeMatcher::from);
        link_executor.auto_scroll = link.auto_scroll.map(|s| AutoScrollConfig {
            step_px: s.step_px,
            interval: std::time::Duration::from_millis(s.interval_ms),
            timeout: std::time::Duration::from_secs(s.timeout_secs),
        });
    }

    let scripts: Vec<ScriptEntry> = file_config
        .scripts
        .into_iter()
        .map(|s| {
            let mut entry = ScriptEntry::new(s.filename);
            entry.timing = s.timing.map(|t| match t {
                FileScriptTiming::Before => ScriptTiming::BeforePageLoad,
                FileScriptTiming::After => ScriptTiming::AfterPageLoad,
            });
            entry
        })
        .collect();

    let auth_handler = file_config.auth.map(|a| {
        let mut handler = AutoLoginHandler::new(a.login_url);
        if let Some(sel) = a.text_input_selector {
            handler.text_input_selector = sel;
        }
        if let Some(sel) = a.sign_in_button_selector {
            handler.sign_in_button_selector = sel;
        }
        handler
    });

    let (session, handler_task) = driver::chromium::launch(!cli.headed).await.context("launching chromium")?;

    let pipeline = SitePipeline {
        start_url: file_config.start_url,
        runtime,
        collector,
        mode: ModeConfig::Block {
            config: block_config,
            ignore_mismatch: file_config.ignore_mismatch,
            pause_on_error: file_config.pause_on_error,
        },
        link_executor,
        auth_handler: auth_handler.as_ref().map(|h| h as &dyn catalog_crawler::auth::AuthHandler),
        scripts,
    };

    let meta = run_site(&session, pipeline).await?;
    log::info!(
        "done: {} pages, {} blocks extracted, free pages {}, free blocks {}",
        meta.collection_links.len(),
        meta.total_actual,
        meta.free_pages.count,
        meta.free_blocks.count
    );

    let _ = session.close().await;
    handler_task.abort();
    Ok(())
}
