//! Top-level pipeline: wires configuration, authentication, collection, and
//! the scheduler together, and owns every state recorder exclusively (§3
//! "Ownership" — link executors only ever see borrowed references and may
//! only append).
//!
//! This is the one place in the crate that sequences the four cooperating
//! phases named in §1: authenticate ([`auth::ensure_auth`]), collect
//! ([`collect::collect`]), navigate + extract (the [`scheduler`] fanning out
//! to [`link_executor`]/[`block`]/[`page_processor`] per link).

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthHandler;
use crate::collect::LinkCollectorConfig;
use crate::config::{paths_for, PerSitePaths, RuntimeConfig};
use crate::driver::{BrowserSession, PageHandle};
use crate::errors::{CrawlError, Result};
use crate::link_executor::LinkExecutorConfig;
use crate::mode::ModeConfig;
use crate::scheduler::HostLimiter;
use crate::scripts::ScriptEntry;
use crate::state::{
    save_atomic, save_atomic_sync, CollectResult, CountedSet, FilenameMapping, FreeRecord, MismatchLog, Progress, SiteMeta,
};

/// Everything one site crawl needs beyond the browser session itself.
pub struct SitePipeline<'a> {
    pub start_url: String,
    pub runtime: RuntimeConfig,
    pub collector: LinkCollectorConfig,
    pub mode: ModeConfig,
    pub link_executor: LinkExecutorConfig,
    pub auth_handler: Option<&'a dyn AuthHandler>,
    pub scripts: Vec<ScriptEntry>,
}

/// Run the full pipeline for one site: ensure auth, collect (or load) links,
/// fan out through the scheduler, and persist every state recorder plus a
/// `meta.json` summary. Installs a `Ctrl+C`/`SIGTERM` handler that flushes
/// state synchronously and exits, per §5 "Cancellation & timeouts".
pub async fn run_site(session: &dyn BrowserSession, pipeline: SitePipeline<'_>) -> Result<SiteMeta> {
    let paths = paths_for(&pipeline.start_url, &pipeline.runtime);
    tokio::fs::create_dir_all(&paths.output_dir)
        .await
        .map_err(|e| CrawlError::Other(e.into()))?;
    tokio::fs::create_dir_all(&paths.state_dir)
        .await
        .map_err(|e| CrawlError::Other(e.into()))?;

    let primary_page = session.new_page().await.map_err(CrawlError::DriverError)?;

    crate::auth::ensure_auth(session, &paths.auth_file, &paths.state_dir, pipeline.auth_handler).await?;

    let mut link_executor_config = pipeline.link_executor.clone();
    if !pipeline.scripts.is_empty() {
        let (before, after) = crate::scripts::load_scripts(&paths.scripts_dir, &pipeline.scripts).await?;
        link_executor_config.before_open_scripts.extend(before);
        link_executor_config.after_open_scripts.extend(after);
    }

    let collect_result = load_or_collect(primary_page.as_ref(), &pipeline.collector, &paths).await?;

    let progress = Mutex::new(load_progress(&paths, &pipeline.runtime).await?);
    let free_record = Mutex::new(crate::state::load_or_default(&paths.free_file, FreeRecord::default()).await.map_err(CrawlError::Other)?);
    let mismatch = Mutex::new(
        crate::state::load_or_default(&paths.mismatch_file, MismatchLog::default())
            .await
            .map_err(CrawlError::Other)?,
    );
    let filename_mapping = Mutex::new(
        crate::state::load_or_default(&paths.filename_mapping_file, FilenameMapping::default())
            .await
            .map_err(CrawlError::Other)?,
    );

    let host_limiter = HostLimiter::new(pipeline.runtime.max_concurrency);
    let cancel = CancellationToken::new();

    let flush_handle = spawn_signal_flush(cancel.clone());

    let meta = SiteMeta::started(&pipeline.start_url);
    let summary = crate::scheduler::run(
        session,
        primary_page.as_ref(),
        &pipeline.start_url,
        &collect_result,
        &pipeline.mode,
        &paths.output_dir,
        &link_executor_config,
        pipeline.runtime.max_concurrency,
        &host_limiter,
        &progress,
        &free_record,
        &mismatch,
        &filename_mapping,
        &cancel,
        pipeline.runtime.log_level,
    )
    .await;

    flush_handle.abort();
    let _ = primary_page.close().await;

    let meta = finalize_meta(meta, &pipeline.start_url, &collect_result, &progress, &free_record, summary);
    flush_state(
        &paths,
        &progress,
        &free_record,
        &mismatch,
        &filename_mapping,
        &meta,
        pipeline.runtime.progress.enable,
    )
    .await?;
    Ok(meta)
}

async fn load_or_collect(page: &dyn PageHandle, config: &LinkCollectorConfig, paths: &PerSitePaths) -> Result<CollectResult> {
    match crate::collect::collect(page, config, &paths.collect_file).await {
        Ok(result) => Ok(result),
        Err(CrawlError::CollectExists) => {
            crate::state::load_or_default(&paths.collect_file, CollectResult::default())
                .await
                .map_err(CrawlError::Other)
        }
        Err(e) => Err(e),
    }
}

/// `progress.enable = false` still loads an existing `progress.json` for
/// skip purposes — see DESIGN.md for why this resolves the Open Question.
/// `progress.rebuild = true` discards it and starts from empty regardless.
async fn load_progress(paths: &PerSitePaths, runtime: &RuntimeConfig) -> Result<Progress> {
    if runtime.progress.rebuild {
        return Ok(Progress::default());
    }
    crate::state::load_or_default(&paths.progress_file, Progress::default())
        .await
        .map_err(CrawlError::Other)
}

fn finalize_meta(
    mut meta: SiteMeta,
    start_url: &str,
    collect_result: &CollectResult,
    progress: &Mutex<Progress>,
    free_record: &Mutex<FreeRecord>,
    summary: crate::scheduler::RunSummary,
) -> SiteMeta {
    meta.start_url = start_url.to_string();
    meta.collection_links = collect_result.collections.clone();
    meta.total_displayed = collect_result.total_blocks;
    meta.total_actual = progress.lock().expect("progress lock poisoned").completed_blocks.len();
    let free = free_record.lock().expect("free_record lock poisoned");
    meta.free_pages = CountedSet::from_iter(free.pages.iter().cloned());
    meta.free_blocks = CountedSet::from_iter(free.blocks.iter().cloned());
    drop(free);
    meta.finish();
    log::info!(
        "site {} complete: {} succeeded ({} previously), {} failed, {} aborted",
        start_url,
        summary.completed,
        summary.previously_completed,
        summary.failed,
        summary.aborted
    );
    meta
}

async fn flush_state(
    paths: &PerSitePaths,
    progress: &Mutex<Progress>,
    free_record: &Mutex<FreeRecord>,
    mismatch: &Mutex<MismatchLog>,
    filename_mapping: &Mutex<FilenameMapping>,
    meta: &SiteMeta,
    progress_enabled: bool,
) -> Result<()> {
    let progress_snapshot = progress.lock().expect("progress lock poisoned").clone();
    if progress_enabled && (!progress_snapshot.completed_pages.is_empty() || !progress_snapshot.completed_blocks.is_empty()) {
        save_atomic(&paths.progress_file, &progress_snapshot).await.map_err(CrawlError::Other)?;
    }
    let free_snapshot = free_record.lock().expect("free_record lock poisoned").clone();
    if !free_snapshot.pages.is_empty() || !free_snapshot.blocks.is_empty() {
        save_atomic(&paths.free_file, &free_snapshot).await.map_err(CrawlError::Other)?;
    }
    let mismatch_snapshot = mismatch.lock().expect("mismatch lock poisoned").clone();
    if !mismatch_snapshot.is_empty() {
        save_atomic(&paths.mismatch_file, &mismatch_snapshot)
            .await
            .map_err(CrawlError::Other)?;
    }
    let mapping_snapshot = filename_mapping.lock().expect("filename_mapping lock poisoned").clone();
    save_atomic(&paths.filename_mapping_file, &mapping_snapshot).await.map_err(CrawlError::Other)?;

    let merged = merge_meta(&paths.meta_file, meta.clone()).await;
    save_atomic(&paths.meta_file, &merged).await.map_err(CrawlError::Other)?;
    Ok(())
}

/// "merged with any prior run's meta": the new summary wins for everything
/// computed from the current state snapshot; `started_at` is preserved from
/// the prior run only if this run's collection produced no new completions
/// at all (so a no-op re-run doesn't advance the reported start time).
async fn merge_meta(meta_file: &std::path::Path, mut meta: SiteMeta) -> SiteMeta {
    if let Ok(prior) = crate::state::load_or_default(meta_file, meta.clone()).await {
        if prior.total_actual == meta.total_actual && prior.is_complete {
            meta.started_at = prior.started_at;
        }
    }
    meta
}

/// `Ctrl+C` cancels the shared token so the scheduler stops dispatching new
/// links; every in-flight link still runs to completion or driver-error, and
/// [`flush_state`] on the caller's task is the single flush routine every
/// teardown path (signal or normal completion) funnels through - the state
/// mutexes themselves never cross into this task, since they live only for
/// the duration of the run on the caller's stack.
fn spawn_signal_flush(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("received interrupt, cancelling in-flight dispatch");
            cancel.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::NullPage;
    use crate::page_processor::PageHandlerFn;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullSession;

    #[async_trait]
    impl BrowserSession for NullSession {
        async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
            Ok(Box::new(NullPage))
        }
        async fn new_context(&self, _storage_state: Option<crate::driver::StorageState>) -> anyhow::Result<Box<dyn BrowserSession>> {
            Ok(Box::new(NullSession))
        }
        async fn add_cookies(&self, _cookies: Vec<crate::driver::Cookie>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn storage_state(&self) -> anyhow::Result<crate::driver::StorageState> {
            Ok(crate::driver::StorageState::default())
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct CountingPageHandler(AtomicUsize);

    #[async_trait]
    impl PageHandlerFn for CountingPageHandler {
        async fn handle(&self, _page: &dyn PageHandle, _output_dir: &std::path::Path) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_site_persists_meta_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = RuntimeConfig::default();
        runtime.output_base_dir = dir.path().join("output");
        runtime.state_base_dir = dir.path().join("state");

        let session = NullSession;
        let handler = Arc::new(CountingPageHandler(AtomicUsize::new(0)));
        let pipeline = SitePipeline {
            start_url: "https://example.test/blocks".to_string(),
            runtime,
            collector: LinkCollectorConfig::static_sections("https://example.test/blocks", "section"),
            mode: ModeConfig::Page {
                handler: handler.clone(),
                pause_on_error: false,
            },
            link_executor: LinkExecutorConfig::new(),
            auth_handler: None,
            scripts: Vec::new(),
        };

        let meta = run_site(&session, pipeline).await.unwrap();
        assert!(meta.is_complete);

        let paths = paths_for("https://example.test/blocks", &RuntimeConfig {
            output_base_dir: dir.path().join("output"),
            state_base_dir: dir.path().join("state"),
            ..RuntimeConfig::default()
        });
        assert!(tokio::fs::try_exists(&paths.meta_file).await.unwrap());
        assert!(tokio::fs::try_exists(&paths.collect_file).await.unwrap());
    }

    #[tokio::test]
    async fn progress_enable_false_does_not_write_progress_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = RuntimeConfig::default();
        runtime.output_base_dir = dir.path().join("output");
        runtime.state_base_dir = dir.path().join("state");
        assert!(!runtime.progress.enable, "default progress.enable must be false per spec");

        let session = NullSession;
        let handler = Arc::new(CountingPageHandler(AtomicUsize::new(0)));
        let pipeline = SitePipeline {
            start_url: "https://example.test/blocks".to_string(),
            runtime,
            collector: LinkCollectorConfig::static_sections("https://example.test/blocks", "section"),
            mode: ModeConfig::Page {
                handler,
                pause_on_error: false,
            },
            link_executor: LinkExecutorConfig::new(),
            auth_handler: None,
            scripts: Vec::new(),
        };

        run_site(&session, pipeline).await.unwrap();

        let paths = paths_for("https://example.test/blocks", &RuntimeConfig {
            output_base_dir: dir.path().join("output"),
            state_base_dir: dir.path().join("state"),
            ..RuntimeConfig::default()
        });
        assert!(!tokio::fs::try_exists(&paths.progress_file).await.unwrap());
    }

    #[tokio::test]
    async fn progress_enable_true_writes_progress_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = RuntimeConfig::default();
        runtime.output_base_dir = dir.path().join("output");
        runtime.state_base_dir = dir.path().join("state");
        runtime.progress.enable = true;

        let session = NullSession;
        let handler = Arc::new(CountingPageHandler(AtomicUsize::new(0)));
        let pipeline = SitePipeline {
            start_url: "https://example.test/blocks".to_string(),
            runtime,
            collector: LinkCollectorConfig::static_sections("https://example.test/blocks", "section"),
            mode: ModeConfig::Page {
                handler,
                pause_on_error: false,
            },
            link_executor: LinkExecutorConfig::new(),
            auth_handler: None,
            scripts: Vec::new(),
        };

        run_site(&session, pipeline).await.unwrap();

        let paths = paths_for("https://example.test/blocks", &RuntimeConfig {
            output_base_dir: dir.path().join("output"),
            state_base_dir: dir.path().join("state"),
            ..RuntimeConfig::default()
        });
        assert!(tokio::fs::try_exists(&paths.progress_file).await.unwrap());
    }
}
