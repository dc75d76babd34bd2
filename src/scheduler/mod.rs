//! Concurrent executor: the bounded-parallel dispatcher over a
//! [`CollectResult`] — a semaphore for the global bound, a per-host
//! [`HostLimiter`] for fairness, `FuturesUnordered` to drive in-flight link
//! tasks cooperatively within one function (never `tokio::spawn`, so the
//! pre-dispatch gates and state-recorder mutations below stay true "not
//! suspension points" between any two `.await`s, per the single-threaded
//! cooperative event-loop model).

mod domain_limiter;

pub use domain_limiter::HostLimiter;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use dashmap::DashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{host_of, LogLevel};
use crate::debug::is_debug_mode;
use crate::driver::{BrowserSession, PageHandle};
use crate::errors::Result;
use crate::link_executor::{execute_link, LinkExecutorConfig};
use crate::mode::{ModeConfig, ModeDispatch};
use crate::state::{CollectResult, CollectionLink, FilenameMapping, FreeRecord, MismatchLog, Progress};
use crate::util::normalize_link;

/// Per-run tallies, combined with the progress store's pre-existing
/// completions to report a final success count.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub previously_completed: usize,
}

enum LinkTaskOutcome {
    Success,
    Failed,
    Aborted,
}

/// Fan out every collected link, honoring `maxConcurrency`, the pre-dispatch
/// skip gates, and the "first task reuses the primary page" ordering
/// guarantee.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    session: &dyn BrowserSession,
    primary_page: &dyn PageHandle,
    base_url: &str,
    collect_result: &CollectResult,
    mode: &ModeConfig,
    base_output_dir: &std::path::Path,
    link_executor_config: &LinkExecutorConfig,
    max_concurrency: usize,
    host_limiter: &HostLimiter,
    progress: &Mutex<Progress>,
    free_record: &Mutex<FreeRecord>,
    mismatch: &Mutex<MismatchLog>,
    filename_mapping: &Mutex<FilenameMapping>,
    cancel: &CancellationToken,
    log_level: LogLevel,
) -> RunSummary {
    let mut summary = RunSummary {
        previously_completed: progress.lock().expect("progress lock poisoned").completed_pages.len(),
        ..RunSummary::default()
    };

    // Snapshot the free-pages set as it stood at the start of the run: gate 2
    // consults this preloaded set, not whatever the run itself accumulates.
    let preloaded_free: HashSet<String> = free_record.lock().expect("free_record lock poisoned").pages.clone();

    let mut dispatchable: Vec<&CollectionLink> = Vec::new();
    for link in &collect_result.collections {
        let path = normalize_link(&link.link);
        if progress.lock().expect("progress lock poisoned").is_page_complete(&path) {
            log::info!("[{path}] skip-completed");
            summary.completed += 1;
            continue;
        }
        if preloaded_free.contains(&path) {
            log::info!("[{path}] skip-known-free");
            free_record.lock().expect("free_record lock poisoned").mark_page_free(&path);
            progress.lock().expect("progress lock poisoned").mark_page_complete(&path);
            summary.completed += 1;
            continue;
        }
        dispatchable.push(link);
    }

    let Some((first, rest)) = dispatchable.split_first() else {
        return summary;
    };

    let expected_block_counts: HashMap<String, Option<usize>> = dispatchable
        .iter()
        .map(|l| (normalize_link(&l.link), l.block_count))
        .collect();

    let dispatch = ModeDispatch {
        mode,
        base_output_dir,
        progress,
        free_record,
        mismatch,
        filename_mapping,
        expected_block_counts: &expected_block_counts,
        debug_mode: is_debug_mode(),
    };

    let semaphore = Semaphore::new(max_concurrency.max(1));
    let attempted: DashSet<String> = DashSet::new();

    // The very first task always reuses the primary page and is awaited to
    // completion before any other task is dispatched: context-reuse
    // decisions for every later link depend on this one's completion signal.
    let outcome = run_one(
        session,
        Some(primary_page),
        first,
        base_url,
        link_executor_config,
        &dispatch,
        &semaphore,
        host_limiter,
        &attempted,
        progress,
        free_record,
        cancel,
        log_level,
    )
    .await;
    record(&mut summary, outcome);

    let mut in_flight = FuturesUnordered::new();
    for link in rest {
        if cancel.is_cancelled() {
            break;
        }
        in_flight.push(run_one(
            session,
            None,
            link,
            base_url,
            link_executor_config,
            &dispatch,
            &semaphore,
            host_limiter,
            &attempted,
            progress,
            free_record,
            cancel,
            log_level,
        ));
    }

    while let Some(outcome) = in_flight.next().await {
        record(&mut summary, outcome);
    }

    log::info!(
        "run complete: {} succeeded ({} previously), {} failed, {} aborted",
        summary.completed,
        summary.previously_completed,
        summary.failed,
        summary.aborted
    );
    summary
}

#[allow(clippy::too_many_arguments)]
async fn run_one<'a>(
    session: &dyn BrowserSession,
    primary_page: Option<&dyn PageHandle>,
    link: &CollectionLink,
    base_url: &str,
    link_executor_config: &LinkExecutorConfig,
    dispatch: &ModeDispatch<'a>,
    semaphore: &Semaphore,
    host_limiter: &HostLimiter,
    attempted: &DashSet<String>,
    progress: &Mutex<Progress>,
    free_record: &Mutex<FreeRecord>,
    cancel: &CancellationToken,
    log_level: LogLevel,
) -> LinkTaskOutcome {
    let path = normalize_link(&link.link);
    if !attempted.insert(path.clone()) {
        return LinkTaskOutcome::Aborted;
    }
    if cancel.is_cancelled() {
        return LinkTaskOutcome::Aborted;
    }

    let url = resolve_url(base_url, &link.link);
    let host = host_of(&url);

    let Ok(_permit) = semaphore.acquire().await else {
        return LinkTaskOutcome::Aborted;
    };
    let _host_permit = host_limiter.acquire(&host).await;

    log::info!("[{path}] dispatching");
    let result = execute_link(session, primary_page, &path, &url, link_executor_config, progress, free_record, dispatch).await;

    match result {
        Ok(outcome) => {
            log::info!("[{path}] done ({outcome:?})");
            LinkTaskOutcome::Success
        }
        Err(e) if e.is_user_abort() => {
            log::debug!("[{path}] user-abort: {e}");
            LinkTaskOutcome::Aborted
        }
        Err(e) => {
            match log_level {
                LogLevel::Silent => {}
                LogLevel::Info => log::error!("[{path}] failed: {e}"),
                LogLevel::Debug => log::error!("[{path}] failed: {e:?}"),
            }
            LinkTaskOutcome::Failed
        }
    }
}

fn resolve_url(base_url: &str, link: &str) -> String {
    match Url::parse(link) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => match Url::parse(base_url).and_then(|base| base.join(link)) {
            Ok(joined) => joined.to_string(),
            Err(_) => link.to_string(),
        },
    }
}

fn record(summary: &mut RunSummary, outcome: LinkTaskOutcome) {
    match outcome {
        LinkTaskOutcome::Success => summary.completed += 1,
        LinkTaskOutcome::Failed => summary.failed += 1,
        LinkTaskOutcome::Aborted => summary.aborted += 1,
    }
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

    fn collect_result(links: &[&str]) -> CollectResult {
        CollectResult::new(
            links
                .iter()
                .map(|l| CollectionLink {
                    link: (*l).to_string(),
                    name: None,
                    block_count: None,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn every_link_is_dispatched_exactly_once() {
        let session = NullSession;
        let primary = NullPage;
        let collected = collect_result(&["/a", "/b", "/c"]);
        let handler = Arc::new(CountingPageHandler(AtomicUsize::new(0)));
        let mode = ModeConfig::Page {
            handler: handler.clone(),
            pause_on_error: false,
        };
        let progress = Mutex::new(Progress::default());
        let free_record = Mutex::new(FreeRecord::default());
        let mismatch = Mutex::new(MismatchLog::default());
        let filename_mapping = Mutex::new(FilenameMapping::default());
        let host_limiter = HostLimiter::new(5);
        let cancel = CancellationToken::new();

        let summary = run(
            &session,
            &primary,
            "https://example.test",
            &collected,
            &mode,
            std::path::Path::new("out"),
            &LinkExecutorConfig::new(),
            5,
            &host_limiter,
            &progress,
            &free_record,
            &mismatch,
            &filename_mapping,
            &cancel,
            LogLevel::Info,
        )
        .await;

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(handler.0.load(Ordering::SeqCst), 3);
        assert_eq!(progress.lock().unwrap().completed_pages.len(), 3);
    }

    #[tokio::test]
    async fn completed_pages_are_skipped_without_dispatch() {
        let session = NullSession;
        let primary = NullPage;
        let collected = collect_result(&["/a", "/b"]);
        let handler = Arc::new(CountingPageHandler(AtomicUsize::new(0)));
        let mode = ModeConfig::Page {
            handler: handler.clone(),
            pause_on_error: false,
        };
        let mut initial = Progress::default();
        initial.mark_page_complete("a");
        let progress = Mutex::new(initial);
        let free_record = Mutex::new(FreeRecord::default());
        let mismatch = Mutex::new(MismatchLog::default());
        let filename_mapping = Mutex::new(FilenameMapping::default());
        let host_limiter = HostLimiter::new(5);
        let cancel = CancellationToken::new();

        let summary = run(
            &session,
            &primary,
            "https://example.test",
            &collected,
            &mode,
            std::path::Path::new("out"),
            &LinkExecutorConfig::new(),
            5,
            &host_limiter,
            &progress,
            &free_record,
            &mismatch,
            &filename_mapping,
            &cancel,
            LogLevel::Info,
        )
        .await;

        assert_eq!(summary.previously_completed, 1);
        assert_eq!(summary.completed, 2);
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_url_joins_relative_links_against_base() {
        assert_eq!(resolve_url("https://example.test/start", "/buttons"), "https://example.test/buttons");
        assert_eq!(resolve_url("https://example.test/start", "https://other.test/x"), "https://other.test/x");
    }
}
