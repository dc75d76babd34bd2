//! Unified mode interface: one-shot test, page, and block are three
//! variants of the same per-link dispatch rather than three near-duplicate
//! revisions coexisting side by side.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::block::{BlockPageOutcome, BlockProcessorConfig};
use crate::driver::{BrowserSession, PageHandle};
use crate::errors::{CrawlError, Result};
use crate::link_executor::{execute_link, LinkDispatch, LinkExecutorConfig};
use crate::page_processor::PageHandlerFn;
use crate::state::{FilenameMapping, FreeRecord, MismatchLog, Progress};

/// User handler invoked once against a single, fully-loaded page, for
/// iterating on a site config without running the whole collected set.
#[async_trait]
pub trait TestHandlerFn: Send + Sync {
    async fn handle(&self, page: &dyn PageHandle, output_dir: &Path) -> anyhow::Result<()>;
}

/// Which of the three per-link dispatch shapes a run uses.
#[derive(Clone)]
pub enum ModeConfig {
    Page {
        handler: Arc<dyn PageHandlerFn>,
        pause_on_error: bool,
    },
    Block {
        config: BlockProcessorConfig,
        ignore_mismatch: bool,
        pause_on_error: bool,
    },
    Test {
        handler: Arc<dyn TestHandlerFn>,
    },
}

/// Shared state every link task dispatches through, implementing
/// [`LinkDispatch`] so it plugs directly into [`execute_link`].
pub struct ModeDispatch<'a> {
    pub mode: &'a ModeConfig,
    pub base_output_dir: &'a Path,
    pub progress: &'a Mutex<Progress>,
    pub free_record: &'a Mutex<FreeRecord>,
    pub mismatch: &'a Mutex<MismatchLog>,
    pub filename_mapping: &'a Mutex<FilenameMapping>,
    pub expected_block_counts: &'a std::collections::HashMap<String, Option<usize>>,
    pub debug_mode: bool,
}

#[async_trait]
impl<'a> LinkDispatch for ModeDispatch<'a> {
    async fn dispatch(&self, page: &dyn PageHandle, link_path: &str) -> Result<()> {
        let output_dir: PathBuf = self.base_output_dir.join(link_path);
        match self.mode {
            ModeConfig::Page { handler, pause_on_error } => {
                crate::page_processor::process_page(page, handler.as_ref(), &output_dir, *pause_on_error, self.debug_mode).await
            }
            ModeConfig::Block {
                config,
                ignore_mismatch,
                pause_on_error,
            } => {
                let mut per_link_config = config.clone();
                per_link_config.output_dir = output_dir;
                let expected = self.expected_block_counts.get(link_path).copied().flatten();
                let outcome: BlockPageOutcome = crate::block::process_page(
                    page,
                    link_path,
                    &per_link_config,
                    expected,
                    self.progress,
                    self.free_record,
                    self.mismatch,
                    self.filename_mapping,
                    *ignore_mismatch,
                    *pause_on_error,
                )
                .await?;
                log::debug!("[{link_path}] block outcome: {} completed, {} skipped, {} failed", outcome.completed, outcome.skipped, outcome.failed);
                Ok(())
            }
            ModeConfig::Test { handler } => handler.handle(page, &output_dir).await.map_err(classify),
        }
    }
}

fn classify(e: anyhow::Error) -> CrawlError {
    if CrawlError::classify_abort(&e.to_string()) {
        CrawlError::UserAbort
    } else {
        CrawlError::HandlerError(e)
    }
}

/// Run a single link through the full §4.E protocol without touching the
/// scheduler's progress/free accounting — for exercising a site config
/// against one page while it's being written.
pub async fn run_test_mode(
    session: &dyn BrowserSession,
    url: &str,
    handler: Arc<dyn TestHandlerFn>,
    output_dir: &Path,
    link_executor_config: &LinkExecutorConfig,
) -> Result<()> {
    let progress = Mutex::new(Progress::default());
    let free_record = Mutex::new(FreeRecord::default());
    let mismatch = Mutex::new(MismatchLog::default());
    let filename_mapping = Mutex::new(FilenameMapping::default());
    let expected_block_counts = std::collections::HashMap::new();
    let mode = ModeConfig::Test { handler };
    let dispatch = ModeDispatch {
        mode: &mode,
        base_output_dir: output_dir,
        progress: &progress,
        free_record: &free_record,
        mismatch: &mismatch,
        filename_mapping: &filename_mapping,
        expected_block_counts: &expected_block_counts,
        debug_mode: crate::debug::is_debug_mode(),
    };

    let page = session.new_page().await.map_err(CrawlError::DriverError)?;
    let result = execute_link(session, Some(page.as_ref()), "", url, link_executor_config, &progress, &free_record, &dispatch).await;
    let _ = page.close().await;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::NullPage;

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

    struct RecordsCall(std::sync::atomic::AtomicBool);

    #[async_trait]
    impl TestHandlerFn for RecordsCall {
        async fn handle(&self, _page: &dyn PageHandle, _output_dir: &Path) -> anyhow::Result<()> {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mode_invokes_handler_once() {
        let session = NullSession;
        let handler = Arc::new(RecordsCall(std::sync::atomic::AtomicBool::new(false)));
        let config = LinkExecutorConfig::new();
        run_test_mode(&session, "https://example.test/buttons", handler.clone(), Path::new("out"), &config)
            .await
            .unwrap();
        assert!(handler.0.load(std::sync::atomic::Ordering::SeqCst));
    }
}
