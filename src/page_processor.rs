//! Page processor: runs one user-supplied page handler per top-level page.
//!
//! The page-mode counterpart to the block processor: runs a user-supplied
//! handler over the whole, fully-loaded page and emits one artifact set per
//! page. The only protocol work beyond invoking the handler is error policy,
//! matching thin `process_single_page` error-path shape
//! (log, optionally pause in debug, re-raise).

use std::path::Path;

use async_trait::async_trait;

use crate::driver::PageHandle;
use crate::errors::{CrawlError, Result};

/// User-supplied page handler, invoked once the link executor has finished
/// navigation, script injection, the page-level free check, and auto-scroll.
#[async_trait]
pub trait PageHandlerFn: Send + Sync {
    async fn handle(&self, page: &dyn PageHandle, output_dir: &Path) -> anyhow::Result<()>;
}

/// Run `handler` over `page`, writing artifacts under `output_dir`.
pub async fn process_page(
    page: &dyn PageHandle,
    handler: &dyn PageHandlerFn,
    output_dir: &Path,
    pause_on_error: bool,
    debug_mode: bool,
) -> Result<()> {
    match handler.handle(page, output_dir).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if CrawlError::classify_abort(&e.to_string()) {
                return Err(CrawlError::UserAbort);
            }
            if pause_on_error && debug_mode {
                let _ = page.pause().await;
            }
            log::error!("page handler failed for {}: {e}", output_dir.display());
            Err(CrawlError::HandlerError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::NullPage;

    struct WritesMarker;

    #[async_trait]
    impl PageHandlerFn for WritesMarker {
        async fn handle(&self, _page: &dyn PageHandle, _output_dir: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl PageHandlerFn for AlwaysFails {
        async fn handle(&self, _page: &dyn PageHandle, _output_dir: &Path) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    struct AbortsLikeClosedBrowser;

    #[async_trait]
    impl PageHandlerFn for AbortsLikeClosedBrowser {
        async fn handle(&self, _page: &dyn PageHandle, _output_dir: &Path) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("Target page, context or browser has been closed"))
        }
    }

    #[tokio::test]
    async fn success_passes_through() {
        let page = NullPage;
        let result = process_page(&page, &WritesMarker, Path::new("out"), false, false).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handler_error_is_reraised() {
        let page = NullPage;
        let result = process_page(&page, &AlwaysFails, Path::new("out"), false, false).await;
        assert!(matches!(result, Err(CrawlError::HandlerError(_))));
    }

    #[tokio::test]
    async fn closed_browser_message_classifies_as_user_abort() {
        let page = NullPage;
        let result = process_page(&page, &AbortsLikeClosedBrowser, Path::new("out"), false, false).await;
        assert!(matches!(result, Err(CrawlError::UserAbort)));
    }
}
