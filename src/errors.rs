//! Error taxonomy for the crawl pipeline.
//!
//! `CrawlError` is the typed surface handed back to callers; internal glue
//! code works in `anyhow::Result` and converts at module boundaries, the same
//! split the orchestration engine uses between its public types and its
//! `crawl_engine` internals.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error taxonomy for the crawl pipeline.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// `auth.json` missing and no handler configured, or malformed on load.
    #[error("auth credentials missing or unreadable for state dir {state_dir}")]
    AuthMissing { state_dir: PathBuf },

    /// Login form did not expose exactly two text inputs and one sign-in button.
    #[error("login form unsupported: {detail}")]
    AuthFormUnsupported { detail: String },

    /// Post-submit redirect away from the login/auth path was not observed.
    #[error("login submission was not confirmed within {timeout_secs}s")]
    AuthNotConfirmed { timeout_secs: u64 },

    /// `collect.json` already existed; collection was skipped (informational).
    #[error("collect.json already exists, skipping collection")]
    CollectExists,

    /// The browser/driver was torn down mid-operation; not a real failure.
    #[error("operation aborted: driver session was closed")]
    UserAbort,

    /// `BlockNameExtractor` could not resolve a name after retries.
    #[error("could not extract a block name at {page_path}")]
    NameExtractionFailed { page_path: String },

    /// Heading had multiple element children with no anchor child.
    #[error("heading at {page_path} has multiple children but no link")]
    ComplexHeading { page_path: String },

    /// The free-text matcher matched more than once within its search region.
    #[error("free-text matcher found {count} matches, expected exactly 1")]
    FreeAmbiguous { count: usize },

    /// `expectedBlockCount` from `CollectResult` disagreed with the actual DOM count.
    #[error("block count mismatch at {page_path}: expected {expected}, found {actual}")]
    BlockCountMismatch {
        page_path: String,
        expected: usize,
        actual: usize,
    },

    /// A user-supplied handler raised an error.
    #[error("handler error: {0}")]
    HandlerError(#[source] anyhow::Error),

    /// Driver-level failure (navigation timeout, locator timeout, etc.).
    #[error("driver error: {0}")]
    DriverError(#[source] anyhow::Error),

    /// Catch-all for state persistence or configuration failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// True for errors that should terminate the enclosing page/link task
    /// without being reported as a failure.
    #[must_use]
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Self::UserAbort)
    }

    /// Classify a driver-raised error message as a silent user-abort: a
    /// torn-down browser/context/page raises an error whose text contains
    /// one of these substrings, and such errors must be counted as neither
    /// success nor failure.
    #[must_use]
    pub fn classify_abort(message: &str) -> bool {
        const MARKERS: [&str; 4] = [
            "Target page, context or browser has been closed",
            "Test ended",
            "Browser closed",
            "Target closed",
        ];
        MARKERS.iter().any(|m| message.contains(m))
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
