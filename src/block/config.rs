//! Block processor configuration.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::{Locator, PageHandle};
use crate::extract::AutoExtractConfig;
use crate::free::FreeMatcher;

/// One-shot vs. lazy-load block discovery ("Two modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLocatorMode {
    Traditional,
    Progressive,
}

/// User-supplied `blockHandler(context)` (handler shape (a)).
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle(&self, page: &dyn PageHandle, block: &dyn Locator, output_dir: &std::path::Path) -> anyhow::Result<()>;
}

/// User-supplied `getBlockName(block)` (name resolution strategy (1)).
#[async_trait]
pub trait BlockNameFn: Send + Sync {
    async fn name(&self, page: &dyn PageHandle, block: &dyn Locator) -> anyhow::Result<Option<String>>;
}

/// One entry of a conditional-config set (step 2 / handler shape
/// (c)): `when` gates whether this config matches a given block; if it does,
/// its `auto` config (with the `when` locator clicked first) drives
/// extraction.
#[derive(Clone)]
pub struct ConditionalBlockConfig {
    pub when_selector: String,
    pub skip_pre_checks: bool,
    pub auto: AutoExtractConfig,
}

/// The three handler shapes step 4 enumerates.
#[derive(Clone)]
pub enum BlockHandlerKind {
    UserHandler(Arc<dyn BlockHandler>),
    Auto(AutoExtractConfig),
    Conditional(Vec<ConditionalBlockConfig>),
}

#[derive(Clone, Default)]
pub struct BlockNameConfig {
    pub get_block_name: Option<Arc<dyn BlockNameFn>>,
    pub block_name_locator: Option<String>,
}

/// Everything the block processor needs for one page's worth of blocks.
#[derive(Clone)]
pub struct BlockProcessorConfig {
    pub blocks_selector: String,
    pub mode: BlockLocatorMode,
    pub handler: BlockHandlerKind,
    pub skip_free: Option<FreeMatcher>,
    pub name: BlockNameConfig,
    /// Open Question: unified to default `true` everywhere except
    /// the dedicated test-mode path.
    pub verify_block_completion: bool,
    pub output_dir: PathBuf,
}

impl BlockProcessorConfig {
    #[must_use]
    pub fn new(blocks_selector: impl Into<String>, handler: BlockHandlerKind, output_dir: PathBuf) -> Self {
        Self {
            blocks_selector: blocks_selector.into(),
            mode: BlockLocatorMode::Traditional,
            handler,
            skip_free: None,
            name: BlockNameConfig::default(),
            verify_block_completion: true,
            output_dir,
        }
    }

    #[must_use]
    pub fn progressive(mut self) -> Self {
        self.mode = BlockLocatorMode::Progressive;
        self
    }

    #[must_use]
    pub fn with_skip_free(mut self, matcher: FreeMatcher) -> Self {
        self.skip_free = Some(matcher);
        self
    }
}
