//! Core configuration types, centered on `RuntimeConfig`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity, mirrored onto the `log` crate's levels at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Debug,
    Silent,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// `progress.{enable, rebuild?}` from 
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressPolicy {
    /// Gates whether new completions are *written*. Loading an existing
    /// `progress.json` for skip purposes happens regardless (see DESIGN.md,
    /// "progress.enable open question").
    #[serde(default)]
    pub enable: bool,
    /// When true, discard any on-disk progress and start from empty before
    /// the run (used to force a full re-crawl without touching `collect.json`
    /// or `free.json`).
    #[serde(default)]
    pub rebuild: bool,
}

/// Immutable, resolved configuration the orchestrator consumes. Produced once
/// at startup by [`super::resolve`]; never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub locale: String,
    pub output_base_dir: PathBuf,
    pub state_base_dir: PathBuf,
    pub max_concurrency: usize,
    pub pause_on_error: bool,
    pub log_level: LogLevel,
    pub ignore_mismatch: bool,
    pub progress: ProgressPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            output_base_dir: PathBuf::from("output"),
            state_base_dir: PathBuf::from(".crawler"),
            max_concurrency: 5,
            pause_on_error: true,
            log_level: LogLevel::Info,
            ignore_mismatch: false,
            progress: ProgressPolicy::default(),
        }
    }
}

/// The fully-resolved per-site pipeline description the declarative fluent
/// API (out of scope) compiles down to. Only the fields the orchestration
/// core actually reads are modeled here; site-specific extraction selectors
/// live alongside this in the link-collector / block-processor configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub start_url: String,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl SiteConfig {
    #[must_use]
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            runtime: RuntimeConfig::default(),
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }
}
