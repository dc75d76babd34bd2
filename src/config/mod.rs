//! Configuration resolution.
//!
//! The resolver is pure: it never touches the filesystem. Given a
//! [`SiteConfig`] (what the declarative fluent API — out of scope here — would
//! hand the core) it produces an immutable [`RuntimeConfig`] and a
//! [`PerSitePaths`] derivation function.

mod paths;
mod types;

pub use paths::{host_of, paths_for, PerSitePaths};
pub use types::{LogLevel, ProgressPolicy, RuntimeConfig, SiteConfig};
