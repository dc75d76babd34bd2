//! Per-site path derivation: one state directory per site, keyed by host.
//!
//! `paths_for` is pure string/path work — it never touches the filesystem,
//! mirroring the `get_mirror_path`/`ensure_domain_gitignore` host-keyed
//! layout in `utils/url_utils.rs`, generalized from content mirrors to state
//! files.

use std::path::PathBuf;

use url::Url;

use super::RuntimeConfig;

/// All paths derived for one site, keyed by the start URL's host.
#[derive(Debug, Clone)]
pub struct PerSitePaths {
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    pub progress_file: PathBuf,
    pub free_file: PathBuf,
    pub collect_file: PathBuf,
    pub meta_file: PathBuf,
    pub mismatch_file: PathBuf,
    pub auth_file: PathBuf,
    pub scripts_dir: PathBuf,
    pub filename_mapping_file: PathBuf,
    pub env_file: PathBuf,
}

/// Extract a host from `url`, falling back to `"default"` on any failure
/// (: "Host extraction failure falls back to `default`").
#[must_use]
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "default".to_string())
}

/// Derive every per-site path from the start URL and the resolved config.
#[must_use]
pub fn paths_for(start_url: &str, config: &RuntimeConfig) -> PerSitePaths {
    let host = host_of(start_url);
    let output_dir = config.output_base_dir.join(&host);
    let state_dir = config.state_base_dir.join(&host);
    PerSitePaths {
        progress_file: state_dir.join("progress.json"),
        free_file: state_dir.join("free.json"),
        collect_file: state_dir.join("collect.json"),
        meta_file: state_dir.join("meta.json"),
        mismatch_file: state_dir.join("mismatch.json"),
        auth_file: state_dir.join("auth.json"),
        scripts_dir: state_dir.join("scripts"),
        filename_mapping_file: state_dir.join("filename-mapping.json"),
        env_file: state_dir.join(".env"),
        output_dir,
        state_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_falls_back_to_default() {
        assert_eq!(host_of("not a url"), "default");
    }

    #[test]
    fn host_of_extracts_host() {
        assert_eq!(host_of("https://blocks.example.com/foo"), "blocks.example.com");
    }

    #[test]
    fn paths_for_is_pure_and_host_keyed() {
        let config = RuntimeConfig::default();
        let paths = paths_for("https://blocks.example.com/foo", &config);
        assert_eq!(paths.output_dir, PathBuf::from("output/blocks.example.com"));
        assert_eq!(
            paths.progress_file,
            PathBuf::from(".crawler/blocks.example.com/progress.json")
        );
        assert_eq!(
            paths.filename_mapping_file,
            PathBuf::from(".crawler/blocks.example.com/filename-mapping.json")
        );
    }
}
