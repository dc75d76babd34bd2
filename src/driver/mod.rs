//! The narrow capability interface the orchestration engine programs against.
//!
//! The core never talks to a concrete
//! browser-automation crate directly: it calls `PageHandle`/`BrowserSession`.
//! `chromium.rs` supplies the default `chromiumoxide`-backed binding; tests use
//! a hand-rolled in-memory double (see `engine::tests`/`processor::tests`).

pub mod chromium;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single cookie, shaped after the storage-state cookie record used by
/// Playwright-family drivers (`domain`, `path`, `expires` as seconds-since-epoch,
/// `secure`/`http_only`, and a `SameSite` enum).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: Option<SameSite>,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// An origin's `localStorage`/`sessionStorage` snapshot, part of the native
/// storage-state format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<(String, String)>,
}

/// Native browser-driver storage state: `{cookies, origins}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

/// Page-wait conditions accepted by `goto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl Default for WaitUntil {
    fn default() -> Self {
        Self::Load
    }
}

/// A DOM locator resolved against some element-bearing scope. Implementations
/// are cheap to clone (a selector string plus a scope reference) because every
/// method re-queries the live page.
#[async_trait]
pub trait Locator: Send + Sync {
    /// The raw selector this locator resolves against, exposed so callers
    /// can compose relative-scope selectors (`util::scoped_locator`) or
    /// splice a concrete element reference into an `evaluate` script, the
    /// same way `collect::extract_links` bakes selectors into JS templates.
    fn selector(&self) -> &str;
    async fn all(&self) -> anyhow::Result<Vec<Box<dyn Locator>>>;
    async fn count(&self) -> anyhow::Result<usize>;
    async fn text_content(&self) -> anyhow::Result<String>;
    async fn inner_html(&self) -> anyhow::Result<String>;
    async fn click(&self) -> anyhow::Result<()>;
    async fn fill(&self, value: &str) -> anyhow::Result<()>;
    async fn is_visible(&self, timeout: Duration) -> anyhow::Result<bool>;
    async fn wait_for(&self, timeout: Duration) -> anyhow::Result<()>;
    async fn scroll_into_view(&self) -> anyhow::Result<()>;
    async fn get_attribute(&self, name: &str) -> anyhow::Result<Option<String>>;
}

/// The capability surface enumerates: navigation, locators, cookies,
/// evaluate-in-page, and scroll/screenshot primitives.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> anyhow::Result<()>;
    async fn wait_for_navigation(&self, timeout: Duration) -> anyhow::Result<()>;
    fn locator(&self, selector: &str) -> Box<dyn Locator>;
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;
    async fn add_init_script(&self, script: &str) -> anyhow::Result<()>;
    async fn wheel_scroll(&self, dy: f64) -> anyhow::Result<()>;
    async fn scroll_y(&self) -> anyhow::Result<f64>;
    async fn scroll_height(&self) -> anyhow::Result<f64>;
    async fn viewport_height(&self) -> anyhow::Result<f64>;
    async fn wait_timeout(&self, duration: Duration) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// The browser-level session: opens/owns pages and contexts.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>>;
    async fn new_context(&self, storage_state: Option<StorageState>) -> anyhow::Result<Box<dyn BrowserSession>>;
    async fn add_cookies(&self, cookies: Vec<Cookie>) -> anyhow::Result<()>;
    async fn storage_state(&self) -> anyhow::Result<StorageState>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// Hand-rolled `PageHandle`/`Locator` doubles shared by every module's unit
/// tests. Not a mocking crate — there is none in its dependency tree
/// for this layer, and these flows are simple enough not to need one.
#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// A locator whose answers are fixed at construction time.
    pub struct FakeLocator {
        pub sel: String,
        pub visible: bool,
        pub text: String,
        pub html: String,
        pub attribute: Option<String>,
        pub clicks: Mutex<usize>,
    }

    impl FakeLocator {
        #[must_use]
        pub fn new(sel: impl Into<String>) -> Self {
            Self {
                sel: sel.into(),
                visible: false,
                text: String::new(),
                html: String::new(),
                attribute: None,
                clicks: Mutex::new(0),
            }
        }

        #[must_use]
        pub fn visible(mut self, visible: bool) -> Self {
            self.visible = visible;
            self
        }

        #[must_use]
        pub fn with_text(mut self, text: impl Into<String>) -> Self {
            self.text = text.into();
            self
        }
    }

    #[async_trait]
    impl Locator for FakeLocator {
        fn selector(&self) -> &str {
            &self.sel
        }
        async fn all(&self) -> anyhow::Result<Vec<Box<dyn Locator>>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> anyhow::Result<usize> {
            Ok(usize::from(self.visible))
        }
        async fn text_content(&self) -> anyhow::Result<String> {
            Ok(self.text.clone())
        }
        async fn inner_html(&self) -> anyhow::Result<String> {
            Ok(self.html.clone())
        }
        async fn click(&self) -> anyhow::Result<()> {
            *self.clicks.lock().expect("lock") += 1;
            Ok(())
        }
        async fn fill(&self, _value: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn is_visible(&self, _timeout: Duration) -> anyhow::Result<bool> {
            Ok(self.visible)
        }
        async fn wait_for(&self, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn scroll_into_view(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_attribute(&self, _name: &str) -> anyhow::Result<Option<String>> {
            Ok(self.attribute.clone())
        }
    }

    /// A page with no meaningful DOM: every call succeeds with an empty
    /// answer. Useful when a test only cares about control flow, not data.
    pub struct NullPage;

    #[async_trait]
    impl PageHandle for NullPage {
        async fn goto(&self, _url: &str, _wait_until: WaitUntil, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn wait_for_navigation(&self, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        fn locator(&self, selector: &str) -> Box<dyn Locator> {
            Box::new(FakeLocator::new(selector))
        }
        async fn evaluate(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn add_init_script(&self, _script: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn wheel_scroll(&self, _dy: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn scroll_y(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn scroll_height(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn viewport_height(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn wait_timeout(&self, _duration: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn pause(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// A page whose `evaluate()` answers are looked up by matching a
    /// substring against the script text, in registration order. Everything
    /// else behaves like [`NullPage`]. This is enough to drive the
    /// evaluate-heavy flows (name resolution, free-region detection,
    /// auto-extraction) without a real DOM.
    #[derive(Default)]
    pub struct ScriptedPage {
        responses: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl ScriptedPage {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on_contains(&self, needle: impl Into<String>, value: serde_json::Value) {
            self.responses.lock().expect("lock").push((needle.into(), value));
        }
    }

    #[async_trait]
    impl PageHandle for ScriptedPage {
        async fn goto(&self, _url: &str, _wait_until: WaitUntil, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn wait_for_navigation(&self, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        fn locator(&self, selector: &str) -> Box<dyn Locator> {
            Box::new(FakeLocator::new(selector))
        }
        async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
            let responses = self.responses.lock().expect("lock");
            for (needle, value) in responses.iter() {
                if script.contains(needle.as_str()) {
                    return Ok(value.clone());
                }
            }
            Ok(serde_json::Value::Null)
        }
        async fn add_init_script(&self, _script: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn wheel_scroll(&self, _dy: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn scroll_y(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn scroll_height(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn viewport_height(&self) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn wait_timeout(&self, _duration: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn pause(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
