//! Login handlers invoked when `auth.json` is absent.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{BrowserSession, WaitUntil};
use crate::errors::{CrawlError, Result};

use super::dotenv;

const SIGN_IN_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// User-supplied or auto login handler, invoked once when no cached
/// credentials exist.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn login(&self, session: &dyn BrowserSession, state_dir: &Path) -> Result<()>;
}

/// Reads `EMAIL`/`PASSWORD` from `stateDir/.env`, fills the two detected text
/// inputs on `login_url`, clicks the sign-in button, and waits for a redirect
/// away from `/login` or `/auth`.
pub struct AutoLoginHandler {
    pub login_url: String,
    pub text_input_selector: String,
    pub sign_in_button_selector: String,
}

impl AutoLoginHandler {
    #[must_use]
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            text_input_selector: "input[type=text], input[type=email], input[type=password]".to_string(),
            sign_in_button_selector: "button[type=submit], button:has-text('Sign in')".to_string(),
        }
    }
}

#[async_trait]
impl AuthHandler for AutoLoginHandler {
    async fn login(&self, session: &dyn BrowserSession, state_dir: &Path) -> Result<()> {
        let vars = dotenv::read(&state_dir.join(".env"))
            .await
            .map_err(CrawlError::Other)?;
        let email = vars.get("EMAIL").ok_or_else(|| CrawlError::AuthMissing {
            state_dir: state_dir.to_path_buf(),
        })?;
        let password = vars.get("PASSWORD").ok_or_else(|| CrawlError::AuthMissing {
            state_dir: state_dir.to_path_buf(),
        })?;

        let page = session.new_page().await.map_err(CrawlError::DriverError)?;
        page.goto(&self.login_url, WaitUntil::Load, Duration::from_secs(30))
            .await
            .map_err(CrawlError::DriverError)?;

        let inputs = page
            .locator(&self.text_input_selector)
            .all()
            .await
            .map_err(CrawlError::DriverError)?;
        if inputs.len() != 2 {
            return Err(CrawlError::AuthFormUnsupported {
                detail: format!("expected exactly 2 text inputs, found {}", inputs.len()),
            });
        }

        let buttons = page
            .locator(&self.sign_in_button_selector)
            .all()
            .await
            .map_err(CrawlError::DriverError)?;
        if buttons.len() != 1 {
            return Err(CrawlError::AuthFormUnsupported {
                detail: format!("expected exactly 1 sign-in button, found {}", buttons.len()),
            });
        }

        // Fill email then password — the first detected input is assumed to
        // be the identity field, matching "first input wins"
        // locator-ordering convention elsewhere in the codebase.
        fill(inputs[0].as_ref(), email).await?;
        fill(inputs[1].as_ref(), password).await?;

        buttons[0].click().await.map_err(CrawlError::DriverError)?;

        wait_for_redirect_away_from_login(page.as_ref()).await?;
        Ok(())
    }
}

async fn fill(input: &dyn crate::driver::Locator, value: &str) -> Result<()> {
    input.fill(value).await.map_err(CrawlError::DriverError)
}

async fn wait_for_redirect_away_from_login(page: &dyn crate::driver::PageHandle) -> Result<()> {
    let deadline = tokio::time::Instant::now() + SIGN_IN_CONFIRM_TIMEOUT;
    loop {
        let url = page
            .evaluate("window.location.pathname")
            .await
            .map_err(CrawlError::DriverError)?;
        let path = url.as_str().unwrap_or_default();
        if !path.contains("/login") && !path.contains("/auth") {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CrawlError::AuthNotConfirmed {
                timeout_secs: SIGN_IN_CONFIRM_TIMEOUT.as_secs(),
            });
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
