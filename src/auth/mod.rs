//! Authentication manager.
//!
//! Ensures a `BrowserSession` carries valid credentials before any crawl page
//! opens. `auth.json` is the cache: present and loadable means replay, absent
//! means invoke a handler and persist the result.

mod dotenv;
mod handler;

pub use handler::{AuthHandler, AutoLoginHandler};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::driver::{BrowserSession, Cookie, SameSite, StorageState};
use crate::errors::{CrawlError, Result};

/// The plain cookie-export array accepted as storage format (ii). Mirrors the
/// shape common browser-automation cookie exports use, which is looser than
/// the driver's native `Cookie` (string `sameSite`, optional everything but
/// `name`/`value`/`domain`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlainCookie {
    name: String,
    value: String,
    domain: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    expires: Option<f64>,
    #[serde(default)]
    secure: bool,
    #[serde(default, rename = "httpOnly")]
    http_only: bool,
    #[serde(default, rename = "sameSite")]
    same_site: Option<String>,
}

impl From<PlainCookie> for Cookie {
    fn from(raw: PlainCookie) -> Self {
        Cookie {
            name: raw.name,
            value: raw.value,
            domain: raw.domain,
            path: raw.path.unwrap_or_else(|| "/".to_string()),
            expires: raw.expires,
            secure: raw.secure,
            http_only: raw.http_only,
            same_site: raw.same_site.and_then(|s| match s.to_lowercase().as_str() {
                "strict" => Some(SameSite::Strict),
                "lax" => Some(SameSite::Lax),
                "none" => Some(SameSite::None),
                _ => None,
            }),
        }
    }
}

/// Either on-disk format `auth.json` may hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AuthFile {
    Native(StorageState),
    Plain(Vec<PlainCookie>),
}

/// Ensure `session` carries valid credentials for this site.
///
/// If `handler` is `None`, returns immediately (no auth configured). Otherwise
/// loads and replays `auth.json` if present; if absent, runs the handler and
/// persists its resulting storage state.
pub async fn ensure_auth(
    session: &dyn BrowserSession,
    auth_file: &Path,
    state_dir: &Path,
    handler: Option<&dyn AuthHandler>,
) -> Result<()> {
    let Some(handler) = handler else {
        return Ok(());
    };

    if tokio::fs::try_exists(auth_file).await.unwrap_or(false) {
        return load_and_apply(session, auth_file).await;
    }

    handler.login(session, state_dir).await?;

    let storage_state = session
        .storage_state()
        .await
        .map_err(CrawlError::DriverError)?;
    crate::state::save_atomic(auth_file, &storage_state)
        .await
        .map_err(CrawlError::Other)?;
    Ok(())
}

async fn load_and_apply(session: &dyn BrowserSession, auth_file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(auth_file).await.map_err(|_| CrawlError::AuthMissing {
        state_dir: auth_file.parent().map_or_else(|| auth_file.to_path_buf(), Path::to_path_buf),
    })?;

    let parsed: AuthFile = serde_json::from_slice(&bytes).map_err(|e| CrawlError::AuthMissing {
        state_dir: auth_file
            .parent()
            .map_or_else(|| auth_file.to_path_buf(), Path::to_path_buf)
            .join(format!("(malformed: {e})")),
    })?;

    let cookies = match parsed {
        AuthFile::Native(state) => {
            return apply_storage_state(session, state).await;
        }
        AuthFile::Plain(raw) => raw.into_iter().map(Cookie::from).collect(),
    };

    session
        .add_cookies(cookies)
        .await
        .map_err(CrawlError::DriverError)
}

async fn apply_storage_state(session: &dyn BrowserSession, state: StorageState) -> Result<()> {
    if !state.cookies.is_empty() {
        session
            .add_cookies(state.cookies)
            .await
            .map_err(CrawlError::DriverError)?;
    }
    // `origins` (localStorage snapshots) have no driver-level apply primitive
    // in the narrow capability trait; replay is cookie-only, matching what
    // `new_context(Some(storage_state))` would otherwise seed for a fresh
    // context. Non-cookie state is simply not replayed here.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_cookie_defaults_path_and_same_site() {
        let raw = PlainCookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: "example.com".into(),
            path: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: Some("Lax".into()),
        };
        let cookie: Cookie = raw.into();
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
    }

    #[test]
    fn untagged_auth_file_accepts_native_and_plain_shapes() {
        let native = serde_json::json!({"cookies": [], "origins": []});
        let parsed: AuthFile = serde_json::from_value(native).unwrap();
        assert!(matches!(parsed, AuthFile::Native(_)));

        let plain = serde_json::json!([{"name": "sid", "value": "x", "domain": "example.com"}]);
        let parsed: AuthFile = serde_json::from_value(plain).unwrap();
        assert!(matches!(parsed, AuthFile::Plain(_)));
    }
}
