//! Debug-mode detection ("Environment flags detected").
//!
//! Any of `PWDEBUG`, `PW_TEST_DEBUG`, `PLAYWRIGHT_INSPECTOR` being set enables
//! mid-run pausing on errors and verification failures.

const DEBUG_ENV_VARS: [&str; 3] = ["PWDEBUG", "PW_TEST_DEBUG", "PLAYWRIGHT_INSPECTOR"];

#[must_use]
pub fn is_debug_mode() -> bool {
    DEBUG_ENV_VARS.iter().any(|k| std::env::var_os(k).is_some())
}
