//! Browser error types - re-exports the unified ProbeError from pageprobe-core
//!
//! Driver failures use:
//! - Session(String) - the browser or its tab could not be created
//! - Browser(String) - CDP calls, script evaluation, screenshots
//! - Navigation { url, reason } - page load failures and load timeouts
//! - ElementNotFound { selector } - bounded element waits that ran out
//!
//! Error messages should name the operation and the selector or URL involved.

pub use pageprobe_core::{ProbeError, Result};

pub type BrowserError = ProbeError;
