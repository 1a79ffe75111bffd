//! Fail-open utilities for best-effort diagnostics
//!
//! Screenshots, observer polling, pre-check scrolling and report writes support a
//! run but are not the run itself. A failure in any of them is logged and swallowed so the run
//! still finishes and still produces whatever report it can.
//!
//! DO NOT use fail-open for:
//! - Navigation (a failed load is a recorded issue, not a silent skip)
//! - Check execution (the runner converts errors into results instead)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Await `fut`, returning `None` and logging a warning if it fails
///
/// ```no_run
/// use pageprobe_core::fail_open::fail_open;
/// use pageprobe_core::Result;
///
/// async fn write_screenshot() -> Result<std::path::PathBuf> {
///     Ok("screenshots/desktop-1920_loaded.png".into())
/// }
///
/// async fn example() {
///     let path = fail_open("evidence::loaded", write_screenshot()).await;
///     // path is None if the write failed
/// }
/// ```
pub async fn fail_open<Fut, T>(operation_name: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`], but falls back to `default` instead of `None`
pub async fn fail_open_or<Fut, T>(operation_name: &str, default: T, fut: Fut) -> T
where
    Fut: Future<Output = Result<T>>,
{
    fail_open(operation_name, fut).await.unwrap_or(default)
}
