//! Browser sessions, page observation and screenshot evidence for pageprobe
//!
//! This crate owns everything that touches a live page: launching isolated
//! Chrome instances per viewport profile, answering semantic questions about
//! the rendered document, collecting console and network events, and writing
//! screenshot evidence.
//!
//! # Example
//!
//! ```no_run
//! use pageprobe_browser::{BrowserConfig, ChromeSessionManager, Observer, SessionManager};
//! use pageprobe_core::Profile;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ChromeSessionManager::new(BrowserConfig::default());
//!     let session = manager.open(&Profile::mobile()).await?;
//!
//!     let observer = Observer::new();
//!     observer.attach(&session).await;
//!     session
//!         .page()
//!         .navigate("https://example.com", Duration::from_secs(30))
//!         .await?;
//!
//!     let cards = session.page().count("#products .grid > *").await?;
//!     println!("{} product cards", cards);
//!
//!     observer.poll(&session).await;
//!     let events = observer.drain(session.id()).await;
//!     println!("{} console errors", events.console_errors().len());
//!
//!     manager.close(session).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed (or `chrome_path` set in the config)
//! - In containers, launch with the sandbox disabled
//!
//! # Architecture
//!
//! - [`browser`]: Chrome launch and the CDP-backed [`PageDriver`]
//! - [`driver`]: The [`PageDriver`] seam checks are written against
//! - [`session`]: Sessions and the [`SessionManager`] trait
//! - [`observer`]: Per-session console and network buffers
//! - [`screenshot`]: Screenshot evidence
//! - `fake` (feature `testing`): Scripted page for tests

pub mod browser;
pub mod driver;
pub mod error;
mod js;
pub mod observer;
pub mod screenshot;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use browser::{BrowserConfig, ChromeDriver, ChromeSessionManager};
pub use driver::{DocumentMetrics, ElementBox, ImageInfo, PageDriver, RawConsoleEntry};
pub use error::{BrowserError, Result};
pub use observer::{ObservedEvents, Observer};
pub use screenshot::{sanitize_label, EvidenceCapturer, ScreenshotOptions};
pub use session::{Session, SessionId, SessionManager};
