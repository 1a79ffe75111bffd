//! Page driver abstraction
//!
//! Checks never talk to Chrome directly. They ask a [`PageDriver`] semantic
//! questions about the rendered page (how many elements match, how wide is the
//! document, where are the images), which keeps check logic testable against
//! the scripted [`crate::fake::FakePage`] as well as a real browser.

use async_trait::async_trait;
use pageprobe_core::{NetworkEvent, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page-space geometry of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Leading text content, trimmed
    #[serde(default)]
    pub text: String,
}

impl ElementBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            text: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// One `<img>` in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    /// Value of the `loading` attribute, if any
    pub loading: Option<String>,
    /// Page-space top edge in CSS pixels
    pub top: f64,
}

impl ImageInfo {
    pub fn is_lazy(&self) -> bool {
        self.loading.as_deref() == Some("lazy")
    }
}

/// Root element and window dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub scroll_width: f64,
    pub client_width: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub viewport_height: f64,
}

/// Console entry as captured in-page, before classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConsoleEntry {
    /// Console method or event type (`log`, `warn`, `error`, `exception`, ...)
    pub kind: String,
    pub text: String,
    /// Epoch milliseconds when the page recorded it
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
}

/// Operations a run needs from a loaded page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url`, failing with `Navigation` if it does not finish within `timeout`
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until `selector` matches, failing with `ElementNotFound` after `timeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Number of elements currently matching `selector`
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Whether the first match of `selector` is rendered and visible
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Click the first match of `selector`
    async fn click(&self, selector: &str) -> Result<()>;

    /// Press a named key (`Escape`, `Enter`, ...)
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Geometry of up to `limit` matches of `selector`, in document order
    async fn element_boxes(&self, selector: &str, limit: usize) -> Result<Vec<ElementBox>>;

    async fn images(&self) -> Result<Vec<ImageInfo>>;

    async fn document_metrics(&self) -> Result<DocumentMetrics>;

    /// Scroll the first match of `selector` into view, failing with
    /// `ElementNotFound` when nothing matches
    async fn scroll_into_view(&self, selector: &str) -> Result<()>;

    /// Scroll the window to page offset `y` (CSS pixels)
    async fn scroll_to(&self, y: f64) -> Result<()>;

    /// Computed CSS `property` of the first match of `selector`; `None` when nothing matches
    async fn computed_style(&self, selector: &str, property: &str) -> Result<Option<String>>;

    /// Start capturing console output. Must precede `navigate`: only documents
    /// loaded afterwards are captured from their first script on
    async fn install_observer(&self) -> Result<()>;

    /// Console entries captured since the last call
    async fn take_console(&self) -> Result<Vec<RawConsoleEntry>>;

    /// Completed requests since the last call
    async fn take_resources(&self) -> Result<Vec<NetworkEvent>>;

    /// PNG screenshot of the viewport, or of the whole document when `full_page`
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Release the browser. Called once, by the session manager
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_lazy_detection() {
        let lazy = ImageInfo {
            src: "/a.webp".to_string(),
            loading: Some("lazy".to_string()),
            top: 2000.0,
        };
        let eager = ImageInfo {
            loading: Some("eager".to_string()),
            ..lazy.clone()
        };
        assert!(lazy.is_lazy());
        assert!(!eager.is_lazy());
    }

    #[test]
    fn test_raw_console_entry_without_timestamp() {
        let entry: RawConsoleEntry =
            serde_json::from_str(r#"{"kind":"error","text":"No QueryClient set"}"#).unwrap();
        assert_eq!(entry.kind, "error");
        assert!(entry.timestamp_ms.is_none());
    }
}
