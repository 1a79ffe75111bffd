//! Scripted in-memory page for tests
//!
//! [`FakePage`] answers driver queries from a fixed table of selectors, so a
//! missing element never appears later: waits for it fail immediately rather
//! than after their timeout. Delays are opt-in via [`FakePage::hanging`] and
//! [`FakePage::with_navigation_delay`].
//!
//! Console output is logged while a document loads. Like a real page, only an
//! observer installed before [`PageDriver::navigate`] sees it.

use crate::driver::{DocumentMetrics, ElementBox, ImageInfo, PageDriver, RawConsoleEntry};
use crate::error::{ProbeError, Result};
use crate::session::{Session, SessionManager};
use async_trait::async_trait;
use pageprobe_core::{NetworkEvent, Profile};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Smallest valid PNG (1x1, transparent)
const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone)]
struct Overlay {
    selector: String,
    dismissible: bool,
}

#[derive(Debug)]
struct FakeState {
    counts: HashMap<String, usize>,
    visible: HashSet<String>,
    boxes: HashMap<String, Vec<ElementBox>>,
    images: Vec<ImageInfo>,
    metrics: DocumentMetrics,
    /// Logged by the page on every load
    load_console: Vec<RawConsoleEntry>,
    /// Captured and not yet taken
    console: Vec<RawConsoleEntry>,
    observing: bool,
    resources: Vec<NetworkEvent>,
    /// Selectors that only render once the page has been scrolled
    on_scroll: HashMap<String, usize>,
    scrolls: Vec<String>,
    /// selector -> computed style property -> value
    styles: HashMap<String, HashMap<String, String>>,
    /// trigger selector -> overlay it opens
    overlays: HashMap<String, Overlay>,
    navigations: Vec<String>,
    keys: Vec<String>,
}

impl FakeState {
    /// Render everything that waits for a scroll
    fn reveal(&mut self) {
        for (selector, count) in std::mem::take(&mut self.on_scroll) {
            self.counts.insert(selector.clone(), count);
            if count > 0 {
                self.visible.insert(selector);
            }
        }
    }
}

/// Scripted [`PageDriver`]
#[derive(Debug)]
pub struct FakePage {
    state: Mutex<FakeState>,
    failing: HashMap<String, String>,
    hanging: HashMap<String, Duration>,
    navigation_delay: Option<Duration>,
    navigation_error: Option<String>,
    stuck_teardown: Option<Duration>,
    broken_observer: bool,
    broken_screenshots: bool,
    closes: Arc<AtomicUsize>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    /// Empty 1920x1080 document with no overflow
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                counts: HashMap::new(),
                visible: HashSet::new(),
                boxes: HashMap::new(),
                images: Vec::new(),
                metrics: DocumentMetrics {
                    scroll_width: 1920.0,
                    client_width: 1920.0,
                    scroll_height: 1080.0,
                    client_height: 1080.0,
                    viewport_height: 1080.0,
                },
                load_console: Vec::new(),
                console: Vec::new(),
                observing: false,
                resources: Vec::new(),
                on_scroll: HashMap::new(),
                scrolls: Vec::new(),
                styles: HashMap::new(),
                overlays: HashMap::new(),
                navigations: Vec::new(),
                keys: Vec::new(),
            }),
            failing: HashMap::new(),
            hanging: HashMap::new(),
            navigation_delay: None,
            navigation_error: None,
            stuck_teardown: None,
            broken_observer: false,
            broken_screenshots: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state_mut(&mut self) -> &mut FakeState {
        self.state.get_mut()
    }

    /// `count` visible elements match `selector`
    pub fn with_elements(mut self, selector: &str, count: usize) -> Self {
        let state = self.state_mut();
        state.counts.insert(selector.to_string(), count);
        if count > 0 {
            state.visible.insert(selector.to_string());
        }
        self
    }

    /// `count` elements match `selector` but none is visible
    pub fn with_hidden(mut self, selector: &str, count: usize) -> Self {
        let state = self.state_mut();
        state.counts.insert(selector.to_string(), count);
        state.visible.remove(selector);
        self
    }

    /// Visible elements with the given geometry
    pub fn with_boxes(mut self, selector: &str, boxes: Vec<ElementBox>) -> Self {
        let state = self.state_mut();
        state.counts.insert(selector.to_string(), boxes.len());
        if !boxes.is_empty() {
            state.visible.insert(selector.to_string());
        }
        state.boxes.insert(selector.to_string(), boxes);
        self
    }

    pub fn with_images(mut self, images: Vec<ImageInfo>) -> Self {
        self.state_mut().images = images;
        self
    }

    /// Document widths; heights keep their defaults
    pub fn with_widths(mut self, scroll_width: f64, client_width: f64) -> Self {
        let metrics = &mut self.state_mut().metrics;
        metrics.scroll_width = scroll_width;
        metrics.client_width = client_width;
        self
    }

    pub fn with_viewport_height(mut self, height: f64) -> Self {
        let metrics = &mut self.state_mut().metrics;
        metrics.viewport_height = height;
        metrics.client_height = height;
        self
    }

    /// Console message the page logs while loading
    pub fn with_console(mut self, kind: &str, text: &str) -> Self {
        self.state_mut().load_console.push(RawConsoleEntry {
            kind: kind.to_string(),
            text: text.to_string(),
            timestamp_ms: None,
        });
        self
    }

    pub fn with_resource(mut self, url: &str, duration_ms: f64) -> Self {
        self.state_mut().resources.push(NetworkEvent {
            url: url.to_string(),
            start_ms: 0.0,
            duration_ms,
            transfer_size: 0,
            status: Some(200),
        });
        self
    }

    /// Clicking `trigger` shows `overlay`; Escape hides it when `dismissible`
    pub fn with_overlay(mut self, trigger: &str, overlay: &str, dismissible: bool) -> Self {
        let state = self.state_mut();
        state.counts.entry(trigger.to_string()).or_insert(1);
        state.visible.insert(trigger.to_string());
        state.overlays.insert(
            trigger.to_string(),
            Overlay {
                selector: overlay.to_string(),
                dismissible,
            },
        );
        self
    }

    /// `count` visible elements match `selector`, but only after any scroll
    pub fn with_elements_on_scroll(mut self, selector: &str, count: usize) -> Self {
        self.state_mut().on_scroll.insert(selector.to_string(), count);
        self
    }

    /// Computed `property` of the first match of `selector`
    pub fn with_style(mut self, selector: &str, property: &str, value: &str) -> Self {
        self.state_mut()
            .styles
            .entry(selector.to_string())
            .or_default()
            .insert(property.to_string(), value.to_string());
        self
    }

    /// Every operation touching `selector` fails with a browser error
    pub fn failing(mut self, selector: &str, message: &str) -> Self {
        self.failing.insert(selector.to_string(), message.to_string());
        self
    }

    /// Every operation touching `selector` sleeps for `delay` first
    pub fn hanging(mut self, selector: &str, delay: Duration) -> Self {
        self.hanging.insert(selector.to_string(), delay);
        self
    }

    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    pub fn with_navigation_error(mut self, message: &str) -> Self {
        self.navigation_error = Some(message.to_string());
        self
    }

    /// Console reads and close both sleep for `delay`, like a wedged target
    pub fn with_stuck_teardown(mut self, delay: Duration) -> Self {
        self.stuck_teardown = Some(delay);
        self
    }

    pub fn with_broken_observer(mut self) -> Self {
        self.broken_observer = true;
        self
    }

    pub fn with_broken_screenshots(mut self) -> Self {
        self.broken_screenshots = true;
        self
    }

    /// Shared close counter, for asserting the page was released
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    /// URLs navigated to so far
    pub async fn navigations(&self) -> Vec<String> {
        self.state.lock().await.navigations.clone()
    }

    /// Keys pressed so far
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.keys.clone()
    }

    /// Scroll targets so far: selectors, or `y=<px>` for absolute scrolls
    pub async fn scrolls(&self) -> Vec<String> {
        self.state.lock().await.scrolls.clone()
    }

    async fn touch(&self, selector: &str) -> Result<()> {
        if let Some(delay) = self.hanging.get(selector) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failing.get(selector) {
            return Err(ProbeError::Browser(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        if let Some(delay) = self.navigation_delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProbeError::navigation(
                    url,
                    format!("load did not finish within {:?}", timeout),
                ));
            }
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.navigation_error {
            return Err(ProbeError::navigation(url, message.clone()));
        }

        let mut state = self.state.lock().await;
        state.navigations.push(url.to_string());
        if state.observing {
            let logged = state.load_console.clone();
            state.console.extend(logged);
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.touch(selector).await?;
        let state = self.state.lock().await;
        if state.counts.get(selector).copied().unwrap_or(0) > 0 {
            Ok(())
        } else {
            Err(ProbeError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.touch(selector).await?;
        Ok(self.state.lock().await.counts.get(selector).copied().unwrap_or(0))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.touch(selector).await?;
        Ok(self.state.lock().await.visible.contains(selector))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.touch(selector).await?;
        let mut state = self.state.lock().await;
        if state.counts.get(selector).copied().unwrap_or(0) == 0 {
            return Err(ProbeError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        if let Some(overlay) = state.overlays.get(selector).cloned() {
            state.counts.insert(overlay.selector.clone(), 1);
            state.visible.insert(overlay.selector);
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.keys.push(key.to_string());
        if key == "Escape" {
            let dismissed: Vec<String> = state
                .overlays
                .values()
                .filter(|o| o.dismissible)
                .map(|o| o.selector.clone())
                .collect();
            for selector in dismissed {
                state.visible.remove(&selector);
            }
        }
        Ok(())
    }

    async fn element_boxes(&self, selector: &str, limit: usize) -> Result<Vec<ElementBox>> {
        self.touch(selector).await?;
        let state = self.state.lock().await;
        Ok(state
            .boxes
            .get(selector)
            .map(|b| b.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn images(&self) -> Result<Vec<ImageInfo>> {
        self.touch("img").await?;
        Ok(self.state.lock().await.images.clone())
    }

    async fn document_metrics(&self) -> Result<DocumentMetrics> {
        self.touch("document").await?;
        Ok(self.state.lock().await.metrics)
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        self.touch(selector).await?;
        let mut state = self.state.lock().await;
        if state.counts.get(selector).copied().unwrap_or(0) == 0 {
            return Err(ProbeError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        state.scrolls.push(selector.to_string());
        state.reveal();
        Ok(())
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        self.touch("document").await?;
        let mut state = self.state.lock().await;
        state.scrolls.push(format!("y={}", y));
        if y > 0.0 {
            state.reveal();
        }
        Ok(())
    }

    async fn computed_style(&self, selector: &str, property: &str) -> Result<Option<String>> {
        self.touch(selector).await?;
        let state = self.state.lock().await;
        if state.counts.get(selector).copied().unwrap_or(0) == 0 {
            return Ok(None);
        }
        Ok(state
            .styles
            .get(selector)
            .and_then(|props| props.get(property))
            .cloned())
    }

    async fn install_observer(&self) -> Result<()> {
        if self.broken_observer {
            return Err(ProbeError::Browser("capture shim rejected".to_string()));
        }
        self.state.lock().await.observing = true;
        Ok(())
    }

    async fn take_console(&self) -> Result<Vec<RawConsoleEntry>> {
        if let Some(delay) = self.stuck_teardown {
            tokio::time::sleep(delay).await;
        }
        if self.broken_observer {
            return Err(ProbeError::Browser("console buffer unreadable".to_string()));
        }
        Ok(std::mem::take(&mut self.state.lock().await.console))
    }

    async fn take_resources(&self) -> Result<Vec<NetworkEvent>> {
        if self.broken_observer {
            return Err(ProbeError::Browser("resource timing unavailable".to_string()));
        }
        Ok(std::mem::take(&mut self.state.lock().await.resources))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        if self.broken_screenshots {
            return Err(ProbeError::Browser("CDP capture failed".to_string()));
        }
        Ok(PNG_1X1.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stuck_teardown {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

type PageFactory = Box<dyn Fn(&Profile) -> FakePage + Send + Sync>;

/// Session manager handing out [`FakePage`]s and counting opens and closes
pub struct FakeSessionManager {
    factory: PageFactory,
    refused: HashSet<String>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl FakeSessionManager {
    /// Build each profile's page with `factory`
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Profile) -> FakePage + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            refused: HashSet::new(),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Fail `open` for the named profile, as if Chrome would not start
    pub fn refusing(mut self, profile: &str) -> Self {
        self.refused.insert(profile.to_string());
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionManager for FakeSessionManager {
    async fn open(&self, profile: &Profile) -> Result<Session> {
        if self.refused.contains(&profile.name) {
            return Err(ProbeError::Session(format!(
                "Failed to launch browser for {}",
                profile.name
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(profile.clone(), Box::new((self.factory)(profile))))
    }

    async fn close(&self, session: Session) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        session.page().close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overlay_opens_and_dismisses() {
        let page = FakePage::new().with_overlay(".product-card", "[role=dialog]", true);

        assert!(!page.is_visible("[role=dialog]").await.unwrap());
        page.click(".product-card").await.unwrap();
        assert!(page.is_visible("[role=dialog]").await.unwrap());
        page.press_key("Escape").await.unwrap();
        assert!(!page.is_visible("[role=dialog]").await.unwrap());
        assert_eq!(page.keys().await, vec!["Escape".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_element_wait_fails_fast() {
        let page = FakePage::new();
        let err = page
            .wait_for_selector("#products", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_navigation_delay_beyond_timeout() {
        let page = FakePage::new().with_navigation_delay(Duration::from_secs(60));
        let err = page
            .navigate("https://example.com", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Navigation { .. }));
        assert!(page.navigations().await.is_empty());
    }

    #[tokio::test]
    async fn test_console_needs_observer_before_load() {
        let late = FakePage::new().with_console("error", "No QueryClient set");
        late.navigate("https://shop.example", Duration::from_secs(1)).await.unwrap();
        late.install_observer().await.unwrap();
        assert!(late.take_console().await.unwrap().is_empty());

        let early = FakePage::new().with_console("error", "No QueryClient set");
        early.install_observer().await.unwrap();
        early.navigate("https://shop.example", Duration::from_secs(1)).await.unwrap();
        let captured = early.take_console().await.unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].text, "No QueryClient set");
    }

    #[tokio::test]
    async fn test_scroll_reveals_deferred_elements() {
        let page = FakePage::new()
            .with_elements("#products", 1)
            .with_elements_on_scroll("#products .grid > *", 8);

        assert_eq!(page.count("#products .grid > *").await.unwrap(), 0);
        page.scroll_to(0.0).await.unwrap();
        assert_eq!(page.count("#products .grid > *").await.unwrap(), 0);

        page.scroll_into_view("#products").await.unwrap();
        assert_eq!(page.count("#products .grid > *").await.unwrap(), 8);
        assert!(page.scroll_into_view("#missing").await.unwrap_err().is_timeout());
        assert_eq!(page.scrolls().await, vec!["y=0".to_string(), "#products".to_string()]);
    }

    #[tokio::test]
    async fn test_manager_counts_sessions() {
        let manager = FakeSessionManager::new(|_| FakePage::new()).refusing("mobile-iphone12");

        let session = manager.open(&Profile::desktop()).await.unwrap();
        assert!(manager.open(&Profile::mobile()).await.is_err());
        manager.close(session).await.unwrap();

        assert_eq!(manager.opened(), 1);
        assert_eq!(manager.closed(), 1);
    }
}
