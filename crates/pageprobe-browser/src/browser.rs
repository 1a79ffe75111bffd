//! Chrome lifecycle management using the Chrome DevTools Protocol
//!
//! headless_chrome is a blocking client. Every CDP call runs on the blocking
//! pool so that scenario deadlines (plain tokio timeouts) can abandon a hung
//! call instead of stalling the runtime.

use crate::driver::{DocumentMetrics, ElementBox, ImageInfo, PageDriver, RawConsoleEntry};
use crate::error::{ProbeError, Result};
use crate::js;
use crate::session::{Session, SessionManager};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Page::{
    AddScriptToEvaluateOnNewDocument, CaptureScreenshotFormatOption, Viewport,
};
use headless_chrome::{Browser, LaunchOptions, Tab};
use pageprobe_core::config::BrowserOptions;
use pageprobe_core::{NetworkEvent, Profile};
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Launch settings shared by every session of a scenario
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub options: BrowserOptions,
    /// Chrome kills itself after this long without CDP traffic
    pub idle_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            options: BrowserOptions::default(),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Opens one Chrome process per session, so profiles never share browser state
pub struct ChromeSessionManager {
    config: BrowserConfig,
}

impl ChromeSessionManager {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionManager for ChromeSessionManager {
    async fn open(&self, profile: &Profile) -> Result<Session> {
        info!(
            "Launching browser for {} (headless: {})",
            profile, self.config.options.headless
        );

        let config = self.config.clone();
        let launch_profile = profile.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || launch(&config, &launch_profile))
            .await
            .map_err(|e| ProbeError::Session(format!("Browser launch task failed: {}", e)))??;

        info!("Browser launched for {}", profile.name);

        let driver = ChromeDriver {
            browser: Mutex::new(Some(browser)),
            tab,
        };
        Ok(Session::new(profile.clone(), Box::new(driver)))
    }
}

fn launch(config: &BrowserConfig, profile: &Profile) -> Result<(Browser, Arc<Tab>)> {
    let mut extra_args = vec![format!(
        "--force-device-scale-factor={}",
        profile.device_scale_factor
    )];
    if let Some(ref ua) = profile.user_agent {
        extra_args.push(format!("--user-agent={}", ua));
    }
    let arg_refs: Vec<&OsStr> = extra_args.iter().map(OsStr::new).collect();

    let launch_options = LaunchOptions::default_builder()
        .headless(config.options.headless)
        .sandbox(config.options.sandbox)
        .window_size(Some((profile.width, profile.height)))
        .path(config.options.chrome_path.clone())
        .idle_browser_timeout(config.idle_timeout)
        .args(arg_refs)
        .build()
        .map_err(|e| ProbeError::Session(format!("Invalid launch options: {}", e)))?;

    let browser = Browser::new(launch_options)
        .map_err(|e| ProbeError::Session(format!("Failed to launch browser: {}", e)))?;

    let tab = browser
        .new_tab()
        .map_err(|e| ProbeError::Session(format!("Failed to create tab: {}", e)))?;

    emulate(&tab, profile)?;

    Ok((browser, tab))
}

/// Device metrics for `profile`. `mobile` switches Chrome to mobile layout
/// rules (meta viewport, overlay scrollbars, text autosizing).
fn device_metrics(profile: &Profile) -> Emulation::SetDeviceMetricsOverride {
    Emulation::SetDeviceMetricsOverride {
        width: profile.width,
        height: profile.height,
        device_scale_factor: profile.device_scale_factor,
        mobile: profile.mobile,
        scale: None,
        screen_width: Some(profile.width),
        screen_height: Some(profile.height),
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    }
}

/// Pin the tab's viewport to the profile; mobile profiles also get touch input
fn emulate(tab: &Tab, profile: &Profile) -> Result<()> {
    tab.call_method(device_metrics(profile))
        .map_err(|e| ProbeError::Session(format!("Device emulation failed: {}", e)))?;

    if profile.mobile {
        tab.call_method(Emulation::SetTouchEmulationEnabled {
            enabled: true,
            max_touch_points: Some(5),
        })
        .map_err(|e| ProbeError::Session(format!("Touch emulation failed: {}", e)))?;
    }

    debug!(
        "Emulating {}x{} @{}x (mobile: {})",
        profile.width, profile.height, profile.device_scale_factor, profile.mobile
    );
    Ok(())
}

/// [`PageDriver`] over a single Chrome tab
pub struct ChromeDriver {
    /// Dropping the browser kills the process; taken on close
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    /// Run a blocking CDP operation against the tab on the blocking pool
    async fn with_tab<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| ProbeError::Browser(format!("{} task failed: {}", operation, e)))?
    }

    /// Evaluate a script that returns a JSON string and decode it
    async fn eval_json<T>(&self, operation: &'static str, script: String) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.with_tab(operation, move |tab| eval_json_blocking(tab, &script))
            .await
    }
}

fn eval_json_blocking<T: DeserializeOwned>(tab: &Tab, script: &str) -> Result<T> {
    let remote = tab
        .evaluate(script, false)
        .map_err(|e| ProbeError::Browser(format!("JavaScript evaluation failed: {}", e)))?;

    let raw = remote
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProbeError::Browser("Script did not return a JSON string".to_string()))?;

    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!("Navigating to {} (timeout: {:?})", url, timeout);

        let target = url.to_string();
        let load = self.with_tab("navigate", move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)
                .map_err(|e| ProbeError::navigation(&target, e.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|e| ProbeError::navigation(&target, e.to_string()))?;
            Ok(())
        });

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProbeError::navigation(
                    url,
                    format!("load did not finish within {:?}", timeout),
                ))
            }
        }

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        debug!("Waiting for element: {} (timeout: {:?})", selector, timeout);

        let sel = selector.to_string();
        self.with_tab("wait_for_selector", move |tab| {
            tab.wait_for_element_with_custom_timeout(&sel, timeout)
                .map(|_| ())
                .map_err(|_| ProbeError::ElementNotFound { selector: sel.clone() })
        })
        .await
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval_json("count", js::count(selector)).await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.eval_json("is_visible", js::is_visible(selector)).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        debug!("Clicking {}", selector);

        let sel = selector.to_string();
        self.with_tab("click", move |tab| {
            let element = tab
                .find_element(&sel)
                .map_err(|_| ProbeError::ElementNotFound { selector: sel.clone() })?;
            element
                .click()
                .map_err(|e| ProbeError::Browser(format!("Click on {} failed: {}", sel, e)))?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_tab("press_key", move |tab| {
            tab.press_key(&key)
                .map_err(|e| ProbeError::Browser(format!("Key press {} failed: {}", key, e)))?;
            Ok(())
        })
        .await
    }

    async fn element_boxes(&self, selector: &str, limit: usize) -> Result<Vec<ElementBox>> {
        self.eval_json("element_boxes", js::element_boxes(selector, limit))
            .await
    }

    async fn images(&self) -> Result<Vec<ImageInfo>> {
        self.eval_json("images", js::IMAGES.to_string()).await
    }

    async fn document_metrics(&self) -> Result<DocumentMetrics> {
        self.eval_json("document_metrics", js::DOCUMENT_METRICS.to_string())
            .await
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        debug!("Scrolling {} into view", selector);
        let found: bool = self
            .eval_json("scroll_into_view", js::scroll_into_view(selector))
            .await?;
        if found {
            Ok(())
        } else {
            Err(ProbeError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        self.eval_json::<bool>("scroll_to", js::scroll_to(y)).await?;
        Ok(())
    }

    async fn computed_style(&self, selector: &str, property: &str) -> Result<Option<String>> {
        self.eval_json("computed_style", js::computed_style(selector, property))
            .await
    }

    async fn install_observer(&self) -> Result<()> {
        // Registered with the page so every later document runs the shim before
        // its own scripts; load-time errors are the ones that matter most
        self.with_tab("install_observer", |tab| {
            tab.call_method(AddScriptToEvaluateOnNewDocument {
                source: js::INSTALL_CAPTURE.to_string(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            })
            .map_err(|e| ProbeError::Browser(format!("Capture shim not registered: {}", e)))?;
            Ok(())
        })
        .await?;

        // And the document that is already there
        self.eval_json::<bool>("install_observer", js::INSTALL_CAPTURE.to_string())
            .await?;
        debug!("Console capture registered for new documents");
        Ok(())
    }

    async fn take_console(&self) -> Result<Vec<RawConsoleEntry>> {
        self.eval_json("take_console", js::TAKE_CONSOLE.to_string())
            .await
    }

    async fn take_resources(&self) -> Result<Vec<NetworkEvent>> {
        self.eval_json("take_resources", js::TAKE_RESOURCES.to_string())
            .await
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let clip = if full_page {
            let metrics = self.document_metrics().await?;
            Some(Viewport {
                x: 0.0,
                y: 0.0,
                width: metrics.scroll_width,
                height: metrics.scroll_height,
                scale: 1.0,
            })
        } else {
            None
        };

        self.with_tab("screenshot", move |tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
                .map_err(|e| ProbeError::Browser(format!("CDP capture failed: {}", e)))
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        if let Some(browser) = browser {
            info!("Closing browser");
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| ProbeError::Browser(format!("Browser shutdown failed: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.options.headless);
        assert!(config.options.sandbox);
        assert!(config.options.chrome_path.is_none());
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_device_metrics_follow_profile() {
        let mobile = device_metrics(&Profile::mobile());
        assert!(mobile.mobile);
        assert_eq!(mobile.width, Profile::mobile().width);
        assert_eq!(mobile.device_scale_factor, Profile::mobile().device_scale_factor);

        let desktop = device_metrics(&Profile::desktop());
        assert!(!desktop.mobile);
        assert_eq!((desktop.width, desktop.height), (1920, 1080));
    }

    #[test]
    fn test_custom_config() {
        let config = BrowserConfig {
            options: BrowserOptions {
                headless: false,
                sandbox: false,
                chrome_path: Some("/usr/bin/chromium".into()),
            },
            idle_timeout: Duration::from_secs(60),
        };

        assert!(!config.options.headless);
        assert!(config.options.chrome_path.is_some());
    }
}
