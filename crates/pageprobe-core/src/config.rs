//! Configuration management for verification runs
//!
//! A scenario is described by one [`ProbeConfig`], loaded from a TOML file
//! (`pageprobe.toml` by default) and handed to the scenario driver. Nothing here
//! is global: every run gets its own copy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Profile, Severity};
use crate::{ProbeError, Result};

/// Default config file name in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "pageprobe.toml";

/// Scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Page under test
    pub target_url: String,

    /// Viewport profiles to run, in order
    #[serde(default = "Profile::presets")]
    pub profiles: Vec<Profile>,

    /// Where to write reports; one file per profile, suffixed with the profile name
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Directory for screenshot evidence
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Run profiles concurrently, each with its own browser
    #[serde(default)]
    pub parallel: bool,

    /// Capture a screenshot for each non-passing check
    #[serde(default = "default_true")]
    pub capture_on_failure: bool,

    #[serde(default)]
    pub timeouts: TimeoutBudget,

    #[serde(default)]
    pub readiness: Readiness,

    #[serde(default)]
    pub browser: BrowserOptions,

    /// Ordered check list; empty means the built-in product page list
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

/// Wait budgets, all bounded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutBudget {
    /// Total page load including the readiness wait
    #[serde(default = "default_navigation_secs")]
    pub navigation_secs: u64,

    /// Element-wait budget inside a single check
    #[serde(default = "default_check_wait_ms")]
    pub check_wait_ms: u64,

    /// Hard cap on one check's total runtime
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// Fixed delay after navigation and UI interactions
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Wall-clock bound for the whole scenario, all profiles included
    #[serde(default = "default_scenario_secs")]
    pub scenario_secs: u64,

    /// How long a session close may take once the scenario is over
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl TimeoutBudget {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn check_wait(&self) -> Duration {
        Duration::from_millis(self.check_wait_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_secs(self.scenario_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// When a navigated page counts as ready, and how it is prepared for checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readiness {
    /// Selector that must be present before checks start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Scroll this element into view after the page settles, so
    /// intersection-triggered grids and images render
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_to: Option<String>,

    /// Scroll down one viewport height this many times, then back to the top
    #[serde(default, skip_serializing_if = "is_zero")]
    pub scroll_steps: u32,
}

impl Readiness {
    /// Whether any scrolling happens before checks
    pub fn scrolls(&self) -> bool {
        self.scroll_to.is_some() || self.scroll_steps > 0
    }
}

/// Expected rendering of an element on a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Chrome's sandbox; containers usually need this off
    #[serde(default = "default_true")]
    pub sandbox: bool,

    /// Explicit Chrome/Chromium binary (auto-detected when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<PathBuf>,
}

/// Expected polarity of an element check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// One configured check: shared options plus the kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Overrides the kind's default name (also the issue component)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Overrides the kind's default severity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Restrict to these profile names; empty runs everywhere
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,

    #[serde(flatten)]
    pub kind: CheckKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// Element must be present (bounded wait) or absent (immediate query)
    Element {
        selector: String,
        #[serde(default)]
        expect: Presence,
    },

    /// Container exists and holds at least `min` matching children
    ChildCount {
        container: String,
        child: String,
        #[serde(default = "default_min_children")]
        min: usize,
    },

    /// Below-fold images use `loading="lazy"`
    LazyImages {
        #[serde(default)]
        require_all: bool,
    },

    /// `scrollWidth <= clientWidth + tolerance_px`
    NoHorizontalOverflow {
        #[serde(default = "default_overflow_tolerance")]
        tolerance_px: u32,
    },

    /// Activating `trigger` shows `overlay`, and `dismiss_key` hides it again
    Overlay {
        trigger: String,
        overlay: String,
        #[serde(default = "default_dismiss_key")]
        dismiss_key: String,
    },

    /// Interactive elements meet a minimum size on narrow viewports
    TouchTargets {
        #[serde(default = "default_touch_selector")]
        selector: String,
        #[serde(default = "default_touch_size")]
        min_width: f64,
        #[serde(default = "default_touch_size")]
        min_height: f64,
        #[serde(default = "default_touch_limit")]
        limit: usize,
        #[serde(default = "default_narrow_width")]
        max_viewport_width: u32,
    },

    /// At most `max` console errors (optionally only those matching `pattern`)
    ConsoleErrors {
        #[serde(default)]
        max: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },

    /// Some completed request URL contains `url_contains`
    ResourceRequested { url_contains: String },

    /// The first two matches are stacked vertically (single-column layout)
    StackedLayout {
        selector: String,
        #[serde(default = "default_min_dy")]
        min_dy: f64,
    },

    /// First match is rendered (`visible`) or not (`hidden`: `display: none`,
    /// `visibility: hidden`, zero opacity or no boxes). A missing element fails
    /// either way
    Visibility { selector: String, expect: Visibility },

    /// Computed `font-size` of the first match is at least `min_px`
    MinFontSize {
        selector: String,
        #[serde(default = "default_min_font_px")]
        min_px: f64,
    },
}

impl CheckKind {
    /// Short kind tag, as written in config files
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Element { .. } => "element",
            Self::ChildCount { .. } => "child_count",
            Self::LazyImages { .. } => "lazy_images",
            Self::NoHorizontalOverflow { .. } => "no_horizontal_overflow",
            Self::Overlay { .. } => "overlay",
            Self::TouchTargets { .. } => "touch_targets",
            Self::ConsoleErrors { .. } => "console_errors",
            Self::ResourceRequested { .. } => "resource_requested",
            Self::StackedLayout { .. } => "stacked_layout",
            Self::Visibility { .. } => "visibility",
            Self::MinFontSize { .. } => "min_font_size",
        }
    }

    pub fn default_name(&self) -> String {
        match self {
            Self::Element {
                expect: Presence::Present,
                ..
            } => "container_exists".to_string(),
            Self::Element {
                expect: Presence::Absent,
                ..
            } => "no_error_marker".to_string(),
            Self::ChildCount { min, .. } => format!("child_count>={}", min),
            Self::LazyImages { .. } => "lazy_loading".to_string(),
            Self::NoHorizontalOverflow { .. } => "no_horizontal_overflow".to_string(),
            Self::Overlay { .. } => "overlay_dismiss".to_string(),
            Self::TouchTargets { .. } => "touch_targets".to_string(),
            Self::ConsoleErrors { .. } => "no_console_errors".to_string(),
            Self::ResourceRequested { .. } => "resource_requested".to_string(),
            Self::StackedLayout { .. } => "single_column".to_string(),
            Self::Visibility {
                expect: Visibility::Visible,
                ..
            } => "element_visible".to_string(),
            Self::Visibility {
                expect: Visibility::Hidden,
                ..
            } => "element_hidden".to_string(),
            Self::MinFontSize { .. } => "min_font_size".to_string(),
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Element {
                expect: Presence::Present,
                ..
            }
            | Self::ChildCount { .. } => Severity::Critical,
            Self::Element {
                expect: Presence::Absent,
                ..
            }
            | Self::NoHorizontalOverflow { .. }
            | Self::Overlay { .. }
            | Self::ResourceRequested { .. } => Severity::Major,
            Self::LazyImages { .. }
            | Self::TouchTargets { .. }
            | Self::ConsoleErrors { .. }
            | Self::StackedLayout { .. }
            | Self::Visibility { .. }
            | Self::MinFontSize { .. } => Severity::Minor,
        }
    }
}

impl CheckSpec {
    pub fn new(kind: CheckKind) -> Self {
        Self {
            name: None,
            severity: None,
            profiles: Vec::new(),
            kind,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn only_on(mut self, profiles: &[&str]) -> Self {
        self.profiles = profiles.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Name used in results, issues and the severity policy
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.default_name())
    }

    pub fn resolved_severity(&self) -> Severity {
        self.severity.unwrap_or_else(|| self.kind.default_severity())
    }

    pub fn applies_to(&self, profile: &str) -> bool {
        self.profiles.is_empty() || self.profiles.iter().any(|p| p == profile)
    }
}

/// Product listing checks used when a config names none
pub fn default_checks() -> Vec<CheckSpec> {
    vec![
        CheckSpec::new(CheckKind::Element {
            selector: "#products".to_string(),
            expect: Presence::Present,
        }),
        CheckSpec::new(CheckKind::ChildCount {
            container: "#products".to_string(),
            child: "#products .grid > *".to_string(),
            min: 1,
        }),
        CheckSpec::new(CheckKind::Element {
            selector: "#products .animate-pulse".to_string(),
            expect: Presence::Absent,
        })
        .named("no_loading_marker"),
        CheckSpec::new(CheckKind::Element {
            selector: "#products .text-red-600".to_string(),
            expect: Presence::Absent,
        })
        .named("no_error_marker"),
        CheckSpec::new(CheckKind::LazyImages { require_all: false }),
        CheckSpec::new(CheckKind::NoHorizontalOverflow {
            tolerance_px: default_overflow_tolerance(),
        }),
        CheckSpec::new(CheckKind::ConsoleErrors {
            max: 0,
            pattern: None,
        }),
    ]
}

// Default value providers
fn default_true() -> bool {
    true
}

fn default_report_path() -> PathBuf {
    PathBuf::from("pageprobe-report.json")
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_navigation_secs() -> u64 {
    30
}

fn default_check_wait_ms() -> u64 {
    10_000
}

fn default_check_timeout_secs() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    1_000
}

fn default_scenario_secs() -> u64 {
    300
}

fn default_close_grace_ms() -> u64 {
    5_000
}

fn default_min_children() -> usize {
    1
}

fn default_overflow_tolerance() -> u32 {
    10
}

fn default_dismiss_key() -> String {
    "Escape".to_string()
}

fn default_touch_selector() -> String {
    r#"button, a[role="button"]"#.to_string()
}

fn default_touch_size() -> f64 {
    44.0
}

fn default_touch_limit() -> usize {
    10
}

fn default_narrow_width() -> u32 {
    crate::types::NARROW_VIEWPORT_MAX
}

fn default_min_dy() -> f64 {
    50.0
}

fn default_min_font_px() -> f64 {
    16.0
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ProbeConfig {
    /// Config for `target_url` with every other field defaulted
    pub fn for_url(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            ..Self::default()
        }
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ProbeError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut config = Self::default();
        config.checks = default_checks();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| ProbeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured checks, or the built-in list when none are configured
    pub fn effective_checks(&self) -> Vec<CheckSpec> {
        if self.checks.is_empty() {
            default_checks()
        } else {
            self.checks.clone()
        }
    }

    /// Report file for one profile: `<stem>_<profile>.<ext>`
    pub fn report_path_for(&self, profile: &str) -> PathBuf {
        let stem = self
            .report_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("pageprobe-report");
        let ext = self
            .report_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("json");
        self.report_path
            .with_file_name(format!("{}_{}.{}", stem, profile, ext))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_url.trim().is_empty() {
            return Err(ProbeError::Config("target_url must not be empty".to_string()));
        }
        if self.profiles.is_empty() {
            return Err(ProbeError::Config("at least one profile is required".to_string()));
        }

        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if profile.width == 0 || profile.height == 0 {
                return Err(ProbeError::Config(format!(
                    "profile '{}' has an empty viewport",
                    profile.name
                )));
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(ProbeError::Config(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }

        let mut names = HashSet::new();
        for spec in self.effective_checks() {
            let name = spec.resolved_name();
            if !names.insert(name.clone()) {
                return Err(ProbeError::Config(format!("duplicate check name '{}'", name)));
            }
        }

        let t = &self.timeouts;
        if t.navigation_secs == 0 || t.check_wait_ms == 0 || t.check_timeout_secs == 0 || t.scenario_secs == 0
        {
            return Err(ProbeError::Config("timeouts must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:3000".to_string(),
            profiles: Profile::presets(),
            report_path: default_report_path(),
            screenshot_dir: default_screenshot_dir(),
            parallel: false,
            capture_on_failure: true,
            timeouts: TimeoutBudget::default(),
            readiness: Readiness::default(),
            browser: BrowserOptions::default(),
            checks: Vec::new(),
        }
    }
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        Self {
            navigation_secs: default_navigation_secs(),
            check_wait_ms: default_check_wait_ms(),
            check_timeout_secs: default_check_timeout_secs(),
            settle_ms: default_settle_ms(),
            scenario_secs: default_scenario_secs(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chrome_path: None,
        }
    }
}
