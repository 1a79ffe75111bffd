//! Core type definitions for page verification runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Detail recorded for checks that never started because the scenario ran out of time
pub const NOT_RUN_DEADLINE: &str = "not run: deadline exceeded";

/// Detail recorded for a check that was cut off mid-run by the scenario deadline
pub const INTERRUPTED_DEADLINE: &str = "interrupted: deadline exceeded";

const IPHONE_12_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1";

/// Widest viewport still treated as a phone/tablet layout
pub const NARROW_VIEWPORT_MAX: u32 = 768;

/// A named viewport/device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub device_scale_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub mobile: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl Profile {
    /// Desktop browser at 1920x1080
    pub fn desktop() -> Self {
        Self {
            name: "desktop-1920".to_string(),
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            user_agent: None,
            mobile: false,
        }
    }

    /// iPhone 12 Pro viewport with a Mobile Safari user agent
    pub fn mobile() -> Self {
        Self {
            name: "mobile-iphone12".to_string(),
            width: 390,
            height: 844,
            device_scale_factor: 3.0,
            user_agent: Some(IPHONE_12_USER_AGENT.to_string()),
            mobile: true,
        }
    }

    /// All built-in presets
    pub fn presets() -> Vec<Self> {
        vec![Self::desktop(), Self::mobile()]
    }

    /// Resolve a built-in preset by name
    pub fn preset(name: &str) -> Option<Self> {
        Self::presets().into_iter().find(|p| p.name == name)
    }

    /// Whether this viewport gets narrow-screen checks (touch targets etc.)
    pub fn is_narrow(&self) -> bool {
        self.width <= NARROW_VIEWPORT_MAX
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Outcome status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Error,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Immutable record of one executed (or skipped) check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    /// Structured measurements (counts, sizes) backing the detail string
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(
        name: impl Into<String>,
        status: CheckStatus,
        detail: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, detail, None)
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, detail, None)
    }

    pub fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Error, detail, None)
    }

    /// Placeholder for a check the scenario deadline prevented from starting
    pub fn not_run(name: impl Into<String>) -> Self {
        Self::error(name, NOT_RUN_DEADLINE)
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// Issue severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Human-facing record of a non-passing check or a failed profile step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub component: String,
    pub description: String,
    pub screenshot: Option<PathBuf>,
}

impl Issue {
    pub fn new(severity: Severity, component: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            component: component.into(),
            description: description.into(),
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, path: PathBuf) -> Self {
        self.screenshot = Some(path);
        self
    }
}

/// Console message level as seen by the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warning,
    Error,
}

impl ConsoleLevel {
    /// Classify a raw console method / event type name
    pub fn classify(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "error" | "assert" | "exception" | "unhandledrejection" => Self::Error,
            "warn" | "warning" => Self::Warning,
            _ => Self::Log,
        }
    }
}

impl std::fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub level: ConsoleLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A completed network request from resource timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub url: String,
    /// Milliseconds since navigation start
    #[serde(default)]
    pub start_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub transfer_size: u64,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl ReportSummary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            passed: count(CheckStatus::Pass),
            failed: count(CheckStatus::Fail),
            errored: count(CheckStatus::Error),
        }
    }
}

/// Finalized outcome of one profile run.
///
/// Field order is the serialized order; consumers diff these files across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub target_url: String,
    pub profile: String,
    pub summary: ReportSummary,
    pub checks: Vec<CheckResult>,
    pub issues: Vec<Issue>,
    pub console_errors: Vec<String>,
    pub console: Vec<ConsoleEvent>,
    pub network: Vec<NetworkEvent>,
    pub observer_faults: u32,
}

impl Report {
    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_presets() {
        let mobile = Profile::preset("mobile-iphone12").unwrap();
        assert_eq!(mobile.width, 390);
        assert!(mobile.mobile);
        assert!(mobile.is_narrow());
        assert!(mobile.user_agent.as_deref().unwrap().contains("iPhone"));

        let desktop = Profile::preset("desktop-1920").unwrap();
        assert!(!desktop.is_narrow());
        assert!(Profile::preset("tablet").is_none());
    }

    #[test]
    fn test_severity_ordering_and_parsing() {
        assert!(Severity::Critical < Severity::Major);
        assert!(Severity::Major < Severity::Minor);
        assert_eq!("MAJOR".parse::<Severity>().unwrap(), Severity::Major);
        assert!("blocker".parse::<Severity>().is_err());
    }

    #[test]
    fn test_console_level_classification() {
        assert_eq!(ConsoleLevel::classify("error"), ConsoleLevel::Error);
        assert_eq!(ConsoleLevel::classify("assert"), ConsoleLevel::Error);
        assert_eq!(ConsoleLevel::classify("warn"), ConsoleLevel::Warning);
        assert_eq!(ConsoleLevel::classify("info"), ConsoleLevel::Log);
        assert_eq!(ConsoleLevel::classify("debug"), ConsoleLevel::Log);
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::fail("b", "missing"),
            CheckResult::not_run("c"),
            CheckResult::pass("d", "ok"),
        ];
        let summary = ReportSummary::from_results(&results);
        assert_eq!(
            summary,
            ReportSummary {
                total: 4,
                passed: 2,
                failed: 1,
                errored: 1
            }
        );
        assert_eq!(results[2].detail, NOT_RUN_DEADLINE);
    }

    #[test]
    fn test_check_status_serializes_lowercase() {
        let json = serde_json::to_string(&CheckStatus::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }
}
