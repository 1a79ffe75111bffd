//! Report aggregation and serialization

use chrono::{DateTime, Utc};
use pageprobe_browser::ObservedEvents;
use pageprobe_core::{
    CheckResult, CheckSpec, CheckStatus, Issue, ProbeError, Report, ReportSummary, Result,
    Severity,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Issue component for page loads that never became ready
pub const NAVIGATION_COMPONENT: &str = "navigation";

/// Issue component for profiles whose browser never opened
pub const SESSION_COMPONENT: &str = "session";

/// Static check-name -> severity table
#[derive(Debug, Clone)]
pub struct SeverityPolicy {
    table: HashMap<String, Severity>,
    fallback: Severity,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        let mut table = HashMap::new();
        table.insert(NAVIGATION_COMPONENT.to_string(), Severity::Critical);
        table.insert(SESSION_COMPONENT.to_string(), Severity::Critical);
        Self {
            table,
            fallback: Severity::Major,
        }
    }
}

impl SeverityPolicy {
    /// Policy covering each configured check under its resolved name
    pub fn from_specs(specs: &[CheckSpec]) -> Self {
        specs.iter().fold(Self::default(), |policy, spec| {
            policy.with(spec.resolved_name(), spec.resolved_severity())
        })
    }

    pub fn with(mut self, name: impl Into<String>, severity: Severity) -> Self {
        self.table.insert(name.into(), severity);
        self
    }

    /// Severity for a check name. Unknown names get the fallback
    pub fn severity_for(&self, name: &str) -> Severity {
        self.table.get(name).copied().unwrap_or(self.fallback)
    }
}

/// Collects results for one profile run and freezes them into a [`Report`]
#[derive(Debug)]
pub struct ReportAggregator {
    timestamp: DateTime<Utc>,
    target_url: String,
    profile: String,
    policy: SeverityPolicy,
    checks: Vec<CheckResult>,
    issues: Vec<Issue>,
    events: ObservedEvents,
    in_flight: Option<String>,
    frozen: Option<Report>,
}

impl ReportAggregator {
    pub fn new(target_url: impl Into<String>, profile: impl Into<String>, policy: SeverityPolicy) -> Self {
        Self {
            timestamp: Utc::now(),
            target_url: target_url.into(),
            profile: profile.into(),
            policy,
            checks: Vec::new(),
            issues: Vec::new(),
            events: ObservedEvents::default(),
            in_flight: None,
            frozen: None,
        }
    }

    pub fn policy(&self) -> &SeverityPolicy {
        &self.policy
    }

    /// Number of check results recorded so far
    pub fn recorded(&self) -> usize {
        self.checks.len()
    }

    /// Note that `name` has started; cleared by the next recorded result
    pub fn begin(&mut self, name: &str) {
        self.in_flight = Some(name.to_string());
    }

    /// Check that started but has no result yet
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.frozen.is_some()
    }

    /// Issue a non-passing result would raise, per the severity policy
    pub fn issue_for(&self, result: &CheckResult) -> Option<Issue> {
        let description = match result.status {
            CheckStatus::Pass => return None,
            CheckStatus::Fail => result.detail.clone(),
            CheckStatus::Error => format!("check error: {}", result.detail),
        };
        Some(Issue::new(
            self.policy.severity_for(&result.name),
            &result.name,
            description,
        ))
    }

    /// Append a result, and its issue if it did not pass
    pub fn record(&mut self, result: CheckResult) {
        self.record_with_evidence(result, None);
    }

    /// Like [`record`](Self::record), referencing a screenshot from the issue
    pub fn record_with_evidence(&mut self, result: CheckResult, screenshot: Option<PathBuf>) {
        if self.ensure_open("record") {
            self.in_flight = None;
            if let Some(mut issue) = self.issue_for(&result) {
                issue.screenshot = screenshot;
                self.issues.push(issue);
            }
            self.checks.push(result);
        }
    }

    /// Append an issue that has no check result behind it
    pub fn record_issue(&mut self, issue: Issue) {
        if self.ensure_open("record_issue") {
            self.issues.push(issue);
        }
    }

    /// Take over the observer events drained at the end of the run
    pub fn absorb(&mut self, events: ObservedEvents) {
        if self.ensure_open("absorb") {
            self.events.console.extend(events.console);
            self.events.network.extend(events.network);
            self.events.faults += events.faults;
        }
    }

    /// Freeze the report. Later calls return the same frozen value
    pub fn finalize(&mut self) -> Report {
        if let Some(ref report) = self.frozen {
            return report.clone();
        }

        let report = Report {
            timestamp: self.timestamp,
            target_url: self.target_url.clone(),
            profile: self.profile.clone(),
            summary: ReportSummary::from_results(&self.checks),
            checks: std::mem::take(&mut self.checks),
            issues: std::mem::take(&mut self.issues),
            console_errors: self.events.console_errors(),
            console: std::mem::take(&mut self.events.console),
            network: std::mem::take(&mut self.events.network),
            observer_faults: self.events.faults,
        };
        self.frozen = Some(report.clone());
        report
    }

    fn ensure_open(&self, operation: &str) -> bool {
        if self.frozen.is_some() {
            warn!(
                "{} on finalized report for {} ignored",
                operation, self.profile
            );
            false
        } else {
            true
        }
    }
}

/// Pretty-printed JSON with a trailing newline
pub fn to_json(report: &Report) -> Result<String> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    Ok(json)
}

/// Write `report` to `path`, creating parent directories as needed
pub async fn serialize(report: &Report, path: &Path) -> Result<()> {
    let write_error = |reason: String| ProbeError::ReportWrite {
        path: path.to_path_buf(),
        reason,
    };

    let json = to_json(report).map_err(|e| write_error(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(e.to_string()))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| write_error(e.to_string()))?;

    info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageprobe_core::config::default_checks;
    use pageprobe_core::{CheckKind, ConsoleEvent, ConsoleLevel};

    fn aggregator() -> ReportAggregator {
        ReportAggregator::new(
            "https://shop.example",
            "desktop-1920",
            SeverityPolicy::from_specs(&default_checks()),
        )
    }

    #[test]
    fn test_policy_from_specs() {
        let policy = SeverityPolicy::from_specs(&default_checks());
        assert_eq!(policy.severity_for("container_exists"), Severity::Critical);
        assert_eq!(policy.severity_for("child_count>=1"), Severity::Critical);
        assert_eq!(policy.severity_for("no_error_marker"), Severity::Major);
        assert_eq!(policy.severity_for("no_horizontal_overflow"), Severity::Major);
        assert_eq!(policy.severity_for("lazy_loading"), Severity::Minor);
        assert_eq!(policy.severity_for(NAVIGATION_COMPONENT), Severity::Critical);
        assert_eq!(policy.severity_for("something_else"), Severity::Major);
    }

    #[test]
    fn test_override_severity() {
        let spec = CheckSpec::new(CheckKind::LazyImages { require_all: true })
            .with_severity(Severity::Critical);
        let policy = SeverityPolicy::from_specs(&[spec]);
        assert_eq!(policy.severity_for("lazy_loading"), Severity::Critical);
    }

    #[test]
    fn test_severity_ignores_status_and_detail() {
        let agg = aggregator();
        let fail = agg
            .issue_for(&CheckResult::fail("no_horizontal_overflow", "scrollWidth 440"))
            .unwrap();
        let error = agg
            .issue_for(&CheckResult::error("no_horizontal_overflow", "CDP gone"))
            .unwrap();
        let again = agg
            .issue_for(&CheckResult::fail("no_horizontal_overflow", "scrollWidth 900"))
            .unwrap();

        assert_eq!(fail.severity, Severity::Major);
        assert_eq!(error.severity, fail.severity);
        assert_eq!(again.severity, fail.severity);
        assert_eq!(fail.component, "no_horizontal_overflow");
    }

    #[test]
    fn test_record_keeps_order_and_raises_issues() {
        let mut agg = aggregator();
        agg.record(CheckResult::pass("container_exists", "#products found"));
        agg.record_with_evidence(
            CheckResult::fail("child_count>=1", "0"),
            Some(PathBuf::from("screenshots/desktop-1920_child_count__1.png")),
        );
        agg.record(CheckResult::error("lazy_loading", "Target closed"));

        let report = agg.finalize();
        let names: Vec<_> = report.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["container_exists", "child_count>=1", "lazy_loading"]);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0].screenshot.is_some());
        assert_eq!(report.issues[1].description, "check error: Target closed");
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.errored, 1);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut agg = aggregator();
        agg.record(CheckResult::fail("no_horizontal_overflow", "scrollWidth 440 vs clientWidth 390"));
        agg.absorb(ObservedEvents {
            console: vec![ConsoleEvent {
                level: ConsoleLevel::Error,
                text: "No QueryClient set".to_string(),
                timestamp: Utc::now(),
            }],
            network: Vec::new(),
            faults: 1,
        });

        let first = to_json(&agg.finalize()).unwrap();
        agg.record(CheckResult::pass("late", "ignored"));
        let second = to_json(&agg.finalize()).unwrap();

        assert_eq!(first, second);
        assert!(agg.is_finalized());
        assert!(first.ends_with("}\n"));
    }

    #[test]
    fn test_report_field_order() {
        let mut agg = aggregator();
        let json = to_json(&agg.finalize()).unwrap();

        let keys = [
            "\"timestamp\"",
            "\"target_url\"",
            "\"profile\"",
            "\"summary\"",
            "\"checks\"",
            "\"issues\"",
            "\"console_errors\"",
            "\"console\"",
            "\"network\"",
            "\"observer_faults\"",
        ];
        let positions: Vec<_> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_serialize_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/pageprobe-report_desktop-1920.json");
        let report = aggregator().finalize();

        serialize(&report, &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: Report = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, report);
    }

    #[tokio::test]
    async fn test_serialize_failure_is_report_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = serialize(&aggregator().finalize(), &blocker.join("report.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::ReportWrite { .. }));
    }
}
