//! Human-readable run summary

use pageprobe_core::{CheckStatus, Report};
use std::fmt::Write;

const NAME_WIDTH: usize = 28;

/// Summary table, check list and issues for one report
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let s = &report.summary;

    // Writing to a String cannot fail
    let _ = writeln!(out, "Profile: {}", report.profile);
    let _ = writeln!(out, "Target:  {}", report.target_url);
    let _ = writeln!(out);
    let _ = writeln!(out, "  {:>6} {:>6} {:>6} {:>6}", "total", "pass", "fail", "error");
    let _ = writeln!(
        out,
        "  {:>6} {:>6} {:>6} {:>6}",
        s.total, s.passed, s.failed, s.errored
    );

    if !report.checks.is_empty() {
        let _ = writeln!(out);
        for check in &report.checks {
            let _ = writeln!(
                out,
                "  {} {:<width$} {}",
                status_marker(check.status),
                check.name,
                check.detail,
                width = NAME_WIDTH
            );
        }
    }

    if report.issues.is_empty() {
        let _ = writeln!(out, "\nNo issues");
    } else {
        let _ = writeln!(out, "\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                issue.severity, issue.component, issue.description
            );
            if let Some(ref shot) = issue.screenshot {
                let _ = writeln!(out, "      screenshot: {}", shot.display());
            }
        }
    }

    if !report.console_errors.is_empty() {
        let _ = writeln!(out, "\nConsole errors ({}):", report.console_errors.len());
        for text in report.console_errors.iter().take(5) {
            let _ = writeln!(out, "  {}", text);
        }
    }

    if report.observer_faults > 0 {
        let _ = writeln!(out, "\nObserver faults: {}", report.observer_faults);
    }

    out
}

fn status_marker(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS ",
        CheckStatus::Fail => "FAIL ",
        CheckStatus::Error => "ERROR",
    }
}
