//! Ordered, non-short-circuiting check execution
//!
//! Every check yields exactly one [`CheckResult`], whatever it does: returns,
//! errors, panics, hangs past its cap, or is cut off by the scenario deadline.

use crate::checks::{Check, CheckContext, CheckOutcome};
use crate::report::ReportAggregator;
use futures::FutureExt;
use pageprobe_browser::{EvidenceCapturer, Observer, ScreenshotOptions, Session};
use pageprobe_core::{CheckResult, CheckStatus, TimeoutBudget, INTERRUPTED_DEADLINE};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where results go as they are produced
pub trait ResultSink {
    /// Called as `name` starts running
    fn starting(&mut self, _name: &str) {}

    fn accept(&mut self, result: CheckResult, screenshot: Option<PathBuf>);
}

impl ResultSink for Vec<CheckResult> {
    fn accept(&mut self, result: CheckResult, _screenshot: Option<PathBuf>) {
        self.push(result);
    }
}

impl ResultSink for ReportAggregator {
    fn starting(&mut self, name: &str) {
        self.begin(name);
    }

    fn accept(&mut self, result: CheckResult, screenshot: Option<PathBuf>) {
        self.record_with_evidence(result, screenshot);
    }
}

/// Time limits applied to each check
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub wait_budget: Duration,
    pub settle: Duration,
    /// Hard cap on one check; exceeding it is a `fail`
    pub check_timeout: Duration,
}

impl From<&TimeoutBudget> for RunnerOptions {
    fn from(budget: &TimeoutBudget) -> Self {
        Self {
            wait_budget: budget.check_wait(),
            settle: budget.settle(),
            check_timeout: budget.check_timeout(),
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&TimeoutBudget::default())
    }
}

pub struct CheckRunner<'a> {
    observer: &'a Observer,
    options: RunnerOptions,
    evidence: Option<&'a EvidenceCapturer>,
    deadline: Option<Instant>,
}

impl<'a> CheckRunner<'a> {
    pub fn new(observer: &'a Observer, options: RunnerOptions) -> Self {
        Self {
            observer,
            options,
            evidence: None,
            deadline: None,
        }
    }

    /// Screenshot the page after each non-passing check
    pub fn with_evidence(mut self, capturer: &'a EvidenceCapturer) -> Self {
        self.evidence = Some(capturer);
        self
    }

    /// Stop starting checks at `deadline` and cut off the one in flight
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run `checks` in order; one result per check
    pub async fn run(&self, session: &Session, checks: &[Box<dyn Check>]) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(checks.len());
        self.execute(session, checks, &mut results).await;
        results
    }

    /// Run `checks` in order, feeding each result to `sink` as soon as it exists
    pub async fn execute<S>(&self, session: &Session, checks: &[Box<dyn Check>], sink: &mut S)
    where
        S: ResultSink + Send,
    {
        let ctx = CheckContext {
            session,
            observer: self.observer,
            wait_budget: self.options.wait_budget,
            settle: self.options.settle,
        };

        let mut cut_off = false;
        for check in checks {
            let name = check.name();

            if cut_off || self.deadline_passed() {
                cut_off = true;
                sink.accept(CheckResult::not_run(name), None);
                continue;
            }

            debug!(profile = %session.profile().name, "Running check {}", name);
            sink.starting(name);
            let (result, interrupted) = self.run_one(check.as_ref(), &ctx).await;
            cut_off = interrupted;

            info!(
                profile = %session.profile().name,
                "{} {}: {}", name, result.status, result.detail
            );

            let screenshot = if result.passed() || interrupted {
                None
            } else {
                self.capture(session, name).await
            };
            sink.accept(result, screenshot);
        }
    }

    /// Returns the result and whether the scenario deadline interrupted it
    async fn run_one(&self, check: &dyn Check, ctx: &CheckContext<'_>) -> (CheckResult, bool) {
        let name = check.name();

        let (limit, limited_by_deadline) = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining < self.options.check_timeout {
                    (remaining, true)
                } else {
                    (self.options.check_timeout, false)
                }
            }
            None => (self.options.check_timeout, false),
        };

        let guarded = AssertUnwindSafe(check.run(ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(limit, guarded).await {
            Err(_) if limited_by_deadline => {
                warn!("Check {} interrupted by the scenario deadline", name);
                return (CheckResult::error(name, INTERRUPTED_DEADLINE), true);
            }
            Err(_) => {
                return (
                    CheckResult::fail(name, format!("timed out after {:?}", limit)),
                    false,
                )
            }
            Ok(Err(panic)) => {
                return (
                    CheckResult::error(name, format!("check panicked: {}", panic_message(panic.as_ref()))),
                    false,
                )
            }
            Ok(Ok(outcome)) => outcome,
        };

        let result = match outcome {
            Ok(CheckOutcome::Pass { detail, data }) => {
                CheckResult::new(name, CheckStatus::Pass, detail, data)
            }
            Ok(CheckOutcome::Fail { detail, data }) => {
                CheckResult::new(name, CheckStatus::Fail, detail, data)
            }
            Err(e) if e.is_timeout() => CheckResult::fail(name, e.to_string()),
            Err(e) => CheckResult::error(name, e.to_string()),
        };
        (result, false)
    }

    async fn capture(&self, session: &Session, label: &str) -> Option<PathBuf> {
        let capturer = self.evidence?;
        let shot = capturer.capture(session, label, ScreenshotOptions::viewport());
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, shot).await.ok().flatten(),
            None => shot.await,
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
