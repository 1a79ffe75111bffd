//! Scenario orchestration
//!
//! Per profile: open session, attach observer, navigate, wait for readiness,
//! settle, scroll, capture `loaded`, run checks, capture `final`, poll, close,
//! drain, finalize, write. The session is closed on every path out of a profile run,
//! including a scenario deadline that interrupts it.

use crate::checks::{build_checks, Check};
use crate::report::{serialize, ReportAggregator, SeverityPolicy, NAVIGATION_COMPONENT, SESSION_COMPONENT};
use crate::runner::{CheckRunner, RunnerOptions};
use futures::future::join_all;
use pageprobe_browser::{EvidenceCapturer, Observer, ScreenshotOptions, Session, SessionManager};
use pageprobe_core::fail_open::fail_open;
use pageprobe_core::{
    CheckResult, CheckSpec, Issue, ProbeConfig, ProbeError, Profile, Report, Result,
    INTERRUPTED_DEADLINE,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

/// Outcome of one profile run
#[derive(Debug, Clone)]
pub struct ProfileRun {
    pub report: Report,
    /// Where the report landed; `None` if writing it failed
    pub report_path: Option<PathBuf>,
    /// Whether a browser session was ever opened for this profile
    pub session_opened: bool,
}

/// Every profile's run, in profile order. Always complete: a profile that
/// could not open a browser still has its report
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub runs: Vec<ProfileRun>,
}

impl ScenarioOutcome {
    pub fn any_session_opened(&self) -> bool {
        self.runs.iter().any(|run| run.session_opened)
    }

    /// Session error when not a single profile managed to open a browser
    pub fn ensure_session_opened(&self) -> Result<()> {
        if self.runs.is_empty() || self.any_session_opened() {
            Ok(())
        } else {
            Err(ProbeError::Session(
                "no profile could open a browser session".to_string(),
            ))
        }
    }
}

pub struct ScenarioDriver {
    config: ProbeConfig,
    sessions: Arc<dyn SessionManager>,
    observer: Observer,
    capturer: EvidenceCapturer,
}

impl ScenarioDriver {
    pub fn new(config: ProbeConfig, sessions: Arc<dyn SessionManager>) -> Self {
        let capturer = EvidenceCapturer::new(config.screenshot_dir.clone());
        Self {
            config,
            sessions,
            observer: Observer::new(),
            capturer,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run the configured scenario: every profile, each with the checks that apply to it
    pub async fn run(&self) -> ScenarioOutcome {
        let checks = self.config.effective_checks();
        let checks_by_profile: HashMap<String, Vec<CheckSpec>> = self
            .config
            .profiles
            .iter()
            .map(|profile| {
                let applicable = checks
                    .iter()
                    .filter(|spec| spec.applies_to(&profile.name))
                    .cloned()
                    .collect();
                (profile.name.clone(), applicable)
            })
            .collect();

        self.run_scenario(&self.config.target_url, &self.config.profiles, &checks_by_profile)
            .await
    }

    /// Check `url` under each profile.
    ///
    /// Reports for every profile are written before returning, including
    /// profiles whose browser never opened. See
    /// [`ScenarioOutcome::ensure_session_opened`] for the all-failed case.
    pub async fn run_scenario(
        &self,
        url: &str,
        profiles: &[Profile],
        checks_by_profile: &HashMap<String, Vec<CheckSpec>>,
    ) -> ScenarioOutcome {
        let deadline = Instant::now() + self.config.timeouts.scenario();

        info!(
            "Probing {} with {} profile(s){}",
            url,
            profiles.len(),
            if self.config.parallel { " in parallel" } else { "" }
        );

        let runs = if self.config.parallel {
            join_all(
                profiles
                    .iter()
                    .map(|profile| self.run_profile(url, profile, checks_for(checks_by_profile, profile), deadline)),
            )
            .await
        } else {
            let mut runs = Vec::with_capacity(profiles.len());
            for profile in profiles {
                runs.push(self.run_profile(url, profile, checks_for(checks_by_profile, profile), deadline).await);
            }
            runs
        };

        let outcome = ScenarioOutcome { runs };
        if let Err(e) = outcome.ensure_session_opened() {
            error!("Scenario for {} failed: {}", url, e);
        }
        outcome
    }

    async fn run_profile(
        &self,
        url: &str,
        profile: &Profile,
        specs: &[CheckSpec],
        deadline: Instant,
    ) -> ProfileRun {
        let checks = build_checks(specs);
        let mut aggregator =
            ReportAggregator::new(url, &profile.name, SeverityPolicy::from_specs(specs));

        info!("Starting profile {}", profile);

        let opened = if Instant::now() >= deadline {
            None
        } else {
            timeout_at(deadline, self.sessions.open(profile)).await.ok()
        };

        let session_opened = match opened {
            None => {
                warn!("Scenario deadline passed before {} started", profile.name);
                mark_unrun(&mut aggregator, &checks);
                false
            }
            Some(Err(e)) => {
                warn!("Could not open a session for {}: {}", profile.name, e);
                let severity = aggregator.policy().severity_for(SESSION_COMPONENT);
                aggregator.record_issue(Issue::new(severity, SESSION_COMPONENT, e.to_string()));
                false
            }
            Some(Ok(session)) => {
                let finished =
                    timeout_at(deadline, self.visit(url, &session, &checks, deadline, &mut aggregator))
                        .await;
                if finished.is_err() {
                    warn!("Scenario deadline interrupted {}", profile.name);
                    mark_unrun(&mut aggregator, &checks);
                }
                self.release(session, &mut aggregator).await;
                true
            }
        };

        let report = aggregator.finalize();
        let path = self.config.report_path_for(&profile.name);
        let report_path = fail_open("report::write", serialize(&report, &path))
            .await
            .map(|_| path);

        info!(
            "Finished profile {}: {} passed, {} failed, {} errored",
            profile.name, report.summary.passed, report.summary.failed, report.summary.errored
        );

        ProfileRun {
            report,
            report_path,
            session_opened,
        }
    }

    /// Everything between open and close. Results land in `aggregator` as they
    /// are produced, so an interrupted visit keeps what it finished.
    async fn visit(
        &self,
        url: &str,
        session: &Session,
        checks: &[Box<dyn Check>],
        deadline: Instant,
        aggregator: &mut ReportAggregator,
    ) {
        let timeouts = &self.config.timeouts;
        self.observer.attach(session).await;

        let load_budget = timeouts
            .navigation()
            .min(deadline.saturating_duration_since(Instant::now()));
        let load_started = Instant::now();

        let loaded = match session.page().navigate(url, load_budget).await {
            Ok(()) => self.wait_ready(url, session, load_budget.saturating_sub(load_started.elapsed())).await,
            Err(e) => Err(e),
        };
        if let Err(e) = loaded {
            warn!("{} did not load for {}: {}", url, session.profile().name, e);
            let mut issue = Issue::new(
                aggregator.policy().severity_for(NAVIGATION_COMPONENT),
                NAVIGATION_COMPONENT,
                e.to_string(),
            );
            if self.config.capture_on_failure {
                issue.screenshot = self
                    .capturer
                    .capture(session, NAVIGATION_COMPONENT, ScreenshotOptions::viewport())
                    .await;
            }
            aggregator.record_issue(issue);
            return;
        }

        tokio::time::sleep(timeouts.settle()).await;
        self.prepare(session).await;
        self.capturer
            .capture(session, "loaded", ScreenshotOptions::full_page())
            .await;

        let mut runner = CheckRunner::new(&self.observer, RunnerOptions::from(timeouts))
            .with_deadline(deadline);
        if self.config.capture_on_failure {
            runner = runner.with_evidence(&self.capturer);
        }
        runner.execute(session, checks, aggregator).await;

        self.capturer
            .capture(session, "final", ScreenshotOptions::viewport())
            .await;
    }

    async fn wait_ready(&self, url: &str, session: &Session, remaining: Duration) -> Result<()> {
        let Some(ref selector) = self.config.readiness.selector else {
            return Ok(());
        };

        session
            .page()
            .wait_for_selector(selector, remaining)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::navigation(
                        url,
                        format!("readiness selector {} not present within {:?}", selector, remaining),
                    )
                } else {
                    e
                }
            })
    }

    /// Scroll so content rendered on intersection (product grids, lazy images)
    /// exists before checks look at it. Best effort: a page that will not
    /// scroll is still checked as it stands.
    async fn prepare(&self, session: &Session) {
        let readiness = &self.config.readiness;
        if !readiness.scrolls() {
            return;
        }

        let page = session.page();
        let settle = self.config.timeouts.settle();

        if let Some(ref selector) = readiness.scroll_to {
            if fail_open("scroll::into_view", page.scroll_into_view(selector))
                .await
                .is_some()
            {
                tokio::time::sleep(settle).await;
            }
        }

        if readiness.scroll_steps > 0 {
            let step = fail_open("scroll::metrics", page.document_metrics())
                .await
                .map(|m| m.viewport_height)
                .unwrap_or_else(|| f64::from(session.profile().height));

            for i in 1..=readiness.scroll_steps {
                fail_open("scroll::step", page.scroll_to(step * f64::from(i))).await;
                tokio::time::sleep(settle).await;
            }
            fail_open("scroll::top", page.scroll_to(0.0)).await;
            tokio::time::sleep(settle).await;
        }
    }

    /// Final poll, close and drain. Poll and close share one close grace
    /// period, so a wedged browser holds the scenario at most that long. The
    /// poll gets half of it at most; close gets whatever is left.
    async fn release(&self, session: Session, aggregator: &mut ReportAggregator) {
        let grace = self.config.timeouts.close_grace();
        let started = Instant::now();
        let release_by = started + grace;
        let id = session.id();
        let profile = session.profile().name.clone();

        if timeout_at(started + grace / 2, self.observer.poll(&session)).await.is_err() {
            warn!("Final observer poll for {} timed out", profile);
        }

        match timeout_at(release_by, self.sessions.close(session)).await {
            Ok(Ok(())) => info!("Session for {} closed", profile),
            Ok(Err(e)) => warn!("Closing session for {} failed: {}", profile, e),
            Err(_) => warn!("Closing session for {} timed out after {:?}", profile, grace),
        }

        aggregator.absorb(self.observer.drain(id).await);
    }
}

fn checks_for<'m>(checks_by_profile: &'m HashMap<String, Vec<CheckSpec>>, profile: &Profile) -> &'m [CheckSpec] {
    checks_by_profile
        .get(&profile.name)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Fill in results for checks a deadline kept from finishing. The check that
/// was running when it hit is marked interrupted, the rest not run.
fn mark_unrun(aggregator: &mut ReportAggregator, checks: &[Box<dyn Check>]) {
    let in_flight = aggregator.in_flight().map(str::to_string);
    for check in checks.iter().skip(aggregator.recorded()) {
        let result = if in_flight.as_deref() == Some(check.name()) {
            CheckResult::error(check.name(), INTERRUPTED_DEADLINE)
        } else {
            CheckResult::not_run(check.name())
        };
        aggregator.record(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageprobe_browser::fake::{FakePage, FakeSessionManager};
    use pageprobe_core::{CheckKind, CheckStatus, Presence, NOT_RUN_DEADLINE};

    fn config(dir: &std::path::Path) -> ProbeConfig {
        let mut config = ProbeConfig::for_url("https://shop.example");
        config.report_path = dir.join("report.json");
        config.screenshot_dir = dir.join("shots");
        config.timeouts.settle_ms = 1;
        config.timeouts.check_wait_ms = 50;
        config
    }

    #[tokio::test]
    async fn test_checks_are_filtered_per_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.checks = vec![
            CheckSpec::new(CheckKind::Element {
                selector: "body".to_string(),
                expect: Presence::Present,
            }),
            CheckSpec::new(CheckKind::StackedLayout {
                selector: ".grid > *".to_string(),
                min_dy: 50.0,
            })
            .only_on(&["mobile-iphone12"]),
        ];

        let manager = Arc::new(FakeSessionManager::new(|_| FakePage::new().with_elements("body", 1)));
        let driver = ScenarioDriver::new(config, manager.clone());
        let runs = driver.run().await.runs;

        assert_eq!(runs[0].report.checks.len(), 1);
        assert_eq!(runs[1].report.checks.len(), 2);
        assert_eq!(manager.opened(), manager.closed());
    }

    #[tokio::test]
    async fn test_refused_profile_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(
            FakeSessionManager::new(|_| FakePage::new().with_elements("#products", 1))
                .refusing("desktop-1920"),
        );
        let driver = ScenarioDriver::new(config(dir.path()), manager.clone());

        let runs = driver.run().await.runs;

        assert!(!runs[0].session_opened);
        assert_eq!(runs[0].report.issues[0].component, SESSION_COMPONENT);
        assert!(runs[0].report.checks.is_empty());
        assert!(runs[1].session_opened);
        assert!(runs[1].report.result("container_exists").unwrap().passed());
    }

    #[tokio::test]
    async fn test_no_sessions_at_all_keeps_runs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(
            FakeSessionManager::new(|_| FakePage::new())
                .refusing("desktop-1920")
                .refusing("mobile-iphone12"),
        );
        let driver = ScenarioDriver::new(config(dir.path()), manager);

        let outcome = driver.run().await;
        assert!(!outcome.any_session_opened());
        assert!(matches!(
            outcome.ensure_session_opened(),
            Err(ProbeError::Session(_))
        ));

        // Both runs come back with their reports, for the caller to print
        assert_eq!(outcome.runs.len(), 2);
        for run in &outcome.runs {
            assert_eq!(run.report.issues[0].component, SESSION_COMPONENT);
            assert!(run.report_path.as_ref().unwrap().exists());
        }
    }

    #[tokio::test]
    async fn test_one_open_session_is_enough() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(FakeSessionManager::new(|_| FakePage::new()).refusing("desktop-1920"));
        let driver = ScenarioDriver::new(config(dir.path()), manager);

        let outcome = driver.run().await;
        assert!(outcome.ensure_session_opened().is_ok());
    }

    #[tokio::test]
    async fn test_release_shares_one_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profiles = vec![Profile::desktop()];
        config.timeouts.close_grace_ms = 300;
        config.checks = vec![CheckSpec::new(CheckKind::Element {
            selector: "body".to_string(),
            expect: Presence::Present,
        })];

        let manager = Arc::new(FakeSessionManager::new(|_| {
            FakePage::new()
                .with_elements("body", 1)
                .with_stuck_teardown(Duration::from_secs(60))
        }));
        let driver = ScenarioDriver::new(config, manager.clone());

        let started = Instant::now();
        let outcome = driver.run().await;
        let elapsed = started.elapsed();

        // Poll and close each bounded separately would take twice the grace
        assert!(elapsed < Duration::from_millis(550), "took {:?}", elapsed);
        assert!(outcome.runs[0].report.checks[0].passed());
        assert_eq!(manager.closed(), 1);
    }

    #[tokio::test]
    async fn test_scrolling_renders_deferred_grid() {
        let dir = tempfile::tempdir().unwrap();
        let page = || {
            FakePage::new()
                .with_elements("#products", 1)
                .with_elements_on_scroll("#products .grid > *", 6)
        };

        let unscrolled = ScenarioDriver::new(
            config(dir.path()),
            Arc::new(FakeSessionManager::new(move |_| page())),
        );
        let runs = unscrolled.run().await.runs;
        assert!(!runs[0].report.result("child_count>=1").unwrap().passed());

        let mut scrolled_config = config(dir.path());
        scrolled_config.readiness.scroll_to = Some("#products".to_string());
        let scrolled = ScenarioDriver::new(
            scrolled_config,
            Arc::new(FakeSessionManager::new(move |_| page())),
        );
        let runs = scrolled.run().await.runs;
        for run in &runs {
            assert_eq!(run.report.result("child_count>=1").unwrap().detail, "6");
        }
    }

    #[tokio::test]
    async fn test_scroll_steps_walk_the_page_and_return() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profiles = vec![Profile::mobile()];
        config.readiness.scroll_steps = 3;
        config.checks = vec![CheckSpec::new(CheckKind::Element {
            selector: "#contact".to_string(),
            expect: Presence::Present,
        })];

        let manager = Arc::new(FakeSessionManager::new(|_| {
            FakePage::new()
                .with_viewport_height(844.0)
                .with_elements_on_scroll("#contact", 1)
        }));
        let driver = ScenarioDriver::new(config, manager);

        let runs = driver.run().await.runs;
        assert!(runs[0].report.checks[0].passed());
    }

    #[tokio::test]
    async fn test_unscrollable_page_is_still_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profiles = vec![Profile::desktop()];
        config.readiness.scroll_to = Some("#products".to_string());
        config.checks = vec![CheckSpec::new(CheckKind::Element {
            selector: "body".to_string(),
            expect: Presence::Present,
        })];

        // #products never renders, so the scroll target is missing
        let manager = Arc::new(FakeSessionManager::new(|_| FakePage::new().with_elements("body", 1)));
        let driver = ScenarioDriver::new(config, manager);

        let runs = driver.run().await.runs;
        assert_eq!(runs[0].report.checks.len(), 1);
        assert!(runs[0].report.checks[0].passed());
    }

    #[test]
    fn test_mark_unrun() {
        let specs = vec![
            CheckSpec::new(CheckKind::LazyImages { require_all: false }),
            CheckSpec::new(CheckKind::NoHorizontalOverflow { tolerance_px: 10 }),
            CheckSpec::new(CheckKind::ConsoleErrors { max: 0, pattern: None }),
        ];
        let checks = build_checks(&specs);
        let mut aggregator =
            ReportAggregator::new("https://shop.example", "desktop-1920", SeverityPolicy::from_specs(&specs));
        aggregator.record(CheckResult::pass("lazy_loading", "no images below the fold"));
        aggregator.begin("no_horizontal_overflow");

        mark_unrun(&mut aggregator, &checks);
        let report = aggregator.finalize();

        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.checks[1].detail, INTERRUPTED_DEADLINE);
        assert_eq!(report.checks[2].detail, NOT_RUN_DEADLINE);
        assert!(report.checks[1..].iter().all(|c| c.status == CheckStatus::Error));
    }
}
