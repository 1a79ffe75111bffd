//! End-to-end scenarios against the scripted page

use pageprobe_browser::fake::{FakePage, FakeSessionManager};
use pageprobe_browser::SessionManager;
use pageprobe_core::config::default_checks;
use pageprobe_core::{
    CheckKind, CheckSpec, CheckStatus, Presence, ProbeConfig, Profile, Report, Severity,
    INTERRUPTED_DEADLINE, NOT_RUN_DEADLINE,
};
use pageprobe_runner::{to_json, ScenarioDriver, NAVIGATION_COMPONENT};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config(dir: &Path) -> ProbeConfig {
    let mut config = ProbeConfig::for_url("https://shop.example/");
    config.report_path = dir.join("pageprobe-report.json");
    config.screenshot_dir = dir.join("screenshots");
    config.timeouts.settle_ms = 1;
    config.timeouts.check_wait_ms = 50;
    config.timeouts.navigation_secs = 1;
    config
}

/// Product listing that renders correctly
fn healthy_listing() -> FakePage {
    FakePage::new()
        .with_elements("#products", 1)
        .with_elements("#products .grid > *", 5)
        .with_resource("https://shop.example/wp-json/wc/store/products?per_page=20", 210.0)
}

fn read_report(path: &Path) -> Report {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_healthy_listing_passes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(FakeSessionManager::new(|_| healthy_listing()));
    let driver = ScenarioDriver::new(config(dir.path()), manager.clone());

    let runs = driver.run().await.runs;
    assert_eq!(runs.len(), 2);

    for run in &runs {
        let report = &run.report;
        assert_eq!(report.result("container_exists").unwrap().status, CheckStatus::Pass);

        let count = report.result("child_count>=1").unwrap();
        assert_eq!(count.status, CheckStatus::Pass);
        assert_eq!(count.detail, "5");

        assert!(report.result("no_error_marker").unwrap().passed());
        assert!(report.result("no_loading_marker").unwrap().passed());
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.network.len(), 1);
    }

    let desktop = dir.path().join("pageprobe-report_desktop-1920.json");
    assert_eq!(runs[0].report_path.as_deref(), Some(desktop.as_path()));
    assert_eq!(read_report(&desktop), runs[0].report);
    assert!(dir.path().join("screenshots/desktop-1920_loaded.png").exists());
    assert!(dir.path().join("screenshots/mobile-iphone12_final.png").exists());
}

#[tokio::test]
async fn test_horizontal_overflow_is_major_issue() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(FakeSessionManager::new(|profile: &Profile| {
        let width = f64::from(profile.width);
        healthy_listing().with_widths(width + 50.0, width)
    }));
    let driver = ScenarioDriver::new(config(dir.path()), manager);

    let runs = driver.run().await.runs;

    for run in &runs {
        let report = &run.report;
        let overflow = report.result("no_horizontal_overflow").unwrap();
        assert_eq!(overflow.status, CheckStatus::Fail);

        let issue = report
            .issues
            .iter()
            .find(|i| i.component == "no_horizontal_overflow")
            .unwrap();
        assert_eq!(issue.severity, Severity::Major);
        assert!(issue.screenshot.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn test_unready_profile_records_navigation_issue() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.readiness.selector = Some("#products".to_string());

    // Mobile never renders the listing container
    let manager = Arc::new(FakeSessionManager::new(|profile: &Profile| {
        if profile.mobile {
            FakePage::new()
        } else {
            healthy_listing()
        }
    }));
    let driver = ScenarioDriver::new(config, manager.clone());

    let runs = driver.run().await.runs;

    let desktop = &runs[0].report;
    assert_eq!(desktop.checks.len(), default_checks().len());
    assert!(desktop.issues.is_empty());

    let mobile = &runs[1].report;
    assert!(mobile.checks.is_empty());
    assert_eq!(mobile.issues.len(), 1);
    assert_eq!(mobile.issues[0].component, NAVIGATION_COMPONENT);
    assert_eq!(mobile.issues[0].severity, Severity::Critical);
    assert!(mobile.has_critical());

    let on_disk = read_report(&dir.path().join("pageprobe-report_mobile-iphone12.json"));
    assert!(on_disk.checks.is_empty());
    assert_eq!(on_disk.issues.len(), 1);

    assert_eq!(manager.opened(), 2);
    assert_eq!(manager.closed(), 2);
}

#[tokio::test]
async fn test_slow_load_is_navigation_issue() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(FakeSessionManager::new(|_| {
        healthy_listing().with_navigation_delay(Duration::from_secs(5))
    }));
    let mut config = config(dir.path());
    config.profiles = vec![Profile::desktop()];
    let driver = ScenarioDriver::new(config, manager.clone());

    let started = Instant::now();
    let runs = driver.run().await.runs;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(runs[0].report.issues[0].component, NAVIGATION_COMPONENT);
    assert!(runs[0].report.checks.is_empty());
    assert_eq!(manager.opened(), manager.closed());
}

#[tokio::test]
async fn test_every_check_yields_a_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.profiles = vec![Profile::mobile()];
    config.checks = vec![
        CheckSpec::new(CheckKind::Element {
            selector: "#products".to_string(),
            expect: Presence::Present,
        }),
        CheckSpec::new(CheckKind::LazyImages { require_all: false }),
        CheckSpec::new(CheckKind::NoHorizontalOverflow { tolerance_px: 10 }),
        CheckSpec::new(CheckKind::ConsoleErrors {
            max: 0,
            pattern: Some("[unclosed".to_string()),
        }),
        CheckSpec::new(CheckKind::StackedLayout {
            selector: ".grid > *".to_string(),
            min_dy: 50.0,
        }),
    ];

    // Every page query except element waits blows up
    let manager = Arc::new(FakeSessionManager::new(|_| {
        FakePage::new()
            .failing("img", "Target closed")
            .failing("document", "Target closed")
            .failing(".grid > *", "Target closed")
    }));
    let driver = ScenarioDriver::new(config, manager);

    let runs = driver.run().await.runs;
    let report = &runs[0].report;

    assert_eq!(report.checks.len(), 5);
    assert_eq!(report.summary.total, 5);
    assert_eq!(report.checks[0].status, CheckStatus::Fail);
    assert!(report.checks[1..].iter().all(|c| c.status == CheckStatus::Error));
    assert_eq!(report.issues.len(), 5);
}

#[tokio::test]
async fn test_sessions_always_closed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(
        FakeSessionManager::new(|profile: &Profile| {
            if profile.mobile {
                FakePage::new().with_navigation_error("net::ERR_CONNECTION_RESET")
            } else {
                healthy_listing().failing("document", "Target closed")
            }
        })
        .refusing("tablet"),
    );
    let mut config = config(dir.path());
    let mut tablet = Profile::desktop();
    tablet.name = "tablet".to_string();
    tablet.width = 820;
    config.profiles.push(tablet);

    let driver = ScenarioDriver::new(config, manager.clone());
    let runs = driver.run().await.runs;

    assert_eq!(runs.len(), 3);
    assert!(!runs[2].session_opened);
    assert_eq!(manager.opened(), 2);
    assert_eq!(manager.opened(), manager.closed());
}

#[tokio::test]
async fn test_parallel_profiles_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.parallel = true;

    let manager = Arc::new(FakeSessionManager::new(|profile: &Profile| {
        if profile.mobile {
            healthy_listing().with_console("error", "Hydration failed")
        } else {
            healthy_listing()
        }
    }));
    let driver = ScenarioDriver::new(config, manager.clone());

    let runs = driver.run().await.runs;

    assert_eq!(runs[0].report.profile, "desktop-1920");
    assert!(runs[0].report.console_errors.is_empty());
    assert_eq!(runs[1].report.console_errors, vec!["Hydration failed".to_string()]);
    assert!(!runs[1].report.result("no_console_errors").unwrap().passed());
    assert_eq!(manager.opened(), manager.closed());
}

#[tokio::test]
async fn test_deadline_bounds_hung_check() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.timeouts.scenario_secs = 1;
    config.checks = vec![
        CheckSpec::new(CheckKind::Element {
            selector: "#products".to_string(),
            expect: Presence::Present,
        }),
        CheckSpec::new(CheckKind::Element {
            selector: "#reviews".to_string(),
            expect: Presence::Present,
        })
        .named("reviews_loaded"),
        CheckSpec::new(CheckKind::NoHorizontalOverflow { tolerance_px: 10 }),
    ];

    let manager = Arc::new(FakeSessionManager::new(|_| {
        healthy_listing()
            .with_elements("#reviews", 1)
            .hanging("#reviews", Duration::from_secs(60))
    }));
    let driver = ScenarioDriver::new(config, manager.clone());

    let started = Instant::now();
    let runs = driver.run().await.runs;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert_eq!(manager.opened(), manager.closed());

    let desktop = &runs[0].report;
    assert_eq!(desktop.checks.len(), 3);
    assert!(desktop.checks[0].passed());
    assert_eq!(desktop.checks[1].detail, INTERRUPTED_DEADLINE);
    assert_eq!(desktop.checks[2].detail, NOT_RUN_DEADLINE);

    // The deadline had passed before mobile could start
    let mobile = &runs[1].report;
    assert!(!runs[1].session_opened);
    assert_eq!(mobile.checks.len(), 3);
    assert!(mobile.checks.iter().all(|c| c.detail == NOT_RUN_DEADLINE));
}

#[tokio::test]
async fn test_run_scenario_with_explicit_checks() {
    let dir = tempfile::tempdir().unwrap();
    let manager: Arc<dyn SessionManager> = Arc::new(FakeSessionManager::new(|_| healthy_listing()));
    let driver = ScenarioDriver::new(config(dir.path()), manager);

    let mut checks_by_profile = HashMap::new();
    checks_by_profile.insert(
        "desktop-1920".to_string(),
        vec![CheckSpec::new(CheckKind::ResourceRequested {
            url_contains: "/products".to_string(),
        })],
    );

    let runs = driver
        .run_scenario(
            "https://shop.example/shop",
            &[Profile::desktop(), Profile::mobile()],
            &checks_by_profile,
        )
        .await
        .runs;

    assert_eq!(runs[0].report.target_url, "https://shop.example/shop");
    assert!(runs[0].report.result("resource_requested").unwrap().passed());
    // No entry for mobile: visited with no checks
    assert!(runs[1].report.checks.is_empty());
    assert!(runs[1].session_opened);
}

#[tokio::test]
async fn test_load_time_console_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(FakeSessionManager::new(|_| {
        healthy_listing().with_console("error", "No QueryClient set, use QueryClientProvider to set one")
    }));
    let driver = ScenarioDriver::new(config(dir.path()), manager);

    let runs = driver.run().await.runs;

    for run in &runs {
        let check = run.report.result("no_console_errors").unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.detail.contains("No QueryClient set"));
        assert_eq!(run.report.console_errors.len(), 1);
    }
}

#[tokio::test]
async fn test_all_sessions_refused_still_returns_reports() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(
        FakeSessionManager::new(|_| healthy_listing())
            .refusing("desktop-1920")
            .refusing("mobile-iphone12"),
    );
    let driver = ScenarioDriver::new(config(dir.path()), manager);

    let outcome = driver.run().await;

    assert!(outcome.ensure_session_opened().is_err());
    assert_eq!(outcome.runs.len(), 2);
    for run in &outcome.runs {
        let path = run.report_path.as_ref().unwrap();
        assert_eq!(read_report(path), run.report);
        assert!(run.report.has_critical());
    }
}

#[tokio::test]
async fn test_report_serialization_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(FakeSessionManager::new(|_| healthy_listing()));
    let driver = ScenarioDriver::new(config(dir.path()), manager);

    let runs = driver.run().await.runs;
    let path = runs[0].report_path.clone().unwrap();

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, to_json(&runs[0].report).unwrap());
}
