//! # pageprobe-runner
//!
//! Runs a verification scenario against a page.
//!
//! This crate provides:
//! - The [`Check`] trait and the built-in check catalogue
//! - An ordered, non-short-circuiting check runner with deadlines
//! - Report aggregation with a static severity policy
//! - The scenario driver that sequences every profile run

mod checks;
mod report;
mod runner;
mod scenario;
pub mod summary;

pub use checks::{build_check, build_checks, Check, CheckContext, CheckOutcome};
pub use report::{
    serialize, to_json, ReportAggregator, SeverityPolicy, NAVIGATION_COMPONENT, SESSION_COMPONENT,
};
pub use runner::{CheckRunner, ResultSink, RunnerOptions};
pub use scenario::{ProfileRun, ScenarioDriver, ScenarioOutcome};
