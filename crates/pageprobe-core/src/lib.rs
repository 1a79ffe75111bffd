//! # pageprobe-core
//!
//! Core types for the pageprobe page verification tool.
//!
//! A run loads one target URL under one or more viewport profiles, runs an
//! ordered list of independent checks against each rendered page, and writes one
//! structured report per profile. This crate holds what every layer shares:
//!
//! - the data model ([`Profile`], [`CheckResult`], [`Issue`], [`Report`], observer events)
//! - the error taxonomy ([`ProbeError`])
//! - the scenario configuration ([`config::ProbeConfig`])
//! - fail-open helpers for best-effort diagnostics

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{CheckKind, CheckSpec, Presence, ProbeConfig, TimeoutBudget, Visibility};
pub use error::{ProbeError, Result};
pub use types::*;
