//! pageprobe CLI - rendered-page verification across viewport profiles
//!
//! Usage:
//!   pageprobe run                 Check the configured page and write reports
//!   pageprobe init [PATH]         Write a default pageprobe.toml
//!   pageprobe profiles            List built-in viewport profiles
//!   pageprobe checks              Show the resolved check list

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pageprobe_browser::{BrowserConfig, ChromeSessionManager};
use pageprobe_core::config::DEFAULT_CONFIG_FILE;
use pageprobe_core::{ProbeConfig, Profile};
use pageprobe_runner::{summary, ProfileRun, ScenarioDriver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pageprobe")]
#[command(author, version, about = "Rendered-page verification across viewport profiles")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the target page and write one report per profile
    Run {
        /// Config file (defaults to ./pageprobe.toml when present)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write a default config file
    Init {
        /// Where to write it
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// List built-in viewport profiles
    Profiles,

    /// Show the resolved check list for a config
    Checks {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

/// Command-line values that take precedence over the config file
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Page to check
    #[arg(long)]
    url: Option<String>,

    /// Only run these profiles (repeatable; config or preset names)
    #[arg(long = "profile", value_name = "NAME")]
    profiles: Vec<String>,

    /// Report path; the profile name is appended to the file stem
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Screenshot directory
    #[arg(long, value_name = "DIR")]
    screenshots: Option<PathBuf>,

    /// Scenario deadline in seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Run profiles concurrently
    #[arg(long)]
    parallel: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Disable Chrome's sandbox (needed in most containers)
    #[arg(long)]
    no_sandbox: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for the summary
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { config, overrides } => cmd_run(config, overrides).await,
        Commands::Init { path, force } => cmd_init(path, force).await,
        Commands::Profiles => cmd_profiles().await,
        Commands::Checks { config } => cmd_checks(config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ProbeConfig> {
    match path {
        Some(path) => ProbeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => ProbeConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))
            .context("Failed to load pageprobe.toml"),
    }
}

fn apply_overrides(config: &mut ProbeConfig, overrides: Overrides) -> Result<()> {
    if let Some(url) = overrides.url {
        config.target_url = url;
    }

    if !overrides.profiles.is_empty() {
        let mut selected = Vec::with_capacity(overrides.profiles.len());
        for name in &overrides.profiles {
            let profile = config
                .profiles
                .iter()
                .find(|p| &p.name == name)
                .cloned()
                .or_else(|| Profile::preset(name));
            match profile {
                Some(profile) => selected.push(profile),
                None => bail!(
                    "Unknown profile '{}' (see `pageprobe profiles`)",
                    name
                ),
            }
        }
        config.profiles = selected;
    }

    if let Some(report) = overrides.report {
        config.report_path = report;
    }
    if let Some(dir) = overrides.screenshots {
        config.screenshot_dir = dir;
    }
    if let Some(secs) = overrides.deadline {
        config.timeouts.scenario_secs = secs;
    }
    if overrides.parallel {
        config.parallel = true;
    }
    if overrides.headed {
        config.browser.headless = false;
    }
    if overrides.no_sandbox {
        config.browser.sandbox = false;
    }

    Ok(())
}

async fn cmd_run(config_path: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    apply_overrides(&mut config, overrides)?;
    config.validate().context("Invalid configuration")?;

    info!(
        "Probing {} ({} profile(s), deadline {:?})",
        config.target_url,
        config.profiles.len(),
        config.timeouts.scenario()
    );

    let sessions = Arc::new(ChromeSessionManager::new(BrowserConfig {
        options: config.browser.clone(),
        ..BrowserConfig::default()
    }));
    let driver = ScenarioDriver::new(config, sessions);

    let outcome = driver.run().await;
    print!("{}", render_runs(&outcome.runs));

    // Reports are out before a failed scenario exits non-zero
    outcome
        .ensure_session_opened()
        .context("Page check could not run")?;

    Ok(())
}

/// Each profile's summary, then where its report went
fn render_runs(runs: &[ProfileRun]) -> String {
    let mut out = String::new();
    for run in runs {
        out.push_str(&summary::render(&run.report));
        out.push('\n');
    }

    out.push_str("Reports:\n");
    for run in runs {
        match run.report_path {
            Some(ref path) => out.push_str(&format!("  {}\n", path.display())),
            None => out.push_str(&format!("  {}: not written (see log)\n", run.report.profile)),
        }
    }
    out
}

async fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    ProbeConfig::write_default(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    println!("Set target_url, then run `pageprobe run`");
    Ok(())
}

async fn cmd_profiles() -> Result<()> {
    println!("Built-in profiles");
    println!("=================");

    for profile in Profile::presets() {
        println!(
            "\n{}\n  viewport: {}x{} @{}x{}",
            profile.name,
            profile.width,
            profile.height,
            profile.device_scale_factor,
            if profile.mobile { " (mobile)" } else { "" }
        );
        if let Some(ref ua) = profile.user_agent {
            println!("  user agent: {}", ua);
        }
    }

    Ok(())
}

async fn cmd_checks(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let checks = config.effective_checks();

    println!("Checks for {}", config.target_url);
    println!("{}", "=".repeat(11 + config.target_url.len()));

    for spec in &checks {
        let scope = if spec.profiles.is_empty() {
            "all profiles".to_string()
        } else {
            spec.profiles.join(", ")
        };
        println!(
            "  {:<28} {:<24} {:<9} {}",
            spec.resolved_name(),
            spec.kind.tag(),
            spec.resolved_severity().to_string(),
            scope
        );
    }

    Ok(())
}
