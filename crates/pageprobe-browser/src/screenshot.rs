//! Screenshot evidence
//!
//! Files are named `{profile}_{label}.png` inside the evidence directory, so a
//! rerun overwrites the previous run's images instead of piling up new ones.

use crate::error::{BrowserError, Result};
use crate::session::Session;
use pageprobe_core::fail_open::fail_open;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Screenshot capture options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Capture the whole document rather than just the viewport
    pub full_page: bool,
}

impl ScreenshotOptions {
    pub fn full_page() -> Self {
        Self { full_page: true }
    }

    pub fn viewport() -> Self {
        Self { full_page: false }
    }
}

/// Writes named screenshots for a scenario
#[derive(Debug, Clone)]
pub struct EvidenceCapturer {
    dir: PathBuf,
}

impl EvidenceCapturer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic output path for a profile/label pair
    pub fn path_for(&self, profile: &str, label: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.png",
            sanitize_label(profile),
            sanitize_label(label)
        ))
    }

    /// Capture a screenshot labelled `label`.
    ///
    /// Best effort: failures are logged and reported as `None`.
    pub async fn capture(&self, session: &Session, label: &str, options: ScreenshotOptions) -> Option<PathBuf> {
        fail_open(
            &format!("evidence::{}", label),
            self.try_capture(session, label, options),
        )
        .await
    }

    async fn try_capture(&self, session: &Session, label: &str, options: ScreenshotOptions) -> Result<PathBuf> {
        debug!(
            "Capturing {} screenshot '{}' for {}",
            if options.full_page { "full page" } else { "viewport" },
            label,
            session.profile().name
        );

        let data = session.page().screenshot(options.full_page).await?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BrowserError::Other(format!(
                "Failed to create evidence directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(&session.profile().name, label);
        tokio::fs::write(&path, &data).await?;

        info!("Screenshot stored: {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }
}

/// Reduce a label to `[A-Za-z0-9_-]`, mapping everything else to `_`.
///
/// When that changed the label, a short digest of the original is appended so
/// that `child_count>=1` and `child_count<=1` land in different files.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else if cleaned == label {
        cleaned
    } else {
        format!("{}-{}", cleaned, label_digest(label))
    }
}

/// First 8 hex chars of the label's SHA-256
fn label_digest(label: &str) -> String {
    let digest = Sha256::digest(label.as_bytes());
    hex::encode(&digest[..4])
}
