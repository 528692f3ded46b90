//! Screenshot sink trait.
//!
//! Screenshots leave the data path here: the pipeline hands them to a sink
//! and never reads them back.

use async_trait::async_trait;
use std::path::PathBuf;

/// Whether a screenshot documents a successful fetch or a failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Success,
    Error,
}

impl CaptureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureOutcome::Success => "success",
            CaptureOutcome::Error => "error",
        }
    }
}

/// Receives page screenshots.
#[async_trait]
pub trait ScreenshotSink: Send + Sync {
    /// Persist `png` for `url`, returning where it went.
    async fn save(&self, url: &str, png: &[u8], outcome: CaptureOutcome)
        -> std::io::Result<PathBuf>;
}
