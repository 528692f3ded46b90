//! Directory-backed screenshot sink.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

use crate::traits::screenshot::{CaptureOutcome, ScreenshotSink};

const MAX_SLUG_LEN: usize = 50;

/// Filesystem-safe slug for `url`: scheme dropped, separators replaced, truncated.
pub fn url_slug(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);

    without_scheme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect()
}

/// Writes `<outcome>_<slug>_<YYYYmmdd_HHMMSS>.png` files into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl ScreenshotSink for DirectorySink {
    async fn save(
        &self,
        url: &str,
        png: &[u8],
        outcome: CaptureOutcome,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!(
            "{}_{}_{}.png",
            outcome.as_str(),
            url_slug(url),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(name);
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }
}
