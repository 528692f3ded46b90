//! Rendered page content handed from the fetcher to the extractor.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// A PNG screenshot of the rendered page.
#[derive(Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,

    /// Where a screenshot sink wrote it, if anywhere
    pub saved_to: Option<PathBuf>,
}

impl Screenshot {
    pub fn new(png: Vec<u8>) -> Self {
        Self { png, saved_to: None }
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("bytes", &self.png.len())
            .field("saved_to", &self.saved_to)
            .finish()
    }
}

/// Rendered content of one page, owned by a single analysis run.
///
/// Dropped once extraction finishes; never persisted.
#[derive(Debug, Clone)]
pub struct RawContent {
    /// Normalized URL that was requested
    pub url: String,

    /// URL after redirects, as reported by the engine
    pub final_url: String,

    /// Rendered page markup
    pub text: String,

    pub screenshot: Option<Screenshot>,

    /// HTTP status of the main document, when the engine exposes it
    pub status: Option<u16>,

    /// User-Agent presented for this fetch
    pub user_agent: String,

    pub fetched_at: DateTime<Utc>,
}

impl RawContent {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            text: text.into(),
            screenshot: None,
            status: None,
            user_agent: String::new(),
            fetched_at: Utc::now(),
        }
    }

    /// SHA-256 of the rendered markup, for log correlation.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// What a browser session returns for one navigation.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub final_url: String,
    pub html: String,
    pub status: Option<u16>,
    pub screenshot: Option<Vec<u8>>,
}

/// Outcome of a bare navigation, before scrolling and capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub final_url: String,
    pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = RawContent::new("https://example.com", "<html>hi</html>");
        let b = RawContent::new("https://example.com/other", "<html>hi</html>");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_screenshot_debug_hides_bytes() {
        let shot = Screenshot::new(vec![0u8; 2048]);
        assert_eq!(format!("{shot:?}"), "Screenshot { bytes: 2048, saved_to: None }");
    }
}
