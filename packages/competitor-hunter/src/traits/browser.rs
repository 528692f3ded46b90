//! Browser traits.
//!
//! A [`BrowserEngine`] opens [`BrowserSession`]s; a session performs one
//! navigation at a time. Engines only implement the primitives. The
//! scroll-and-capture sequence lives in the provided
//! [`BrowserSession::navigate_and_extract`] so every engine applies the
//! same policy.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::types::config::ScrollPolicy;
use crate::types::content::{Navigation, PageCapture};

/// How one navigation should be performed.
#[derive(Debug, Clone)]
pub struct NavigationPlan {
    pub user_agent: String,
    pub timeout: Duration,
    pub scroll: ScrollPolicy,
    pub settle_delay: Duration,
    pub capture_screenshot: bool,
}

/// Launches sessions. Implementations are shared across tasks.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh, isolated session (a page with its own settings).
    async fn open_session(&self, headless: bool) -> FetchResult<Box<dyn BrowserSession>>;

    /// Tear down the engine and any process it owns.
    async fn shutdown(&self) -> FetchResult<()>;

    /// Engine name for logging.
    fn name(&self) -> &str {
        "browser"
    }
}

/// A single browsing session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Present `user_agent` on subsequent requests.
    async fn set_user_agent(&mut self, user_agent: &str) -> FetchResult<()>;

    /// Load `url` and wait for the network to go idle.
    async fn navigate(&mut self, url: &str) -> FetchResult<Navigation>;

    /// Current `document.body.scrollHeight`.
    async fn scroll_height(&mut self) -> FetchResult<u64>;

    /// Scroll the window to vertical offset `y`.
    async fn scroll_to(&mut self, y: u64) -> FetchResult<()>;

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> FetchResult<String>;

    /// Full-page PNG of the current page.
    async fn screenshot(&mut self) -> FetchResult<Vec<u8>>;

    /// Release engine resources held by this session.
    async fn close(&mut self) -> FetchResult<()>;

    /// Scroll to the bottom until the page stops growing, then back to the top.
    ///
    /// Returns the number of scroll steps taken.
    async fn auto_scroll(&mut self, policy: &ScrollPolicy) -> FetchResult<u32> {
        if policy.max_steps == 0 {
            return Ok(0);
        }

        let mut steps = 0;
        let mut height = self.scroll_height().await?;
        while steps < policy.max_steps {
            self.scroll_to(height).await?;
            steps += 1;
            if !policy.step_pause.is_zero() {
                tokio::time::sleep(policy.step_pause).await;
            }

            let new_height = self.scroll_height().await?;
            if new_height <= height {
                break;
            }
            height = new_height;
        }

        self.scroll_to(0).await?;
        if !policy.return_pause.is_zero() {
            tokio::time::sleep(policy.return_pause).await;
        }

        debug!(steps, height, "Auto-scroll finished");
        Ok(steps)
    }

    /// Navigate, scroll, settle and capture.
    async fn navigate_and_extract(
        &mut self,
        url: &str,
        plan: &NavigationPlan,
    ) -> FetchResult<PageCapture> {
        self.set_user_agent(&plan.user_agent).await?;

        let navigation = match tokio::time::timeout(plan.timeout, self.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: plan.timeout.as_millis() as u64,
                })
            }
        };

        self.auto_scroll(&plan.scroll).await?;

        if !plan.settle_delay.is_zero() {
            tokio::time::sleep(plan.settle_delay).await;
        }

        let html = self.content().await?;

        let screenshot = if plan.capture_screenshot {
            match self.screenshot().await {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!(url = %url, error = %e, "Screenshot failed, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Ok(PageCapture {
            final_url: navigation.final_url,
            html,
            status: navigation.status,
            screenshot,
        })
    }
}
