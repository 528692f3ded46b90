//! Page fetching through the shared session pool.
//!
//! Applies the anti-detection policy (User-Agent rotation, progressive
//! scrolling, settle delay), classifies failures and hands screenshots to
//! an optional sink.

use governor::{Quota, RateLimiter};
use rand::seq::SliceRandom;
use scraper::{Html, Selector};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::pool::{SessionLease, SessionPool};
use crate::error::{FetchError, FetchResult};
use crate::normalize::{normalize, parse_http_url};
use crate::pipeline::markdown::title_of;
use crate::traits::browser::NavigationPlan;
use crate::traits::screenshot::{CaptureOutcome, ScreenshotSink};
use crate::types::config::{FetchConfig, DEFAULT_USER_AGENTS};
use crate::types::content::{PageCapture, RawContent, Screenshot};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Elements that only exist on a bot wall, whatever the page size.
///
/// Cloudflare also injects `/cdn-cgi/challenge-platform/` scripts and DataDome
/// its `tags.js` into pages it serves normally, so those never count.
const INTERSTITIAL_SELECTORS: &[(&str, &str)] = &[
    (
        "#challenge-platform, #challenge-form, #challenge-stage, #cf-challenge-running, .cf-browser-verification",
        "cloudflare challenge",
    ),
    ("#px-captcha", "perimeterx captcha"),
    (r#"iframe[src*="captcha-delivery.com"]"#, "datadome"),
];

/// Titles of challenge and error interstitials.
const BLOCK_TITLES: &[(&str, &str)] = &[
    ("attention required! | cloudflare", "cloudflare block"),
    ("just a moment...", "access denied page"),
    ("access denied", "access denied page"),
];

/// Signals that are only a block when the page has little else on it.
const WIDGET_SELECTORS: &[(&str, &str)] = &[(".g-recaptcha", "recaptcha"), (".h-captcha", "hcaptcha")];
const WIDGET_PHRASES: &[(&str, &str)] = &[
    ("please verify you are a human", "human verification"),
    ("are you a robot", "human verification"),
];

/// Pages shorter than this that carry a widget or phrase are treated as interstitials.
const INTERSTITIAL_MAX_BYTES: usize = 20_000;

fn first_match(document: &Html, selectors: &[(&str, &'static str)]) -> Option<&'static str> {
    selectors.iter().find_map(|(css, name)| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).next().map(|_| *name)
    })
}

/// Name the anti-bot mechanism `html` shows, if any.
pub fn detect_block(html: &str) -> Option<&'static str> {
    let document = Html::parse_document(html);

    if let Some(name) = first_match(&document, INTERSTITIAL_SELECTORS) {
        return Some(name);
    }

    if let Some(title) = title_of(&document).map(|t| t.to_lowercase()) {
        if let Some((_, name)) = BLOCK_TITLES.iter().find(|(marker, _)| title.contains(marker)) {
            return Some(*name);
        }
    }

    if html.len() < INTERSTITIAL_MAX_BYTES {
        if let Some(name) = first_match(&document, WIDGET_SELECTORS) {
            return Some(name);
        }
        let lower = html.to_lowercase();
        if let Some((_, name)) = WIDGET_PHRASES.iter().find(|(phrase, _)| lower.contains(phrase)) {
            return Some(*name);
        }
    }

    None
}

/// Fetches rendered pages.
#[derive(Clone)]
pub struct PageFetcher {
    pool: SessionPool,
    config: FetchConfig,
    screenshots: Option<Arc<dyn ScreenshotSink>>,
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl PageFetcher {
    pub fn new(pool: SessionPool, config: FetchConfig) -> Self {
        let limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Self {
            pool,
            config,
            screenshots: None,
            limiter,
        }
    }

    /// Send screenshots to `sink`.
    pub fn with_screenshot_sink(mut self, sink: Arc<dyn ScreenshotSink>) -> Self {
        self.screenshots = Some(sink);
        self
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn pick_user_agent(&self) -> String {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
    }

    fn plan(&self, capture_screenshot: bool) -> NavigationPlan {
        NavigationPlan {
            user_agent: self.pick_user_agent(),
            timeout: self.config.navigation_timeout,
            scroll: self.config.scroll.clone(),
            settle_delay: self.config.settle_delay,
            capture_screenshot,
        }
    }

    /// Fetch `url` with the configured screenshot setting.
    pub async fn fetch(&self, url: &str) -> FetchResult<RawContent> {
        self.fetch_with(url, self.config.capture_screenshot).await
    }

    /// Fetch `url`, overriding whether a screenshot is captured.
    pub async fn fetch_with(&self, url: &str, capture_screenshot: bool) -> FetchResult<RawContent> {
        let parsed = parse_http_url(url)?;
        let url = normalize(&parsed);

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let mut lease = self.pool.acquire().await?;
        let plan = self.plan(capture_screenshot);
        let ua_prefix: String = plan.user_agent.chars().take(48).collect();
        debug!(url = %url, user_agent = %ua_prefix, "Fetching page");

        match lease.navigate_and_extract(&url, &plan).await {
            Ok(capture) => self.accept(&url, capture, plan.user_agent).await,
            Err(e) => {
                if e.poisons_session() {
                    lease.discard();
                } else {
                    self.capture_error_screenshot(&url, &mut lease).await;
                }
                Err(e)
            }
        }
    }

    /// Classify a capture and turn it into raw content.
    async fn accept(
        &self,
        url: &str,
        capture: PageCapture,
        user_agent: String,
    ) -> FetchResult<RawContent> {
        if let Some(marker) = detect_block(&capture.html) {
            if let Some(png) = &capture.screenshot {
                self.save_screenshot(url, png, CaptureOutcome::Error).await;
            }
            warn!(url = %url, marker, "Page blocked by anti-bot protection");
            return Err(FetchError::Blocked {
                url: url.to_string(),
                marker: marker.to_string(),
            });
        }

        if let Some(status) = capture.status.filter(|s| *s >= 400) {
            if let Some(png) = &capture.screenshot {
                self.save_screenshot(url, png, CaptureOutcome::Error).await;
            }
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let screenshot = match capture.screenshot {
            Some(png) => {
                let saved_to = self.save_screenshot(url, &png, CaptureOutcome::Success).await;
                Some(Screenshot { png, saved_to })
            }
            None => None,
        };

        info!(
            url = %url,
            final_url = %capture.final_url,
            bytes = capture.html.len(),
            "Fetched page"
        );

        Ok(RawContent {
            url: url.to_string(),
            final_url: capture.final_url,
            text: capture.html,
            screenshot,
            status: capture.status,
            user_agent,
            fetched_at: chrono::Utc::now(),
        })
    }

    async fn capture_error_screenshot(&self, url: &str, lease: &mut SessionLease) {
        if self.screenshots.is_none() {
            return;
        }
        if let Ok(png) = lease.screenshot().await {
            self.save_screenshot(url, &png, CaptureOutcome::Error).await;
        }
    }

    async fn save_screenshot(
        &self,
        url: &str,
        png: &[u8],
        outcome: CaptureOutcome,
    ) -> Option<std::path::PathBuf> {
        let sink = self.screenshots.as_ref()?;
        match sink.save(url, png, outcome).await {
            Ok(path) => {
                debug!(url = %url, path = %path.display(), "Saved screenshot");
                Some(path)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to save screenshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBrowser, MockFailure, MockPage};
    use crate::browser::DirectorySink;
    use crate::testing::fixtures;
    use crate::types::config::PipelineConfig;

    fn fetcher(browser: &MockBrowser) -> PageFetcher {
        let config = PipelineConfig::immediate().fetch;
        let pool = SessionPool::new(Arc::new(browser.clone()), true, config.max_sessions);
        PageFetcher::new(pool, config)
    }

    #[tokio::test]
    async fn test_fetch_returns_rendered_content() {
        let browser = MockBrowser::new().with_page(fixtures::NOTION_URL, fixtures::NOTION_HTML);
        let raw = fetcher(&browser).fetch("https://www.notion.so/pricing/").await.unwrap();

        assert_eq!(raw.url, fixtures::NOTION_URL);
        assert_eq!(raw.text, fixtures::NOTION_HTML);
        assert_eq!(raw.status, Some(200));
        assert!(raw.screenshot.is_some());
        assert!(DEFAULT_USER_AGENTS.contains(&raw.user_agent.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_url_never_touches_browser() {
        let browser = MockBrowser::new();
        let err = fetcher(&browser).fetch("not a url").await.unwrap_err();

        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert!(!err.is_retryable());
        assert_eq!(browser.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_user_agent_drawn_from_pool() {
        let browser = MockBrowser::new().with_default_page("<p>ok</p>");
        let fetcher = fetcher(&browser);
        for i in 0..10 {
            fetcher.fetch(&format!("https://example.com/{i}")).await.unwrap();
        }

        let agents = browser.user_agents();
        assert_eq!(agents.len(), 10);
        assert!(agents.iter().all(|ua| DEFAULT_USER_AGENTS.contains(&ua.as_str())));
    }

    #[tokio::test]
    async fn test_challenge_page_is_blocked() {
        let browser = MockBrowser::new().with_page("https://example.com", fixtures::CHALLENGE_HTML);
        let err = fetcher(&browser).fetch("https://example.com").await.unwrap_err();

        assert!(matches!(err, FetchError::Blocked { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_status_is_retryable() {
        let browser = MockBrowser::new()
            .with_mock_page("https://example.com", MockPage::new("<p>oops</p>").with_status(503));
        let err = fetcher(&browser).fetch("https://example.com").await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_crashed_session_is_discarded() {
        let browser = MockBrowser::new()
            .with_default_page("<p>ok</p>")
            .failing_times("https://example.com", MockFailure::Crash, 1);
        let fetcher = fetcher(&browser);

        assert!(fetcher.fetch("https://example.com").await.is_err());
        assert_eq!(fetcher.pool().idle_sessions(), 0);

        fetcher.fetch("https://example.com").await.unwrap();
        assert_eq!(browser.sessions_opened(), 2);
        assert_eq!(fetcher.pool().available(), fetcher.pool().max_sessions());
    }

    #[tokio::test]
    async fn test_screenshots_written_to_sink() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new().with_default_page("<p>ok</p>");
        let fetcher = fetcher(&browser).with_screenshot_sink(Arc::new(DirectorySink::new(dir.path())));

        let raw = fetcher.fetch("https://example.com/pricing").await.unwrap();
        let saved = raw.screenshot.unwrap().saved_to.unwrap();
        assert!(saved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("success_example.com_pricing_"));
    }

    #[test]
    fn test_detect_block() {
        assert_eq!(detect_block(fixtures::CHALLENGE_HTML), Some("cloudflare challenge"));
        assert_eq!(
            detect_block("<title>Access Denied</title><p>Reference #18</p>"),
            Some("access denied page")
        );
        assert_eq!(
            detect_block("<title>Attention Required! | Cloudflare</title><p>Sorry, you have been blocked</p>"),
            Some("cloudflare block")
        );
        assert_eq!(
            detect_block(r#"<form><div class="g-recaptcha"></div></form>"#),
            Some("recaptcha")
        );
        assert_eq!(detect_block(r#"<div id="px-captcha"></div>"#), Some("perimeterx captcha"));
        assert_eq!(
            detect_block(r#"<iframe src="https://geo.captcha-delivery.com/captcha/?cid=abc"></iframe>"#),
            Some("datadome")
        );
        assert_eq!(detect_block("<p>Please verify you are a human</p>"), Some("human verification"));
        assert_eq!(detect_block(fixtures::NOTION_HTML), None);

        let big_page = format!("<div class=\"g-recaptcha\"></div>{}", "<p>content</p>".repeat(3000));
        assert_eq!(detect_block(&big_page), None);
    }

    #[test]
    fn test_bot_manager_scripts_on_normal_pages_are_not_blocks() {
        let cloudflare = format!(
            r#"{}<script>(function(){{var a=document.createElement('script');a.src='/cdn-cgi/challenge-platform/scripts/jsd/main.js';document.getElementsByTagName('head')[0].appendChild(a);}})();</script>"#,
            fixtures::NOTION_HTML
        );
        let datadome = format!(
            r#"{}<script src="https://js.datadome.co/tags.js" async></script>"#,
            fixtures::NOTION_HTML
        );

        assert_eq!(detect_block(&cloudflare), None);
        assert_eq!(detect_block(&datadome), None);
    }
}
