//! Chromium engine using chromiumoxide.
//!
//! The browser process is launched on the first `open_session` and shared by
//! every session afterwards. Each session is a separate page with the
//! stealth script installed before any document loads.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetTimezoneOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserEngine, BrowserSession};
use crate::types::content::Navigation;

/// Hides the most common automation fingerprint.
const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

const TIMEZONE: &str = "America/New_York";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Status of the main document, from the Navigation Timing API.
const STATUS_SCRIPT: &str = "(() => { \
    const nav = performance.getEntriesByType('navigation')[0]; \
    return nav && nav.responseStatus ? nav.responseStatus : null; })()";

fn browser_error(e: impl std::error::Error + Send + Sync + 'static) -> FetchError {
    FetchError::Browser(Box::new(e))
}

/// Chromium launch options.
#[derive(Debug, Clone, Default)]
pub struct ChromiumConfig {
    /// Browser binary; chromiumoxide's detection is used when unset.
    pub executable: Option<PathBuf>,

    /// Extra command-line switches.
    pub extra_args: Vec<String>,
}

impl ChromiumConfig {
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}

struct Launched {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

/// Chromium-backed [`BrowserEngine`].
pub struct ChromiumEngine {
    config: ChromiumConfig,
    launched: OnceCell<Launched>,
}

impl ChromiumEngine {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config,
            launched: OnceCell::new(),
        }
    }

    async fn launch(&self, headless: bool) -> FetchResult<Launched> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .viewport(Viewport {
                width: 1920,
                height: 1080,
                ..Viewport::default()
            })
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--lang=en-US");

        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.config.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Browser(format!("invalid browser config: {e}").into()))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!(headless, "Launched Chromium");
        Ok(Launched {
            browser: Mutex::new(browser),
            handler,
        })
    }

    async fn prepare_page(page: &Page) -> FetchResult<()> {
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(browser_error)?;
        page.execute(SetTimezoneOverrideParams::new(TIMEZONE))
            .await
            .map_err(browser_error)?;
        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn open_session(&self, headless: bool) -> FetchResult<Box<dyn BrowserSession>> {
        let launched = self
            .launched
            .get_or_try_init(|| self.launch(headless))
            .await?;

        let page = launched
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;
        Self::prepare_page(&page).await?;

        Ok(Box::new(ChromiumSession { page }))
    }

    async fn shutdown(&self) -> FetchResult<()> {
        if let Some(launched) = self.launched.get() {
            let mut browser = launched.browser.lock().await;
            browser.close().await.map_err(browser_error)?;
            let _ = browser.wait().await;
            launched.handler.abort();
            info!("Chromium shut down");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

struct ChromiumSession {
    page: Page,
}

impl ChromiumSession {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> FetchResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(browser_error)
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn set_user_agent(&mut self, user_agent: &str) -> FetchResult<()> {
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .accept_language(ACCEPT_LANGUAGE)
            .build()
            .map_err(|e| FetchError::Browser(e.into()))?;
        self.page.set_user_agent(params).await.map_err(browser_error)?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> FetchResult<Navigation> {
        if let Err(e) = self.page.goto(url).await {
            let reason = e.to_string();
            // net::ERR_* are DNS/connection failures; anything else is the engine
            return Err(if reason.contains("net::ERR_") {
                FetchError::Navigation {
                    url: url.to_string(),
                    reason,
                }
            } else {
                browser_error(e)
            });
        }

        let final_url = self
            .page
            .url()
            .await
            .map_err(browser_error)?
            .unwrap_or_else(|| url.to_string());
        let status: Option<u16> = self.eval(STATUS_SCRIPT).await.unwrap_or(None);

        debug!(url = %url, final_url = %final_url, ?status, "Navigation complete");
        Ok(Navigation { final_url, status })
    }

    async fn scroll_height(&mut self) -> FetchResult<u64> {
        self.eval("document.body ? document.body.scrollHeight : 0").await
    }

    async fn scroll_to(&mut self, y: u64) -> FetchResult<()> {
        self.page
            .evaluate(format!("window.scrollTo(0, {y})"))
            .await
            .map_err(browser_error)?;
        Ok(())
    }

    async fn content(&mut self) -> FetchResult<String> {
        self.page.content().await.map_err(browser_error)
    }

    async fn screenshot(&mut self) -> FetchResult<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(browser_error)
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.page.clone().close().await.map_err(browser_error)
    }
}
