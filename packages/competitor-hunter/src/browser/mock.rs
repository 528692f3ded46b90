//! Mock browser for testing.
//!
//! Serves scripted pages, injects failures and records every call so tests
//! can assert on navigation counts, User-Agents and concurrency.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserEngine, BrowserSession};
use crate::types::content::Navigation;

/// A scripted page.
#[derive(Debug, Clone)]
pub struct MockPage {
    pub html: String,
    pub status: Option<u16>,

    /// Successive `scrollHeight` values; the last one repeats.
    pub heights: Vec<u64>,
}

impl MockPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            status: Some(200),
            heights: vec![1080],
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Simulate lazy loading: the page grows through `heights` as it is scrolled.
    pub fn with_heights(mut self, heights: Vec<u64>) -> Self {
        self.heights = heights;
        self
    }
}

/// An injected navigation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Connection,
    Crash,
    /// Never completes; only cancellation or a timeout ends it.
    Hang,
}

/// Record of a call made to the mock browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBrowserCall {
    OpenSession { headless: bool },
    SetUserAgent(String),
    Navigate(String),
    ScrollTo(u64),
    Content,
    Screenshot,
    Close,
}

#[derive(Default)]
struct MockState {
    pages: RwLock<HashMap<String, MockPage>>,
    default_page: RwLock<Option<MockPage>>,
    failures: RwLock<HashMap<String, VecDeque<MockFailure>>>,
    permanent_failures: RwLock<HashMap<String, MockFailure>>,
    navigation_delay: RwLock<Duration>,
    calls: RwLock<Vec<MockBrowserCall>>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    shut_down: AtomicBool,
    navigation_started: Notify,
}

impl MockState {
    fn record(&self, call: MockBrowserCall) {
        self.calls.write().unwrap().push(call);
    }

    fn next_failure(&self, url: &str) -> Option<MockFailure> {
        if let Some(failure) = self.permanent_failures.read().unwrap().get(url) {
            return Some(*failure);
        }
        self.failures
            .write()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
    }

    fn page_for(&self, url: &str) -> Option<MockPage> {
        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .or_else(|| self.default_page.read().unwrap().clone())
    }
}

/// A mock browser engine.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the pool owns another.
#[derive(Clone, Default)]
pub struct MockBrowser {
    state: Arc<MockState>,
}

impl MockBrowser {
    /// Create a mock browser that knows no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.with_mock_page(url, MockPage::new(html))
    }

    pub fn with_mock_page(self, url: impl Into<String>, page: MockPage) -> Self {
        self.state.pages.write().unwrap().insert(url.into(), page);
        self
    }

    /// Serve `html` for every URL without its own page.
    pub fn with_default_page(self, html: impl Into<String>) -> Self {
        *self.state.default_page.write().unwrap() = Some(MockPage::new(html));
        self
    }

    /// Fail the next `times` navigations to `url`.
    pub fn failing_times(self, url: impl Into<String>, failure: MockFailure, times: usize) -> Self {
        self.state
            .failures
            .write()
            .unwrap()
            .entry(url.into())
            .or_default()
            .extend(std::iter::repeat(failure).take(times));
        self
    }

    /// Fail every navigation to `url`.
    pub fn failing_always(self, url: impl Into<String>, failure: MockFailure) -> Self {
        self.state
            .permanent_failures
            .write()
            .unwrap()
            .insert(url.into(), failure);
        self
    }

    /// Delay every navigation.
    pub fn with_navigation_delay(self, delay: Duration) -> Self {
        *self.state.navigation_delay.write().unwrap() = delay;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockBrowserCall> {
        self.state.calls.read().unwrap().clone()
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockBrowserCall::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations().len()
    }

    /// User-Agents set, in order.
    pub fn user_agents(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockBrowserCall::SetUserAgent(ua) => Some(ua),
                _ => None,
            })
            .collect()
    }

    /// Scroll offsets requested, in order.
    pub fn scrolls(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockBrowserCall::ScrollTo(y) => Some(y),
                _ => None,
            })
            .collect()
    }

    /// Any browser interaction at all, including opening a session.
    pub fn invocation_count(&self) -> usize {
        self.state.calls.read().unwrap().len()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }

    /// Highest number of navigations observed in flight at once.
    pub fn max_concurrent_navigations(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.shut_down.load(Ordering::SeqCst)
    }

    /// Wait until a navigation has started.
    pub async fn navigation_started(&self) {
        self.state.navigation_started.notified().await;
    }
}

#[async_trait]
impl BrowserEngine for MockBrowser {
    async fn open_session(&self, headless: bool) -> FetchResult<Box<dyn BrowserSession>> {
        self.state.record(MockBrowserCall::OpenSession { headless });
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            page: None,
            height_index: 0,
        }))
    }

    async fn shutdown(&self) -> FetchResult<()> {
        self.state.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Decrements the in-flight counter even when the navigation is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockSession {
    state: Arc<MockState>,
    page: Option<MockPage>,
    height_index: usize,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn set_user_agent(&mut self, user_agent: &str) -> FetchResult<()> {
        self.state
            .record(MockBrowserCall::SetUserAgent(user_agent.to_string()));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> FetchResult<Navigation> {
        self.state.record(MockBrowserCall::Navigate(url.to_string()));

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.state.in_flight);
        self.state.navigation_started.notify_one();

        let delay = *self.state.navigation_delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.state.next_failure(url) {
            Some(MockFailure::Timeout) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: 30_000,
                })
            }
            Some(MockFailure::Connection) => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_REFUSED".to_string(),
                })
            }
            Some(MockFailure::Crash) => {
                return Err(FetchError::Browser("target crashed".into()));
            }
            Some(MockFailure::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let page = self.state.page_for(url).ok_or_else(|| FetchError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })?;

        let status = page.status;
        self.page = Some(page);
        self.height_index = 0;
        Ok(Navigation {
            final_url: url.to_string(),
            status,
        })
    }

    async fn scroll_height(&mut self) -> FetchResult<u64> {
        let heights = self.page.as_ref().map(|p| p.heights.as_slice()).unwrap_or(&[]);
        let index = self.height_index.min(heights.len().saturating_sub(1));
        Ok(heights.get(index).copied().unwrap_or(0))
    }

    async fn scroll_to(&mut self, y: u64) -> FetchResult<()> {
        self.state.record(MockBrowserCall::ScrollTo(y));
        if y > 0 {
            self.height_index += 1;
        }
        Ok(())
    }

    async fn content(&mut self) -> FetchResult<String> {
        self.state.record(MockBrowserCall::Content);
        Ok(self.page.as_ref().map(|p| p.html.clone()).unwrap_or_default())
    }

    async fn screenshot(&mut self) -> FetchResult<Vec<u8>> {
        self.state.record(MockBrowserCall::Screenshot);
        Ok(b"\x89PNG\r\n\x1a\nmock".to_vec())
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.state.record(MockBrowserCall::Close);
        self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
