//! The invocation surface: single and batch analysis plus shutdown.

use futures::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::browser::pool::SessionPool;
use crate::error::{AnalysisError, StoreResult};
use crate::pipeline::batch::{BatchCoordinator, BatchReport};
use crate::pipeline::extract::StructuredExtractor;
use crate::pipeline::fetch::PageFetcher;
use crate::pipeline::orchestrator::Orchestrator;
use crate::stores::ResultStore;
use crate::traits::ai::AI;
use crate::traits::browser::BrowserEngine;
use crate::traits::screenshot::ScreenshotSink;
use crate::traits::store::ProductStore;
use crate::types::config::PipelineConfig;
use crate::types::product::CompetitorProduct;
use crate::types::state::{AnalysisRequest, RunReport};

/// Owns the session pool, the store and the orchestrator.
///
/// Create one per process and call [`Analyzer::shutdown`] before exit.
///
/// ```rust,ignore
/// let analyzer = Analyzer::new(Arc::new(ChromiumEngine::new(ChromiumConfig::default())), OpenAI::from_env()?, store);
/// let product = analyzer.analyze("https://www.notion.so/pricing").await?;
/// analyzer.shutdown().await?;
/// ```
pub struct Analyzer<A: AI, S: ProductStore> {
    orchestrator: Arc<Orchestrator<A, S>>,
    batch: BatchCoordinator<A, S>,
    pool: SessionPool,
    store: Arc<ResultStore<S>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl<A: AI, S: ProductStore> Analyzer<A, S> {
    pub fn new(engine: Arc<dyn BrowserEngine>, ai: A, store: S) -> Self {
        Self::with_config(engine, ai, store, PipelineConfig::default())
    }

    pub fn with_config(engine: Arc<dyn BrowserEngine>, ai: A, store: S, config: PipelineConfig) -> Self {
        Self::assemble(engine, ai, store, config, None)
    }

    /// Like [`Analyzer::with_config`], handing screenshots to `sink`.
    pub fn with_screenshot_sink(
        engine: Arc<dyn BrowserEngine>,
        ai: A,
        store: S,
        config: PipelineConfig,
        sink: Arc<dyn ScreenshotSink>,
    ) -> Self {
        Self::assemble(engine, ai, store, config, Some(sink))
    }

    fn assemble(
        engine: Arc<dyn BrowserEngine>,
        ai: A,
        store: S,
        config: PipelineConfig,
        sink: Option<Arc<dyn ScreenshotSink>>,
    ) -> Self {
        let pool = SessionPool::new(engine, config.fetch.headless, config.fetch.max_sessions);
        let mut fetcher = PageFetcher::new(pool.clone(), config.fetch);
        if let Some(sink) = sink {
            fetcher = fetcher.with_screenshot_sink(sink);
        }

        let store = Arc::new(ResultStore::new(store));
        let orchestrator = Arc::new(Orchestrator::new(
            fetcher,
            StructuredExtractor::new(ai, config.extract),
            store.clone(),
            config.retry,
        ));

        Self {
            batch: BatchCoordinator::new(orchestrator.clone(), config.batch),
            orchestrator,
            pool,
            store,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn store(&self) -> &ResultStore<S> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator<A, S> {
        &self.orchestrator
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Analyse `url` and return the stored record.
    pub async fn analyze(&self, url: &str) -> Result<CompetitorProduct, AnalysisError> {
        self.orchestrator
            .run(AnalysisRequest::new(url), &self.shutdown.child_token())
            .await
            .into_result()
    }

    /// Run `request` to completion and return the full report.
    ///
    /// The run stops early when either `cancel` or the analyzer's shutdown fires.
    pub async fn run(&self, request: AnalysisRequest, cancel: &CancellationToken) -> RunReport {
        let token = self.shutdown.child_token();
        let linked = async {
            cancel.cancelled().await;
            token.cancel();
            future::pending::<RunReport>().await
        };

        tokio::select! {
            report = self.orchestrator.run(request, &token) => report,
            report = linked => report,
        }
    }

    /// Analyse `url`, stopping when `cancel` fires.
    pub async fn analyze_with_cancel(&self, url: &str, cancel: &CancellationToken) -> RunReport {
        self.run(AnalysisRequest::new(url), cancel).await
    }

    /// Analyse many URLs under the configured concurrency bound.
    pub async fn analyze_batch(&self, urls: &[String]) -> BatchReport {
        self.batch.run_all(urls, &self.shutdown.child_token()).await
    }

    /// The stored record for `url`.
    pub async fn stored(&self, url: &str) -> StoreResult<CompetitorProduct> {
        self.store.get(url).await
    }

    /// Cancel in-flight runs, close the browser pool and the store.
    ///
    /// Idempotent. Later analyses fail with `Cancelled`.
    pub async fn shutdown(&self) -> Result<(), AnalysisError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        let pool = self.pool.shutdown().await;
        let store = self.store.close().await;
        info!("Analyzer shut down");

        pool?;
        store?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBrowser, MockFailure};
    use crate::error::{ErrorKind, Stage};
    use crate::stores::MemoryStore;
    use crate::testing::{fixtures, MockAI};

    fn analyzer(browser: &MockBrowser, ai: &MockAI) -> Analyzer<MockAI, MemoryStore> {
        Analyzer::with_config(
            Arc::new(browser.clone()),
            ai.clone(),
            MemoryStore::new(),
            PipelineConfig::immediate(),
        )
    }

    #[tokio::test]
    async fn test_analyze_then_stored() {
        let browser = MockBrowser::new().with_page(fixtures::NOTION_URL, fixtures::NOTION_HTML);
        let ai = MockAI::new().with_response(fixtures::notion_candidate());
        let analyzer = analyzer(&browser, &ai);

        let product = analyzer.analyze("https://www.notion.so/pricing#plans").await.unwrap();
        let stored = analyzer.stored(fixtures::NOTION_URL).await.unwrap();

        assert_eq!(product, stored);
    }

    #[tokio::test]
    async fn test_cancel_mid_fetch_releases_session_slot() {
        let browser = MockBrowser::new().failing_always("https://slow.example", MockFailure::Hang);
        let analyzer = Arc::new(analyzer(&browser, &MockAI::new()));
        let before = analyzer.pool().available();
        let cancel = CancellationToken::new();

        let task = {
            let analyzer = analyzer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { analyzer.analyze_with_cancel("https://slow.example", &cancel).await })
        };

        browser.navigation_started().await;
        assert_eq!(analyzer.pool().available(), before - 1);

        cancel.cancel();
        let report = task.await.unwrap();

        let err = report.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(err.stage, Stage::Fetch);
        assert_eq!(analyzer.pool().available(), before);
        assert_eq!(analyzer.pool().idle_sessions(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_closes() {
        let browser = MockBrowser::new().with_default_page("<p>ok</p>");
        let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
        let analyzer = analyzer(&browser, &ai);

        analyzer.analyze("https://example.com").await.unwrap();
        assert_eq!(analyzer.pool().idle_sessions(), 1);

        analyzer.shutdown().await.unwrap();
        analyzer.shutdown().await.unwrap();

        assert!(analyzer.is_shut_down());
        assert!(browser.is_shut_down());
        assert_eq!(browser.sessions_closed(), 1);

        let err = analyzer.analyze("https://example.com").await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
