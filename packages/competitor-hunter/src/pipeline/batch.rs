//! Bounded-concurrency analysis of many URLs.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indexmap::{IndexMap, IndexSet};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{AnalysisError, Stage};
use crate::pipeline::orchestrator::Orchestrator;
use crate::traits::ai::AI;
use crate::traits::store::ProductStore;
use crate::types::config::BatchConfig;
use crate::types::product::CompetitorProduct;
use crate::types::state::{AnalysisOptions, AnalysisRequest};

/// Outcome of a batch, one entry per distinct input URL in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: IndexMap<String, Result<CompetitorProduct, AnalysisError>>,

    /// Input URLs answered from the store without re-analysis
    pub served_from_store: Vec<String>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Result<CompetitorProduct, AnalysisError>> {
        self.results.get(url)
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    /// Successful products, in input order.
    pub fn products(&self) -> impl Iterator<Item = &CompetitorProduct> {
        self.results.values().filter_map(|r| r.as_ref().ok())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs orchestrations for many URLs, at most `concurrency` at a time.
pub struct BatchCoordinator<A: AI, S: ProductStore> {
    orchestrator: Arc<Orchestrator<A, S>>,
    config: BatchConfig,
}

impl<A: AI, S: ProductStore> BatchCoordinator<A, S> {
    pub fn new(orchestrator: Arc<Orchestrator<A, S>>, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Analyse every URL. A failing or panicking run never affects the others.
    pub async fn run_all(&self, urls: &[String], cancel: &CancellationToken) -> BatchReport {
        let unique: IndexSet<&String> = urls.iter().collect();
        let concurrency = self.config.concurrency.max(1);
        let options = AnalysisOptions {
            skip_if_fresh: self.config.freshness_window,
            ..Default::default()
        };

        info!(
            urls = unique.len(),
            duplicates = urls.len() - unique.len(),
            concurrency,
            "Starting batch"
        );

        let mut outcomes: HashMap<&String, _> = stream::iter(unique.iter().copied())
            .map(|url| {
                let request = AnalysisRequest::new(url.clone()).with_options(options.clone());
                async move {
                    let outcome = AssertUnwindSafe(self.orchestrator.run(request, cancel))
                        .catch_unwind()
                        .await;
                    (url, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for url in unique {
            let result = match outcomes.remove(url) {
                Some(Ok(run)) => {
                    if run.served_from_store {
                        report.served_from_store.push(url.clone());
                    }
                    run.into_result()
                }
                Some(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!(url = %url, panic = %message, "Analysis panicked");
                    Err(AnalysisError::internal(Stage::Fetch, format!("analysis panicked: {message}")))
                }
                None => Err(AnalysisError::internal(Stage::Fetch, "analysis produced no outcome")),
            };
            report.results.insert(url.clone(), result);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            from_store = report.served_from_store.len(),
            "Batch complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBrowser;
    use crate::browser::pool::SessionPool;
    use crate::error::ErrorKind;
    use crate::pipeline::extract::StructuredExtractor;
    use crate::pipeline::fetch::PageFetcher;
    use crate::stores::{MemoryStore, ResultStore};
    use crate::testing::{fixtures, MockAI};
    use crate::types::config::PipelineConfig;
    use std::time::Duration;

    fn coordinator(
        browser: &MockBrowser,
        ai: &MockAI,
        config: PipelineConfig,
    ) -> BatchCoordinator<MockAI, MemoryStore> {
        let pool = SessionPool::new(Arc::new(browser.clone()), true, config.fetch.max_sessions);
        let orchestrator = Orchestrator::new(
            PageFetcher::new(pool, config.fetch),
            StructuredExtractor::new(ai.clone(), config.extract),
            Arc::new(ResultStore::new(MemoryStore::new())),
            config.retry,
        );
        BatchCoordinator::new(Arc::new(orchestrator), config.batch)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failures_isolated_and_order_kept() {
        let browser = MockBrowser::new()
            .with_page("https://a.example", "<p>a</p>")
            .with_page("https://c.example", "<p>c</p>");
        let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
        let batch = coordinator(&browser, &ai, PipelineConfig::immediate());

        let input = urls(&["https://c.example", "not a url", "https://a.example", "https://c.example"]);
        let report = batch.run_all(&input, &CancellationToken::new()).await;

        assert_eq!(report.len(), 3);
        assert_eq!(
            report.results.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["https://c.example", "not a url", "https://a.example"]
        );
        assert_eq!(report.succeeded(), 2);
        assert_eq!(
            report.get("not a url").unwrap().as_ref().unwrap_err().kind,
            ErrorKind::InvalidInput
        );
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let browser = MockBrowser::new()
            .with_default_page("<p>ok</p>")
            .with_navigation_delay(Duration::from_millis(20));
        let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
        let mut config = PipelineConfig::immediate();
        config.fetch = config.fetch.with_max_sessions(8);
        config.batch = config.batch.with_concurrency(2);
        let batch = coordinator(&browser, &ai, config);

        let input: Vec<String> = (0..6).map(|i| format!("https://example.com/{i}")).collect();
        let report = batch.run_all(&input, &CancellationToken::new()).await;

        assert_eq!(report.succeeded(), 6);
        assert!(browser.max_concurrent_navigations() <= 2);
        assert!(browser.max_concurrent_navigations() >= 1);
    }

    #[tokio::test]
    async fn test_freshness_window_skips_reanalysis() {
        let browser = MockBrowser::new().with_default_page("<p>ok</p>");
        let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
        let mut config = PipelineConfig::immediate();
        config.batch = config.batch.with_freshness_window(Duration::from_secs(600));
        let batch = coordinator(&browser, &ai, config);
        let cancel = CancellationToken::new();

        batch.run_all(&urls(&["https://example.com/a"]), &cancel).await;
        let report = batch
            .run_all(&urls(&["https://example.com/a/", "https://example.com/b"]), &cancel)
            .await;

        assert_eq!(report.served_from_store, vec!["https://example.com/a/".to_string()]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(browser.navigation_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_every_url() {
        let browser = MockBrowser::new().with_default_page("<p>ok</p>");
        let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
        let batch = coordinator(&browser, &ai, PipelineConfig::immediate());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = batch
            .run_all(&urls(&["https://a.example", "https://b.example"]), &cancel)
            .await;

        assert_eq!(report.failed(), 2);
        assert!(report
            .results
            .values()
            .all(|r| r.as_ref().unwrap_err().is_cancelled()));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
