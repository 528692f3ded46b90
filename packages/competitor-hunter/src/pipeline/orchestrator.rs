//! Per-URL analysis state machine.
//!
//! One run walks `Init -> Fetching -> Extracting -> Validating -> Done`,
//! with `Failed` reachable from every non-terminal phase. Retryable fetch
//! and LLM failures loop on their phase with exponential backoff; schema
//! violations loop back to `Extracting` with a corrective prompt. Every
//! suspension point observes the run's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{AnalysisError, Stage};
use crate::normalize::normalize_url;
use crate::pipeline::extract::{PreparedContent, StructuredExtractor};
use crate::pipeline::fetch::PageFetcher;
use crate::pipeline::validate::SchemaViolation;
use crate::stores::ResultStore;
use crate::traits::ai::AI;
use crate::traits::store::ProductStore;
use crate::types::config::RetryConfig;
use crate::types::content::RawContent;
use crate::types::product::CompetitorProduct;
use crate::types::state::{AnalysisRequest, Phase, RunReport};

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    stage: Stage,
    fut: F,
) -> Result<F::Output, AnalysisError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AnalysisError::cancelled(stage)),
        output = fut => Ok(output),
    }
}

async fn backoff(cancel: &CancellationToken, stage: Stage, delay: Duration) -> Result<(), AnalysisError> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(AnalysisError::cancelled(stage))
        } else {
            Ok(())
        };
    }
    until_cancelled(cancel, stage, tokio::time::sleep(delay)).await
}

/// Drives single analyses from URL to stored record.
pub struct Orchestrator<A: AI, S: ProductStore> {
    fetcher: PageFetcher,
    extractor: StructuredExtractor<A>,
    store: Arc<ResultStore<S>>,
    retry: RetryConfig,
}

impl<A: AI, S: ProductStore> Orchestrator<A, S> {
    pub fn new(
        fetcher: PageFetcher,
        extractor: StructuredExtractor<A>,
        store: Arc<ResultStore<S>>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            retry,
        }
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn extractor(&self) -> &StructuredExtractor<A> {
        &self.extractor
    }

    pub fn store(&self) -> &Arc<ResultStore<S>> {
        &self.store
    }

    /// Run one analysis to a terminal phase.
    ///
    /// Never panics on pipeline failures: the report carries either the
    /// product or the classified error.
    pub async fn run(&self, request: AnalysisRequest, cancel: &CancellationToken) -> RunReport {
        let run_id = Uuid::now_v7();
        let span = info_span!("analysis", %run_id, url = %request.url);
        self.drive(request, cancel).instrument(span).await
    }

    async fn drive(&self, request: AnalysisRequest, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::start(&request.url);

        let product = match self.execute(&request, cancel, &mut report).await {
            Ok(product) => product,
            Err(err) => {
                warn!(stage = %err.stage, kind = %err.kind, error = %err.message, "Analysis failed");
                report.fail(err);
                return report;
            }
        };

        if let Err(err) = report.enter(Phase::Done) {
            report.fail(err);
            return report;
        }

        let product = if report.served_from_store {
            product
        } else {
            self.persist(product, cancel, &mut report).await
        };

        info!(
            product = %product.product_name,
            tiers = product.pricing_tiers.len(),
            features = product.core_features.len(),
            fetch_attempts = report.fetch_attempts,
            llm_calls = report.llm_calls,
            from_store = report.served_from_store,
            "Analysis complete"
        );
        report.state.product = Some(product);
        report
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<CompetitorProduct, AnalysisError> {
        let url = normalize_url(&request.url).map_err(|e| AnalysisError::invalid_input(e.to_string()))?;
        report.state.url = url.clone();

        if cancel.is_cancelled() {
            return Err(AnalysisError::cancelled(Stage::Fetch));
        }

        if let Some(window) = request.options.skip_if_fresh {
            if let Some(product) = self.lookup_fresh(&url, window, cancel).await? {
                report.served_from_store = true;
                return Ok(product);
            }
        }

        report.enter(Phase::Fetching)?;
        let capture = request
            .options
            .capture_screenshot
            .unwrap_or(self.fetcher.config().capture_screenshot);
        let raw = self.fetch_stage(&url, capture, cancel, report).await?;

        report.enter(Phase::Extracting)?;
        let prepared = self.extractor.prepare(&raw);
        report.state.raw_content = Some(raw);

        let result = self.extract_stage(&prepared, &url, cancel, report).await;
        report.state.raw_content = None;
        result
    }

    async fn lookup_fresh(
        &self,
        url: &str,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<CompetitorProduct>, AnalysisError> {
        match until_cancelled(cancel, Stage::Store, self.store.fresh(url, window)).await? {
            Ok(Some(product)) => {
                info!(last_updated = %product.last_updated, "Serving fresh stored record");
                Ok(Some(product))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Freshness lookup failed, analysing anyway");
                Ok(None)
            }
        }
    }

    async fn fetch_stage(
        &self,
        url: &str,
        capture_screenshot: bool,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<RawContent, AnalysisError> {
        let policy = &self.retry.fetch;
        let mut attempt = 0;

        loop {
            attempt += 1;
            report.fetch_attempts = attempt;

            let result = until_cancelled(
                cancel,
                Stage::Fetch,
                self.fetcher.fetch_with(url, capture_screenshot),
            )
            .await?;

            match result {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    backoff(cancel, Stage::Fetch, delay).await?;
                    report.enter(Phase::Fetching)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Request candidates until one validates or the bounds are spent.
    async fn extract_stage(
        &self,
        prepared: &PreparedContent,
        url: &str,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<CompetitorProduct, AnalysisError> {
        let max_corrections = self.extractor.config().max_validation_retries;
        let mut corrections = 0;
        let mut correction: Option<SchemaViolation> = None;

        loop {
            let candidate = self
                .request_candidate(prepared, correction.as_ref(), cancel, report)
                .await?;

            report.enter(Phase::Validating)?;
            match self.extractor.validate(&candidate, url) {
                Ok(product) => return Ok(product),
                Err(violation) if corrections < max_corrections => {
                    corrections += 1;
                    warn!(
                        correction = corrections,
                        issues = violation.issues.len(),
                        error = %violation,
                        "Candidate failed validation, re-prompting"
                    );
                    report.enter(Phase::Extracting)?;
                    correction = Some(violation);
                }
                Err(violation) => return Err(violation.into()),
            }
        }
    }

    async fn request_candidate(
        &self,
        prepared: &PreparedContent,
        correction: Option<&SchemaViolation>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<serde_json::Value, AnalysisError> {
        let policy = &self.retry.llm;
        let mut attempt = 0;

        loop {
            attempt += 1;
            report.llm_calls += 1;

            let result = until_cancelled(
                cancel,
                Stage::Extract,
                self.extractor.request_candidate(prepared, correction),
            )
            .await?;

            match result {
                Ok(candidate) => return Ok(candidate),
                Err(e) if e.is_retryable() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    backoff(cancel, Stage::Extract, delay).await?;
                    report.enter(Phase::Extracting)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Upsert `product`. Failures are recorded on the report; the product
    /// is returned either way.
    async fn persist(
        &self,
        product: CompetitorProduct,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> CompetitorProduct {
        match until_cancelled(cancel, Stage::Store, self.store.upsert(product.clone())).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to persist product");
                report.store_error = Some(e.into());
                product
            }
            Err(cancelled) => {
                warn!("Cancelled while persisting product");
                report.store_error = Some(cancelled);
                product
            }
        }
    }
}
