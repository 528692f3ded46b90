//! Integration tests for end-to-end analysis runs.
//!
//! These tests drive the public `Analyzer` surface with the mock browser
//! and mock LLM:
//! 1. Render a page
//! 2. Extract and validate a record (with corrective re-prompts)
//! 3. Persist it under the normalized URL
//! 4. Classify every failure

use std::sync::Arc;
use std::time::Duration;

use competitor_hunter::{
    testing::{fixtures, FailingStore, MockAI},
    Analyzer, AnalysisOptions, AnalysisRequest, BillingCycle, CompetitorProduct, ErrorKind,
    MemoryStore, MockBrowser, MockFailure, Phase, PipelineConfig, ProductStore, RetryPolicy,
    Stage,
};
use tokio_util::sync::CancellationToken;

/// Helper to build an analyzer over mocks with zero backoff and no scrolling.
fn analyzer_with<S: ProductStore>(
    browser: &MockBrowser,
    ai: &MockAI,
    store: S,
    config: PipelineConfig,
) -> Analyzer<MockAI, S> {
    Analyzer::with_config(Arc::new(browser.clone()), ai.clone(), store, config)
}

fn analyzer(browser: &MockBrowser, ai: &MockAI) -> Analyzer<MockAI, MemoryStore> {
    analyzer_with(browser, ai, MemoryStore::new(), PipelineConfig::immediate())
}

fn notion_browser() -> MockBrowser {
    MockBrowser::new().with_page(fixtures::NOTION_URL, fixtures::NOTION_HTML)
}

#[tokio::test]
async fn test_notion_pricing_page() {
    let ai = MockAI::new().with_response(fixtures::notion_candidate());
    let analyzer = analyzer(&notion_browser(), &ai);

    let product = analyzer.analyze("https://www.notion.so/pricing").await.unwrap();

    assert_eq!(product.product_name, "Notion");
    assert_eq!(product.pricing_tiers.len(), 4);
    assert_eq!(
        product.tier("Enterprise").unwrap().billing_cycle,
        BillingCycle::Custom
    );
    assert_eq!(product.core_features.len(), 13);
    assert!(product.summary.contains("SWOT"));
}

#[tokio::test]
async fn test_product_url_is_normalized_input() {
    let ai = MockAI::new().with_response(fixtures::notion_candidate());
    let analyzer = analyzer(&notion_browser(), &ai);

    let product = analyzer
        .analyze("HTTPS://WWW.Notion.so/pricing/?utm_campaign=spring#enterprise")
        .await
        .unwrap();

    assert_eq!(product.url, fixtures::NOTION_URL);
    assert_eq!(analyzer.stored(fixtures::NOTION_URL).await.unwrap(), product);
}

#[tokio::test]
async fn test_output_json_round_trip() {
    let ai = MockAI::new().with_response(fixtures::notion_candidate());
    let analyzer = analyzer(&notion_browser(), &ai);

    let product = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();
    let json = product.to_json_pretty().unwrap();

    assert_eq!(CompetitorProduct::from_json(&json).unwrap(), product);
}

#[tokio::test]
async fn test_reanalysis_is_idempotent() {
    let ai = MockAI::new().with_default_response(fixtures::notion_candidate());
    let analyzer = analyzer(&notion_browser(), &ai);

    let first = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();
    let second = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();

    assert!(second.last_updated >= first.last_updated);
    assert_eq!(second.product_name, first.product_name);
    assert_eq!(second.pricing_tiers, first.pricing_tiers);
    assert_eq!(second.core_features, first.core_features);
    assert_eq!(second.summary, first.summary);
    assert_eq!(analyzer.store().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_url_never_reaches_browser() {
    let browser = MockBrowser::new();
    let ai = MockAI::new();
    let analyzer = analyzer(&browser, &ai);

    let err = analyzer.analyze("not a url").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidInput);
    assert!(!err.retryable);
    assert_eq!(browser.invocation_count(), 0);
    assert_eq!(ai.call_count(), 0);
}

#[tokio::test]
async fn test_missing_core_features_gets_one_correction() {
    let ai = MockAI::new().with_default_response(fixtures::candidate_without_core_features());
    let analyzer = analyzer(&notion_browser(), &ai);

    let report = analyzer
        .run(AnalysisRequest::new(fixtures::NOTION_URL), &CancellationToken::new())
        .await;

    let err = report.error().unwrap();
    assert_eq!(err.stage, Stage::Validate);
    assert_eq!(err.kind, ErrorKind::SchemaValidationFailure);
    assert!(err.message.contains("core_features"));
    assert_eq!(report.llm_calls, 2);
    assert_eq!(ai.call_count(), 2);
    assert!(ai.calls()[1].user.contains("core_features"));
    assert!(analyzer.store().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retryable_fetch_failure_tries_exactly_max_attempts() {
    let browser = MockBrowser::new().failing_always("https://example.com/pricing", MockFailure::Connection);
    let ai = MockAI::new();
    let mut config = PipelineConfig::immediate();
    config.retry.fetch = RetryPolicy::immediate(4);
    let analyzer = analyzer_with(&browser, &ai, MemoryStore::new(), config);

    let report = analyzer
        .run(AnalysisRequest::new("https://example.com/pricing"), &CancellationToken::new())
        .await;

    assert_eq!(report.fetch_attempts, 4);
    assert_eq!(browser.navigation_count(), 4);
    assert_eq!(report.error().unwrap().kind, ErrorKind::FetchFailure);
    assert!(report.error().unwrap().retryable);
    assert_eq!(
        report.transitions.iter().filter(|p| **p == Phase::Fetching).count(),
        4
    );
}

#[tokio::test(start_paused = true)]
async fn test_fetch_backoff_is_exponential() {
    let browser = MockBrowser::new().failing_always("https://example.com", MockFailure::Connection);
    let ai = MockAI::new();
    let mut config = PipelineConfig::immediate();
    config.retry.fetch = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        multiplier: 2.0,
        jitter: false,
    };
    let analyzer = analyzer_with(&browser, &ai, MemoryStore::new(), config);

    let started = tokio::time::Instant::now();
    analyzer.analyze("https://example.com").await.unwrap_err();

    // 2s after the first failure, 4s after the second
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(started.elapsed() < Duration::from_secs(7));
}

#[tokio::test]
async fn test_blocked_page_is_not_retried() {
    let browser = MockBrowser::new().with_page("https://example.com", fixtures::CHALLENGE_HTML);
    let ai = MockAI::new();
    let analyzer = analyzer(&browser, &ai);

    let err = analyzer.analyze("https://example.com").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::FetchBlocked);
    assert!(!err.retryable);
    assert_eq!(browser.navigation_count(), 1);
    assert_eq!(ai.call_count(), 0);
}

#[tokio::test]
async fn test_page_with_bot_manager_scripts_is_analyzed() {
    let html = format!(
        r#"{}<script src="/cdn-cgi/challenge-platform/scripts/jsd/main.js"></script><script src="https://js.datadome.co/tags.js" async></script>"#,
        fixtures::NOTION_HTML
    );
    let browser = MockBrowser::new().with_page(fixtures::NOTION_URL, html);
    let ai = MockAI::new().with_response(fixtures::notion_candidate());
    let analyzer = analyzer(&browser, &ai);

    let product = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();

    assert_eq!(product.pricing_tiers.len(), 4);
    assert_eq!(ai.call_count(), 1);
}

#[tokio::test]
async fn test_store_failure_still_returns_product() {
    let ai = MockAI::new().with_response(fixtures::notion_candidate());
    let analyzer = analyzer_with(
        &notion_browser(),
        &ai,
        FailingStore::new(),
        PipelineConfig::immediate(),
    );

    let report = analyzer
        .run(AnalysisRequest::new(fixtures::NOTION_URL), &CancellationToken::new())
        .await;

    assert_eq!(report.phase(), Phase::Done);
    assert_eq!(report.store_error.as_ref().unwrap().stage, Stage::Store);
    assert_eq!(report.into_result().unwrap().pricing_tiers.len(), 4);
}

#[tokio::test]
async fn test_skip_if_fresh_uses_stored_record() {
    let browser = notion_browser();
    let ai = MockAI::new().with_default_response(fixtures::notion_candidate());
    let analyzer = analyzer(&browser, &ai);
    let first = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();

    let request = AnalysisRequest::new(fixtures::NOTION_URL).with_options(AnalysisOptions {
        skip_if_fresh: Some(Duration::from_secs(86_400)),
        ..Default::default()
    });
    let report = analyzer.run(request, &CancellationToken::new()).await;

    assert!(report.served_from_store);
    assert_eq!(report.into_result().unwrap(), first);
    assert_eq!(browser.navigation_count(), 1);
}

#[tokio::test]
async fn test_batch_one_entry_per_url() {
    let browser = MockBrowser::new()
        .with_page(fixtures::NOTION_URL, fixtures::NOTION_HTML)
        .with_page("https://linear.app/pricing", "<h1>Linear</h1>")
        .with_page("https://blocked.example", fixtures::CHALLENGE_HTML);
    let ai = MockAI::new().with_default_response(fixtures::simple_candidate("Acme"));
    let analyzer = analyzer(&browser, &ai);

    let urls: Vec<String> = [
        fixtures::NOTION_URL,
        "https://linear.app/pricing",
        "https://blocked.example",
        "ftp://files.example",
        fixtures::NOTION_URL,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let report = analyzer.analyze_batch(&urls).await;

    assert_eq!(report.len(), 4);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(
        report.get("https://blocked.example").unwrap().as_ref().unwrap_err().kind,
        ErrorKind::FetchBlocked
    );
    assert_eq!(
        report.get("ftp://files.example").unwrap().as_ref().unwrap_err().kind,
        ErrorKind::InvalidInput
    );
    assert_eq!(analyzer.store().list().await.unwrap().len(), 2);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    use competitor_hunter::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("competitors.db");
    let ai = MockAI::new().with_response(fixtures::notion_candidate());

    let analyzer = analyzer_with(
        &notion_browser(),
        &ai,
        SqliteStore::open(&path).await.unwrap(),
        PipelineConfig::immediate(),
    );
    let product = analyzer.analyze(fixtures::NOTION_URL).await.unwrap();
    analyzer.shutdown().await.unwrap();

    let reopened = SqliteStore::open(&path).await.unwrap();
    let stored = reopened.get_product(fixtures::NOTION_URL).await.unwrap();
    assert_eq!(stored, Some(product));
}
