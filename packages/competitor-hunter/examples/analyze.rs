//! Analyse competitor pages from the command line.
//!
//! Renders each URL in Chromium, extracts a product record with OpenAI and
//! stores it in SQLite at `DB_PATH`. One URL prints the record as JSON;
//! several run as a batch and print a summary.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example analyze --features chromium,openai,sqlite -- \
//!     https://www.notion.so/pricing https://linear.app/pricing
//! ```

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use competitor_hunter::ai::OpenAI;
use competitor_hunter::browser::{ChromiumConfig, ChromiumEngine, DirectorySink};
use competitor_hunter::{Analyzer, Settings, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,competitor_hunter=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: analyze <url> [<url> ...]");
    }

    let settings = Settings::from_env().context("Failed to load configuration")?;
    settings.ensure_dirs().context("Failed to create data directories")?;
    tracing::info!(model = %settings.llm.model, db = %settings.db_path.display(), "Configuration loaded");

    let store = SqliteStore::open(&settings.db_path)
        .await
        .context("Failed to open database")?;

    let mut chromium = ChromiumConfig::default();
    if let Some(bin) = &settings.chrome_bin {
        chromium = chromium.with_executable(bin);
    }

    let analyzer = Analyzer::with_screenshot_sink(
        Arc::new(ChromiumEngine::new(chromium)),
        OpenAI::from_credentials(settings.llm.clone()),
        store,
        settings.pipeline_config(),
        Arc::new(DirectorySink::new(&settings.screenshot_dir)),
    );

    let outcome = run(&analyzer, &urls).await;
    analyzer.shutdown().await.context("Shutdown failed")?;
    outcome
}

async fn run(analyzer: &Analyzer<OpenAI, SqliteStore>, urls: &[String]) -> Result<()> {
    if let [url] = urls {
        let product = analyzer.analyze(url).await?;
        println!("{}", product.to_json_pretty()?);
        return Ok(());
    }

    let report = analyzer.analyze_batch(urls).await;
    for (url, result) in &report.results {
        match result {
            Ok(product) => println!(
                "OK    {url}  {} ({} tiers, {} features)",
                product.product_name,
                product.pricing_tiers.len(),
                product.core_features.len()
            ),
            Err(e) => println!("FAIL  {url}  {e}"),
        }
    }
    println!(
        "\n{} succeeded, {} failed, {} served from store",
        report.succeeded(),
        report.failed(),
        report.served_from_store.len()
    );
    Ok(())
}
