//! Competitor Intelligence Pipeline
//!
//! Renders a competitor's product or pricing page in a headless browser,
//! extracts a structured product record with an LLM and keeps the latest
//! record per URL in a store.
//!
//! # Design Philosophy
//!
//! - Every run ends in exactly one of a validated record or a classified error
//! - Browser, LLM and storage sit behind traits; the pipeline owns the policy
//! - Retries, timeouts and cancellation are explicit state-machine transitions
//! - Persistence is a side effect after success and never loses the result
//!
//! # Usage
//!
//! ```rust,ignore
//! use competitor_hunter::{Analyzer, MemoryStore};
//! use competitor_hunter::browser::{ChromiumConfig, ChromiumEngine};
//! use competitor_hunter::ai::OpenAI;
//!
//! let analyzer = Analyzer::new(Arc::new(ChromiumEngine::new(ChromiumConfig::default())), OpenAI::from_env()?, MemoryStore::new());
//!
//! let notion = analyzer.analyze("https://www.notion.so/pricing").await?;
//! println!("{}", notion.to_json_pretty()?);
//!
//! let report = analyzer.analyze_batch(&urls).await;
//! analyzer.shutdown().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (BrowserEngine, AI, ProductStore, ScreenshotSink)
//! - [`types`] - Product records, pipeline configuration and run state
//! - [`pipeline`] - Fetch, extract, validate and the orchestration around them
//! - [`browser`] - Session pool, Chromium engine and mock browser
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore) and ResultStore
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod browser;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use config::Settings;
pub use error::{
    AnalysisError, ConfigError, ErrorKind, FetchError, LlmError, Stage, StoreError,
};
pub use normalize::normalize_url;
pub use traits::{
    ai::{Prompt, AI},
    browser::{BrowserEngine, BrowserSession, NavigationPlan},
    screenshot::{CaptureOutcome, ScreenshotSink},
    store::ProductStore,
};
pub use types::{
    config::{
        BatchConfig, ExtractConfig, FetchConfig, PipelineConfig, RetryConfig, RetryPolicy,
        ScrollPolicy,
    },
    content::{RawContent, Screenshot},
    product::{BillingCycle, CompetitorProduct, PricingTier},
    state::{AgentState, AnalysisOptions, AnalysisRequest, Phase, RunReport},
};

// Re-export pipeline components
pub use pipeline::{
    Analyzer, BatchCoordinator, BatchReport, Orchestrator, PageFetcher, SchemaViolation,
    StructuredExtractor,
};

// Re-export browser plumbing
pub use browser::{DirectorySink, SessionPool};

#[cfg(feature = "chromium")]
pub use browser::ChromiumEngine;

// Re-export stores
pub use stores::{MemoryStore, ResultStore};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export testing utilities
pub use testing::{MockAI, MockLlmFailure};
pub use browser::{MockBrowser, MockFailure};
