//! Analysis pipeline.
//!
//! The pipeline drives each URL through:
//! - Fetch (rendered page via the session pool, anti-detection policy)
//! - Extract (HTML to markdown, token budget, LLM candidate)
//! - Validate (schema check with corrective re-prompts)
//! - Store (per-key serialized upsert)
//!
//! [`Orchestrator`] is the per-URL state machine, [`BatchCoordinator`]
//! fans out over many URLs and [`Analyzer`] is the public entry point.

pub mod analyzer;
pub mod batch;
pub mod extract;
pub mod fetch;
pub mod markdown;
pub mod orchestrator;
pub mod prompts;
pub mod validate;

pub use analyzer::Analyzer;
pub use batch::{BatchCoordinator, BatchReport};
pub use extract::{PreparedContent, StructuredExtractor};
pub use fetch::{detect_block, PageFetcher};
pub use markdown::{html_to_markdown, truncate_middle, TRUNCATION_MARKER};
pub use orchestrator::Orchestrator;
pub use prompts::{format_extract_prompt, prompt_hash, EXTRACT_PROMPT, SYSTEM_PROMPT};
pub use validate::{validate_candidate, SchemaIssue, SchemaViolation};
