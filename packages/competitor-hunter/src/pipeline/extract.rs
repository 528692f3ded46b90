//! Structured extraction: rendered page to validated product.
//!
//! The extractor exposes its steps separately (prepare, request a
//! candidate, validate) so the orchestrator can run them as distinct
//! states. [`StructuredExtractor::extract`] chains them for one pass.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AnalysisError, LlmError, LlmResult};
use crate::pipeline::markdown::{extract_title, html_to_markdown, truncate_middle};
use crate::pipeline::prompts::format_extract_prompt;
use crate::pipeline::validate::{validate_candidate, SchemaViolation};
use crate::traits::ai::AI;
use crate::types::config::ExtractConfig;
use crate::types::content::RawContent;
use crate::types::product::{CompetitorProduct, ProductCandidate};

/// Page text ready to be sent to the LLM.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    pub url: String,
    pub title: Option<String>,
    pub text: String,

    /// Whether the middle of the page was cut to fit the budget
    pub truncated: bool,
}

/// Turns rendered pages into validated product records.
pub struct StructuredExtractor<A: AI> {
    ai: A,
    config: ExtractConfig,
    schema_hint: Value,
}

impl<A: AI> StructuredExtractor<A> {
    pub fn new(ai: A, config: ExtractConfig) -> Self {
        Self {
            ai,
            config,
            schema_hint: ProductCandidate::schema_hint(),
        }
    }

    pub fn ai(&self) -> &A {
        &self.ai
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Convert markup to text and fit it into the token budget.
    pub fn prepare(&self, raw: &RawContent) -> PreparedContent {
        let markdown = html_to_markdown(&raw.text);
        let original_chars = markdown.chars().count();
        let (text, truncated) = truncate_middle(&markdown, self.config.max_chars());

        if truncated {
            info!(
                url = %raw.url,
                original_chars,
                max_chars = self.config.max_chars(),
                "Page text over budget, truncated middle"
            );
        }

        PreparedContent {
            url: raw.url.clone(),
            title: extract_title(&raw.text),
            text,
            truncated,
        }
    }

    /// Ask the LLM for a candidate record.
    ///
    /// `correction` carries the violations of the previous candidate.
    pub async fn request_candidate(
        &self,
        prepared: &PreparedContent,
        correction: Option<&SchemaViolation>,
    ) -> LlmResult<Value> {
        let prompt = format_extract_prompt(&prepared.url, &prepared.text, correction);

        debug!(
            url = %prepared.url,
            ai = self.ai.name(),
            chars = prepared.text.len(),
            corrective = correction.is_some(),
            "Requesting candidate"
        );

        match tokio::time::timeout(
            self.config.llm_timeout,
            self.ai.complete(&prompt, &self.schema_hint),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                timeout_ms: self.config.llm_timeout.as_millis() as u64,
            }),
        }
    }

    /// Validate a candidate for `url`, stamping it with the current time.
    pub fn validate(&self, candidate: &Value, url: &str) -> Result<CompetitorProduct, SchemaViolation> {
        validate_candidate(candidate, url, Utc::now())
    }

    /// One pass: prepare, request, validate. No retries.
    pub async fn extract(&self, raw: &RawContent) -> Result<CompetitorProduct, AnalysisError> {
        let prepared = self.prepare(raw);
        let candidate = self.request_candidate(&prepared, None).await?;
        Ok(self.validate(&candidate, &raw.url)?)
    }
}
