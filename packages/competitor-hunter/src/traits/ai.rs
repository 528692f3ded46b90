//! AI trait for LLM operations.
//!
//! The pipeline needs exactly one capability from a language model:
//! turn a prompt into a JSON candidate record. Implementations wrap a
//! specific provider and handle transport, authentication and reply parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;

/// A system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// AI trait for LLM operations.
#[async_trait]
pub trait AI: Send + Sync {
    /// Complete `prompt`, returning the model's JSON reply.
    ///
    /// `schema_hint` is the JSON schema the reply should follow. Providers
    /// may pass it through as a structured-output constraint or ignore it;
    /// the caller validates the reply either way.
    async fn complete(
        &self,
        prompt: &Prompt,
        schema_hint: &serde_json::Value,
    ) -> LlmResult<serde_json::Value>;

    /// Provider name for logging.
    fn name(&self) -> &str {
        "ai"
    }
}
