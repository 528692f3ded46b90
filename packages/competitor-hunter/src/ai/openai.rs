//! OpenAI implementation of the AI trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use competitor_hunter::ai::OpenAI;
//!
//! let ai = OpenAI::new("sk-...").with_model("gpt-4o");
//! let analyzer = Analyzer::new(engine, ai, store);
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{ConfigResult, LlmError, LlmResult};
use crate::pipeline::validate::strip_code_fences;
use crate::security::LlmCredentials;
use crate::traits::ai::{Prompt, AI};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// OpenAI chat completions client.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    credentials: LlmCredentials,
    max_tokens: u32,
}

impl OpenAI {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_credentials(LlmCredentials::new(api_key))
    }

    pub fn from_credentials(credentials: LlmCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            max_tokens: 4096,
        }
    }

    /// Create from `OPENAI_API_KEY`, `OPENAI_MODEL_NAME` and `OPENAI_BASE_URL`.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self::from_credentials(Settings::from_env()?.llm))
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.credentials.model = model.into();
        self
    }

    /// Set a custom base URL (for proxies or compatible providers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.credentials.base_url = Some(url.into());
        self
    }

    /// Cap the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.credentials.model
    }

    fn endpoint(&self) -> String {
        let base = self
            .credentials
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn request<'a>(&'a self, prompt: &'a Prompt, schema_hint: &'a Value) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.credentials.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "competitor_product",
                    strict: false,
                    schema: schema_hint,
                },
            },
        }
    }
}

/// Map an unsuccessful HTTP status to an LLM error.
fn status_error(status: StatusCode, body: &str) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        StatusCode::REQUEST_TIMEOUT => LlmError::Unavailable {
            status: status.as_u16(),
        },
        s if s.is_server_error() => LlmError::Unavailable { status: s.as_u16() },
        s => {
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            LlmError::Rejected(format!("HTTP {}: {}", s.as_u16(), body))
        }
    }
}

/// The error body, or nothing when it could not be read.
fn body_or_empty<E: std::fmt::Display>(status: StatusCode, body: Result<String, E>) -> String {
    body.unwrap_or_else(|e| {
        debug!(status = status.as_u16(), error = %e, "Failed to read OpenAI error body");
        String::new()
    })
}

/// Parse the assistant message into a JSON object.
fn parse_content(content: &str) -> LlmResult<Value> {
    let body = strip_code_fences(content);
    match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(LlmError::MalformedResponse("expected a JSON object".into())),
        Err(e) => Err(LlmError::MalformedResponse(e.to_string())),
    }
}

#[async_trait]
impl AI for OpenAI {
    async fn complete(&self, prompt: &Prompt, schema_hint: &Value) -> LlmResult<Value> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.credentials.api_key.expose())
            .json(&self.request(prompt, schema_hint))
            .send()
            .await
            .map_err(|e| LlmError::Transport(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = body_or_empty(status, response.text().await);
            return Err(status_error(status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &chat.usage {
            debug!(
                model = %self.credentials.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI completion"
            );
        }

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".into()))?;

        parse_content(&content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_builder() {
        let ai = OpenAI::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_base_url("https://custom.api.com/v1/");

        assert_eq!(ai.model(), "gpt-4o-mini");
        assert_eq!(ai.endpoint(), "https://custom.api.com/v1/chat/completions");
        assert_eq!(OpenAI::new("k").endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_request_shape() {
        let ai = OpenAI::new("sk-test");
        let prompt = Prompt::new("system text", "user text");
        let schema = json!({"type": "object"});

        let body = serde_json::to_value(ai.request(&prompt, &schema)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user text");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], false);
        assert_eq!(body["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn test_parse_content() {
        assert_eq!(
            parse_content("```json\n{\"product_name\": \"Acme\"}\n```").unwrap(),
            json!({"product_name": "Acme"})
        );
        assert!(matches!(parse_content("[1, 2]"), Err(LlmError::MalformedResponse(_))));
        assert!(matches!(parse_content("Sure! Here"), Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            LlmError::Unavailable { status: 502 }
        ));

        let unreadable = body_or_empty(StatusCode::BAD_REQUEST, Err::<String, _>("connection reset"));
        assert!(unreadable.is_empty());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, &unreadable),
            LlmError::Rejected(msg) if msg == "HTTP 400: "
        ));

        let rejected = status_error(StatusCode::UNAUTHORIZED, "invalid api key");
        assert!(!rejected.is_retryable());
        assert!(rejected.to_string().contains("HTTP 401"));
    }
}
