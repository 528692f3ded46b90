//! Typed errors for the analysis pipeline.
//!
//! Each collaborator (browser, LLM, store, configuration) has its own
//! `thiserror` enum. The orchestrator folds them into an [`AnalysisError`],
//! the classified record every failed run ends with.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Validate,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Store => "store",
        })
    }
}

/// Classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unsupported URL. Never retried.
    InvalidInput,
    /// Navigation did not complete in time.
    FetchTimeout,
    /// DNS, connection or HTTP status failure.
    FetchFailure,
    /// Bot wall or CAPTCHA interstitial. Never retried.
    FetchBlocked,
    /// LLM call failed, timed out or returned something that is not JSON.
    ExtractionFailure,
    /// Candidate record did not satisfy the product schema.
    SchemaValidationFailure,
    /// Persisting the record failed.
    StoreFailure,
    /// The run was cancelled.
    Cancelled,
    /// Anything unclassified.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::FetchTimeout => "fetch_timeout",
            ErrorKind::FetchFailure => "fetch_failure",
            ErrorKind::FetchBlocked => "fetch_blocked",
            ErrorKind::ExtractionFailure => "extraction_failure",
            ErrorKind::SchemaValidationFailure => "schema_validation_failure",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        })
    }
}

/// The classified failure of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage} failed ({kind}): {message}")]
pub struct AnalysisError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl AnalysisError {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Malformed input, rejected before any browser interaction.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(Stage::Fetch, ErrorKind::InvalidInput, message, false)
    }

    /// Cancellation observed while in `stage`.
    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, ErrorKind::Cancelled, "analysis cancelled", false)
    }

    pub fn internal(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::Internal, message, false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Errors raised while rendering a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL is not an absolute http(s) URL with a host
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Navigation or capture exceeded its deadline
    #[error("timed out after {timeout_ms}ms loading {url}")]
    Timeout { url: String, timeout_ms: u64 },

    /// DNS or connection failure reported by the engine
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Server answered with an error status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Anti-bot interstitial detected in the rendered page
    #[error("blocked by {marker} at {url}")]
    Blocked { url: String, marker: String },

    /// Browser engine failed in a way that may leave the session unusable
    #[error("browser error: {0}")]
    Browser(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Session pool was shut down
    #[error("browser session pool is shut down")]
    PoolClosed,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. }
                | FetchError::Navigation { .. }
                | FetchError::HttpStatus { .. }
                | FetchError::Browser(_)
        )
    }

    /// Whether the session that produced this error should be discarded.
    pub fn poisons_session(&self) -> bool {
        matches!(self, FetchError::Browser(_) | FetchError::Timeout { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidUrl { .. } => ErrorKind::InvalidInput,
            FetchError::Timeout { .. } => ErrorKind::FetchTimeout,
            FetchError::Navigation { .. } | FetchError::HttpStatus { .. } | FetchError::Browser(_) => {
                ErrorKind::FetchFailure
            }
            FetchError::Blocked { .. } => ErrorKind::FetchBlocked,
            FetchError::PoolClosed => ErrorKind::Cancelled,
        }
    }
}

impl From<FetchError> for AnalysisError {
    fn from(err: FetchError) -> Self {
        AnalysisError::new(Stage::Fetch, err.kind(), err.to_string(), err.is_retryable())
    }
}

/// Errors raised by an LLM implementation.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No answer within the configured deadline
    #[error("LLM call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Provider throttled the request
    #[error("LLM rate limited")]
    RateLimited,

    /// Provider-side failure (5xx)
    #[error("LLM service unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// Provider refused the request (bad key, bad payload)
    #[error("LLM rejected request: {0}")]
    Rejected(String),

    /// Reply was not a JSON object
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Transport-level failure
    #[error("LLM transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Rejected(_))
    }
}

impl From<LlmError> for AnalysisError {
    fn from(err: LlmError) -> Self {
        AnalysisError::new(
            Stage::Extract,
            ErrorKind::ExtractionFailure,
            err.to_string(),
            err.is_retryable(),
        )
    }
}

/// Errors raised by a product store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record under this key
    #[error("no stored product for {key}")]
    NotFound { key: String },

    /// Key could not be derived from the product URL
    #[error("invalid store key: {0}")]
    InvalidKey(String),

    /// Stored payload could not be decoded
    #[error("corrupt stored record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Backend failure
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        let retryable = matches!(err, StoreError::Backend(_));
        AnalysisError::new(Stage::Store, ErrorKind::StoreFailure, err.to_string(), retryable)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable is absent
    #[error("{0} is not set")]
    Missing(&'static str),

    /// Variable is present but unparseable
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },

    /// Filesystem setup failed (e.g. creating the database directory)
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for browser operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for LLM operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
