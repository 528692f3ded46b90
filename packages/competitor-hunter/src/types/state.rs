//! Per-run state: the request, the phase machine and the final report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{AnalysisError, Stage};
use crate::types::content::RawContent;
use crate::types::product::CompetitorProduct;

/// Options attached to a single analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Return the stored record instead of re-analysing when it is younger than this.
    pub skip_if_fresh: Option<Duration>,

    /// Override the fetcher's screenshot setting for this request.
    pub capture_screenshot: Option<bool>,
}

/// One URL to analyse. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub url: String,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: AnalysisOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

/// Phase of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Fetching,
    Extracting,
    Validating,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Pipeline stage a failure in this phase belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Phase::Init | Phase::Fetching => Stage::Fetch,
            Phase::Extracting => Stage::Extract,
            Phase::Validating | Phase::Done | Phase::Failed => Stage::Validate,
        }
    }

    /// Whether the machine permits moving from `self` to `next`.
    ///
    /// `Init -> Done` is taken only when a fresh stored record is served.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Init, Fetching)
                | (Init, Done)
                | (Init, Failed)
                | (Fetching, Fetching)
                | (Fetching, Extracting)
                | (Fetching, Failed)
                | (Extracting, Extracting)
                | (Extracting, Validating)
                | (Extracting, Failed)
                | (Validating, Extracting)
                | (Validating, Done)
                | (Validating, Failed)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Fetching => "fetching",
            Phase::Extracting => "extracting",
            Phase::Validating => "validating",
            Phase::Done => "done",
            Phase::Failed => "failed",
        })
    }
}

/// Working state of one run, exclusively owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub url: String,
    pub raw_content: Option<RawContent>,
    pub product: Option<CompetitorProduct>,
    pub error: Option<AnalysisError>,
}

impl AgentState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_content: None,
            product: None,
            error: None,
        }
    }
}

/// Terminal record of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: AgentState,

    /// Every phase entered, in order, starting with `Init`
    pub transitions: Vec<Phase>,

    pub fetch_attempts: u32,
    pub llm_calls: u32,

    /// Persisting failed; the product is still reported
    pub store_error: Option<AnalysisError>,

    /// Record came from the store under a freshness policy
    pub served_from_store: bool,
}

impl RunReport {
    /// A report for a run that has just entered `Init`.
    pub fn start(url: impl Into<String>) -> Self {
        Self {
            state: AgentState::new(url),
            transitions: vec![Phase::Init],
            fetch_attempts: 0,
            llm_calls: 0,
            store_error: None,
            served_from_store: false,
        }
    }

    /// Record entry into `next`.
    pub fn enter(&mut self, next: Phase) -> Result<(), AnalysisError> {
        let current = self.phase();
        if !current.can_transition_to(next) {
            return Err(AnalysisError::internal(
                current.stage(),
                format!("illegal transition {current} -> {next}"),
            ));
        }
        self.transitions.push(next);
        Ok(())
    }

    /// End the run with `error`. A run already in a terminal phase keeps it.
    pub fn fail(&mut self, error: AnalysisError) {
        if !self.phase().is_terminal() {
            self.transitions.push(Phase::Failed);
        }
        self.state.product = None;
        self.state.error = Some(error);
    }

    pub fn phase(&self) -> Phase {
        self.transitions.last().copied().unwrap_or(Phase::Init)
    }

    pub fn product(&self) -> Option<&CompetitorProduct> {
        self.state.product.as_ref()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.state.error.as_ref()
    }

    /// Collapse into the caller-facing result.
    pub fn into_result(self) -> Result<CompetitorProduct, AnalysisError> {
        match (self.state.product, self.state.error) {
            (Some(product), _) => Ok(product),
            (None, Some(err)) => Err(err),
            (None, None) => Err(AnalysisError::internal(
                Stage::Fetch,
                "run ended without a product or an error",
            )),
        }
    }
}
