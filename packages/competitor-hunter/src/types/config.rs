//! Configuration types for the analysis pipeline.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desktop User-Agents rotated across fetches.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_extract(mut self, extract: ExtractConfig) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Config with every wait set to zero, for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            fetch: FetchConfig::default()
                .with_scroll(ScrollPolicy::disabled())
                .with_settle_delay(Duration::ZERO),
            extract: ExtractConfig::default(),
            retry: RetryConfig {
                fetch: RetryPolicy::immediate(3),
                llm: RetryPolicy::immediate(3),
            },
            batch: BatchConfig::default(),
        }
    }
}

/// Progressive scrolling used to trigger lazy-loaded content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollPolicy {
    /// Maximum scroll-to-bottom steps. Zero disables scrolling.
    pub max_steps: u32,

    /// Pause after each step, letting new content load.
    pub step_pause: Duration,

    /// Pause after returning to the top.
    pub return_pause: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_pause: Duration::from_secs(1),
            return_pause: Duration::from_millis(500),
        }
    }
}

impl ScrollPolicy {
    pub fn disabled() -> Self {
        Self {
            max_steps: 0,
            step_pause: Duration::ZERO,
            return_pause: Duration::ZERO,
        }
    }
}

/// Browser fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Run the browser without a visible window.
    pub headless: bool,

    /// Sessions the pool may hold open at once.
    ///
    /// Bounds concurrent navigations. Default: 2.
    pub max_sessions: usize,

    /// Deadline for the initial navigation. Default: 30s.
    pub navigation_timeout: Duration,

    pub scroll: ScrollPolicy,

    /// Wait after scrolling before capturing. Default: 2s.
    pub settle_delay: Duration,

    /// Capture a full-page screenshot on success.
    pub capture_screenshot: bool,

    /// Navigation rate limit across all sessions (None = unlimited).
    pub requests_per_second: Option<u32>,

    /// User-Agent pool; one is drawn at random per fetch.
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            max_sessions: 2,
            navigation_timeout: Duration::from_secs(30),
            scroll: ScrollPolicy::default(),
            settle_delay: Duration::from_secs(2),
            capture_screenshot: true,
            requests_per_second: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl FetchConfig {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollPolicy) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_screenshots(mut self, capture: bool) -> Self {
        self.capture_screenshot = capture;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.requests_per_second = Some(requests_per_second);
        self
    }

    /// Replace the User-Agent pool.
    pub fn with_user_agents(mut self, agents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.user_agents = agents.into_iter().map(|ua| ua.into()).collect();
        self
    }
}

/// Extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Token budget for page text sent to the LLM. Default: 15000.
    pub max_tokens: usize,

    /// Characters per token used for the budget estimate. Default: 4.
    pub chars_per_token: usize,

    /// Deadline for one LLM call. Default: 120s.
    pub llm_timeout: Duration,

    /// Corrective re-prompts after a schema violation. Default: 1.
    pub max_validation_retries: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_tokens: 15_000,
            chars_per_token: 4,
            llm_timeout: Duration::from_secs(120),
            max_validation_retries: 1,
        }
    }
}

impl ExtractConfig {
    /// Character budget derived from the token budget.
    pub fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(self.chars_per_token.max(1))
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_validation_retries(mut self, retries: u32) -> Self {
        self.max_validation_retries = retries;
        self
    }
}

/// Exponential backoff for one retryable stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Minimum 1.
    pub max_attempts: u32,

    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,

    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether a failed `attempt` (1-based) may be followed by another.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay before the attempt following failed `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter && capped > 0.0 {
            capped + rand::thread_rng().gen_range(0.0..=capped * 0.25)
        } else {
            capped
        };
        Duration::try_from_secs_f64(jittered).unwrap_or(self.max_delay)
    }
}

/// Retry policies per stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub fetch: RetryPolicy,
    pub llm: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fetch: RetryPolicy::default(),
            llm: RetryPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(20),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Batch execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Orchestrations running at once. Default: 4.
    pub concurrency: usize,

    /// Reuse stored records younger than this instead of re-analysing.
    pub freshness_window: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            freshness_window: None,
        }
    }
}

impl BatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = Some(window);
        self
    }
}
