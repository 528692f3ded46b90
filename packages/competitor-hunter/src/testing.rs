//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline
//! without making real LLM calls or touching a database. The mock
//! browser lives in [`crate::browser::mock`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{LlmError, LlmResult, StoreError, StoreResult};
use crate::traits::{
    ai::{Prompt, AI},
    store::ProductStore,
};
use crate::types::product::CompetitorProduct;

/// A scripted LLM failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockLlmFailure {
    Timeout,
    RateLimited,
    Unavailable,
    Rejected,
    Malformed,
}

impl MockLlmFailure {
    fn to_error(self) -> LlmError {
        match self {
            MockLlmFailure::Timeout => LlmError::Timeout { timeout_ms: 120_000 },
            MockLlmFailure::RateLimited => LlmError::RateLimited,
            MockLlmFailure::Unavailable => LlmError::Unavailable { status: 503 },
            MockLlmFailure::Rejected => LlmError::Rejected("invalid API key".into()),
            MockLlmFailure::Malformed => LlmError::MalformedResponse("not JSON".into()),
        }
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Candidate(serde_json::Value),
    Failure(MockLlmFailure),
}

/// A mock AI implementation for testing.
///
/// Replies are consumed in the order they were scripted. When the script
/// runs out, the default response (if any) is returned for every call.
#[derive(Clone, Default)]
pub struct MockAI {
    replies: Arc<RwLock<VecDeque<MockReply>>>,
    default_response: Arc<RwLock<Option<serde_json::Value>>>,
    latency: Arc<RwLock<Duration>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<Prompt>>>,
}

impl MockAI {
    /// Create a mock AI with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate reply.
    pub fn with_response(self, candidate: serde_json::Value) -> Self {
        self.replies
            .write()
            .unwrap()
            .push_back(MockReply::Candidate(candidate));
        self
    }

    /// Queue a failing reply.
    pub fn with_failure(self, failure: MockLlmFailure) -> Self {
        self.replies
            .write()
            .unwrap()
            .push_back(MockReply::Failure(failure));
        self
    }

    /// Reply with `candidate` once the script is exhausted.
    pub fn with_default_response(self, candidate: serde_json::Value) -> Self {
        *self.default_response.write().unwrap() = Some(candidate);
        self
    }

    /// Delay every reply.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write().unwrap() = latency;
        self
    }

    /// Prompts received, in order.
    pub fn calls(&self) -> Vec<Prompt> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl AI for MockAI {
    async fn complete(
        &self,
        prompt: &Prompt,
        _schema_hint: &serde_json::Value,
    ) -> LlmResult<serde_json::Value> {
        self.calls.write().unwrap().push(prompt.clone());

        let latency = *self.latency.read().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.replies.write().unwrap().pop_front();
        match scripted {
            Some(MockReply::Candidate(value)) => Ok(value),
            Some(MockReply::Failure(failure)) => Err(failure.to_error()),
            None => self
                .default_response
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| LlmError::MalformedResponse("no scripted response".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A store whose writes always fail.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    fail_reads: bool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail reads as well as writes.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    fn error() -> StoreError {
        StoreError::Backend("disk I/O error".into())
    }
}

#[async_trait]
impl ProductStore for FailingStore {
    async fn get_product(&self, _key: &str) -> StoreResult<Option<CompetitorProduct>> {
        if self.fail_reads {
            return Err(Self::error());
        }
        Ok(None)
    }

    async fn put_product(&self, _key: &str, _product: &CompetitorProduct) -> StoreResult<()> {
        Err(Self::error())
    }

    async fn delete_product(&self, _key: &str) -> StoreResult<()> {
        Err(Self::error())
    }

    async fn list_products(&self) -> StoreResult<Vec<CompetitorProduct>> {
        if self.fail_reads {
            return Err(Self::error());
        }
        Ok(Vec::new())
    }
}

/// Canned pages and candidates.
pub mod fixtures {
    use serde_json::{json, Value};

    pub const NOTION_URL: &str = "https://www.notion.so/pricing";

    /// Abbreviated Notion pricing page.
    pub const NOTION_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Pricing plans | Notion</title><script>window.__data = {};</script></head>
<body>
<header><nav><a href="/product">Product</a></nav></header>
<main>
  <h1>One tool for your whole company. Free for teams to try.</h1>
  <section class="plans">
    <div><h3>Free</h3><p>$0 per member / month</p></div>
    <div><h3>Plus</h3><p>$10 per seat/month billed annually</p></div>
    <div><h3>Business</h3><p>$15 per seat/month billed annually</p></div>
    <div><h3>Enterprise</h3><p>Contact sales</p></div>
  </section>
  <ul>
    <li>Docs</li><li>Wikis</li><li>Projects</li><li>Notion AI</li>
  </ul>
</main>
</body>
</html>"#;

    /// Candidate the LLM returns for [`NOTION_HTML`]: 4 tiers, 13 features.
    pub fn notion_candidate() -> Value {
        json!({
            "product_name": "Notion",
            "url": NOTION_URL,
            "pricing_tiers": [
                {"name": "Free", "price": "0", "currency": "USD", "billing_cycle": "monthly"},
                {"name": "Plus", "price": "10", "currency": "USD", "billing_cycle": "yearly"},
                {"name": "Business", "price": "15", "currency": "USD", "billing_cycle": "yearly"},
                {"name": "Enterprise", "price": "Custom", "currency": "USD", "billing_cycle": "custom"}
            ],
            "core_features": [
                "Docs", "Wikis", "Projects", "Notion AI", "Databases", "Templates",
                "Calendar", "Sites", "Forms", "Integrations", "Permissions",
                "SAML SSO", "Audit log"
            ],
            "summary": "## Overview\nNotion is a connected workspace for docs, wikis and projects.\n\n## Use Cases\n- Team knowledge bases\n\n## Competitive Advantages\n- Flexible building blocks\n\n## SWOT\n**Strengths:** breadth\n**Weaknesses:** learning curve\n**Opportunities:** AI\n**Threats:** suites"
        })
    }

    /// [`notion_candidate`] without the `core_features` field.
    pub fn candidate_without_core_features() -> Value {
        let mut candidate = notion_candidate();
        if let Some(obj) = candidate.as_object_mut() {
            obj.remove("core_features");
        }
        candidate
    }

    /// Minimal valid candidate for an arbitrary product.
    pub fn simple_candidate(name: &str) -> Value {
        json!({
            "product_name": name,
            "pricing_tiers": [],
            "core_features": ["Search"],
            "summary": format!("## Overview\n{name}.\n\n## SWOT\nTBD")
        })
    }

    /// Cloudflare challenge interstitial.
    pub const CHALLENGE_HTML: &str = r#"<html><head><title>Just a moment...</title></head>
<body><div id="challenge-platform"><h1>Checking your browser before accessing the site.</h1></div></body></html>"#;
}
