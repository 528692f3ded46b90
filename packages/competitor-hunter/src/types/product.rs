//! Product records - the validated output of an analysis run.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

/// How often a pricing tier is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    OneTime,
    /// Anything that is not a fixed recurring price ("contact sales", usage based, ...)
    #[default]
    #[serde(other)]
    Custom,
}

impl BillingCycle {
    /// Map a free-form billing label onto the fixed set.
    ///
    /// Unknown labels fall back to [`BillingCycle::Custom`].
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.trim_start_matches('/').trim_start_matches("per-") {
            "monthly" | "month" | "mo" | "billed-monthly" => BillingCycle::Monthly,
            "yearly" | "year" | "yr" | "annual" | "annually" | "billed-annually"
            | "billed-yearly" => BillingCycle::Yearly,
            "one-time" | "onetime" | "once" | "lifetime" | "one-off" => BillingCycle::OneTime,
            _ => BillingCycle::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::OneTime => "one-time",
            BillingCycle::Custom => "custom",
        }
    }
}

/// One pricing tier as advertised on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PricingTier {
    /// Tier name, e.g. "Free", "Pro", "Enterprise"
    pub name: String,

    /// Price as shown, e.g. "0", "29.99", "Custom"
    pub price: String,

    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub billing_cycle: BillingCycle,
}

impl PricingTier {
    pub fn new(name: impl Into<String>, price: impl Into<String>, billing_cycle: BillingCycle) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            currency: default_currency(),
            billing_cycle,
        }
    }

    /// Set the currency code.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// Structured competitor analysis for one product page.
///
/// The serialized form is the canonical output artifact: field order is
/// stable, `last_updated` is an RFC 3339 UTC timestamp and non-ASCII text
/// is emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorProduct {
    pub product_name: String,

    /// Normalized URL the record was produced from
    pub url: String,

    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,

    #[serde(default)]
    pub core_features: Vec<String>,

    /// Markdown analysis, including a SWOT section
    #[serde(default)]
    pub summary: String,

    pub last_updated: DateTime<Utc>,
}

impl CompetitorProduct {
    /// Serialize to the canonical pretty-printed JSON artifact.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a canonical JSON artifact.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Find a tier by name (case-insensitive).
    pub fn tier(&self, name: &str) -> Option<&PricingTier> {
        self.pricing_tiers
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Shape the LLM is asked to produce.
///
/// Only used to derive the JSON schema hint sent with the prompt;
/// replies are validated from untyped JSON, never deserialized into this.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProductCandidate {
    /// Exact product name as shown on the page
    pub product_name: String,

    /// The source URL, verbatim
    pub url: String,

    /// Pricing tiers in page order; empty when no prices are shown
    pub pricing_tiers: Vec<PricingTier>,

    /// Short (1-3 word) feature names
    pub core_features: Vec<String>,

    /// Markdown analysis with overview, use cases, advantages and a SWOT section
    pub summary: String,
}

impl ProductCandidate {
    /// JSON schema of the candidate, as sent to the LLM.
    pub fn schema_hint() -> serde_json::Value {
        let schema = schemars::schema_for!(ProductCandidate);
        serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
    }
}
