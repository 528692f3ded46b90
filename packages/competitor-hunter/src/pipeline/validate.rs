//! Schema validation of LLM candidates.
//!
//! Candidates arrive as untyped JSON. Validation either produces a typed
//! [`CompetitorProduct`] or a [`SchemaViolation`] listing every problem, so
//! a corrective re-prompt can address them all at once.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::error::{AnalysisError, ErrorKind, Stage};
use crate::types::product::{BillingCycle, CompetitorProduct, PricingTier};

/// One problem found in a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// JSON path of the offending field, e.g. `pricing_tiers[2].name`
    pub path: String,
    pub problem: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

/// A candidate that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema violation: {}", .issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
pub struct SchemaViolation {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaViolation {
    /// Whether `path` is among the reported issues.
    pub fn mentions(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

impl From<SchemaViolation> for AnalysisError {
    fn from(violation: SchemaViolation) -> Self {
        AnalysisError::new(
            Stage::Validate,
            ErrorKind::SchemaValidationFailure,
            violation.to_string(),
            true,
        )
    }
}

/// Strip a Markdown code fence the model may have wrapped around its JSON.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Checker {
    issues: Vec<SchemaIssue>,
}

impl Checker {
    fn issue(&mut self, path: impl Into<String>, problem: impl Into<String>) {
        self.issues.push(SchemaIssue::new(path, problem));
    }

    /// Required, non-empty string.
    fn text(&mut self, value: Option<&Value>, path: &str) -> Option<String> {
        match value {
            None | Some(Value::Null) => {
                self.issue(path, "missing required field");
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.issue(path, "must not be empty");
                None
            }
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => {
                self.issue(path, format!("expected string, got {}", type_name(other)));
                None
            }
        }
    }

    /// Required array.
    fn array<'a>(&mut self, value: Option<&'a Value>, path: &str) -> Option<&'a Vec<Value>> {
        match value {
            None | Some(Value::Null) => {
                self.issue(path, "missing required field");
                None
            }
            Some(Value::Array(items)) => Some(items),
            Some(other) => {
                self.issue(path, format!("expected array, got {}", type_name(other)));
                None
            }
        }
    }

    fn tier(&mut self, value: &Value, path: &str) -> Option<PricingTier> {
        let Some(obj) = value.as_object() else {
            self.issue(path, format!("expected object, got {}", type_name(value)));
            return None;
        };

        let name = self.text(obj.get("name"), &format!("{path}.name"));

        let price_path = format!("{path}.price");
        let price = match obj.get("price") {
            Some(Value::Number(n)) => Some(n.to_string()),
            other => self.text(other, &price_path),
        };

        let currency = obj
            .get("currency")
            .and_then(Value::as_str)
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "USD".to_string());

        let billing_cycle = obj
            .get("billing_cycle")
            .and_then(Value::as_str)
            .map(BillingCycle::from_label)
            .unwrap_or_default();

        Some(PricingTier {
            name: name?,
            price: price?,
            currency,
            billing_cycle,
        })
    }
}

/// Validate `candidate` into a product for `source_url`.
///
/// The candidate's own `url` is ignored; the record always carries the
/// normalized source URL and `now` as its timestamp.
pub fn validate_candidate(
    candidate: &Value,
    source_url: &str,
    now: DateTime<Utc>,
) -> Result<CompetitorProduct, SchemaViolation> {
    if let Value::String(raw) = candidate {
        return match serde_json::from_str::<Value>(strip_code_fences(raw)) {
            Ok(parsed @ Value::Object(_)) => validate_candidate(&parsed, source_url, now),
            _ => Err(SchemaViolation {
                issues: vec![SchemaIssue::new("$", "expected a JSON object, got string")],
            }),
        };
    }

    let Some(obj) = candidate.as_object() else {
        return Err(SchemaViolation {
            issues: vec![SchemaIssue::new(
                "$",
                format!("expected a JSON object, got {}", type_name(candidate)),
            )],
        });
    };

    let mut check = Checker { issues: Vec::new() };

    let product_name = check.text(obj.get("product_name"), "product_name");

    let pricing_tiers = check
        .array(obj.get("pricing_tiers"), "pricing_tiers")
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| check.tier(item, &format!("pricing_tiers[{i}]")))
                .collect::<Vec<_>>()
        });

    let core_features = check
        .array(obj.get("core_features"), "core_features")
        .map(|items| {
            let mut features = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) if !s.trim().is_empty() => features.push(s.trim().to_string()),
                    Value::String(_) => {}
                    other => check.issue(
                        format!("core_features[{i}]"),
                        format!("expected string, got {}", type_name(other)),
                    ),
                }
            }
            features
        });

    let summary = check.text(obj.get("summary"), "summary");

    match (product_name, pricing_tiers, core_features, summary) {
        (Some(product_name), Some(pricing_tiers), Some(core_features), Some(summary))
            if check.issues.is_empty() =>
        {
            Ok(CompetitorProduct {
                product_name,
                url: source_url.to_string(),
                pricing_tiers,
                core_features,
                summary,
                last_updated: now,
            })
        }
        _ => Err(SchemaViolation {
            issues: check.issues,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "https://example.com/pricing";

    fn valid() -> Value {
        json!({
            "product_name": "Acme",
            "url": "https://wrong.example",
            "pricing_tiers": [
                {"name": "Free", "price": "0", "currency": "usd", "billing_cycle": "monthly"},
                {"name": "Team", "price": 12.5, "billing_cycle": "annually"},
                {"name": "Enterprise", "price": "Custom", "billing_cycle": "contact us"}
            ],
            "core_features": ["Docs", " Wikis ", ""],
            "summary": "## Overview\nAcme.\n## SWOT\n..."
        })
    }

    #[test]
    fn test_valid_candidate() {
        let now = Utc::now();
        let product = validate_candidate(&valid(), URL, now).unwrap();

        assert_eq!(product.product_name, "Acme");
        assert_eq!(product.url, URL);
        assert_eq!(product.last_updated, now);
        assert_eq!(product.pricing_tiers.len(), 3);
        assert_eq!(product.pricing_tiers[0].currency, "USD");
        assert_eq!(product.pricing_tiers[1].price, "12.5");
        assert_eq!(product.pricing_tiers[1].billing_cycle, BillingCycle::Yearly);
        assert_eq!(product.pricing_tiers[2].billing_cycle, BillingCycle::Custom);
        assert_eq!(product.core_features, vec!["Docs", "Wikis"]);
    }

    #[test]
    fn test_empty_lists_are_valid() {
        let mut candidate = valid();
        candidate["pricing_tiers"] = json!([]);
        candidate["core_features"] = json!([]);
        let product = validate_candidate(&candidate, URL, Utc::now()).unwrap();
        assert!(product.pricing_tiers.is_empty());
        assert!(product.core_features.is_empty());
    }

    #[test]
    fn test_missing_core_features() {
        let mut candidate = valid();
        candidate.as_object_mut().unwrap().remove("core_features");

        let violation = validate_candidate(&candidate, URL, Utc::now()).unwrap_err();
        assert!(violation.mentions("core_features"));
        assert_eq!(violation.issues.len(), 1);
    }

    #[test]
    fn test_collects_every_issue() {
        let candidate = json!({
            "product_name": "",
            "pricing_tiers": [{"price": "10"}, "Pro"],
            "core_features": "Docs",
            "summary": null
        });

        let violation = validate_candidate(&candidate, URL, Utc::now()).unwrap_err();
        assert!(violation.mentions("product_name"));
        assert!(violation.mentions("pricing_tiers[0].name"));
        assert!(violation.mentions("pricing_tiers[1]"));
        assert!(violation.mentions("core_features"));
        assert!(violation.mentions("summary"));
    }

    #[test]
    fn test_non_object_rejected() {
        let violation = validate_candidate(&json!([1, 2]), URL, Utc::now()).unwrap_err();
        assert!(violation.mentions("$"));
    }

    #[test]
    fn test_fenced_json_string_accepted() {
        let fenced = format!("```json\n{}\n```", valid());
        let product = validate_candidate(&Value::String(fenced), URL, Utc::now()).unwrap();
        assert_eq!(product.product_name, "Acme");
    }

    #[test]
    fn test_violation_maps_to_validate_stage() {
        let err: AnalysisError = SchemaViolation {
            issues: vec![SchemaIssue::new("summary", "must not be empty")],
        }
        .into();
        assert_eq!(err.stage, Stage::Validate);
        assert_eq!(err.kind, ErrorKind::SchemaValidationFailure);
        assert!(err.message.contains("summary: must not be empty"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }
}
