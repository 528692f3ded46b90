//! LLM prompts for product extraction.

use sha2::{Digest, Sha256};

use crate::pipeline::validate::SchemaViolation;
use crate::traits::ai::Prompt;

/// System prompt for competitor analysis.
pub const SYSTEM_PROMPT: &str = r#"You are a senior product analyst studying competitor websites.
Read the page content and return a single JSON object describing the product.

Rules:
1. product_name: the exact product name as the page presents it.
2. url: copy the Source URL given below verbatim.
3. pricing_tiers: one entry per plan, in page order.
   - name: the plan name ("Free", "Pro", "Enterprise", ...)
   - price: the price as shown, without currency symbol ("0", "12", "Custom")
   - currency: ISO code, "USD" when unclear
   - billing_cycle: one of "monthly", "yearly", "one-time", "custom"
   Never invent prices. If the page shows no pricing, return an empty list.
   Plans with "contact sales" style pricing use price "Custom" and billing_cycle "custom".
4. core_features: the main capabilities as short names of 1-3 words each.
5. summary: Markdown with these sections:
   - Overview (what the product is and who it is for)
   - Use cases
   - Competitive advantages
   - SWOT (Strengths, Weaknesses, Opportunities, Threats)
If information is missing, use empty lists or say so in the summary. Do not guess.
Respond with JSON only."#;

/// User message template.
pub const EXTRACT_PROMPT: &str = r#"Source URL: {url}

Page content:
{content}"#;

/// Appended after a reply failed validation.
pub const CORRECTION_PROMPT: &str = r#"

Your previous reply did not match the required schema:
{issues}

Return the complete corrected JSON object. Keep every field, including empty lists."#;

/// Stable hash of the prompt set, logged with each run.
pub fn prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(SYSTEM_PROMPT.as_bytes());
    hasher.update(EXTRACT_PROMPT.as_bytes());
    hasher.update(CORRECTION_PROMPT.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the extraction prompt, optionally with corrective context.
pub fn format_extract_prompt(
    url: &str,
    content: &str,
    correction: Option<&SchemaViolation>,
) -> Prompt {
    let mut user = EXTRACT_PROMPT
        .replace("{url}", url)
        .replace("{content}", content);

    if let Some(violation) = correction {
        let issues = violation
            .issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");
        user.push_str(&CORRECTION_PROMPT.replace("{issues}", &issues));
    }

    Prompt::new(SYSTEM_PROMPT, user)
}
