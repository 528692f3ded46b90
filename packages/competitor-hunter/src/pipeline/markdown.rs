//! HTML to Markdown-like text conversion and budget truncation.

use htmd::options::{HeadingStyle, Options};
use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Joins the head and tail of over-budget text.
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]\n\n";

/// Elements whose content never reaches the model.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "head", "template", "iframe"];

fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            ..Default::default()
        })
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build()
}

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank-line pattern"));

/// Convert rendered HTML into compact Markdown.
pub fn html_to_markdown(html: &str) -> String {
    let markdown = converter().convert(html).unwrap_or_else(|e| {
        debug!(error = %e, "Markdown conversion failed, falling back to plain text");
        plain_text(html)
    });

    BLANK_LINES.replace_all(&markdown, "\n\n").trim().to_string()
}

/// Visible text of `html` without any markup.
fn plain_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        });
        let chunk = chunk.trim();
        if !hidden && !chunk.is_empty() {
            text.push_str(chunk);
            text.push('\n');
        }
    }
    text
}

/// Extract the document title.
pub fn extract_title(html: &str) -> Option<String> {
    title_of(&Html::parse_document(html))
}

/// Title of an already parsed document.
pub(crate) fn title_of(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Fit `text` into `max_chars`, keeping the first and last 40%.
///
/// Pricing pages put the product name and tiers near the top and plan
/// comparisons near the bottom, so the middle is what gets dropped.
pub fn truncate_middle(text: &str, max_chars: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= max_chars {
        return (text.to_string(), false);
    }

    let keep = max_chars * 2 / 5;
    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(total - keep).collect();
    (format!("{head}{TRUNCATION_MARKER}{tail}"), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_and_styles() {
        let html = r#"<html><head><title>X</title><style>.a{color:red}</style></head>
            <body><script type="text/javascript">var secret = 1;</script><p>Visible</p></body></html>"#;
        let md = html_to_markdown(html);
        assert_eq!(md, "Visible");
    }

    #[test]
    fn test_nested_raw_text_does_not_leak() {
        let html = r#"<body><script>var tag = "</style>"; var secret = 2;</script>
            <noscript><style>p { display: none }</style>Enable JS</noscript>
            <p>Pricing</p><svg><style>.x{}</style><text>logo</text></svg><p>Plans</p></body>"#;
        let md = html_to_markdown(html);

        assert!(md.contains("Pricing"));
        assert!(md.contains("Plans"));
        assert!(!md.contains("secret"));
        assert!(!md.contains("Enable JS"));
        assert!(!md.contains("logo"));
    }

    #[test]
    fn test_structure_conversion() {
        let html = r#"<h1>Notion</h1><h2 class="x">Plans</h2>
            <ul><li>Free</li><li>Plus<ul><li>Unlimited blocks</li></ul></li></ul>
            <p>See <a href="/pricing">pricing</a> and more</p>"#;
        let md = html_to_markdown(html);

        assert!(md.contains("# Notion"));
        assert!(md.contains("## Plans"));
        assert!(md.contains("Free"));
        assert!(md.contains("Plus"));
        assert!(md.contains("Unlimited blocks"));
        assert!(md.find("Plus").unwrap() < md.find("Unlimited blocks").unwrap());
        assert!(md.contains("[pricing](/pricing)"));
        assert!(!md.contains("<li>"));
    }

    #[test]
    fn test_table_text_kept() {
        let html = "<table><tr><th>Plan</th><th>Price</th></tr><tr><td>Pro</td><td>$10</td></tr></table>";
        let md = html_to_markdown(html);
        assert!(md.contains("Plan"));
        assert!(md.contains("Pro"));
        assert!(md.contains("$10"));
        assert!(!md.contains("<td>"));
    }

    #[test]
    fn test_entities_decoded() {
        let md = html_to_markdown("<p>&euro;8&nbsp;per user, billed yearly</p>");
        assert!(md.contains("€8"));
        assert!(!md.contains("&euro;"));
    }

    #[test]
    fn test_blank_lines_collapsed() {
        let md = html_to_markdown("<p>One</p><br><br><br><div></div><p>Two</p>");
        assert!(!md.contains("\n\n\n"));
    }

    #[test]
    fn test_plain_text_fallback_skips_hidden() {
        let text = plain_text("<head><title>T</title></head><body><script>x()</script><p>Hi</p></body>");
        assert_eq!(text.trim(), "Hi");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<head><title> Pricing &amp; Plans | Notion </title></head>"),
            Some("Pricing & Plans | Notion".to_string())
        );
        assert_eq!(extract_title("<p>none</p>"), None);
    }

    #[test]
    fn test_truncate_keeps_head_and_tail() {
        let text = format!("{}{}{}", "H".repeat(50), "M".repeat(100), "T".repeat(50));
        let (out, truncated) = truncate_middle(&text, 100);

        assert!(truncated);
        assert!(out.starts_with(&"H".repeat(40)));
        assert!(out.ends_with(&"T".repeat(40)));
        assert!(out.contains("[... content truncated ...]"));
        assert!(!out.contains('M'));
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        let (out, truncated) = truncate_middle("short", 100);
        assert_eq!(out, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "é".repeat(300);
        let (out, truncated) = truncate_middle(&text, 100);
        assert!(truncated);
        assert_eq!(out.chars().filter(|c| *c == 'é').count(), 80);
    }
}
