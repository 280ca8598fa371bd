// src/analyze/prompts.rs
//! Request builders for each analysis call.

use serde_json::{json, Value};

use crate::analyze::types::{Article, Category};
use crate::inference::InferenceRequest;

/// Upper bound on article body characters sent to any tier.
pub const MAX_CONTENT_CHARS: usize = 6_000;

pub const BASELINE_REQUIRED: [&str; 4] = ["tldr", "category", "severity", "key_points"];
pub const CLASSIFIER_REQUIRED: [&str; 3] = ["category", "severity", "tldr"];
pub const EXTRACTOR_REQUIRED: [&str; 1] = ["key_points"];

const SEVERITIES: &str = "critical, high, medium, low, info";

fn categories() -> String {
    Category::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn article_block(article: &Article) -> String {
    let body = truncate_chars(&article.content, MAX_CONTENT_CHARS);
    let mut out = format!("Title: {}\n", article.title.trim());
    if !article.source.is_empty() {
        out.push_str(&format!("Source: {}\n", article.source));
    }
    if let Some(ts) = article.published_at {
        out.push_str(&format!("Published: {}\n", ts.to_rfc3339()));
    }
    out.push('\n');
    out.push_str(body);
    out
}

fn ioc_schema() -> Value {
    let list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "ips": list, "domains": list, "cves": list,
            "hashes": list, "urls": list, "emails": list
        }
    })
}

fn classification_properties() -> Value {
    json!({
        "tldr": {"type": "string"},
        "category": {"type": "string"},
        "severity": {"type": "string"},
        "affected_sectors": {"type": "array", "items": {"type": "string"}},
        "threat_actors": {"type": "array", "items": {"type": "string"}}
    })
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "type": "object",
            "properties": properties,
            "required": required
        }
    })
}

/// Full analysis in one round trip (large tier).
pub fn baseline_request(article: &Article) -> InferenceRequest {
    let sys = format!(
        "You are a threat intelligence analyst. Read the security article and reply with ONE JSON object only: \
{{\"tldr\": one sentence, \"key_points\": [3-5 short strings], \"category\": one of [{}], \
\"severity\": one of [{}], \"affected_sectors\": [strings], \"threat_actors\": [named groups only], \
\"iocs\": {{\"ips\": [], \"domains\": [], \"cves\": [], \"hashes\": [], \"urls\": [], \"emails\": []}}}}. \
Use empty lists when nothing applies. Do not invent indicators.",
        categories(),
        SEVERITIES
    );
    let mut props = classification_properties();
    props["key_points"] = json!({"type": "array", "items": {"type": "string"}});
    props["iocs"] = ioc_schema();
    InferenceRequest::chat(sys, article_block(article))
        .with_response_format(schema(props, &BASELINE_REQUIRED))
}

/// Category/severity/summary (small classifier tier).
pub fn classifier_request(article: &Article) -> InferenceRequest {
    let sys = format!(
        "Classify the security article. Reply with ONE JSON object only: \
{{\"category\": one of [{}], \"severity\": one of [{}], \"tldr\": one sentence, \
\"affected_sectors\": [strings], \"threat_actors\": [named groups only]}}.",
        categories(),
        SEVERITIES
    );
    InferenceRequest::chat(sys, article_block(article))
        .with_response_format(schema(classification_properties(), &CLASSIFIER_REQUIRED))
}

/// Key points and indicators (mid-size extractor tier).
pub fn extractor_request(article: &Article) -> InferenceRequest {
    let sys = "Extract facts from the security article. Reply with ONE JSON object only: \
{\"key_points\": [3-5 short strings], \"iocs\": {\"ips\": [], \"domains\": [], \"cves\": [], \
\"hashes\": [], \"urls\": [], \"emails\": []}}. Copy indicators exactly as written; \
use empty lists when none are present.";
    let props = json!({
        "key_points": {"type": "array", "items": {"type": "string"}},
        "iocs": ioc_schema()
    });
    InferenceRequest::chat(sys, article_block(article))
        .with_response_format(schema(props, &EXTRACTOR_REQUIRED))
}

/// Trend summary over many articles (large tier, plain text).
pub fn trends_request(articles: &[Article], summaries: &[String], max_items: usize) -> InferenceRequest {
    let sys = "You are a threat intelligence lead. Summarize the dominant trends across the \
following recent security stories in 3-5 sentences of plain prose. Mention recurring threat \
actors, targeted sectors, and exploited vulnerabilities when present.";
    let mut user = String::new();
    for (i, article) in articles.iter().take(max_items).enumerate() {
        user.push_str(&format!("{}. {}", i + 1, article.title.trim()));
        if let Some(s) = summaries.get(i).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            user.push_str(" - ");
            user.push_str(s);
        }
        user.push('\n');
    }
    InferenceRequest::chat(sys, user)
}

/// Cut at a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
