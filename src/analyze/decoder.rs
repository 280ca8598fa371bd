// src/analyze/decoder.rs
//! Tolerant reply decoding.
//!
//! Inference replies arrive as an already-structured object, a JSON-encoded
//! string, a double-encoded JSON string, or prose with one JSON object embedded
//! in it. Decoding runs an ordered chain of independent parse attempts and
//! stops at the first that yields an object:
//!
//! 1. structured: the reply already is an object (envelopes like
//!    `{"response": "..."}` are unwrapped)
//! 2. json string: the reply is a string that parses as an object, possibly
//!    after a second decode for double-encoded strings
//! 3. embedded: brace-matched extraction of the first parseable `{...}` in prose
//!
//! If every attempt fails, an object reply is returned unchanged and anything
//! else yields the caller's fallback (usually `None`).

use serde_json::Value;

type Attempt = fn(&Value) -> Option<Value>;

const ATTEMPTS: [(&str, Attempt); 3] = [
    ("structured", attempt_structured),
    ("json_string", attempt_json_string),
    ("embedded", attempt_embedded),
];

/// Keys that mark a provider envelope around the real payload.
const ENVELOPE_KEYS: [&str; 2] = ["response", "result"];

/// Decode `raw` into a JSON object, or `fallback` when no structure is found.
pub fn decode_reply(raw: &Value, fallback: Option<Value>) -> Option<Value> {
    for (name, attempt) in ATTEMPTS {
        if let Some(v) = attempt(raw) {
            tracing::trace!(target: "analysis", attempt = name, "reply decoded");
            return Some(v);
        }
    }
    if raw.is_object() {
        return Some(raw.clone());
    }
    fallback
}

/// Every named field is present, non-null and not an empty string.
pub fn validate_response(value: &Value, required: &[&str]) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    required.iter().all(|field| match obj.get(*field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    })
}

fn attempt_structured(raw: &Value) -> Option<Value> {
    let obj = raw.as_object()?;
    if obj.len() == 1 {
        if let Some(inner) = ENVELOPE_KEYS.iter().find_map(|k| obj.get(*k)) {
            return match inner {
                Value::Object(_) => Some(inner.clone()),
                Value::String(_) => attempt_json_string(inner).or_else(|| attempt_embedded(inner)),
                _ => None,
            };
        }
    }
    Some(raw.clone())
}

fn attempt_json_string(raw: &Value) -> Option<Value> {
    let s = raw.as_str()?.trim();
    match serde_json::from_str::<Value>(s).ok()? {
        v @ Value::Object(_) => Some(v),
        Value::String(inner) => match serde_json::from_str::<Value>(inner.trim()).ok()? {
            v @ Value::Object(_) => Some(v),
            _ => None,
        },
        _ => None,
    }
}

fn attempt_embedded(raw: &Value) -> Option<Value> {
    extract_json_object(raw.as_str()?)
}

/// First `{...}` in `text` (brace-matched, string-aware) that parses as an object.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let mut from = 0;
    while let Some(rel) = text[from..].find('{') {
        let start = from + rel;
        if let Some(candidate) = balanced_object(text, start) {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                return Some(v);
            }
        }
        from = start + 1;
    }
    None
}

/// Slice from the `{` at `start` to its matching `}`; braces inside JSON
/// string literals are ignored.
pub fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Plain text out of a text-generation reply (for trend summaries).
pub fn reply_text(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Object(obj) => ["summary", "response", "text"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))?
            .to_string(),
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_is_used_directly() {
        let raw = json!({"category": "malware", "tldr": "x"});
        assert_eq!(decode_reply(&raw, None), Some(raw.clone()));
    }

    #[test]
    fn json_string_is_parsed() {
        let raw = json!("{\"category\":\"phishing\",\"tldr\":\"y\"}");
        assert_eq!(
            decode_reply(&raw, None),
            Some(json!({"category": "phishing", "tldr": "y"}))
        );
    }

    #[test]
    fn double_encoded_string_is_parsed() {
        let inner = "{\"a\":1}";
        let raw = Value::String(serde_json::to_string(inner).unwrap());
        assert_eq!(decode_reply(&raw, None), Some(json!({"a": 1})));
    }

    #[test]
    fn nested_braces_in_prose_are_matched() {
        let raw = json!(
            "Sure! Here is the analysis:\n```json\n{\"iocs\": {\"ips\": [\"1.2.3.4\"]}, \"note\": \"use {curly} text\"}\n```\nLet me know {if} you need more."
        );
        assert_eq!(
            decode_reply(&raw, None),
            Some(json!({"iocs": {"ips": ["1.2.3.4"]}, "note": "use {curly} text"}))
        );
    }

    #[test]
    fn unparseable_leading_braces_are_skipped() {
        let raw = json!("Template {name} then {\"ok\": true}");
        assert_eq!(decode_reply(&raw, None), Some(json!({"ok": true})));
    }

    #[test]
    fn text_without_structure_yields_fallback() {
        let raw = json!("I cannot analyze this article.");
        assert_eq!(decode_reply(&raw, None), None);
        assert_eq!(
            decode_reply(&raw, Some(json!({"fallback": true}))),
            Some(json!({"fallback": true}))
        );
        assert_eq!(decode_reply(&json!(42), None), None);
        assert_eq!(decode_reply(&json!("{\"unterminated\": "), None), None);
    }

    #[test]
    fn envelopes_are_unwrapped_or_kept_verbatim() {
        let wrapped = json!({"response": "prefix {\"tldr\": \"z\"} suffix"});
        assert_eq!(decode_reply(&wrapped, None), Some(json!({"tldr": "z"})));

        let opaque = json!({"response": "no json at all"});
        assert_eq!(decode_reply(&opaque, None), Some(opaque.clone()));
    }

    #[test]
    fn validation_rejects_missing_null_and_empty() {
        let v = json!({"tldr": "ok", "category": "", "severity": null, "key_points": []});
        assert!(validate_response(&v, &["tldr", "key_points"]));
        assert!(!validate_response(&v, &["category"]));
        assert!(!validate_response(&v, &["severity"]));
        assert!(!validate_response(&v, &["threat_actors"]));
        assert!(!validate_response(&json!("tldr"), &["tldr"]));
        assert!(validate_response(&json!({}), &[]));
    }

    #[test]
    fn reply_text_reads_strings_and_known_keys() {
        assert_eq!(reply_text(&json!("  hello ")), Some("hello".into()));
        assert_eq!(reply_text(&json!({"summary": "s"})), Some("s".into()));
        assert_eq!(reply_text(&json!({"other": "s"})), None);
        assert_eq!(reply_text(&json!("")), None);
    }
}
