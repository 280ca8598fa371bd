// tests/decoder_roundtrip.rs
//
// Replies in every shape a model produces must decode to the same analysis.

use serde_json::{json, Value};
use threatwire::analyze::decoder::{decode_reply, validate_response};
use threatwire::analyze::prompts::BASELINE_REQUIRED;
use threatwire::analyze::types::FullAnalysis;
use threatwire::analyze::{Category, Severity};

fn analysis() -> Value {
    json!({
        "tldr": "Phishing kit abuses {braces} in \"quoted\" lures.",
        "category": "phishing",
        "severity": "medium",
        "key_points": ["Kit mimics a bank login", "Uses } inside strings"],
        "affected_sectors": ["Finance"],
        "threat_actors": [],
        "iocs": { "domains": ["login-bank[.]example"] }
    })
}

#[test]
fn analysis_embedded_in_prose_round_trips() {
    let prose = format!(
        "Sure! Here is the analysis you asked for:\n\n{}\n\nLet me know if you need more.",
        serde_json::to_string_pretty(&analysis()).unwrap()
    );
    let decoded = decode_reply(&Value::String(prose), None).expect("embedded object");
    assert_eq!(decoded, analysis());
    assert!(validate_response(&decoded, &BASELINE_REQUIRED));
}

#[test]
fn fenced_block_decodes() {
    let fenced = format!("```json\n{}\n```", analysis());
    assert_eq!(decode_reply(&Value::String(fenced), None), Some(analysis()));
}

#[test]
fn double_encoded_string_decodes() {
    let once = analysis().to_string();
    let twice = serde_json::to_string(&once).unwrap();
    assert_eq!(decode_reply(&Value::String(twice), None), Some(analysis()));
}

#[test]
fn envelope_is_unwrapped() {
    let raw = json!({ "response": analysis().to_string() });
    assert_eq!(decode_reply(&raw, None), Some(analysis()));
}

#[test]
fn prose_without_object_uses_fallback() {
    let raw = Value::String("I cannot help with that.".into());
    assert_eq!(decode_reply(&raw, None), None);
    let fb = json!({"tldr": "fallback"});
    assert_eq!(decode_reply(&raw, Some(fb.clone())), Some(fb));
}

#[test]
fn decoded_value_converts_with_lenient_enums() {
    let raw = json!(format!(
        "result: {}",
        json!({
            "tldr": "x",
            "category": "Data Breach",
            "severity": "SEVERE-ish",
            "key_points": "single point"
        })
    ));
    let decoded = decode_reply(&raw, None).expect("decodes");
    assert!(validate_response(&decoded, &["tldr", "category", "severity"]));
    let full: FullAnalysis = serde_json::from_value(decoded).expect("converts");
    assert_eq!(full.classification.category, Category::DataBreach);
    assert_eq!(full.classification.severity, Severity::Medium);
    assert_eq!(full.extraction.key_points, vec!["single point".to_string()]);
}
