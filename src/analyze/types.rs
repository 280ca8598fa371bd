// src/analyze/types.rs
//! Article input and structured analysis output.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Immutable input owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source: String::new(),
            published_at: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Category {
    Ransomware,
    Malware,
    Phishing,
    DataBreach,
    Vulnerability,
    Apt,
    SupplyChain,
    Ddos,
    Fraud,
    Policy,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Ransomware,
        Category::Malware,
        Category::Phishing,
        Category::DataBreach,
        Category::Vulnerability,
        Category::Apt,
        Category::SupplyChain,
        Category::Ddos,
        Category::Fraud,
        Category::Policy,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ransomware => "ransomware",
            Category::Malware => "malware",
            Category::Phishing => "phishing",
            Category::DataBreach => "data_breach",
            Category::Vulnerability => "vulnerability",
            Category::Apt => "apt",
            Category::SupplyChain => "supply_chain",
            Category::Ddos => "ddos",
            Category::Fraud => "fraud",
            Category::Policy => "policy",
            Category::Other => "other",
        }
    }

    /// Normalizes case, spaces and hyphens; unknown labels map to `Other`.
    pub fn parse_lenient(raw: &str) -> Category {
        match normalize_label(raw).as_str() {
            "ransomware" => Category::Ransomware,
            "malware" | "trojan" | "botnet" | "infostealer" => Category::Malware,
            "phishing" | "social_engineering" | "bec" => Category::Phishing,
            "data_breach" | "breach" | "data_leak" | "leak" => Category::DataBreach,
            "vulnerability" | "vuln" | "zero_day" | "exploit" | "cve" => Category::Vulnerability,
            "apt" | "nation_state" | "espionage" | "threat_actor" => Category::Apt,
            "supply_chain" => Category::SupplyChain,
            "ddos" | "dos" | "denial_of_service" => Category::Ddos,
            "fraud" | "scam" => Category::Fraud,
            "policy" | "regulation" | "compliance" | "legal" => Category::Policy,
            _ => Category::Other,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::parse_lenient(&s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered: `Critical > High > Medium > Low > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Unknown labels map to `Medium`: never silently downgrade to informational.
    pub fn parse_lenient(raw: &str) -> Severity {
        match normalize_label(raw).as_str() {
            "critical" | "severe" | "p0" => Severity::Critical,
            "high" | "important" | "p1" => Severity::High,
            "medium" | "moderate" | "p2" => Severity::Medium,
            "low" | "minor" | "p3" => Severity::Low,
            "info" | "informational" | "none" => Severity::Info,
            _ => Severity::Medium,
        }
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        Severity::parse_lenient(&s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Which path actually produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Baseline,
    Tiered,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Baseline => "baseline",
            Strategy::Tiered => "tiered",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicators of compromise; each list is a deduplicated, ordered set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IocBundle {
    #[serde(default, alias = "ip_addresses", alias = "ip", deserialize_with = "lenient_set")]
    pub ips: BTreeSet<String>,
    #[serde(default, alias = "domain", deserialize_with = "lenient_set")]
    pub domains: BTreeSet<String>,
    #[serde(default, alias = "cve", alias = "cve_ids", deserialize_with = "lenient_set")]
    pub cves: BTreeSet<String>,
    #[serde(default, alias = "file_hashes", alias = "hash", deserialize_with = "lenient_set")]
    pub hashes: BTreeSet<String>,
    #[serde(default, alias = "url", deserialize_with = "lenient_set")]
    pub urls: BTreeSet<String>,
    #[serde(default, alias = "email_addresses", alias = "email", deserialize_with = "lenient_set")]
    pub emails: BTreeSet<String>,
}

impl IocBundle {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.ips.len()
            + self.domains.len()
            + self.cves.len()
            + self.hashes.len()
            + self.urls.len()
            + self.emails.len()
    }
}

/// Classifier tier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub severity: Severity,
    pub tldr: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub affected_sectors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub threat_actors: Vec<String>,
}

/// Extractor tier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default, deserialize_with = "lenient_list")]
    pub key_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient_iocs")]
    pub iocs: IocBundle,
}

/// Baseline tier output: both halves in one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullAnalysis {
    #[serde(flatten)]
    pub classification: Classification,
    #[serde(flatten)]
    pub extraction: Extraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tldr: String,
    pub key_points: Vec<String>,
    pub category: Category,
    pub severity: Severity,
    pub affected_sectors: Vec<String>,
    pub threat_actors: Vec<String>,
    pub iocs: IocBundle,
    pub strategy: Strategy,
}

impl AnalysisResult {
    pub fn assemble(c: Classification, e: Extraction, strategy: Strategy) -> Self {
        Self {
            tldr: c.tldr.trim().to_string(),
            key_points: clean_list(e.key_points),
            category: c.category,
            severity: c.severity,
            affected_sectors: clean_list(c.affected_sectors),
            threat_actors: clean_list(c.threat_actors),
            iocs: crate::analyze::iocs::normalize(e.iocs),
            strategy,
        }
    }
}

/// Trim, drop empties and drop repeats while keeping first-seen order.
pub(crate) fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_ascii_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

/// Accept `null`, a single string, or an array (non-string items are stringified).
fn lenient_list<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(de)?;
    Ok(match v {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|it| match it {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

fn lenient_set<'de, D>(de: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_list(de)?.into_iter().collect())
}

fn lenient_iocs<'de, D>(de: D) -> Result<IocBundle, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(de)?;
    match v {
        Value::Object(_) => serde_json::from_value(v).map_err(serde::de::Error::custom),
        _ => Ok(IocBundle::default()),
    }
}
