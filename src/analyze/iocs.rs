// src/analyze/iocs.rs
//! Indicator normalization: refang, validate, case-normalize, dedup.
//! Entries that do not look like their kind are dropped.

use std::collections::BTreeSet;
use std::net::IpAddr;

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::analyze::types::IocBundle;

fn re_cve() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)^CVE-\d{4}-\d{4,}$").unwrap())
}

fn re_hash() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]+$").unwrap())
}

fn re_domain() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+(?:[a-z]{2,63}|xn--[a-z0-9-]{1,59})$",
        )
        .unwrap()
    })
}

fn re_email() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@(?:[a-z0-9-]+\.)+(?:[a-z]{2,63}|xn--[a-z0-9-]{1,59})$").unwrap()
    })
}

/// Undo common defanging: `hxxp`, `[.]`, `(.)`, `[dot]`, `[@]`, `[at]`, `[:]`.
pub fn refang(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    for (from, to) in [
        ("[.]", "."),
        ("(.)", "."),
        ("{.}", "."),
        ("[dot]", "."),
        ("(dot)", "."),
        ("[@]", "@"),
        ("[at]", "@"),
        ("(at)", "@"),
        ("[:]", ":"),
        ("[://]", "://"),
    ] {
        s = s.replace(from, to);
    }
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("hxxps") || lower.starts_with("hxxp") {
        s = format!("http{}", &s[4..]);
    }
    s
}

pub fn normalize_ip(raw: &str) -> Option<String> {
    refang(raw).parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

pub fn normalize_cve(raw: &str) -> Option<String> {
    let s = raw.trim();
    re_cve().is_match(s).then(|| s.to_ascii_uppercase())
}

/// MD5, SHA-1, SHA-256 and SHA-512 lengths only.
pub fn normalize_hash(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_lowercase();
    let ok_len = matches!(s.len(), 32 | 40 | 64 | 128);
    (ok_len && re_hash().is_match(&s)).then_some(s)
}

pub fn normalize_domain(raw: &str) -> Option<String> {
    let s = refang(raw).to_ascii_lowercase();
    let s = s.trim_end_matches('.');
    re_domain().is_match(s).then(|| s.to_string())
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let s = refang(raw).to_ascii_lowercase();
    re_email().is_match(&s).then_some(s)
}

pub fn normalize_url(raw: &str) -> Option<String> {
    let s = refang(raw);
    let lower = s.to_ascii_lowercase();
    let has_scheme = ["http://", "https://", "ftp://"]
        .iter()
        .any(|p| lower.starts_with(p) && lower.len() > p.len());
    (has_scheme && !s.chars().any(char::is_whitespace)).then_some(s)
}

fn apply(set: BTreeSet<String>, f: fn(&str) -> Option<String>, kind: &str) -> BTreeSet<String> {
    let before = set.len();
    let out: BTreeSet<String> = set.iter().filter_map(|s| f(s)).collect();
    if out.len() < before {
        debug!(target: "analysis", kind, dropped = before - out.len(), "ioc entries normalized away");
    }
    out
}

pub fn normalize(bundle: IocBundle) -> IocBundle {
    IocBundle {
        ips: apply(bundle.ips, normalize_ip, "ip"),
        domains: apply(bundle.domains, normalize_domain, "domain"),
        cves: apply(bundle.cves, normalize_cve, "cve"),
        hashes: apply(bundle.hashes, normalize_hash, "hash"),
        urls: apply(bundle.urls, normalize_url, "url"),
        emails: apply(bundle.emails, normalize_email, "email"),
    }
}
