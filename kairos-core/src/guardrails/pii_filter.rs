//! Redacts PII shapes from assistant output rather than blocking outright
//! (spec §4.3: "filters may rewrite content, not only block it"). Supports
//! every mode and PII type spec §4.3 names: modes mask/redact/hash over
//! email, phone, SSN, credit card, IP, DOB, and passport.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use regex::Regex;

use super::{OutputFilter, Verdict};

/// How a matched span is rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiiMode {
    /// Replace the match with `*` repeated to its original length.
    Mask,
    /// Replace the match with a `[redacted-<type>]` tag (the default).
    Redact,
    /// Replace the match with a stable, non-reversible hash of its text.
    Hash,
}

/// A PII shape the filter can recognize. Selectable per spec §4.3
/// "selectable PII types".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Ip,
    Dob,
    Passport,
}

impl PiiType {
    fn tag(self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit-card",
            PiiType::Ip => "ip",
            PiiType::Dob => "dob",
            PiiType::Passport => "passport",
        }
    }

    /// Order matters: more specific patterns (SSN, credit card, DOB,
    /// passport) run before the looser phone pattern so a looser regex can't
    /// claim part of a more specific match first.
    fn all() -> [PiiType; 7] {
        [
            PiiType::Ssn,
            PiiType::CreditCard,
            PiiType::Dob,
            PiiType::Passport,
            PiiType::Ip,
            PiiType::Email,
            PiiType::Phone,
        ]
    }

    fn pattern(self) -> &'static str {
        match self {
            PiiType::Email => r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            PiiType::Phone => r"\b(\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b",
            PiiType::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            PiiType::CreditCard => r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b",
            PiiType::Ip => r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            PiiType::Dob => r"\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})\b",
            PiiType::Passport => r"\b[A-Z][0-9]{8}\b",
        }
    }
}

pub struct PiiFilter {
    mode: PiiMode,
    patterns: Vec<(PiiType, Regex)>,
}

impl PiiFilter {
    /// All seven PII types, redact mode.
    pub fn new() -> Self {
        Self::with_types(PiiMode::Redact, PiiType::all().to_vec())
    }

    /// All seven PII types, the given mode.
    pub fn with_mode(mode: PiiMode) -> Self {
        Self::with_types(mode, PiiType::all().to_vec())
    }

    /// Only the given PII types, in the given mode (spec §4.3 "selectable
    /// PII types").
    pub fn with_types(mode: PiiMode, types: Vec<PiiType>) -> Self {
        let patterns = PiiType::all()
            .into_iter()
            .filter(|t| types.contains(t))
            .map(|t| (t, Regex::new(t.pattern()).expect("static pii pattern compiles")))
            .collect();
        Self { mode, patterns }
    }

    fn rewrite(&self, pii_type: PiiType, re: &Regex, content: &str) -> String {
        match self.mode {
            PiiMode::Redact => re.replace_all(content, format!("[redacted-{}]", pii_type.tag()).as_str()).into_owned(),
            PiiMode::Mask => re.replace_all(content, |caps: &regex::Captures| "*".repeat(caps[0].len())).into_owned(),
            PiiMode::Hash => re
                .replace_all(content, |caps: &regex::Captures| {
                    let mut hasher = DefaultHasher::new();
                    caps[0].hash(&mut hasher);
                    format!("[hash-{}:{:x}]", pii_type.tag(), hasher.finish())
                })
                .into_owned(),
        }
    }
}

impl Default for PiiFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputFilter for PiiFilter {
    fn id(&self) -> &str {
        "pii_filter"
    }

    async fn filter(&self, content: &str) -> (String, Verdict) {
        let mut current = content.to_string();
        for (pii_type, re) in &self.patterns {
            current = self.rewrite(*pii_type, re, &current);
        }
        (current, Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn redacts_email_addresses() {
        let filter = PiiFilter::new();
        let (out, verdict) = filter.filter("contact me at jane@example.com please").await;
        assert!(!verdict.is_blocked());
        assert_eq!(out, "contact me at [redacted-email] please");
    }

    #[tokio::test]
    async fn redacts_ssn_before_phone_pattern_can_misfire() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("ssn: 123-45-6789").await;
        assert_eq!(out, "ssn: [redacted-ssn]");
    }

    #[tokio::test]
    async fn redacts_phone_numbers() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("call 555-123-4567 now").await;
        assert_eq!(out, "call [redacted-phone] now");
    }

    #[tokio::test]
    async fn redacts_credit_card_numbers() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("card 4111 1111 1111 1111 on file").await;
        assert_eq!(out, "card [redacted-credit-card] on file");
    }

    #[tokio::test]
    async fn redacts_ip_addresses() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("connect from 10.0.0.42 please").await;
        assert_eq!(out, "connect from [redacted-ip] please");
    }

    #[tokio::test]
    async fn redacts_date_of_birth() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("dob 1990-05-12 on record").await;
        assert_eq!(out, "dob [redacted-dob] on record");
    }

    #[tokio::test]
    async fn redacts_passport_numbers() {
        let filter = PiiFilter::new();
        let (out, _) = filter.filter("passport X12345678 issued").await;
        assert_eq!(out, "passport [redacted-passport] issued");
    }

    #[tokio::test]
    async fn mask_mode_replaces_with_asterisks_of_equal_length() {
        let filter = PiiFilter::with_mode(PiiMode::Mask);
        let (out, _) = filter.filter("jane@example.com").await;
        assert_eq!(out, "*".repeat("jane@example.com".len()));
    }

    #[tokio::test]
    async fn hash_mode_is_deterministic_and_hides_the_original() {
        let filter = PiiFilter::with_mode(PiiMode::Hash);
        let (first, _) = filter.filter("jane@example.com").await;
        let (second, _) = filter.filter("jane@example.com").await;
        assert_eq!(first, second);
        assert!(!first.contains("jane@example.com"));
        assert!(first.starts_with("[hash-email:"));
    }

    #[tokio::test]
    async fn selecting_a_subset_of_types_leaves_others_untouched() {
        let filter = PiiFilter::with_types(PiiMode::Redact, vec![PiiType::Email]);
        let (out, _) = filter.filter("email jane@example.com, phone 555-123-4567").await;
        assert_eq!(out, "email [redacted-email], phone 555-123-4567");
    }
}
