//! A heuristic prompt-injection detector: blocks user input that attempts to
//! override the system prompt or exfiltrate prior instructions (spec §4.3,
//! §8 scenario S4). Confidence scales with how many of the configured
//! patterns matched; `threshold` and `strict` (spec §4.3 "tunable threshold
//! and strict mode") control how that confidence turns into a block.

use async_trait::async_trait;
use regex::RegexSet;

use super::{InputChecker, Verdict};

const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)ignore (all )?(previous|prior|above) instructions",
    r"(?i)disregard (all )?(previous|prior|above) (instructions|rules)",
    r"(?i)you are now (in )?(developer|dan|jailbreak) mode",
    r"(?i)reveal (your|the) system prompt",
    r"(?i)print (your|the) (system|hidden) prompt",
];

/// Matches input against a configurable set of regexes; confidence is the
/// fraction of configured patterns that matched. In `strict` mode any single
/// match blocks; otherwise a match blocks only once confidence reaches
/// `threshold`.
pub struct PromptInjectionDetector {
    patterns: RegexSet,
    pattern_count: usize,
    threshold: f32,
    strict: bool,
}

impl PromptInjectionDetector {
    pub fn new() -> Self {
        Self::with_patterns(DEFAULT_PATTERNS.iter().map(|s| s.to_string()))
    }

    pub fn with_patterns(patterns: impl IntoIterator<Item = String>) -> Self {
        let patterns: Vec<String> = patterns.into_iter().collect();
        let pattern_count = patterns.len().max(1);
        Self {
            patterns: RegexSet::new(&patterns).expect("guardrail patterns must compile"),
            pattern_count,
            threshold: 0.0,
            strict: false,
        }
    }

    /// Minimum confidence (fraction of patterns matched, clamped to
    /// `[0, 1]`) required to block when not in `strict` mode. Default `0.0`
    /// — any match blocks.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// In strict mode, a single matched pattern blocks regardless of
    /// `threshold`. Default `false`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for PromptInjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputChecker for PromptInjectionDetector {
    fn id(&self) -> &str {
        "prompt_injection"
    }

    async fn check(&self, input: &str) -> Verdict {
        let matched = self.patterns.matches(input).iter().count();
        if matched == 0 {
            return Verdict::Pass;
        }
        let confidence = (matched as f32 / self.pattern_count as f32).min(1.0);
        if self.strict || confidence >= self.threshold {
            Verdict::Block {
                reason: "input matched a known prompt-injection pattern".into(),
                confidence,
            }
        } else {
            Verdict::Pass
        }
    }
}
