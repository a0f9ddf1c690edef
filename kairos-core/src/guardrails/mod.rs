//! Guardrails: input checkers and output filters run around every LLM turn
//! (spec §4.3). Unlike governance (which gates which *tools* run), a
//! guardrail inspects *content* — user input before it reaches the model,
//! assistant output before it reaches the caller.
//!
//! New relative to the teacher (no guardrails module exists there); built in
//! its idiom: `async_trait` checker/filter traits, one `thiserror` error
//! type, and a `dashmap`-backed `GuardrailSet` so the active rule snapshot
//! used by one agent turn is an immutable, lock-free read even while another
//! task reconfigures it (spec §5: "guardrail checks run against a consistent
//! snapshot").

pub mod content_filter;
pub mod pii_filter;
pub mod prompt_injection;

pub use content_filter::{ContentCategory, ContentFilter};
pub use pii_filter::{PiiFilter, PiiMode, PiiType};
pub use prompt_injection::PromptInjectionDetector;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Guardrails operate independently of `AgentError` transport/tool failures:
/// a block is a deliberate decision, not an error condition to propagate
/// verbatim, so it carries its own small type that the Agent Loop converts
/// into `AgentError::guardrail_blocked` at the call site.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("blocked by guardrail '{guardrail_id}': {reason}")]
    Blocked { guardrail_id: String, reason: String },
}

/// Verdict for one piece of content (spec §3 `GuardrailResult.Input`:
/// `{blocked, guardrail_id, confidence∈[0,1], reason?}` — `guardrail_id` is
/// attached by the caller from `InputChecker::id`/`OutputFilter::id`).
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Pass,
    Block { reason: String, confidence: f32 },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    /// `1.0` for `Pass` (nothing suspicious found); the checker's own
    /// `confidence` for `Block`.
    pub fn confidence(&self) -> f32 {
        match self {
            Verdict::Pass => 1.0,
            Verdict::Block { confidence, .. } => *confidence,
        }
    }
}

/// Runs before a user message is added to the conversation.
#[async_trait]
pub trait InputChecker: Send + Sync {
    fn id(&self) -> &str;
    async fn check(&self, input: &str) -> Verdict;
}

/// Runs on assistant output before it is surfaced to the caller.
#[async_trait]
pub trait OutputFilter: Send + Sync {
    fn id(&self) -> &str;
    /// Returns the (possibly redacted) content alongside a verdict. A
    /// `Block` verdict discards `content` entirely at the call site.
    async fn filter(&self, content: &str) -> (String, Verdict);
}

/// An immutable, swappable snapshot of the active checkers/filters. Callers
/// hold an `Arc<GuardrailSnapshot>` for the duration of one agent turn so
/// concurrent reconfiguration never produces a half-old, half-new pipeline.
#[derive(Clone, Default)]
pub struct GuardrailSnapshot {
    pub input_checkers: Arc<Vec<Arc<dyn InputChecker>>>,
    pub output_filters: Arc<Vec<Arc<dyn OutputFilter>>>,
    counters: Arc<DashMap<String, GuardrailCounter>>,
}

impl GuardrailSnapshot {
    pub async fn check_input(&self, input: &str) -> Result<(), GuardrailError> {
        for checker in self.input_checkers.iter() {
            let verdict = checker.check(input).await;
            self.record(checker.id(), &verdict);
            if let Verdict::Block { reason, .. } = verdict {
                return Err(GuardrailError::Blocked {
                    guardrail_id: checker.id().to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Runs every output filter in order, threading the (possibly redacted)
    /// content through each. The first `Block` short-circuits.
    pub async fn filter_output(&self, content: &str) -> Result<String, GuardrailError> {
        let mut current = content.to_string();
        for filter in self.output_filters.iter() {
            let (filtered, verdict) = filter.filter(&current).await;
            self.record(filter.id(), &verdict);
            if let Verdict::Block { reason, .. } = verdict {
                return Err(GuardrailError::Blocked {
                    guardrail_id: filter.id().to_string(),
                    reason,
                });
            }
            current = filtered;
        }
        Ok(current)
    }

    fn record(&self, guardrail_id: &str, verdict: &Verdict) {
        let mut counter = self.counters.entry(guardrail_id.to_string()).or_insert_with(GuardrailCounter::default);
        counter.checks.fetch_add(1, Ordering::Relaxed);
        if verdict.is_blocked() {
            counter.blocks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Per-guardrail invocation/block counts (spec §4.3 "a `stats()` snapshot
/// reports counts").
#[derive(Default)]
struct GuardrailCounter {
    checks: AtomicU64,
    blocks: AtomicU64,
}

/// One guardrail's counters as read by `GuardrailSet::stats()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuardrailStats {
    pub checks: u64,
    pub blocks: u64,
}

/// Holds the live, named guardrails and publishes immutable snapshots.
/// `DashMap` gives lock-free concurrent registration/removal; `snapshot`
/// clones the current `Arc` contents into a frozen `GuardrailSnapshot`. The
/// counters map is shared (not cloned) between every snapshot and the set
/// itself, so counts accumulate across concurrent turns and reconfiguration.
#[derive(Default)]
pub struct GuardrailSet {
    input_checkers: DashMap<String, Arc<dyn InputChecker>>,
    output_filters: DashMap<String, Arc<dyn OutputFilter>>,
    counters: Arc<DashMap<String, GuardrailCounter>>,
}

impl GuardrailSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_input_checker(&self, checker: Arc<dyn InputChecker>) {
        self.input_checkers.insert(checker.id().to_string(), checker);
    }

    pub fn register_output_filter(&self, filter: Arc<dyn OutputFilter>) {
        self.output_filters.insert(filter.id().to_string(), filter);
    }

    pub fn remove_input_checker(&self, id: &str) {
        self.input_checkers.remove(id);
    }

    pub fn remove_output_filter(&self, id: &str) {
        self.output_filters.remove(id);
    }

    pub fn snapshot(&self) -> GuardrailSnapshot {
        GuardrailSnapshot {
            input_checkers: Arc::new(self.input_checkers.iter().map(|e| Arc::clone(e.value())).collect()),
            output_filters: Arc::new(self.output_filters.iter().map(|e| Arc::clone(e.value())).collect()),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Snapshot of every guardrail's invocation/block counts observed so
    /// far, keyed by `InputChecker::id`/`OutputFilter::id` (spec §4.3).
    pub fn stats(&self) -> HashMap<String, GuardrailStats> {
        self.counters
            .iter()
            .map(|entry| {
                let counter = entry.value();
                (
                    entry.key().clone(),
                    GuardrailStats {
                        checks: counter.checks.load(Ordering::Relaxed),
                        blocks: counter.blocks.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBlockChecker;

    #[async_trait]
    impl InputChecker for AlwaysBlockChecker {
        fn id(&self) -> &str {
            "always_block"
        }
        async fn check(&self, _input: &str) -> Verdict {
            Verdict::Block { reason: "nope".into(), confidence: 1.0 }
        }
    }

    struct UppercaseFilter;

    #[async_trait]
    impl OutputFilter for UppercaseFilter {
        fn id(&self) -> &str {
            "uppercase"
        }
        async fn filter(&self, content: &str) -> (String, Verdict) {
            (content.to_uppercase(), Verdict::Pass)
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_registered_checkers() {
        let set = GuardrailSet::new();
        set.register_input_checker(Arc::new(AlwaysBlockChecker));
        let snapshot = set.snapshot();
        let err = snapshot.check_input("hi").await.unwrap_err();
        assert!(matches!(err, GuardrailError::Blocked { guardrail_id, .. } if guardrail_id == "always_block"));
    }

    #[tokio::test]
    async fn output_filters_chain_and_can_block() {
        let set = GuardrailSet::new();
        set.register_output_filter(Arc::new(UppercaseFilter));
        let snapshot = set.snapshot();
        let out = snapshot.filter_output("hello").await.unwrap();
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn removing_a_checker_excludes_it_from_future_snapshots() {
        let set = GuardrailSet::new();
        set.register_input_checker(Arc::new(AlwaysBlockChecker));
        set.remove_input_checker("always_block");
        let snapshot = set.snapshot();
        assert!(snapshot.check_input("hi").await.is_ok());
    }

    #[tokio::test]
    async fn stats_accumulate_checks_and_blocks_per_guardrail() {
        let set = GuardrailSet::new();
        set.register_input_checker(Arc::new(AlwaysBlockChecker));
        set.register_output_filter(Arc::new(UppercaseFilter));
        let snapshot = set.snapshot();

        let _ = snapshot.check_input("hi").await;
        let _ = snapshot.check_input("again").await;
        let _ = snapshot.filter_output("hello").await;

        let stats = set.stats();
        assert_eq!(stats["always_block"], GuardrailStats { checks: 2, blocks: 2 });
        assert_eq!(stats["uppercase"], GuardrailStats { checks: 1, blocks: 0 });
    }
}
