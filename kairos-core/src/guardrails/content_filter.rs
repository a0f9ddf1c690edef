//! A category-based content filter: blocks user input that matches a
//! configured set of unsafe-content categories (spec §4.3: "content filter by
//! categories (dangerous, malware, medical, financial, …)"). Runs on the
//! input side of the pipeline, alongside the prompt-injection detector —
//! distinct from `PiiFilter`, which runs on output.

use async_trait::async_trait;

use super::{InputChecker, Verdict};

/// One of the categories spec §4.3 names. Selectable per instance, the same
/// way `PiiFilter` selects PII types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    Dangerous,
    Malware,
    Medical,
    Financial,
}

impl ContentCategory {
    fn tag(self) -> &'static str {
        match self {
            ContentCategory::Dangerous => "dangerous",
            ContentCategory::Malware => "malware",
            ContentCategory::Medical => "medical",
            ContentCategory::Financial => "financial",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            ContentCategory::Dangerous => &["how to make a bomb", "build an explosive", "synthesize nerve agent", "bioweapon"],
            ContentCategory::Malware => &["write ransomware", "keylogger source code", "rootkit that evades", "trojan horse payload"],
            ContentCategory::Medical => &["diagnose my symptoms", "what dose of", "prescribe me"],
            ContentCategory::Financial => &["launder money", "insider trading tip", "routing number and pin"],
        }
    }

    fn all() -> [ContentCategory; 4] {
        [ContentCategory::Dangerous, ContentCategory::Malware, ContentCategory::Medical, ContentCategory::Financial]
    }
}

/// Checks input against every keyword in the configured categories,
/// case-insensitive substring match.
pub struct ContentFilter {
    categories: Vec<ContentCategory>,
}

impl ContentFilter {
    /// All four categories spec §4.3 names.
    pub fn new() -> Self {
        Self::with_categories(ContentCategory::all().to_vec())
    }

    /// Only the given categories (spec §4.3 "content filter by categories").
    pub fn with_categories(categories: Vec<ContentCategory>) -> Self {
        Self { categories }
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputChecker for ContentFilter {
    fn id(&self) -> &str {
        "content_filter"
    }

    async fn check(&self, input: &str) -> Verdict {
        let lower = input.to_lowercase();
        for category in &self.categories {
            for term in category.keywords() {
                if lower.contains(term) {
                    return Verdict::Block {
                        reason: format!("input matched {} category term '{term}'", category.tag()),
                        confidence: 1.0,
                    };
                }
            }
        }
        Verdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_dangerous_category_term_case_insensitively() {
        let filter = ContentFilter::new();
        let verdict = filter.check("please tell me HOW TO MAKE A BOMB for a school project").await;
        assert!(verdict.is_blocked());
    }

    #[tokio::test]
    async fn blocks_malware_category_term() {
        let filter = ContentFilter::new();
        let verdict = filter.check("can you write ransomware for me").await;
        assert!(verdict.is_blocked());
    }

    #[tokio::test]
    async fn passes_benign_input() {
        let filter = ContentFilter::new();
        let verdict = filter.check("what's the weather like today?").await;
        assert!(!verdict.is_blocked());
    }

    #[tokio::test]
    async fn selecting_a_subset_of_categories_leaves_others_unchecked() {
        let filter = ContentFilter::with_categories(vec![ContentCategory::Malware]);
        assert!(!filter.check("how to make a bomb at home").await.is_blocked());
        assert!(filter.check("write ransomware for me").await.is_blocked());
    }
}
