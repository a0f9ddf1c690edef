//! Governance: which tools an agent may see at all (`ToolFilter`) and which
//! invocations require a human approval before they run (`PolicyEngine`),
//! spec §4.3 / §3 `PolicyRule`/`Decision`.
//!
//! Grounded in the teacher's `helve::ApprovalPolicy` / `tools_requiring_approval`
//! (a fixed three-value policy naming `delete_file`/`write_file` directly),
//! generalized here to a data-driven, first-match-wins rule table so the set
//! of gated/denied actions is not hardcoded to a file-tool vocabulary.

use glob::Pattern;

/// What kind of action a `PolicyRule` matches against (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionType {
    Tool,
    Action,
}

/// The outcome a matching rule assigns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
    Pending,
}

/// One row of the policy table: `name_pattern` is a glob matched against the
/// action/tool name; the first matching rule in a `PolicyEngine` wins (spec
/// §3, §8 property 3).
#[derive(Clone, Debug)]
pub struct PolicyRule {
    pub id: String,
    pub effect: Effect,
    pub action_type: ActionType,
    pub name_pattern: String,
    pub reason: Option<String>,
}

impl PolicyRule {
    pub fn new(id: impl Into<String>, effect: Effect, action_type: ActionType, name_pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            effect,
            action_type,
            name_pattern: name_pattern.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Convenience constructor for the common case: a tool-name rule.
    pub fn tool(id: impl Into<String>, effect: Effect, name_pattern: impl Into<String>) -> Self {
        Self::new(id, effect, ActionType::Tool, name_pattern)
    }

    fn matches(&self, action_type: ActionType, name: &str) -> bool {
        self.action_type == action_type
            && Pattern::new(&self.name_pattern)
                .map(|p| p.matches(name))
                .unwrap_or(false)
    }
}

/// `{allowed, status, reason?, rule_id?}` (spec §3). `status` is the richer
/// signal; `allowed` is `status == Allow` for callers that only care about a
/// boolean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub status: Effect,
    pub reason: Option<String>,
    pub rule_id: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            status: Effect::Allow,
            reason: None,
            rule_id: None,
        }
    }

    fn from_rule(rule: &PolicyRule) -> Self {
        Self {
            allowed: rule.effect == Effect::Allow,
            status: rule.effect,
            reason: rule.reason.clone(),
            rule_id: Some(rule.id.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Effect::Pending
    }
}

/// An ordered table of `PolicyRule`s. `evaluate` returns the decision of the
/// first matching rule; no match decides `allow` (spec §3, §8 property 3).
#[derive(Clone, Debug, Default)]
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, action_type: ActionType, name: &str) -> Decision {
        for rule in &self.rules {
            if rule.matches(action_type, name) {
                return Decision::from_rule(rule);
            }
        }
        Decision::allow()
    }

    /// Convenience for the Agent Loop, which only ever evaluates tool calls.
    pub fn evaluate_tool(&self, tool_name: &str) -> Decision {
        self.evaluate(ActionType::Tool, tool_name)
    }
}

/// Controls which tool definitions are even visible to the LLM (spec §4.3).
/// Distinct from `PolicyEngine`: a denied tool never reaches the model at
/// all, whereas a gated-but-allowed (pending) tool is visible but pauses for
/// approval when invoked.
///
/// Evaluation order (spec §4.3): deny-list first, then allow-list (if
/// non-empty, membership is required), then the optional `PolicyEngine`,
/// else allow.
#[derive(Clone, Default)]
pub struct ToolFilter {
    deny_globs: Vec<String>,
    allow_globs: Vec<String>,
    policy: Option<PolicyEngine>,
}

impl ToolFilter {
    pub fn builder() -> ToolFilterBuilder {
        ToolFilterBuilder::default()
    }

    /// Returns the subset of `names` this filter allows, preserving order
    /// (spec §8 property 4: idempotent, and `is_allowed(x)=deny ⇒ x ∉
    /// filter({…,x,…})`).
    pub fn filter(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.is_allowed(name).allowed)
            .cloned()
            .collect()
    }

    pub fn is_allowed(&self, name: &str) -> Decision {
        if self.deny_globs.iter().any(|g| glob_matches(g, name)) {
            return Decision {
                allowed: false,
                status: Effect::Deny,
                reason: Some(format!("tool '{name}' matches a deny rule")),
                rule_id: None,
            };
        }
        if !self.allow_globs.is_empty() && !self.allow_globs.iter().any(|g| glob_matches(g, name)) {
            return Decision {
                allowed: false,
                status: Effect::Deny,
                reason: Some(format!("tool '{name}' is not in the allow list")),
                rule_id: None,
            };
        }
        if let Some(policy) = &self.policy {
            return policy.evaluate_tool(name);
        }
        Decision::allow()
    }
}

fn glob_matches(pattern: &str, name: &str) -> bool {
    Pattern::new(pattern).map(|p| p.matches(name)).unwrap_or(false)
}

#[derive(Default)]
pub struct ToolFilterBuilder {
    deny_globs: Vec<String>,
    allow_globs: Vec<String>,
    policy: Option<PolicyEngine>,
}

impl ToolFilterBuilder {
    pub fn deny<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_globs.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn allow<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_globs.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn policy(mut self, policy: PolicyEngine) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> ToolFilter {
        ToolFilter {
            deny_globs: self.deny_globs,
            allow_globs: self.allow_globs,
            policy: self.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_engine_pending_for_matching_glob() {
        let engine = PolicyEngine::new(vec![PolicyRule::tool("p1", Effect::Pending, "delete_*")]);
        let decision = engine.evaluate_tool("delete_file");
        assert!(!decision.allowed);
        assert!(decision.is_pending());
        assert_eq!(decision.rule_id.as_deref(), Some("p1"));
        assert_eq!(engine.evaluate_tool("read_file").status, Effect::Allow);
    }

    #[test]
    fn policy_engine_first_matching_rule_wins() {
        let engine = PolicyEngine::new(vec![
            PolicyRule::tool("r1", Effect::Allow, "write_notes"),
            PolicyRule::tool("r2", Effect::Deny, "write_*"),
        ]);
        assert_eq!(engine.evaluate_tool("write_notes").status, Effect::Allow);
        let denied = engine.evaluate_tool("write_file");
        assert_eq!(denied.status, Effect::Deny);
        assert_eq!(denied.rule_id.as_deref(), Some("r2"));
    }

    #[test]
    fn policy_engine_no_match_allows() {
        let engine = PolicyEngine::new(vec![PolicyRule::tool("r1", Effect::Deny, "delete_*")]);
        let decision = engine.evaluate_tool("anything_else");
        assert!(decision.allowed);
        assert_eq!(decision.rule_id, None);
    }

    #[test]
    fn tool_filter_deny_overrides_allow() {
        let filter = ToolFilter::builder().allow(["*"]).deny(["dangerous_*"]).build();
        assert!(filter.is_allowed("read_file").allowed);
        assert!(!filter.is_allowed("dangerous_shell").allowed);
    }

    #[test]
    fn tool_filter_allow_list_restricts_to_matches() {
        let filter = ToolFilter::builder().allow(["read_*"]).build();
        let names = vec!["read_file".to_string(), "write_file".to_string()];
        assert_eq!(filter.filter(&names), vec!["read_file".to_string()]);
    }

    #[test]
    fn tool_filter_with_no_rules_allows_everything() {
        let filter = ToolFilter::default();
        assert!(filter.is_allowed("anything").allowed);
    }

    #[test]
    fn tool_filter_consults_policy_engine_after_deny_and_allow_lists() {
        let policy = PolicyEngine::new(vec![PolicyRule::tool("p1", Effect::Pending, "restricted")]);
        let filter = ToolFilter::builder().policy(policy).build();
        assert!(filter.is_allowed("restricted").is_pending());
        assert!(filter.is_allowed("other").allowed);
    }

    #[test]
    fn filter_is_idempotent() {
        let filter = ToolFilter::builder().deny(["bad"]).build();
        let names = vec!["good".to_string(), "bad".to_string()];
        let once = filter.filter(&names);
        let twice = filter.filter(&once);
        assert_eq!(once, twice);
    }
}
