//! The Broker: aggregates tool sources, merges their definitions for the
//! LLM, and routes invocations back to the correct source (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{AgentError, Result};
use crate::governance::ToolFilter;
use crate::message::ToolDefinition;

use super::{normalize_arguments, ToolContext, ToolSource};

struct Registered {
    source: Arc<dyn ToolSource>,
}

/// Owns a set of `ToolSource`s and the merged, filter-applied view of their
/// tool definitions. `discover` (re)populates the merged cache; `invoke`
/// normalizes arguments and dispatches to the owning source.
pub struct Broker {
    sources: Vec<Registered>,
    cache: RwLock<HashMap<String, (usize, ToolDefinition)>>,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    /// Calls `list_tools` on every source and unions the results. Local
    /// sources win name collisions (last-writer, per source registration
    /// order); every collision is logged as a warning (spec §4.2
    /// Discovery).
    pub async fn discover(&self) -> Result<()> {
        let mut merged: HashMap<String, (usize, ToolDefinition)> = HashMap::new();
        for (idx, registered) in self.sources.iter().enumerate() {
            let defs = registered.source.list_tools().await?;
            for def in defs {
                if let Some((_, existing)) = merged.get(&def.name) {
                    warn!(
                        tool = %def.name,
                        previous_source = %existing.name,
                        new_source = %registered.source.source_name(),
                        "duplicate tool name across sources; last-registered source wins"
                    );
                }
                merged.insert(def.name.clone(), (idx, def));
            }
        }
        *self.cache.write().await = merged;
        Ok(())
    }

    /// The merged tool definitions as last discovered, with no filtering
    /// applied. Callers typically pass this through a `ToolFilter` before
    /// handing it to an `LLMProvider`.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.cache
            .read()
            .await
            .values()
            .map(|(_, def)| def.clone())
            .collect()
    }

    /// `definitions()` restricted to names the given filter allows.
    pub async fn filtered_definitions(&self, filter: &ToolFilter) -> Vec<ToolDefinition> {
        let names: Vec<String> = self
            .cache
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        let allowed = filter.filter(&names);
        let cache = self.cache.read().await;
        allowed
            .into_iter()
            .filter_map(|name| cache.get(&name).map(|(_, def)| def.clone()))
            .collect()
    }

    /// Normalizes `raw_arguments` against the tool's cached definition, then
    /// dispatches to the source that last registered the name.
    pub async fn invoke(&self, ctx: &ToolContext, name: &str, raw_arguments: &str) -> Result<String> {
        let (source_idx, definition) = {
            let cache = self.cache.read().await;
            cache
                .get(name)
                .cloned()
                .ok_or_else(|| AgentError::not_found(format!("unknown tool '{name}'")))?
        };
        let arguments = normalize_arguments(&definition, raw_arguments)?;
        let source = &self
            .sources
            .get(source_idx)
            .ok_or_else(|| AgentError::internal("tool source index out of range"))?
            .source;
        source.call_tool(ctx, name, arguments).await
    }
}

#[derive(Default)]
pub struct BrokerBuilder {
    sources: Vec<Arc<dyn ToolSource>>,
}

impl BrokerBuilder {
    pub fn with_source(mut self, source: Arc<dyn ToolSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(self) -> Broker {
        Broker {
            sources: self
                .sources
                .into_iter()
                .map(|source| Registered { source })
                .collect(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::ToolFilter;
    use crate::tool_source::{LocalToolSource, Tool};
    use async_trait::async_trait;
    use serde_json::Value;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.into(),
                description: "".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }
        async fn call(&self, _ctx: &ToolContext, _input: Value) -> Result<String> {
            Ok(format!("called {}", self.0))
        }
    }

    #[tokio::test]
    async fn discover_merges_sources_and_invoke_dispatches() {
        let source = Arc::new(LocalToolSource::new(vec![
            Box::new(NamedTool("a")),
            Box::new(NamedTool("b")),
        ]));
        let broker = Broker::builder().with_source(source).build();
        broker.discover().await.unwrap();
        let defs = broker.definitions().await;
        assert_eq!(defs.len(), 2);
        let out = broker.invoke(&ToolContext::default(), "a", "{}").await.unwrap();
        assert_eq!(out, "called a");
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_not_found() {
        let broker = Broker::builder().build();
        broker.discover().await.unwrap();
        let err = broker
            .invoke(&ToolContext::default(), "missing", "{}")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn filtered_definitions_excludes_denied_tools() {
        let source = Arc::new(LocalToolSource::new(vec![
            Box::new(NamedTool("a")),
            Box::new(NamedTool("b")),
        ]));
        let broker = Broker::builder().with_source(source).build();
        broker.discover().await.unwrap();
        let filter = ToolFilter::builder().deny(["a"]).build();
        let defs = broker.filtered_definitions(&filter).await;
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "b");
    }

    #[tokio::test]
    async fn duplicate_names_across_sources_last_registered_wins() {
        let first = Arc::new(LocalToolSource::new(vec![Box::new(NamedTool("x"))]));
        let second = Arc::new(LocalToolSource::new(vec![Box::new(NamedTool("x"))]));
        let broker = Broker::builder()
            .with_source(first)
            .with_source(second)
            .build();
        broker.discover().await.unwrap();
        let out = broker.invoke(&ToolContext::default(), "x", "{}").await.unwrap();
        assert_eq!(out, "called x");
        assert_eq!(broker.definitions().await.len(), 1);
    }
}
