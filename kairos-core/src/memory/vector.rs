//! Embedding and vector-search contracts (spec §4.4), plus an in-memory
//! reference implementation.
//!
//! Grounded directly in the teacher's `memory::embedder::Embedder` trait and
//! `memory::in_memory_vector_store::InMemoryVectorStore` (`DashMap`-backed
//! storage, cosine similarity, namespaced compound keys) — carried over with
//! the item/search vocabulary simplified to what spec §4.4 actually names
//! (no `StoreOp`/batch machinery, since the Agent Loop only ever puts and
//! searches one item at a time).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::error::{AgentError, Result};

/// Turns text into dense vectors for semantic search. Implementations call
/// out to a real embedding model; this crate only defines the contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// A namespaced item stored in a `VectorStore`.
#[derive(Clone, Debug)]
pub struct MemoryItem {
    pub namespace: Vec<String>,
    pub key: String,
    pub value: JsonValue,
    pub created_at: u64,
    pub updated_at: u64,
}

/// One search hit: the matched item plus its cosine similarity score.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub item: MemoryItem,
    pub score: f32,
}

/// Cross-session semantic memory: put/get/delete by namespaced key, and
/// nearest-neighbor search by embedding similarity (spec §4.4).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn put(&self, namespace: &[String], key: &str, value: JsonValue, text: &str) -> Result<()>;
    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<MemoryItem>>;
    async fn delete(&self, namespace: &[String], key: &str) -> Result<()>;
    /// Returns the `limit` items in `namespace` most similar to `query`.
    async fn search(&self, namespace: &[String], query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

struct Entry {
    vector: Vec<f32>,
    item: MemoryItem,
}

fn compound_key(namespace: &[String], key: &str) -> String {
    format!("{}/{key}", namespace.join("/"))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// `DashMap`-backed reference `VectorStore`, suitable for tests and
/// single-process deployments. Compound key is `namespace segments joined by
/// '/'` plus `/key`, matching the teacher's `make_key` scheme.
pub struct InMemoryVectorStore {
    data: DashMap<String, Entry>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            data: DashMap::new(),
            embedder,
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn put(&self, namespace: &[String], key: &str, value: JsonValue, text: &str) -> Result<()> {
        let mut vectors = self.embedder.embed(&[text]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            AgentError::internal("embedder returned no vector for input text")
        })?;
        let now = now_secs();
        let created_at = self
            .data
            .get(&compound_key(namespace, key))
            .map(|e| e.item.created_at)
            .unwrap_or(now);
        let item = MemoryItem {
            namespace: namespace.to_vec(),
            key: key.to_string(),
            value,
            created_at,
            updated_at: now,
        };
        self.data.insert(compound_key(namespace, key), Entry { vector, item });
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<MemoryItem>> {
        Ok(self.data.get(&compound_key(namespace, key)).map(|e| e.item.clone()))
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<()> {
        self.data.remove(&compound_key(namespace, key));
        Ok(())
    }

    async fn search(&self, namespace: &[String], query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut query_vectors = self.embedder.embed(&[query]).await?;
        let query_vector = query_vectors.pop().ok_or_else(|| {
            AgentError::internal("embedder returned no vector for query text")
        })?;

        let mut hits: Vec<SearchHit> = self
            .data
            .iter()
            .filter(|entry| entry.value().item.namespace == namespace)
            .map(|entry| SearchHit {
                item: entry.value().item.clone(),
                score: cosine_similarity(&query_vector, &entry.value().vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}
