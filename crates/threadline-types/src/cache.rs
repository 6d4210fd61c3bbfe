//! Shared cache data model.

use serde::{Deserialize, Serialize};

/// The four cache domains, each with its own default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    /// LLM completion cache; default TTL 3600s.
    Llm,
    /// Retrieval-augmented lookups; default TTL 300s.
    Retrieval,
    /// Analysis tool results; default TTL 300s.
    Tool,
    /// Router decisions; default TTL 300s.
    Routing,
}

impl CacheDomain {
    /// Label used in metrics and namespacing.
    pub fn label(self) -> &'static str {
        match self {
            CacheDomain::Llm => "llm",
            CacheDomain::Retrieval => "retrieval",
            CacheDomain::Tool => "tool",
            CacheDomain::Routing => "routing",
        }
    }

    /// Compile-time default TTL in seconds, before any config override.
    pub fn default_ttl_s(self) -> u64 {
        match self {
            CacheDomain::Llm => 3600,
            CacheDomain::Retrieval => 300,
            CacheDomain::Tool => 300,
            CacheDomain::Routing => 300,
        }
    }
}

/// A single cached entry. Eviction is LRU within a fixed
/// capacity; entries past TTL are lazily evicted on lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key (already namespaced).
    pub key: String,
    /// Embedding vector, present for entries indexed for semantic lookup.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// The cached payload.
    pub value: serde_json::Value,
    /// Unix millis when the entry was created.
    pub created_at: u64,
    /// Time-to-live in seconds from `created_at`.
    pub ttl_s: u64,
    /// Number of times this entry has been read.
    pub hits: u64,
    /// Which logical domain this entry belongs to.
    pub domain: CacheDomain,
}

impl CacheEntry {
    /// Whether this entry is expired at `now_millis`.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        let expires_at = self.created_at.saturating_add(self.ttl_s.saturating_mul(1000));
        now_millis >= expires_at
    }
}

/// The similarity bucket used for the `cache_similarity{bucket}` metric
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityBucket {
    /// `>= 0.9`.
    High,
    /// `0.75..0.9`.
    Medium,
    /// `< 0.75`.
    Low,
}

impl SimilarityBucket {
    /// Classify a cosine similarity into its bucket.
    pub fn classify(similarity: f32) -> Self {
        if similarity >= 0.9 {
            SimilarityBucket::High
        } else if similarity >= 0.75 {
            SimilarityBucket::Medium
        } else {
            SimilarityBucket::Low
        }
    }

    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            SimilarityBucket::High => ">=0.9",
            SimilarityBucket::Medium => "0.75-0.9",
            SimilarityBucket::Low => "<0.75",
        }
    }
}
