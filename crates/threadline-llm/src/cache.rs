//! The multi-level semantic cache: an exact layer keyed by a
//! canonicalized hash, backed by a semantic layer that serves the nearest
//! embedding above a similarity threshold. Both layers share LRU eviction
//! and lazy TTL expiry; at most one concurrent compute runs per key.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use threadline_types::cache::{CacheDomain, CacheEntry, SimilarityBucket};
use threadline_types::config::CacheConfig;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OnceCell;

/// The layer that served a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    /// The exact-key layer.
    Exact,
    /// The embedding-indexed layer.
    Semantic,
}

impl CacheLayer {
    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            CacheLayer::Exact => "exact",
            CacheLayer::Semantic => "semantic",
        }
    }
}

/// The outcome of a [`MultiLevelCache::get`] lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The cached value.
    pub value: serde_json::Value,
    /// Which layer served it.
    pub layer: CacheLayer,
    /// Cosine similarity, populated for semantic hits.
    pub similarity: Option<f32>,
}

/// Canonicalize a prompt for the exact-key layer: collapse whitespace and
/// lowercase, so trivial formatting differences still hit.
pub fn canonicalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Build the exact-layer key (`hash(tenant:workspace:domain:prompt_canonical:model)`).
pub fn exact_key(namespace: &str, domain: CacheDomain, prompt: &str, model: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    let canonical = canonicalize_prompt(prompt);
    let mut hasher = DefaultHasher::new();
    namespace.hash(&mut hasher);
    domain.label().hash(&mut hasher);
    canonical.hash(&mut hasher);
    model.hash(&mut hasher);
    format!("{}:{}:{:x}", namespace, domain.label(), hasher.finish())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

struct LruLayer {
    entries: DashMap<String, CacheEntry>,
    order: AsyncMutex<VecDeque<String>>,
    max_entries: usize,
}

impl LruLayer {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: AsyncMutex::new(VecDeque::new()),
            max_entries,
        }
    }

    async fn touch(&self, key: &str) {
        let mut order = self.order.lock().await;
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }

    async fn insert(&self, key: String, entry: CacheEntry) {
        self.entries.insert(key.clone(), entry);
        self.touch(&key).await;
        let mut order = self.order.lock().await;
        while order.len() > self.max_entries {
            if let Some(evict) = order.pop_front() {
                self.entries.remove(&evict);
            } else {
                break;
            }
        }
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
        let mut order = self.order.lock().await;
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
    }
}

/// The exact + semantic multi-level cache.
pub struct MultiLevelCache {
    exact: LruLayer,
    semantic: LruLayer,
    config: CacheConfig,
    in_flight: DashMap<String, Arc<OnceCell<serde_json::Value>>>,
}

impl MultiLevelCache {
    /// Construct a cache from the closed configuration set.
    pub fn new(config: CacheConfig) -> Self {
        let max_entries = config.max_entries;
        Self {
            exact: LruLayer::new(max_entries),
            semantic: LruLayer::new(max_entries),
            config,
            in_flight: DashMap::new(),
        }
    }

    fn ttl_for(&self, domain: CacheDomain) -> u64 {
        match domain {
            CacheDomain::Llm => self.config.llm_ttl_s,
            CacheDomain::Retrieval => self.config.retrieval_ttl_s,
            CacheDomain::Tool => self.config.tool_ttl_s,
            CacheDomain::Routing => self.config.routing_ttl_s,
        }
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Look up `key` in the exact layer, then (if enabled and an embedding
    /// is supplied) the semantic layer. Lazily evicts expired entries.
    /// Cache errors are non-fatal: on any internal error this returns `None`
    /// rather than propagating ("any cache error is non-fatal
    /// and falls through to compute").
    pub async fn get(
        &self,
        key: &str,
        domain: CacheDomain,
        embedding: Option<&[f32]>,
    ) -> Option<CacheHit> {
        let now = Self::now_millis();

        if let Some(mut entry) = self.exact.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.hits += 1;
                metrics::counter!("cache_hits_total", "domain" => domain.label(), "layer" => "exact").increment(1);
                let value = entry.value.clone();
                drop(entry);
                self.exact.touch(key).await;
                return Some(CacheHit {
                    value,
                    layer: CacheLayer::Exact,
                    similarity: None,
                });
            }
        }
        if self.exact.entries.contains_key(key) {
            // Present but expired: evict lazily.
            self.exact.remove(key).await;
        }

        if self.config.enable_semantic_cache {
            if let Some(query_embedding) = embedding {
                // Consulting the semantic layer at all counts as "issuing" a
                // prefetch against it; a hit that's actually returned to the
                // caller counts as that prefetch being "used".
                metrics::counter!("semantic_prefetch_issued_total", "domain" => domain.label())
                    .increment(1);
                if let Some(hit) = self.semantic_lookup(domain, query_embedding, now).await {
                    metrics::counter!("semantic_prefetch_used_total", "domain" => domain.label())
                        .increment(1);
                    metrics::counter!("cache_hits_total", "domain" => domain.label(), "layer" => "semantic").increment(1);
                    let bucket = SimilarityBucket::classify(hit.1);
                    metrics::counter!("cache_similarity", "bucket" => bucket.label()).increment(1);
                    return Some(CacheHit {
                        value: hit.0,
                        layer: CacheLayer::Semantic,
                        similarity: Some(hit.1),
                    });
                }
            }
        }

        metrics::counter!("cache_misses_total", "domain" => domain.label()).increment(1);
        None
    }

    async fn semantic_lookup(
        &self,
        domain: CacheDomain,
        query: &[f32],
        now: u64,
    ) -> Option<(serde_json::Value, f32)> {
        let threshold = self.config.semantic_cache_threshold;
        let mut best: Option<(String, f32, serde_json::Value)> = None;
        for entry in self.semantic.entries.iter() {
            if entry.domain != domain || entry.is_expired(now) {
                continue;
            }
            let Some(emb) = entry.embedding.as_deref() else {
                continue;
            };
            let sim = cosine_similarity(query, emb);
            if sim >= threshold && best.as_ref().is_none_or(|(_, best_sim, _)| sim > *best_sim) {
                best = Some((entry.key.clone(), sim, entry.value.clone()));
            }
        }
        if let Some((key, sim, value)) = best {
            self.semantic.touch(&key).await;
            Some((value, sim))
        } else {
            None
        }
    }

    /// Write `value` to both layers with the domain's TTL (/// "Set writes to both layers with the same TTL").
    pub async fn set(
        &self,
        key: &str,
        domain: CacheDomain,
        value: serde_json::Value,
        embedding: Option<Vec<f32>>,
    ) {
        let ttl_s = self
            .config
            .semantic_cache_ttl_seconds
            .filter(|_| embedding.is_some())
            .unwrap_or_else(|| self.ttl_for(domain));
        let entry = CacheEntry {
            key: key.to_string(),
            embedding: embedding.clone(),
            value: value.clone(),
            created_at: Self::now_millis(),
            ttl_s,
            hits: 0,
            domain,
        };
        self.exact.insert(key.to_string(), entry.clone()).await;
        if embedding.is_some() && self.config.enable_semantic_cache {
            self.semantic.insert(key.to_string(), entry).await;
        }
    }

    /// Remove every entry whose key starts with `prefix` from both layers
    /// ("transactionally").
    pub async fn invalidate(&self, prefix: &str) {
        let exact_keys: Vec<String> = self
            .exact
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for k in exact_keys {
            self.exact.remove(&k).await;
        }
        let semantic_keys: Vec<String> = self
            .semantic
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for k in semantic_keys {
            self.semantic.remove(&k).await;
        }
    }

    /// Run `compute` at most once concurrently per `key` -- in-flight
    /// requests for the same key join the same future (/// "at-most-one concurrent compute per key").
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        domain: CacheDomain,
        embedding: Option<&[f32]>,
        compute: F,
    ) -> serde_json::Value
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = serde_json::Value>,
    {
        if let Some(hit) = self.get(key, domain, embedding).await {
            return hit.value;
        }

        let cell = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let value = cell
            .get_or_init(|| async {
                let value = compute().await;
                self.set(key, domain, value.clone(), embedding.map(|e| e.to_vec()))
                    .await;
                value
            })
            .await
            .clone();

        self.in_flight.remove(key);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CacheConfig {
        CacheConfig::default()
    }

    #[tokio::test]
    async fn round_trip_within_ttl() {
        let cache = MultiLevelCache::new(cfg());
        cache.set("k1", CacheDomain::Llm, serde_json::json!("v1"), None).await;
        let hit = cache.get("k1", CacheDomain::Llm, None).await.unwrap();
        assert_eq!(hit.value, serde_json::json!("v1"));
        assert_eq!(hit.layer, CacheLayer::Exact);
    }

    #[tokio::test]
    async fn miss_after_ttl_expires() {
        let mut config = cfg();
        config.llm_ttl_s = 0;
        let cache = MultiLevelCache::new(config);
        cache.set("k1", CacheDomain::Llm, serde_json::json!("v1"), None).await;
        // ttl_s = 0 means created_at == expires_at, so "now" is already past.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let hit = cache.get("k1", CacheDomain::Llm, None).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn semantic_hit_above_threshold() {
        let cache = MultiLevelCache::new(cfg());
        cache
            .set(
                "k1",
                CacheDomain::Llm,
                serde_json::json!("v1"),
                Some(vec![1.0, 0.0, 0.0]),
            )
            .await;
        let hit = cache
            .get("different-key", CacheDomain::Llm, Some(&[0.99, 0.01, 0.0]))
            .await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().layer, CacheLayer::Semantic);
    }

    #[tokio::test]
    async fn semantic_miss_below_threshold() {
        let cache = MultiLevelCache::new(cfg());
        cache
            .set("k1", CacheDomain::Llm, serde_json::json!("v1"), Some(vec![1.0, 0.0, 0.0]))
            .await;
        let hit = cache
            .get("different-key", CacheDomain::Llm, Some(&[0.0, 1.0, 0.0]))
            .await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_matching_prefix() {
        let cache = MultiLevelCache::new(cfg());
        cache.set("tenant:ws:a", CacheDomain::Tool, serde_json::json!(1), None).await;
        cache.set("tenant:ws:b", CacheDomain::Tool, serde_json::json!(2), None).await;
        cache.set("other:ws:c", CacheDomain::Tool, serde_json::json!(3), None).await;
        cache.invalidate("tenant:ws:").await;
        assert!(cache.get("tenant:ws:a", CacheDomain::Tool, None).await.is_none());
        assert!(cache.get("tenant:ws:b", CacheDomain::Tool, None).await.is_none());
        assert!(cache.get("other:ws:c", CacheDomain::Tool, None).await.is_some());
    }

    #[tokio::test]
    async fn lru_evicts_oldest_beyond_capacity() {
        let mut config = cfg();
        config.max_entries = 2;
        let cache = MultiLevelCache::new(config);
        cache.set("a", CacheDomain::Tool, serde_json::json!(1), None).await;
        cache.set("b", CacheDomain::Tool, serde_json::json!(2), None).await;
        cache.set("c", CacheDomain::Tool, serde_json::json!(3), None).await;
        assert!(cache.get("a", CacheDomain::Tool, None).await.is_none());
        assert!(cache.get("b", CacheDomain::Tool, None).await.is_some());
        assert!(cache.get("c", CacheDomain::Tool, None).await.is_some());
    }

    #[tokio::test]
    async fn get_or_compute_caches_result() {
        let cache = MultiLevelCache::new(cfg());
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls2 = calls.clone();
        let v1 = cache
            .get_or_compute("k", CacheDomain::Llm, None, || async move {
                calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                serde_json::json!("computed")
            })
            .await;
        let calls3 = calls.clone();
        let v2 = cache
            .get_or_compute("k", CacheDomain::Llm, None, || async move {
                calls3.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                serde_json::json!("computed-again")
            })
            .await;
        assert_eq!(v1, v2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn exact_key_is_deterministic() {
        let k1 = exact_key("t:w", CacheDomain::Llm, "Hello  World", "gpt-4o");
        let k2 = exact_key("t:w", CacheDomain::Llm, "hello world", "gpt-4o");
        assert_eq!(k1, k2);
    }
}
