//! Typed configuration mirroring the closed set of recognized environment
//! options.
//!
//! Each group corresponds to one configuration area (pipeline, quality
//! filter, cache, router, HTTP, tenancy, observability). Loading from
//! environment variables happens in `threadline_platform::config_loader`;
//! this module only defines the shapes and their defaults.

use serde::{Deserialize, Serialize};

/// `PIPELINE_MAX_PARALLEL_ANALYSIS`, `PIPELINE_REQUEST_BUDGET_MS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max concurrent tasks in the analysis fan-out. Default 4.
    #[serde(default = "default_max_parallel_analysis")]
    pub max_parallel_analysis: usize,
    /// Overall request budget in milliseconds. When absent, the
    /// per-depth default timeouts apply.
    #[serde(default)]
    pub request_budget_ms: Option<u64>,
}

fn default_max_parallel_analysis() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_analysis: default_max_parallel_analysis(),
            request_budget_ms: None,
        }
    }
}

/// `QUALITY_MIN_WORD_COUNT`, `QUALITY_MIN_SENTENCE_COUNT`,
/// `QUALITY_MIN_COHERENCE`, `QUALITY_MIN_OVERALL`, `ENABLE_QUALITY_FILTERING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum word count to pass the quality gate. Default 500.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    /// Minimum sentence count to pass the quality gate. Default 10.
    #[serde(default = "default_min_sentence_count")]
    pub min_sentence_count: usize,
    /// Minimum coherence score to pass the quality gate. Default 0.6.
    #[serde(default = "default_min_coherence")]
    pub min_coherence: f64,
    /// Minimum overall score to pass the quality gate. Default 0.65.
    #[serde(default = "default_min_overall")]
    pub min_overall: f64,
    /// Whether the bypass decision is honoured at all. When `false`, the
    /// orchestrator always runs the full analysis fan-out.
    #[serde(default = "default_true")]
    pub enable_quality_filtering: bool,
}

fn default_min_word_count() -> usize {
    500
}
fn default_min_sentence_count() -> usize {
    10
}
fn default_min_coherence() -> f64 {
    0.6
}
fn default_min_overall() -> f64 {
    0.65
}
fn default_true() -> bool {
    true
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            min_sentence_count: default_min_sentence_count(),
            min_coherence: default_min_coherence(),
            min_overall: default_min_overall(),
            enable_quality_filtering: true,
        }
    }
}

/// `CACHE_LLM_TTL`, `CACHE_TOOL_TTL`, `CACHE_ROUTING_TTL`,
/// `ENABLE_SEMANTIC_CACHE`, `SEMANTIC_CACHE_THRESHOLD`,
/// `SEMANTIC_CACHE_TTL_SECONDS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds for the `llm` domain. Default 3600.
    #[serde(default = "default_llm_ttl")]
    pub llm_ttl_s: u64,
    /// TTL in seconds for the `retrieval` domain. Default 300.
    #[serde(default = "default_retrieval_ttl")]
    pub retrieval_ttl_s: u64,
    /// TTL in seconds for the `tool` domain. Default 300.
    #[serde(default = "default_tool_ttl")]
    pub tool_ttl_s: u64,
    /// TTL in seconds for the `routing` domain. Default 300.
    #[serde(default = "default_routing_ttl")]
    pub routing_ttl_s: u64,
    /// Whether the semantic (embedding) cache layer is consulted.
    #[serde(default = "default_true")]
    pub enable_semantic_cache: bool,
    /// Cosine similarity threshold for a semantic hit. Default 0.85.
    #[serde(default = "default_semantic_threshold")]
    pub semantic_cache_threshold: f32,
    /// Override TTL in seconds specifically for semantic-cache entries;
    /// falls back to the domain TTL when unset.
    #[serde(default)]
    pub semantic_cache_ttl_seconds: Option<u64>,
    /// Max entries per cache layer before LRU eviction kicks in.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_llm_ttl() -> u64 {
    3600
}
fn default_retrieval_ttl() -> u64 {
    300
}
fn default_tool_ttl() -> u64 {
    300
}
fn default_routing_ttl() -> u64 {
    300
}
fn default_semantic_threshold() -> f32 {
    0.85
}
fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            llm_ttl_s: default_llm_ttl(),
            retrieval_ttl_s: default_retrieval_ttl(),
            tool_ttl_s: default_tool_ttl(),
            routing_ttl_s: default_routing_ttl(),
            enable_semantic_cache: true,
            semantic_cache_threshold: default_semantic_threshold(),
            semantic_cache_ttl_seconds: None,
            max_entries: default_max_entries(),
        }
    }
}

/// `ROUTER_POLICY`, `LLM_PROVIDER_ALLOWLIST`, `QUALITY_FIRST_TASKS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Which bandit policy governs arm selection.
    #[serde(default)]
    pub policy: RouterPolicyName,
    /// Provider names allowed to participate in routing; empty means "all".
    #[serde(default)]
    pub provider_allowlist: Vec<String>,
    /// Task types routed through the QUALITY_FIRST shortlist regardless
    /// of the configured policy.
    #[serde(default)]
    pub quality_first_tasks: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            policy: RouterPolicyName::default(),
            provider_allowlist: Vec::new(),
            quality_first_tasks: Vec::new(),
        }
    }
}

/// `ROUTER_POLICY ∈ {quality_first, cost_aware, latency_aware}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterPolicyName {
    /// Deterministic top-tier shortlist + bandit tie-break.
    QualityFirst,
    /// ε-greedy / UCB1 over cost-adjusted reward.
    #[default]
    CostAware,
    /// ε-greedy / UCB1 over latency-adjusted reward.
    LatencyAware,
}

/// `HTTP_MAX_RETRIES`, `HTTP_DEFAULT_TIMEOUT`, `HTTP_BACKOFF_FACTOR`,
/// `HTTP_CONNECTION_ERROR_SCALE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Process-level default retry count. Valid range `[1, 20]`; invalid
    /// values are ignored in favour of the compile-time default (3).
    #[serde(default = "default_http_retries")]
    pub max_retries: u32,
    /// Default per-request timeout in seconds. Default 30.
    #[serde(default = "default_http_timeout_s")]
    pub default_timeout_s: u64,
    /// Exponential backoff multiplier. Default 2.0.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Extra backoff multiplier applied specifically to connection
    /// errors (vs. HTTP-status-coded failures). Default 1.0 (no scaling).
    #[serde(default = "default_connection_error_scale")]
    pub connection_error_scale: f64,
}

/// Compile-time default retry count: the final fallback in the precedence
/// chain when no explicit, per-tenant, process, or env override applies.
pub const COMPILE_TIME_DEFAULT_RETRIES: u32 = 3;

fn default_http_retries() -> u32 {
    COMPILE_TIME_DEFAULT_RETRIES
}
fn default_http_timeout_s() -> u64 {
    30
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_connection_error_scale() -> f64 {
    1.0
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: default_http_retries(),
            default_timeout_s: default_http_timeout_s(),
            backoff_factor: default_backoff_factor(),
            connection_error_scale: default_connection_error_scale(),
        }
    }
}

/// `ENABLE_TENANCY_STRICT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// When true, missing tenant context is a fatal `tenancy` error
    /// instead of falling back to `"default:default"`.
    #[serde(default)]
    pub strict: bool,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self { strict: false }
    }
}

/// `ENABLE_PROMETHEUS_ENDPOINT`, `ENABLE_TRACING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Whether to expose a `/metrics` Prometheus endpoint.
    #[serde(default)]
    pub enable_prometheus_endpoint: bool,
    /// Whether to initialize the tracing subscriber.
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_prometheus_endpoint: false,
            enable_tracing: true,
        }
    }
}

/// Aggregate of every configuration group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadlineConfig {
    /// Pipeline orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Quality filter settings.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Router settings.
    #[serde(default)]
    pub router: RouterConfig,
    /// HTTP substrate settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Tenancy settings.
    #[serde(default)]
    pub tenancy: TenancyConfig,
    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}
