//! The process-wide [`PipelineRuntime`] aggregate: an explicitly constructed
//! owner of the HTTP substrate, cache, router, registries, and checkpoint
//! table, replacing module-level singletons. A single process-wide runtime
//! is instantiated at startup and torn down at shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use threadline_llm::{LlmRouter, MultiLevelCache, ProviderAdapter};
use threadline_platform::http::{HttpResponse, ResilientHttpClient};
use threadline_types::cache::CacheDomain;
use threadline_types::config::ThreadlineConfig;
use threadline_types::routing::ArmProfile;

use crate::pipeline::checkpoint::CheckpointTable;
use crate::pipeline::traits::{AnalysisTool, Embedder, GraphMemory, MediaAcquirer, Notifier, Transcriber, VectorMemory};

/// The static registry of collaborator implementations: tool adapters keyed
/// by string name, replacing a dynamic discovery mechanism.
pub struct ToolRegistry {
    /// Media acquisition.
    pub acquirer: Arc<dyn MediaAcquirer>,
    /// Transcription.
    pub transcriber: Arc<dyn Transcriber>,
    /// Named analysis tools participating in the stage-7 fan-out, keyed by
    /// their own `AnalysisTool::name()`.
    pub analysis_tools: HashMap<String, Arc<dyn AnalysisTool>>,
    /// Vector memory.
    pub vector_memory: Arc<dyn VectorMemory>,
    /// Graph memory, used when `depth >= deep`.
    pub graph_memory: Arc<dyn GraphMemory>,
    /// Outbound notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Text embedding, used to index analysis output for vector memory.
    pub embedder: Arc<dyn Embedder>,
}

/// Owns every shared, stateful collaborator: the HTTP substrate, the
/// multi-level cache, the LLM router, the tool registry, and the
/// checkpoint table. Constructed once at process start; passed by
/// reference into every request's [`crate::pipeline::orchestrator::Orchestrator`].
pub struct PipelineRuntime {
    /// The sole HTTP call site.
    pub http: Arc<ResilientHttpClient>,
    /// The exact + semantic cache.
    pub cache: Arc<MultiLevelCache>,
    /// Contextual-bandit arm router.
    pub router: Arc<LlmRouter>,
    /// Collaborator implementations.
    pub tools: ToolRegistry,
    /// Early-exit checkpoint table.
    pub checkpoints: CheckpointTable,
    /// The closed configuration set.
    pub config: ThreadlineConfig,
}

impl PipelineRuntime {
    /// Construct the runtime from its configuration and collaborators. The
    /// router's arm registry and provider adapters are supplied by the
    /// caller, since they come from deployment-specific configuration
    /// rather than anything this crate can default.
    pub fn new(
        config: ThreadlineConfig,
        arm_profiles: Vec<ArmProfile>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        tools: ToolRegistry,
        rng_seed: u64,
    ) -> Self {
        let http = Arc::new(ResilientHttpClient::native(config.http.clone()));
        let cache = Arc::new(MultiLevelCache::new(config.cache.clone()));
        let router = Arc::new(LlmRouter::new(arm_profiles, adapters, config.router.clone(), rng_seed));
        Self {
            http,
            cache,
            router,
            tools,
            checkpoints: CheckpointTable::defaults(),
            config,
        }
    }

    /// Snapshot the router's bandit state for persistence. Call this from
    /// the host process's own shutdown/interval hook; this crate does not
    /// run a background timer itself.
    pub async fn snapshot_bandit_state(&self) -> threadline_llm::BanditState {
        self.router.snapshot_state().await
    }

    /// Restore a previously persisted bandit state, typically called once
    /// at startup before the runtime serves its first request.
    pub async fn restore_bandit_state(&self, state: threadline_llm::BanditState) {
        self.router.restore_state(state).await;
    }

    /// `GET` with the §4.4 cache fronting it: a hit on `{namespace}:get:{url}`
    /// skips the network entirely; a miss falls through to
    /// [`ResilientHttpClient::call`], and only a successful (2xx) response
    /// is written back to the cache -- a transient failure never poisons the
    /// key for the next caller.
    ///
    /// Does not join concurrent callers into a single in-flight request the
    /// way [`MultiLevelCache::get_or_compute`] does for the router: unlike a
    /// billed LLM call, an extra GET on a cache-miss stampede costs nothing
    /// this crate needs to prevent.
    pub async fn cached_get(
        &self,
        namespace: &str,
        domain: CacheDomain,
        url: &str,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        let key = format!("{namespace}:get:{url}");
        if let Some(hit) = self.cache.get(&key, domain, None).await {
            if let Ok(response) = serde_json::from_value::<HttpResponse>(hit.value) {
                return Ok(response);
            }
        }
        let response = self
            .http
            .call("GET", url, &HashMap::new(), None, None)
            .await?;
        if response.is_success() {
            self.cache
                .set(&key, domain, serde_json::to_value(&response)?, None)
                .await;
        }
        Ok(response)
    }
}
