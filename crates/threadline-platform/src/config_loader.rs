//! Environment-variable configuration loading.
//!
//! The closed set of recognized variables is documented on each field of
//! [`threadline_types::config::ThreadlineConfig`]; this module only knows
//! how to read them and apply the compile-time defaults when absent or
//! invalid. Invalid values never fail the process -- they are logged and
//! the default is kept ("invalid values ignored").

use threadline_types::config::{
    CacheConfig, HttpConfig, ObservabilityConfig, PipelineConfig, QualityConfig, RouterConfig,
    RouterPolicyName, TenancyConfig, ThreadlineConfig,
};

use crate::env::Environment;

fn parse_or_default<T: std::str::FromStr>(
    env: &dyn Environment,
    name: &str,
    default: T,
) -> T {
    match env.get_var(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid env value, using default");
            default
        }),
        None => default,
    }
}

fn parse_bool(env: &dyn Environment, name: &str, default: bool) -> bool {
    match env.get_var(name).map(|v| v.to_ascii_lowercase()) {
        Some(v) if v == "1" || v == "true" || v == "yes" => true,
        Some(v) if v == "0" || v == "false" || v == "no" => false,
        Some(v) => {
            tracing::warn!(var = name, value = %v, "invalid boolean env value, using default");
            default
        }
        None => default,
    }
}

fn parse_csv(env: &dyn Environment, name: &str) -> Vec<String> {
    env.get_var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Load the full [`ThreadlineConfig`] from environment variables, falling
/// back to compile-time defaults for anything unset or unparseable.
pub fn load_config(env: &dyn Environment) -> ThreadlineConfig {
    let defaults = ThreadlineConfig::default();

    let pipeline = PipelineConfig {
        max_parallel_analysis: parse_or_default(
            env,
            "PIPELINE_MAX_PARALLEL_ANALYSIS",
            defaults.pipeline.max_parallel_analysis,
        ),
        request_budget_ms: env.get_var("PIPELINE_REQUEST_BUDGET_MS").and_then(|v| v.parse().ok()),
    };

    let quality = QualityConfig {
        min_word_count: parse_or_default(
            env,
            "QUALITY_MIN_WORD_COUNT",
            defaults.quality.min_word_count,
        ),
        min_sentence_count: parse_or_default(
            env,
            "QUALITY_MIN_SENTENCE_COUNT",
            defaults.quality.min_sentence_count,
        ),
        min_coherence: parse_or_default(env, "QUALITY_MIN_COHERENCE", defaults.quality.min_coherence),
        min_overall: parse_or_default(env, "QUALITY_MIN_OVERALL", defaults.quality.min_overall),
        enable_quality_filtering: parse_bool(
            env,
            "ENABLE_QUALITY_FILTERING",
            defaults.quality.enable_quality_filtering,
        ),
    };

    let cache = CacheConfig {
        llm_ttl_s: parse_or_default(env, "CACHE_LLM_TTL", defaults.cache.llm_ttl_s),
        retrieval_ttl_s: defaults.cache.retrieval_ttl_s,
        tool_ttl_s: parse_or_default(env, "CACHE_TOOL_TTL", defaults.cache.tool_ttl_s),
        routing_ttl_s: parse_or_default(env, "CACHE_ROUTING_TTL", defaults.cache.routing_ttl_s),
        enable_semantic_cache: parse_bool(
            env,
            "ENABLE_SEMANTIC_CACHE",
            defaults.cache.enable_semantic_cache,
        ),
        semantic_cache_threshold: parse_or_default(
            env,
            "SEMANTIC_CACHE_THRESHOLD",
            defaults.cache.semantic_cache_threshold,
        ),
        semantic_cache_ttl_seconds: env
            .get_var("SEMANTIC_CACHE_TTL_SECONDS")
            .and_then(|v| v.parse().ok()),
        max_entries: defaults.cache.max_entries,
    };

    let policy = match env.get_var("ROUTER_POLICY").as_deref() {
        Some("quality_first") => RouterPolicyName::QualityFirst,
        Some("cost_aware") => RouterPolicyName::CostAware,
        Some("latency_aware") => RouterPolicyName::LatencyAware,
        Some(other) => {
            tracing::warn!(value = other, "unknown ROUTER_POLICY, using default");
            defaults.router.policy
        }
        None => defaults.router.policy,
    };
    let router = RouterConfig {
        policy,
        provider_allowlist: parse_csv(env, "LLM_PROVIDER_ALLOWLIST"),
        quality_first_tasks: parse_csv(env, "QUALITY_FIRST_TASKS"),
    };

    let http = HttpConfig {
        max_retries: {
            let n: u32 = parse_or_default(env, "HTTP_MAX_RETRIES", defaults.http.max_retries);
            if (1..=20).contains(&n) {
                n
            } else {
                defaults.http.max_retries
            }
        },
        default_timeout_s: parse_or_default(
            env,
            "HTTP_DEFAULT_TIMEOUT",
            defaults.http.default_timeout_s,
        ),
        backoff_factor: parse_or_default(env, "HTTP_BACKOFF_FACTOR", defaults.http.backoff_factor),
        connection_error_scale: parse_or_default(
            env,
            "HTTP_CONNECTION_ERROR_SCALE",
            defaults.http.connection_error_scale,
        ),
    };

    let tenancy = TenancyConfig {
        strict: parse_bool(env, "ENABLE_TENANCY_STRICT", defaults.tenancy.strict),
    };

    let observability = ObservabilityConfig {
        enable_prometheus_endpoint: parse_bool(
            env,
            "ENABLE_PROMETHEUS_ENDPOINT",
            defaults.observability.enable_prometheus_endpoint,
        ),
        enable_tracing: parse_bool(env, "ENABLE_TRACING", defaults.observability.enable_tracing),
    };

    ThreadlineConfig {
        pipeline,
        quality,
        cache,
        router,
        http,
        tenancy,
        observability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockEnv {
        vars: Mutex<HashMap<String, String>>,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: Mutex::new(HashMap::new()),
            }
        }

        fn with_var(self, key: &str, value: &str) -> Self {
            self.vars
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            self
        }
    }

    impl Environment for MockEnv {
        fn get_var(&self, name: &str) -> Option<String> {
            self.vars.lock().unwrap().get(name).cloned()
        }
        fn set_var(&self, _name: &str, _value: &str) {}
        fn remove_var(&self, _name: &str) {}
    }

    #[test]
    fn empty_env_yields_defaults() {
        let env = MockEnv::new();
        let config = load_config(&env);
        assert_eq!(config.pipeline.max_parallel_analysis, 4);
        assert_eq!(config.http.max_retries, 3);
        assert!(!config.tenancy.strict);
    }

    #[test]
    fn overrides_applied() {
        let env = MockEnv::new()
            .with_var("PIPELINE_MAX_PARALLEL_ANALYSIS", "8")
            .with_var("ENABLE_TENANCY_STRICT", "true")
            .with_var("ROUTER_POLICY", "quality_first")
            .with_var("LLM_PROVIDER_ALLOWLIST", "openai, anthropic");
        let config = load_config(&env);
        assert_eq!(config.pipeline.max_parallel_analysis, 8);
        assert!(config.tenancy.strict);
        assert_eq!(config.router.policy, RouterPolicyName::QualityFirst);
        assert_eq!(
            config.router.provider_allowlist,
            vec!["openai".to_string(), "anthropic".to_string()]
        );
    }

    #[test]
    fn invalid_numeric_value_falls_back_to_default() {
        let env = MockEnv::new().with_var("HTTP_MAX_RETRIES", "not-a-number");
        let config = load_config(&env);
        assert_eq!(config.http.max_retries, 3);
    }

    #[test]
    fn out_of_range_retries_falls_back_to_default() {
        let env = MockEnv::new().with_var("HTTP_MAX_RETRIES", "999");
        let config = load_config(&env);
        assert_eq!(config.http.max_retries, 3);
    }
}
