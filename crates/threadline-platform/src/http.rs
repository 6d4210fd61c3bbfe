//! The HTTP substrate: a single call site for all outbound HTTP,
//! with timeout, retry-with-backoff, circuit breaking, and metrics baked in.
//!
//! Direct use of a bare HTTP client anywhere else in the workspace is
//! forbidden -- every stage that needs to reach the network goes through
//! [`ResilientHttpClient`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use threadline_types::config::HttpConfig;

/// HTTP response from a request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HttpResponse {
    /// HTTP status code (e.g., 200, 404, 500).
    pub status: u16,
    /// Response headers as key-value pairs.
    pub headers: HashMap<String, String>,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Parse body as UTF-8 text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Parse body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Check if status is success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` header, in seconds, when present and parseable.
    pub fn retry_after_s(&self) -> Option<u64> {
        self.headers.get("retry-after").and_then(|v| v.parse().ok())
    }
}

/// Platform-agnostic HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send an HTTP request with the given method, URL, headers, and optional body.
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>>;

    /// Send an HTTP GET request.
    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        self.request("GET", url, headers, None).await
    }

    /// Send an HTTP POST request with a body.
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        self.request("POST", url, headers, Some(body)).await
    }
}

/// Bare native HTTP client backed by [`reqwest`], with no retry or circuit
/// breaking. [`ResilientHttpClient`] wraps this to provide the full
/// substrate; nothing outside this module should talk to it directly.
pub struct NativeHttpClient {
    client: reqwest::Client,
}

impl NativeHttpClient {
    /// Create a new native HTTP client with sensible defaults.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
        }
    }
}

impl Default for NativeHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for NativeHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        let reqwest_method = method.parse::<reqwest::Method>()?;
        let mut builder = self.client.request(reqwest_method, url);

        for (key, value) in headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(body_bytes) = body {
            builder = builder.body(body_bytes.to_vec());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let mut resp_headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                resp_headers.insert(key.as_str().to_lowercase(), v.to_string());
            }
        }
        let resp_body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers: resp_headers,
            body: resp_body,
        })
    }
}

/// Host extracted from a URL, used to key circuit breaker and metric labels.
fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Whether a status code is retryable: any 5xx, or 408/429 among 4xx.
fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-host circuit breaker state ("per-host atomic counters").
struct HostCircuit {
    consecutive_failures: AtomicU32,
    state: std::sync::Mutex<CircuitState>,
    opened_at: std::sync::Mutex<Option<Instant>>,
}

impl HostCircuit {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            state: std::sync::Mutex::new(CircuitState::Closed),
            opened_at: std::sync::Mutex::new(None),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cooldown before a half-open probe is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// The resilient HTTP client: timeout (delegated to the wrapped transport),
/// retry with exponential backoff + jitter, per-host circuit breaking, and
/// `metrics`-crate instrumentation. This is the sole call site every stage
/// should use for outbound HTTP.
pub struct ResilientHttpClient {
    inner: Box<dyn HttpClient>,
    http_config: HttpConfig,
    circuit_config: CircuitBreakerConfig,
    circuits: DashMap<String, HostCircuit>,
    retry_attempts_total: AtomicU64,
    retry_giveups_total: AtomicU64,
}

impl ResilientHttpClient {
    /// Build a resilient client wrapping the given transport.
    pub fn new(inner: Box<dyn HttpClient>, http_config: HttpConfig) -> Self {
        Self {
            inner,
            http_config,
            circuit_config: CircuitBreakerConfig::default(),
            circuits: DashMap::new(),
            retry_attempts_total: AtomicU64::new(0),
            retry_giveups_total: AtomicU64::new(0),
        }
    }

    /// Build with native reqwest transport and the given configuration.
    pub fn native(http_config: HttpConfig) -> Self {
        Self::new(Box::new(NativeHttpClient::new()), http_config)
    }

    /// Total retry attempts made since construction (testing/metrics hook).
    pub fn retry_attempts_total(&self) -> u64 {
        self.retry_attempts_total.load(Ordering::Relaxed)
    }

    /// Total retry exhaustion events since construction (testing/metrics hook).
    pub fn retry_giveups_total(&self) -> u64 {
        self.retry_giveups_total.load(Ordering::Relaxed)
    }

    /// Resolve the effective retry count, honouring the precedence chain:
    /// explicit arg > per-tenant config > process config > env >
    /// compile-time default. Per-tenant and env layers are resolved by the
    /// caller before reaching this client; here we only see `explicit` and
    /// fall back to the process-level `http_config`.
    fn resolve_retries(&self, explicit: Option<u32>) -> u32 {
        match explicit {
            Some(n) if (1..=20).contains(&n) => n,
            _ => self.http_config.max_retries,
        }
    }

    fn circuit_allows(&self, host: &str) -> bool {
        let circuit = self
            .circuits
            .entry(host.to_string())
            .or_insert_with(HostCircuit::new);
        let mut state = circuit.state.lock().unwrap();
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = circuit.opened_at.lock().unwrap();
                if opened_at.is_some_and(|t| t.elapsed() >= self.circuit_config.cooldown) {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn record_success(&self, host: &str) {
        if let Some(circuit) = self.circuits.get(host) {
            circuit.consecutive_failures.store(0, Ordering::Relaxed);
            *circuit.state.lock().unwrap() = CircuitState::Closed;
        }
    }

    fn record_failure(&self, host: &str) {
        let circuit = self
            .circuits
            .entry(host.to_string())
            .or_insert_with(HostCircuit::new);
        let failures = circuit.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.circuit_config.failure_threshold {
            *circuit.state.lock().unwrap() = CircuitState::Open;
            *circuit.opened_at.lock().unwrap() = Some(Instant::now());
        }
    }

    fn backoff_delay(&self, attempt: u32, retry_after_s: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_s {
            return Duration::from_secs(secs);
        }
        let base = Duration::from_millis(
            (1000.0 * self.http_config.backoff_factor.powi(attempt as i32)) as u64,
        );
        let capped = base.min(Duration::from_secs(30));
        let jitter_ms = rand::thread_rng().gen_range(0..=(capped.as_millis() as u64 / 4).max(1));
        capped + Duration::from_millis(jitter_ms)
    }

    /// Make a request through retry + circuit breaker + metrics.
    ///
    /// `max_retries` overrides the process-level default when `Some` and in
    /// range `[1, 20]`; the explicit argument always wins.
    pub async fn call(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
        max_retries: Option<u32>,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        let host = host_of(url);
        let retries = self.resolve_retries(max_retries);

        if !self.circuit_allows(&host) {
            metrics::counter!("http_requests_total", "method" => method.to_string(), "host" => host.clone(), "status" => "circuit_open").increment(1);
            return Err("circuit breaker open".into());
        }

        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            let result = self.inner.request(method, url, headers, body).await;
            let elapsed = started.elapsed();
            metrics::histogram!("http_latency", "method" => method.to_string(), "host" => host.clone())
                .record(elapsed.as_secs_f64());

            match &result {
                Ok(resp) if resp.is_success() => {
                    self.record_success(&host);
                    metrics::counter!("http_requests_total", "method" => method.to_string(), "host" => host.clone(), "status" => resp.status.to_string()).increment(1);
                    return result;
                }
                Ok(resp) => {
                    metrics::counter!("http_requests_total", "method" => method.to_string(), "host" => host.clone(), "status" => resp.status.to_string()).increment(1);
                    let retryable = is_retryable_status(resp.status);
                    if !retryable || attempt >= retries {
                        self.record_failure(&host);
                        if retryable {
                            self.retry_giveups_total.fetch_add(1, Ordering::Relaxed);
                            metrics::counter!("http_retry_giveups_total").increment(1);
                            tracing::warn!(retry.give_up = true, host = %host, attempt, "retry exhausted");
                        }
                        return result;
                    }
                    let delay = self.backoff_delay(attempt, resp.retry_after_s());
                    attempt += 1;
                    self.retry_attempts_total.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("http_retry_attempts_total").increment(1);
                    tracing::debug!(retry.attempt = attempt, host = %host, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {
                    metrics::counter!("http_requests_total", "method" => method.to_string(), "host" => host.clone(), "status" => "transport_error").increment(1);
                    if attempt >= retries {
                        self.record_failure(&host);
                        self.retry_giveups_total.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("http_retry_giveups_total").increment(1);
                        tracing::warn!(retry.give_up = true, host = %host, attempt, "retry exhausted");
                        return result;
                    }
                    let scaled = self
                        .backoff_delay(attempt, None)
                        .mul_f64(self.http_config.connection_error_scale);
                    attempt += 1;
                    self.retry_attempts_total.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("http_retry_attempts_total").increment(1);
                    tracing::debug!(retry.attempt = attempt, host = %host, delay = ?scaled, "retrying after transport error");
                    tokio::time::sleep(scaled).await;
                }
            }
        }
    }
}

#[async_trait]
impl HttpClient for ResilientHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        self.call(method, url, headers, body, None).await
    }
}
