//! Process-wide logging and metrics bootstrap.
//!
//! These are one-shot, idempotent-by-convention setup calls meant to run
//! once near the top of a binary's `main`, gated by
//! [`ObservabilityConfig`](threadline_types::config::ObservabilityConfig).
//! Nothing in [`crate::pipeline`] or [`crate::runtime`] depends on either
//! having run -- `tracing` macros are no-ops without a subscriber and
//! `metrics` macros are no-ops without a recorder, so skipping this module
//! entirely (e.g. in a test binary that installs its own subscriber) is
//! safe.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use threadline_types::config::ObservabilityConfig;

/// Install a `tracing-subscriber` formatting layer honoring `RUST_LOG`,
/// falling back to `info` when unset or invalid. A no-op when
/// `cfg.enable_tracing` is `false`.
///
/// Safe to call once per process; a second call would panic (the
/// underlying `set_global_default` only accepts one subscriber), so
/// callers in tests should prefer `tracing_subscriber::fmt().try_init()`
/// directly or run under `#[tokio::test]` without calling this at all.
pub fn init_tracing(cfg: &ObservabilityConfig) {
    if !cfg.enable_tracing {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install the process-global Prometheus recorder and return a handle
/// whose [`PrometheusHandle::render`] produces the text-exposition body
/// for a `/metrics` endpoint.
///
/// Returns `None` when `cfg.enable_prometheus_endpoint` is `false`. The
/// caller owns serving the rendered text over HTTP -- this crate has no
/// opinion on the web framework or port, matching how `threadline-core`
/// never hosts its own sockets for anything else either.
pub fn install_prometheus_recorder(cfg: &ObservabilityConfig) -> Option<PrometheusHandle> {
    if !cfg.enable_prometheus_endpoint {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "failed to install prometheus recorder");
            None
        }
    }
}
