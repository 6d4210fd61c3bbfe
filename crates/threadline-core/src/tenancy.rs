//! Tenant-scoped resource namespacing.
//!
//! `TenantContext` itself lives in `threadline_types::tenant`; this module
//! owns the behaviour around it -- acquisition with a fallback policy,
//! namespace derivation, and the per-request state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use threadline_types::config::TenancyConfig;
use threadline_types::error::{ErrorCategory, PipelineError};
use threadline_types::tenant::TenantContext;

/// Associates a `TenantContext` with a request. A thin wrapper today; kept
/// as a named operation alongside `current_tenant` and `namespace` as the
/// three tenancy primitives.
pub fn with_tenant(tc: TenantContext) -> TenantContext {
    tc
}

/// Resolve the tenant context to use for a request that may have arrived
/// without one. In strict mode, a missing context is a fatal `tenancy`
/// error. In non-strict mode, it falls back to `"default:default"` and
/// increments `tenancy_fallback_total{component}`.
pub fn current_tenant(
    provided: Option<TenantContext>,
    config: &TenancyConfig,
    component: &str,
    request_id: &str,
) -> Result<TenantContext, PipelineError> {
    match provided {
        Some(tc) => Ok(tc),
        None if config.strict => Err(PipelineError::new(
            ErrorCategory::Tenancy,
            "request is missing required tenant context",
            component,
        )),
        None => {
            metrics::counter!("tenancy_fallback_total", "component" => component.to_string())
                .increment(1);
            tracing::warn!(component, "missing tenant context, falling back to default:default");
            Ok(TenantContext::default_fallback(request_id))
        }
    }
}

fn sanitize_disallowed(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 2);
    for c in segment.chars() {
        if matches!(c, ':' | '/' | ' ' | '\t') {
            out.push('_');
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Derive a namespaced key `"{tenant}:{workspace}:{collection}"`, with any
/// of `: / <space> <tab>` inside a segment replaced by `__` so the two
/// top-level `:` separators remain unambiguous.
pub fn namespace(tc: &TenantContext, collection: &str) -> String {
    format!(
        "{}:{}:{}",
        sanitize_disallowed(&tc.tenant_id),
        sanitize_disallowed(&tc.workspace_id),
        sanitize_disallowed(collection)
    )
}

/// The per-request tenancy state machine: `NEW -> ACTIVE ->
/// DONE` on success, or `NEW -> ACTIVE -> FAILED`. `ACTIVE` is the only
/// state in which a request may produce side effects. Transitions are
/// recorded as span events by the caller at each `transition` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    New = 0,
    Active = 1,
    Done = 2,
    Failed = 3,
}

impl RequestState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RequestState::Active,
            2 => RequestState::Done,
            3 => RequestState::Failed,
            _ => RequestState::New,
        }
    }
}

/// Tracks one request's lifecycle state. Constructed once per request by
/// the orchestrator and threaded alongside the cancellation token.
pub struct RequestLifecycle {
    state: AtomicU8,
    request_id: String,
}

impl RequestLifecycle {
    /// Start a new lifecycle in the `NEW` state.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            state: AtomicU8::new(RequestState::New as u8),
            request_id: request_id.into(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `NEW -> ACTIVE`. Only side-effecting stages should run once this
    /// has been called.
    pub fn activate(&self) {
        self.state.store(RequestState::Active as u8, Ordering::SeqCst);
        tracing::info!(request_id = %self.request_id, state = "active", "request activated");
    }

    /// `ACTIVE -> DONE`.
    pub fn complete(&self) {
        self.state.store(RequestState::Done as u8, Ordering::SeqCst);
        tracing::info!(request_id = %self.request_id, state = "done", "request completed");
    }

    /// `ACTIVE -> FAILED`.
    pub fn fail(&self) {
        self.state.store(RequestState::Failed as u8, Ordering::SeqCst);
        tracing::info!(request_id = %self.request_id, state = "failed", "request failed");
    }

    /// Whether side effects (memory writes, notify) are permitted right now.
    pub fn may_side_effect(&self) -> bool {
        self.state() == RequestState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_joins_three_segments() {
        let tc = TenantContext::new("acme", "prod", "req-1");
        assert_eq!(namespace(&tc, "vectors"), "acme:prod:vectors");
    }

    #[test]
    fn namespace_sanitizes_disallowed_characters() {
        let tc = TenantContext::new("ac me", "pro:d", "req-1");
        let ns = namespace(&tc, "coll/ection");
        assert_eq!(ns, "ac__me:pro__d:coll__ection");
        // Only the two top-level `:` separators should remain.
        assert_eq!(ns.matches(':').count(), 2);
        assert!(!ns.contains(' '));
        assert!(!ns.contains('\t'));
    }

    #[test]
    fn namespace_escapes_colon_inside_segment_distinctly_from_separators() {
        let tc = TenantContext::new("a:b", "w", "r");
        let ns = namespace(&tc, "c");
        assert_eq!(ns, "a__b:w:c");
    }

    #[test]
    fn current_tenant_strict_mode_errors_when_missing() {
        let config = TenancyConfig { strict: true };
        let result = current_tenant(None, &config, "acquire", "req-1");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().category, ErrorCategory::Tenancy);
    }

    #[test]
    fn current_tenant_non_strict_falls_back() {
        let config = TenancyConfig { strict: false };
        let tc = current_tenant(None, &config, "acquire", "req-1").unwrap();
        assert_eq!(tc.tenant_id, "default");
        assert_eq!(tc.workspace_id, "default");
    }

    #[test]
    fn current_tenant_returns_provided_context_untouched() {
        let config = TenancyConfig { strict: true };
        let tc = TenantContext::new("acme", "prod", "req-1");
        let resolved = current_tenant(Some(tc.clone()), &config, "acquire", "req-1").unwrap();
        assert_eq!(resolved, tc);
    }

    #[test]
    fn lifecycle_transitions() {
        let lifecycle = RequestLifecycle::new("req-1");
        assert_eq!(lifecycle.state(), RequestState::New);
        assert!(!lifecycle.may_side_effect());
        lifecycle.activate();
        assert!(lifecycle.may_side_effect());
        lifecycle.complete();
        assert_eq!(lifecycle.state(), RequestState::Done);
        assert!(!lifecycle.may_side_effect());
    }

    #[test]
    fn lifecycle_can_fail_from_active() {
        let lifecycle = RequestLifecycle::new("req-2");
        lifecycle.activate();
        lifecycle.fail();
        assert_eq!(lifecycle.state(), RequestState::Failed);
    }
}
