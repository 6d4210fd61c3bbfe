//! [`TenantContext`]: immutable per-request tenant identity.

use serde::{Deserialize, Serialize};

/// Immutable per-request identity scoping isolation and observability
/// labels. Every stateful collaborator (cache, vector store, router
/// state) derives its keys from this via `Namespace` (see
/// `threadline_core::tenancy`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Workspace identifier within the tenant.
    pub workspace_id: String,
    /// Unique identifier for this request, used for log correlation.
    pub request_id: String,
}

impl TenantContext {
    /// Construct a new context.
    pub fn new(
        tenant_id: impl Into<String>,
        workspace_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id: workspace_id.into(),
            request_id: request_id.into(),
        }
    }

    /// The `"default:default"` context used by non-strict-mode fallback
    /// ("non-strict mode ... uses `default:default`").
    pub fn default_fallback(request_id: impl Into<String>) -> Self {
        Self {
            tenant_id: "default".into(),
            workspace_id: "default".into(),
            request_id: request_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_given_fields() {
        let tc = TenantContext::new("acme", "prod", "req-1");
        assert_eq!(tc.tenant_id, "acme");
        assert_eq!(tc.workspace_id, "prod");
        assert_eq!(tc.request_id, "req-1");
    }

    #[test]
    fn default_fallback_uses_default_default() {
        let tc = TenantContext::default_fallback("req-2");
        assert_eq!(tc.tenant_id, "default");
        assert_eq!(tc.workspace_id, "default");
    }

    #[test]
    fn equality_is_field_wise() {
        let a = TenantContext::new("t", "w", "r1");
        let b = TenantContext::new("t", "w", "r1");
        let c = TenantContext::new("t", "w", "r2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
