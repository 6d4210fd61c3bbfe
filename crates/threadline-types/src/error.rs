//! The closed error-category taxonomy shared by every stage.
//!
//! Stages classify their own failures into [`ErrorCategory`]; the
//! orchestrator never rewrites a category it receives from a stage
//!. [`PipelineError`] is the concrete error type that
//! carries a category plus enough context to render a user-facing
//! message and to drive the `pipeline_failures_total{stage,category}`
//! counter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error categories a stage may report.
///
/// Closed by design: adding a category is a breaking change to the
/// contract every stage and the orchestrator rely on, so this enum is
/// deliberately *not* `#[non_exhaustive]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; never retryable.
    Validation,
    /// Transient network failure; retryable.
    Network,
    /// Deadline exceeded; not retryable by default.
    Timeout,
    /// Provider asked us to back off; retryable, honour `Retry-After`.
    RateLimit,
    /// Provider-side failure; retryable unless the 4xx is semantic.
    ProviderError,
    /// Stage-internal processing failure; retryable per stage policy.
    Processing,
    /// Blocked by privacy/security policy; never retryable.
    Policy,
    /// Tenant context missing or invalid; never retryable.
    Tenancy,
    /// Cancellation token fired.
    Cancelled,
    /// Unrecoverable; cancels siblings and downstream stages.
    Fatal,
}

impl ErrorCategory {
    /// Whether this category is retryable *by default* (a stage may
    /// still override the decision with an explicit `retryable` flag
    /// on the [`PipelineError`] it constructs).
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::ProviderError
        )
    }
}

/// Structured context attached to a [`PipelineError`].
///
/// Spec §7: "context includes stage, tenant, workspace, request_id, and
/// (for network) host".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Stage name that produced the error (e.g. `"acquire"`, `"transcribe"`).
    pub stage: String,
    /// Tenant identifier, when known.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Workspace identifier, when known.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Request identifier for correlation.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Remote host, populated for `network` category errors.
    #[serde(default)]
    pub host: Option<String>,
    /// Trace id for a panic captured at a stage boundary.
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Free-form extra fields.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// The concrete error type returned by a failing stage.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{category:?}: {message}")]
pub struct PipelineError {
    /// The taxonomy category this error falls under.
    pub category: ErrorCategory,
    /// Human-readable message, safe to log (not necessarily safe to show
    /// to end users for `policy` category -- see spec §7 user-visible
    /// behaviour).
    pub message: String,
    /// Whether a caller should retry this operation.
    pub retryable: bool,
    /// Structured context.
    pub context: ErrorContext,
    /// Number of retries already attempted, if any ("retry
    /// exhaustion produces fail with retryable=false and retries=N").
    #[serde(default)]
    pub retries: Option<u32>,
}

impl PipelineError {
    /// Build an error with the category's default retryability.
    pub fn new(category: ErrorCategory, message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            retryable: category.default_retryable(),
            category,
            message: message.into(),
            context: ErrorContext {
                stage: stage.into(),
                ..Default::default()
            },
            retries: None,
        }
    }

    /// Override retryability explicitly.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach tenant/workspace/request_id from a `TenantContext`-shaped tuple.
    pub fn with_tenancy(mut self, tenant: &str, workspace: &str, request_id: &str) -> Self {
        self.context.tenant = Some(tenant.to_string());
        self.context.workspace = Some(workspace.to_string());
        self.context.request_id = Some(request_id.to_string());
        self
    }

    /// Attach the remote host (network errors).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.context.host = Some(host.into());
        self
    }

    /// Attach the count of retries already attempted.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// A fixed, non-revealing message for `policy` category errors
    /// (spec §7 user-visible behaviour).
    pub fn user_message(&self) -> String {
        match self.category {
            ErrorCategory::Policy => "this content could not be processed".to_string(),
            ErrorCategory::Validation => format!("invalid input: {}", self.message),
            ErrorCategory::Timeout | ErrorCategory::Cancelled => {
                "processing did not complete in time".to_string()
            }
            ErrorCategory::Network | ErrorCategory::ProviderError | ErrorCategory::RateLimit => {
                "a transient error occurred, please retry later".to_string()
            }
            ErrorCategory::Tenancy => "request is missing required tenant context".to_string(),
            ErrorCategory::Processing | ErrorCategory::Fatal => "processing failed".to_string(),
        }
    }
}

/// Convenience alias for fallible pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_matches_taxonomy() {
        assert!(ErrorCategory::Network.default_retryable());
        assert!(ErrorCategory::RateLimit.default_retryable());
        assert!(ErrorCategory::ProviderError.default_retryable());
        assert!(!ErrorCategory::Validation.default_retryable());
        assert!(!ErrorCategory::Timeout.default_retryable());
        assert!(!ErrorCategory::Policy.default_retryable());
        assert!(!ErrorCategory::Tenancy.default_retryable());
        assert!(!ErrorCategory::Fatal.default_retryable());
    }

    #[test]
    fn new_uses_category_default_retryable() {
        let err = PipelineError::new(ErrorCategory::Network, "connection reset", "acquire");
        assert!(err.retryable);
        assert_eq!(err.context.stage, "acquire");
    }

    #[test]
    fn with_retryable_overrides_default() {
        let err = PipelineError::new(ErrorCategory::Timeout, "deadline exceeded", "transcribe")
            .with_retryable(false);
        assert!(!err.retryable);
    }

    #[test]
    fn policy_user_message_is_fixed_and_non_revealing() {
        let err = PipelineError::new(ErrorCategory::Policy, "matched blocklist term xyz", "acquire");
        assert_eq!(err.user_message(), "this content could not be processed");
        assert!(!err.user_message().contains("xyz"));
    }

    #[test]
    fn with_tenancy_fills_context() {
        let err = PipelineError::new(ErrorCategory::Tenancy, "missing context", "acquire")
            .with_tenancy("t1", "w1", "r1");
        assert_eq!(err.context.tenant.as_deref(), Some("t1"));
        assert_eq!(err.context.workspace.as_deref(), Some("w1"));
        assert_eq!(err.context.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn serde_roundtrip() {
        let err = PipelineError::new(ErrorCategory::Network, "boom", "acquire")
            .with_host("example.com")
            .with_retries(2);
        let json = serde_json::to_string(&err).unwrap();
        let restored: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.category, ErrorCategory::Network);
        assert_eq!(restored.context.host.as_deref(), Some("example.com"));
        assert_eq!(restored.retries, Some(2));
    }
}
