//! Provider error types for threadline-llm.
//!
//! All provider and router operations return [`Result<T>`] which uses
//! [`ProviderError`] as the error type. [`ProviderError`] converts into the
//! closed [`threadline_types::ErrorCategory`] taxonomy at the boundary with
//! the orchestrator ("a stage reports its own category").

use thiserror::Error;
use threadline_types::{ErrorCategory, PipelineError};

/// Errors that can occur when interacting with an LLM provider or the
/// router that selects one.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The call to the provider failed at the transport level.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication with the provider was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The requested model does not exist on the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The provider has not been configured (e.g. missing API key).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The provider returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("timeout")]
    Timeout,

    /// The router could not find any arm satisfying the request's
    /// capability and budget constraints.
    #[error("no eligible arm for request: {0}")]
    NoEligibleArm(String),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience type alias for provider/router operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Map to the closed error-category taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::RequestFailed(_) => ErrorCategory::Network,
            ProviderError::AuthFailed(_) => ErrorCategory::ProviderError,
            ProviderError::RateLimited { .. } => ErrorCategory::RateLimit,
            ProviderError::ModelNotFound(_) => ErrorCategory::ProviderError,
            ProviderError::NotConfigured(_) => ErrorCategory::Validation,
            ProviderError::InvalidResponse(_) => ErrorCategory::ProviderError,
            ProviderError::Timeout => ErrorCategory::Timeout,
            ProviderError::NoEligibleArm(_) => ErrorCategory::Validation,
            ProviderError::Json(_) => ErrorCategory::Processing,
        }
    }

    /// Convert into a [`PipelineError`] stamped with `stage`.
    pub fn into_pipeline_error(self, stage: impl Into<String>) -> PipelineError {
        let category = self.category();
        let retryable = matches!(
            &self,
            ProviderError::RequestFailed(_) | ProviderError::RateLimited { .. }
        );
        PipelineError::new(category, self.to_string(), stage).with_retryable(retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_request_failed() {
        let err = ProviderError::RequestFailed("connection reset".into());
        assert_eq!(err.to_string(), "request failed: connection reset");
    }

    #[test]
    fn display_rate_limited() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited: retry after 5000ms");
    }

    #[test]
    fn category_mapping_matches_taxonomy() {
        assert_eq!(
            ProviderError::RateLimited { retry_after_ms: 0 }.category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(ProviderError::Timeout.category(), ErrorCategory::Timeout);
        assert_eq!(
            ProviderError::NotConfigured("x".into()).category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn into_pipeline_error_stamps_stage() {
        let err = ProviderError::Timeout.into_pipeline_error("llm_router");
        assert_eq!(err.context.stage, "llm_router");
        assert_eq!(err.category, ErrorCategory::Timeout);
    }

    #[test]
    fn rate_limited_is_retryable() {
        let err = ProviderError::RateLimited { retry_after_ms: 10 }.into_pipeline_error("r");
        assert!(err.retryable);
    }

    #[test]
    fn result_type_alias_works() {
        let ok: Result<i32> = Ok(42);
        assert!(ok.is_ok());
        let err: Result<i32> = Err(ProviderError::Timeout);
        assert!(err.is_err());
    }
}
