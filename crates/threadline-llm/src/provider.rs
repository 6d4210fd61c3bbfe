//! [`ProviderAdapter`]: the collaborator boundary to a concrete LLM backend.
//!
//! Concrete adapters (talking to a specific vendor's API) are deliberately
//! out of scope here -- they are "provider SDK internals" the orchestrator
//! only ever sees through this trait. This module defines the contract and
//! a deterministic mock used by the router's own tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One message in a chat-style request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Construct a `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Construct a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat completion request dispatched to a selected arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model id on the target provider.
    pub model: String,
    /// Ordered messages.
    pub messages: Vec<ChatMessage>,
    /// Optional response length cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Token accounting for a completed call, used to estimate cost.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Completion tokens produced.
    pub completion_tokens: u32,
}

/// A chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text.
    pub content: String,
    /// Token usage, when reported by the provider.
    #[serde(default)]
    pub usage: Usage,
}

/// A provider that can execute chat completion requests for one arm.
///
/// Implementations handle the protocol details for a specific vendor's
/// API. The orchestrator and router only ever hold a `dyn ProviderAdapter`,
/// resolved from the arm registry by provider name.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g. `"openai"`, `"anthropic"`).
    fn name(&self) -> &str;

    /// Execute a chat completion request and return the response.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// A deterministic mock adapter for tests: always returns a fixed response,
/// optionally after simulating a failure the first `fail_times` calls.
pub struct MockProviderAdapter {
    name: String,
    response: String,
    fail_times: std::sync::atomic::AtomicU32,
}

impl MockProviderAdapter {
    /// Construct a mock that always succeeds with `response`.
    pub fn new(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            fail_times: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Construct a mock that fails the first `fail_times` calls with a
    /// retryable error before succeeding.
    pub fn flaky(name: impl Into<String>, response: impl Into<String>, fail_times: u32) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            fail_times: std::sync::atomic::AtomicU32::new(fail_times),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        use std::sync::atomic::Ordering;

        let remaining = self.fail_times.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_times.fetch_sub(1, Ordering::Relaxed);
            return Err(crate::error::ProviderError::RequestFailed(
                "mock transient failure".into(),
            ));
        }

        Ok(ChatResponse {
            content: self.response.clone(),
            usage: Usage {
                prompt_tokens: request
                    .messages
                    .iter()
                    .map(|m| m.content.split_whitespace().count() as u32)
                    .sum(),
                completion_tokens: self.response.split_whitespace().count() as u32,
            },
        })
    }
}
