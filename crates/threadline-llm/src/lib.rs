//! # threadline-llm
//!
//! The routed LLM-call substrate: provider arm selection
//! via a contextual bandit, a multi-level semantic cache sitting in front of
//! every call, and the feedback loop that turns completed calls into reward
//! updates.
//!
//! - **[`provider`]** -- the [`provider::ProviderAdapter`] collaborator trait
//!   and a deterministic mock for tests.
//! - **[`bandit`]** -- the four pluggable arm-selection policies plus the
//!   persisted [`bandit::BanditState`].
//! - **[`router`]** -- [`router::LlmRouter`], which filters arms by
//!   capability/budget, queries the configured bandit policy, and applies
//!   the deterministic high-stakes backstop.
//! - **[`cache`]** -- [`cache::MultiLevelCache`], the exact + semantic cache
//!   layered in front of the router and any other cacheable call.
//! - **[`error`]** -- [`error::ProviderError`], mapped into the shared error
//!   taxonomy at the boundary with the orchestrator.

pub mod bandit;
pub mod cache;
pub mod error;
pub mod provider;
pub mod router;

pub use bandit::{BanditPolicy, BanditState};
pub use cache::MultiLevelCache;
pub use error::{ProviderError, Result};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, ProviderAdapter};
pub use router::LlmRouter;
