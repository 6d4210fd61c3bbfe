//! Router/bandit data model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A `provider:model` pair selectable by the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArmId {
    /// Provider name (e.g. `"anthropic"`).
    pub provider: String,
    /// Model identifier (e.g. `"claude-opus-4-5"`).
    pub model: String,
}

impl ArmId {
    /// Construct an arm id.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Canonical `"provider:model"` string form, used as the bandit's
    /// per-arm state key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

impl std::fmt::Display for ArmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Static capability/cost metadata for one provider+model arm (/// "each enumerated from a registry of ProviderAdapters").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmProfile {
    /// The arm this profile describes.
    pub arm: ArmId,
    /// Capability tags this arm supports (e.g. `"vision"`, `"tools"`).
    pub capabilities: HashSet<String>,
    /// USD cost per 1,000 input tokens.
    pub cost_per_1k_in: f64,
    /// USD cost per 1,000 output tokens.
    pub cost_per_1k_out: f64,
    /// Maximum context window in tokens.
    pub context_window: u32,
    /// Whether this arm is on the curated QUALITY_FIRST shortlist.
    #[serde(default)]
    pub quality_tier: bool,
    /// Rolling p95 latency estimate in milliseconds, used as a tie-break.
    #[serde(default)]
    pub p95_latency_ms: u64,
}

/// A routing decision returned by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// The selected arm.
    pub arm_id: ArmId,
    /// Name of the policy that produced this decision.
    pub policy_name: String,
    /// Context feature vector used for the decision (empty for
    /// non-contextual policies).
    pub context_features: Vec<f32>,
    /// Estimated cost in USD for this call.
    pub estimated_cost_usd: f64,
    /// Capability tags the request required.
    pub capability_tags: HashSet<String>,
}

/// The outcome of a completed call, fed back into the bandit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    /// The arm this reward is attributed to.
    pub arm_id: ArmId,
    /// Caller-supplied quality score in `[0, 1]`.
    pub quality: f32,
    /// Actual cost incurred in USD.
    pub cost_usd: f64,
    /// Observed latency in milliseconds.
    pub latency_ms: u64,
    /// Whether the call succeeded.
    pub success: bool,
    /// The composite scalar reward in `[-1, 1]` fed to the policy update.
    pub composite: f32,
}

/// Task criticality, used by the deterministic backstop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStakes {
    /// Ordinary task; no backstop applies.
    Normal,
    /// High-stakes task; a single low-quality response triggers one
    /// deterministic retry against a shortlisted top-tier arm.
    HighStakes,
}

/// A logical LLM request entering the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// The prompt text (opaque to the router beyond length estimation).
    pub prompt: String,
    /// Logical task type, used for QUALITY_FIRST shortlisting.
    pub task_type: String,
    /// Capabilities this request requires.
    #[serde(default)]
    pub required_capabilities: HashSet<String>,
    /// Maximum USD budget for this call.
    pub budget_usd: f64,
    /// Criticality of the task.
    #[serde(default = "default_stakes")]
    pub stakes: TaskStakes,
}

fn default_stakes() -> TaskStakes {
    TaskStakes::Normal
}
