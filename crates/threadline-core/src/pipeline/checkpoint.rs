//! Early-exit checkpoint table, consulted after Acquire and after Transcribe
//! to skip or fail a request before it reaches the expensive stages.
//!
//! An earlier sketch of this table was YAML-configured without a pinned
//! schema. This defines the explicit schema instead:
//! `{stage, when: {field op value}, action: skip|fail}`, evaluated
//! against a small, named set of fields rather than an open predicate
//! language -- keeping the table data instead of code, without needing a
//! general expression evaluator.

use serde::{Deserialize, Serialize};
use threadline_types::tenant::TenantContext;

/// The comparison operator in a checkpoint predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

/// What happens when a checkpoint's predicate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Finalize with `StepResult::skip` (the lightweight path).
    Skip,
    /// Finalize with `StepResult::fail`.
    Fail,
}

/// One row of the checkpoint table: evaluated for a given `stage` against a
/// named field known to that checkpoint (e.g. `duration_s` after Acquire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRule {
    /// Which stage this rule applies after (`"acquire"` or `"transcribe"`).
    pub stage: String,
    /// Field name the rule inspects.
    pub field: String,
    /// Comparison operator.
    pub op: Op,
    /// Threshold value compared against the observed field.
    pub value: f64,
    /// Which pipeline depths this rule is active for; empty means all.
    #[serde(default)]
    pub depths: Vec<String>,
    /// What to do when the predicate matches.
    pub action: Action,
    /// Human-readable reason surfaced in `StepResult.data.reason` / the
    /// error message.
    pub reason: String,
}

impl CheckpointRule {
    fn applies_to_depth(&self, depth: &str) -> bool {
        self.depths.is_empty() || self.depths.iter().any(|d| d == depth)
    }

    fn matches(&self, observed: f64) -> bool {
        match self.op {
            Op::Gt => observed > self.value,
            Op::Gte => observed >= self.value,
            Op::Lt => observed < self.value,
            Op::Lte => observed <= self.value,
            Op::Eq => (observed - self.value).abs() < f64::EPSILON,
        }
    }
}

/// The outcome of evaluating a checkpoint against observed field values.
#[derive(Debug, Clone)]
pub enum CheckpointOutcome {
    /// No rule matched; the pipeline proceeds.
    Proceed,
    /// A rule matched with `action: skip`.
    Skip { reason: String },
    /// A rule matched with `action: fail`.
    Fail { reason: String },
}

/// The checkpoint table evaluated after Acquire (checkpoint A) and after
/// Transcribe (checkpoint B). Rules are evaluated in order; the first match
/// wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointTable {
    pub rules: Vec<CheckpointRule>,
}

impl CheckpointTable {
    /// The default table: a `standard`-depth duration cap after Acquire,
    /// skipping requests whose acquisition ran unexpectedly long.
    pub fn defaults() -> Self {
        Self {
            rules: vec![CheckpointRule {
                stage: "acquire".into(),
                field: "duration_s".into(),
                op: Op::Gt,
                value: 14_400.0,
                depths: vec!["standard".into()],
                action: Action::Skip,
                reason: "duration exceeds standard-depth cap".into(),
            }],
        }
    }

    /// Evaluate every rule scoped to `stage` and `depth` against `fields`.
    /// `fields` is looked up by name; a rule whose field is absent from
    /// `fields` is skipped rather than treated as a match.
    pub fn evaluate(
        &self,
        stage: &str,
        depth: &str,
        fields: &std::collections::HashMap<String, f64>,
    ) -> CheckpointOutcome {
        for rule in &self.rules {
            if rule.stage != stage || !rule.applies_to_depth(depth) {
                continue;
            }
            let Some(&observed) = fields.get(&rule.field) else {
                continue;
            };
            if rule.matches(observed) {
                return match rule.action {
                    Action::Skip => CheckpointOutcome::Skip {
                        reason: rule.reason.clone(),
                    },
                    Action::Fail => CheckpointOutcome::Fail {
                        reason: rule.reason.clone(),
                    },
                };
            }
        }
        CheckpointOutcome::Proceed
    }
}

/// Context identifying which request a checkpoint evaluation belongs to,
/// used only for tracing.
pub fn log_checkpoint(tc: &TenantContext, stage: &str, outcome: &CheckpointOutcome) {
    match outcome {
        CheckpointOutcome::Proceed => {}
        CheckpointOutcome::Skip { reason } => {
            tracing::info!(tenant = %tc.tenant_id, workspace = %tc.workspace_id, stage, reason, "checkpoint skip");
        }
        CheckpointOutcome::Fail { reason } => {
            tracing::warn!(tenant = %tc.tenant_id, workspace = %tc.workspace_id, stage, reason, "checkpoint fail");
        }
    }
}
