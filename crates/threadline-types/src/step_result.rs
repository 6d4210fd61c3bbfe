//! The universal stage envelope.
//!
//! Every stage -- and the pipeline as a whole -- returns a [`StepResult`].
//! The exclusivity invariant (`ok|uncertain` carries `data`, `fail` carries
//! `error`) is enforced by construction through [`StepResult::ok`],
//! [`StepResult::skip`], [`StepResult::fail`], and [`StepResult::uncertain`]
//! rather than left to caller discipline.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The status a [`StepResult`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The stage completed successfully.
    Ok,
    /// The stage was deliberately bypassed.
    Skip,
    /// The stage failed.
    Fail,
    /// The stage completed but the result quality is in question.
    Uncertain,
}

/// Cache participation recorded on a step, when the step consulted a cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Whether the lookup was satisfied from cache.
    pub hit: bool,
    /// Which layer served the hit, when `hit` is true (`"exact"` | `"semantic"`).
    #[serde(default)]
    pub kind: Option<String>,
    /// Cosine similarity of the semantic match, when `kind == "semantic"`.
    #[serde(default)]
    pub similarity: Option<f32>,
}

/// Per-stage metadata attached to every [`StepResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Name of the stage that produced this result.
    pub step: String,
    /// Stage latency in milliseconds.
    pub latency_ms: u64,
    /// Owning tenant.
    pub tenant: String,
    /// Owning workspace.
    pub workspace: String,
    /// Provider used, if this stage made an LLM call.
    #[serde(default)]
    pub provider: Option<String>,
    /// Model used, if this stage made an LLM call.
    #[serde(default)]
    pub model: Option<String>,
    /// Estimated or actual cost in USD, if applicable.
    #[serde(default)]
    pub cost_usd: Option<f64>,
    /// Cache participation, if this stage consulted a cache.
    #[serde(default)]
    pub cache: Option<CacheInfo>,
    /// Number of retries performed inside the stage.
    #[serde(default)]
    pub retries: Option<u32>,
}

impl StepMetadata {
    /// Start a metadata record for `step`, to be stamped with tenancy and
    /// timing by the orchestrator once the stage call returns.
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            ..Default::default()
        }
    }
}

/// The universal result envelope returned by every stage and by the
/// pipeline as a whole.
///
/// Invariants (spec §8, enforced by the constructors below, never by a
/// public field setter): exactly one of (`data` populated on
/// `ok|uncertain`) or (`error` populated on `fail`); `skip` may carry a
/// `reason` inside `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The outcome status.
    pub status: StepStatus,
    /// Stage-specific payload. Populated for `ok`, `uncertain`, and
    /// (optionally, with a `reason` key) `skip`. Always `null` for `fail`.
    pub data: serde_json::Value,
    /// Per-stage metadata.
    pub metadata: StepMetadata,
    /// Populated only when `status == fail`.
    pub error: Option<PipelineError>,
    /// Ordered list of non-fatal warnings surfaced during the stage.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StepResult {
    /// Build a successful result.
    pub fn ok(metadata: StepMetadata, data: serde_json::Value) -> Self {
        Self {
            status: StepStatus::Ok,
            data,
            metadata,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Build a result for a deliberately bypassed stage. `reason` is
    /// folded into `data.reason`.
    pub fn skip(metadata: StepMetadata, reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skip,
            data: serde_json::json!({ "reason": reason.into() }),
            metadata,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Build a failed result from a [`PipelineError`].
    pub fn fail(metadata: StepMetadata, error: PipelineError) -> Self {
        Self {
            status: StepStatus::Fail,
            data: serde_json::Value::Null,
            metadata,
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    /// Build a result whose quality is uncertain but which still carries
    /// usable data.
    pub fn uncertain(metadata: StepMetadata, data: serde_json::Value) -> Self {
        Self {
            status: StepStatus::Uncertain,
            data,
            metadata,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Append a warning, returning `self` for chaining.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// True when the result satisfies the spec §8 exclusivity invariant.
    pub fn is_well_formed(&self) -> bool {
        match self.status {
            StepStatus::Ok | StepStatus::Uncertain => {
                !self.data.is_null() && self.error.is_none()
            }
            StepStatus::Fail => self.error.is_some(),
            StepStatus::Skip => self.error.is_none(),
        }
    }

    /// True if the stage succeeded outright.
    pub fn is_ok(&self) -> bool {
        self.status == StepStatus::Ok
    }

    /// True if the stage failed.
    pub fn is_fail(&self) -> bool {
        self.status == StepStatus::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn ok_is_well_formed() {
        let r = StepResult::ok(StepMetadata::new("acquire"), serde_json::json!({"a": 1}));
        assert!(r.is_well_formed());
        assert!(r.is_ok());
    }

    #[test]
    fn fail_is_well_formed() {
        let err = PipelineError::new(ErrorCategory::Network, "boom", "acquire");
        let r = StepResult::fail(StepMetadata::new("acquire"), err);
        assert!(r.is_well_formed());
        assert!(r.is_fail());
        assert!(r.data.is_null());
    }

    #[test]
    fn skip_carries_reason_in_data() {
        let r = StepResult::skip(StepMetadata::new("checkpoint_a"), "duration exceeds threshold");
        assert!(r.is_well_formed());
        assert_eq!(r.data["reason"], "duration exceeds threshold");
    }

    #[test]
    fn uncertain_requires_data() {
        let r = StepResult::uncertain(StepMetadata::new("quality"), serde_json::json!({"score": 0.5}));
        assert!(r.is_well_formed());
    }

    #[test]
    fn warnings_accumulate() {
        let r = StepResult::ok(StepMetadata::new("notify"), serde_json::json!({}))
            .with_warning("notifier unreachable")
            .with_warning("fallback channel used");
        assert_eq!(r.warnings.len(), 2);
    }

    #[test]
    fn serde_roundtrip_preserves_status() {
        let r = StepResult::ok(StepMetadata::new("persist"), serde_json::json!({"ids": [1, 2]}));
        let json = serde_json::to_string(&r).unwrap();
        let restored: StepResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.status, StepStatus::Ok);
        assert_eq!(restored.data["ids"][1], 2);
    }
}
