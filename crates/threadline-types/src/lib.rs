//! # threadline-types
//!
//! Shared data model for the threadline content intelligence pipeline.
//!
//! This crate is the foundation of the dependency graph -- every other
//! threadline crate depends on it and nothing in here depends back. It
//! contains:
//!
//! - **[`error`]** -- [`error::PipelineError`] and the closed error-category
//!   taxonomy carried verbatim from stage to stage.
//! - **[`step_result`]** -- the [`step_result::StepResult`] envelope every
//!   pipeline stage returns.
//! - **[`tenant`]** -- [`tenant::TenantContext`], the per-request identity
//!   used for namespacing.
//! - **[`transcript`]** -- [`transcript::Transcript`] and
//!   [`transcript::QualityAssessment`].
//! - **[`cache`]** -- shared cache entry/domain/similarity types.
//! - **[`routing`]** -- bandit arm, route decision and reward types.
//! - **[`config`]** -- typed configuration mirroring the closed env-var set.
//! - **[`watch`]** -- [`watch::WatchJob`], the durable watch-queue item
//!   shape; the queue itself is an external collaborator.

pub mod cache;
pub mod config;
pub mod error;
pub mod routing;
pub mod step_result;
pub mod tenant;
pub mod transcript;
pub mod watch;

pub use config::ThreadlineConfig;
pub use error::{ErrorCategory, PipelineError, Result};
pub use step_result::{StepMetadata, StepResult, StepStatus};
pub use tenant::TenantContext;
