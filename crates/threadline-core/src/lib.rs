//! # threadline-core
//!
//! The content intelligence pipeline orchestrator: tenant-scoped stage
//! execution from a URL through acquisition, transcription, quality
//! gating, analysis fan-out, memory persistence, and notification.
//!
//! This crate owns the pipeline's control flow and tenancy semantics; it
//! does not implement transcription, analysis tools, memory backends, or
//! notification channels itself -- those are consumed through the traits
//! in [`pipeline::traits`] and supplied by the binary that constructs a
//! [`runtime::PipelineRuntime`].

pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod tenancy;
