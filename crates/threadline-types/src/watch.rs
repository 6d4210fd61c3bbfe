//! The watch-queue data model (spec §3 glossary, §6 persisted state layout).
//!
//! The queue itself -- the durable table and whatever polls/dispatches it --
//! lives outside the core ("Discord surface / slash-command
//! dispatching" is a deliberately out-of-scope external collaborator). This
//! module defines only the shape of one queued item and its lifecycle, so
//! that a persistence layer and the pipeline orchestrator agree on it.

use serde::{Deserialize, Serialize};

/// Where a watched item originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Video,
    Podcast,
    SocialPost,
}

/// Lifecycle state of a queued watch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// One item in the durable watch queue, deduplicated on
/// `(tenant, workspace, source_type, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchJob {
    pub source_type: SourceType,
    pub external_id: String,
    pub url: String,
    pub tenant: String,
    pub workspace: String,
    pub created_at_ms: i64,
    pub priority: i32,
    #[serde(default)]
    pub status: WatchStatus,
}

impl Default for WatchStatus {
    fn default() -> Self {
        WatchStatus::Queued
    }
}

impl WatchJob {
    /// The dedup key this job occupies in the durable table.
    pub fn dedup_key(&self) -> (String, String, SourceType, String) {
        (
            self.tenant.clone(),
            self.workspace.clone(),
            self.source_type,
            self.external_id.clone(),
        )
    }
}
