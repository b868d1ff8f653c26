//! Snapshot repository abstraction.
//!
//! Snapshots let an aggregate skip replaying its full history: the aggregate
//! is rebuilt from the stored state and only the events after the snapshot's
//! final version are applied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Serialized aggregate state captured at a known version.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Aggregate the state belongs to.
    pub aggregate_id: Uuid,
    /// Number of events folded into `state`. Events with a sequence number
    /// greater than or equal to this still need to be applied.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Repository trait for loading and saving aggregate snapshots.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Returns the latest snapshot for the aggregate, if one exists.
    async fn load_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, DomainError>;

    /// Stores a snapshot, replacing any earlier one for the same aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError>;
}
