//! Test snapshot store: keeps the latest snapshot per aggregate in memory.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coverline_core::error::DomainError;
use coverline_core::snapshot::{Snapshot, SnapshotRepository};
use uuid::Uuid;

/// A snapshot repository backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Mutex<HashMap<Uuid, Snapshot>>,
}

impl InMemorySnapshotRepository {
    /// Creates an empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn load_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("snapshot store poisoned: {e}")))?;
        Ok(snapshots.get(&aggregate_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("snapshot store poisoned: {e}")))?;
        snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }
}
