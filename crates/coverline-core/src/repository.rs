//! Event repository abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Tenant that owns the aggregate.
    pub tenant_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Zero-based sequence number within the aggregate stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Repository trait for loading and appending domain events.
///
/// Implementations guarantee append-only, sequence-ordered persistence per
/// aggregate.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by sequence number.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to an aggregate stream with optimistic concurrency.
    ///
    /// `expected_version` is the number of events the caller believes are
    /// already persisted. Implementations return
    /// [`DomainError::ConcurrencyConflict`] when the stream has moved on.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;

    /// Number of events persisted for the aggregate.
    #[allow(clippy::cast_possible_wrap)]
    async fn persisted_event_count(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        Ok(self.load_events(aggregate_id).await?.len() as i64)
    }

    /// Load the events at or after `from_sequence_number`, in order.
    async fn load_events_from(
        &self,
        aggregate_id: Uuid,
        from_sequence_number: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let mut events = self.load_events(aggregate_id).await?;
        events.retain(|e| e.sequence_number >= from_sequence_number);
        Ok(events)
    }
}
