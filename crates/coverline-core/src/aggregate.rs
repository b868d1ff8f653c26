//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// Command methods append new events to the uncommitted list and apply them
/// immediately, so `version` always counts every applied event, persisted
/// or not.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state.
    ///
    /// Must be deterministic: replaying the same ordered events from scratch
    /// always reproduces the same state.
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);

    /// Number of applied events that have already been persisted.
    ///
    /// This is the `expected_version` for the next append, and the sequence
    /// number the first uncommitted event carries.
    #[allow(clippy::cast_possible_wrap)]
    fn persisted_version(&self) -> i64 {
        self.version() - self.uncommitted_events().len() as i64
    }
}
