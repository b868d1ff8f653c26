//! Shared test doubles and utilities for the Coverline engine.

mod clock;
mod logging;
mod repository;
mod snapshot;

pub use clock::{FixedClock, fixed_now};
pub use logging::init_test_tracing;
pub use repository::{
    EmptyEventRepository, FailingEventRepository, InMemoryEventRepository,
    RecordingEventRepository,
};
pub use snapshot::InMemorySnapshotRepository;
