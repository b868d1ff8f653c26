//! Coverline Core: shared event-sourcing abstractions.
//!
//! This crate defines the fundamental traits and types that the quote
//! bounded context depends on: aggregate roots, event envelopes, commands,
//! clocks, errors, and the event store and snapshot contracts. It contains
//! no infrastructure code.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
pub mod snapshot;
