//! Coverline quote and policy aggregate bounded context.
//!
//! Responsible for the event-sourced quote aggregate: replaying a quote's
//! history into state, the command surface that appends new events, data
//! patches that correct historical snapshots, rollback of the event stream,
//! and the outcome records left by payment and funding attempts.

pub mod application;
pub mod domain;
