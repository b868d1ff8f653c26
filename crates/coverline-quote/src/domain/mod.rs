//! Domain model for the quote context.

pub mod aggregates;
pub mod commands;
pub mod config;
pub mod corollary;
pub mod data;
pub mod datum;
pub mod events;
pub mod expiry;
pub mod json_path;
pub mod outcome;
pub mod patch;
pub mod policy;
pub mod quote;
pub mod rollback;
pub mod workflow;
