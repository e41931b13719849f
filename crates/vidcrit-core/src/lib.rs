//! vidcrit-core — domain logic for the vidcrit video review tool.
//!
//! This crate owns the comment model, thread organization, reaction
//! aggregation, optimistic mutation reconciliation, the realtime hub, the
//! SQLite-backed authoritative store, and guest identity.

pub mod api;
pub mod backend;
pub mod coordinator;
pub mod dedup;
pub mod errors;
pub mod guest;
pub mod model;
pub mod reactions;
pub mod realtime;
pub mod session;
pub mod store;
pub mod thread;

pub use errors::{CoreError, CoreResult};
