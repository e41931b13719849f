//! ID helpers for optimistically created comments.
//!
//! Server-assigned comment IDs are opaque UUIDs. Before the authoritative
//! create round-trip completes, a locally synthesized comment carries a
//! provisional id of the form `temp-<millis>`.

use chrono::{DateTime, Utc};

/// Prefix marking a locally generated, not-yet-confirmed comment id.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Generate a provisional comment id from the local clock.
///
/// Callers that may create several provisional comments within the same
/// millisecond should bump against their working set (see
/// `MutationCoordinator::begin_add`).
#[must_use]
pub fn new_provisional_id(now: DateTime<Utc>) -> String {
    format!("{PROVISIONAL_PREFIX}{}", now.timestamp_millis())
}

/// Check whether an id is provisional (awaiting server confirmation).
#[must_use]
pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}
