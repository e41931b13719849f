//! Echo suppression for locally originated writes.
//!
//! After a local create confirms, the realtime channel will usually echo
//! the same row back. Confirmation and pushes race, so the store cannot
//! rely on arrival order; instead, confirmed ids are remembered here for a
//! short window and matching inserts are discarded. The set is an explicit
//! component owned by the mutation coordinator, purged lazily on lookup.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Default retention for a confirmed id, in seconds. Long enough to cover
/// a late push delivery, short enough that the map never grows.
pub const DEFAULT_WINDOW_SECS: i64 = 5;

/// Short-lived record of locally originated insert ids.
#[derive(Debug)]
pub struct DedupSet {
    window: Duration,
    entries: HashMap<String, DateTime<Utc>>,
}

impl DedupSet {
    /// Create a set with an explicit retention window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Record a confirmed id at `now`.
    pub fn insert(&mut self, id: impl Into<String>, now: DateTime<Utc>) {
        self.entries.insert(id.into(), now);
    }

    /// Check whether `id` was recorded within the window. Purges expired
    /// entries as a side effect.
    pub fn contains(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        self.purge(now);
        self.entries.contains_key(id)
    }

    /// Number of live entries (after the last purge).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.entries.retain(|_, inserted| now - *inserted <= window);
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_WINDOW_SECS))
    }
}
