//! Realtime push feed — event types and the in-process fan-out hub.
//!
//! Delivery is best-effort and at-least-once with no ordering guarantee;
//! consumers converge via the de-dup set and full reaction recompute.
//! Subscriptions are scoped-acquisition resources: `subscribe` returns a
//! handle that detaches from the hub when dropped, so a torn-down view
//! can never keep receiving events. The hub is single-threaded; events are
//! delivered on the owning thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::model::Comment;

/// A push notification from the authoritative store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    /// A comment row was inserted. Scoped to the comment's video.
    CommentInserted(Comment),
    /// A reaction row changed (insert, update, or delete). Unscoped; the
    /// payload carries only the affected comment so consumers re-fetch the
    /// raw rows rather than trusting a diff.
    ReactionChanged { comment_id: String },
}

impl RealtimeEvent {
    /// Serialize to a JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an event from a JSON line.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: Vec<Slot>,
}

struct Slot {
    id: u64,
    video_id: String,
    queue: Rc<RefCell<VecDeque<RealtimeEvent>>>,
}

/// In-process fan-out of realtime events to per-video subscribers.
///
/// Cloning the hub shares the subscriber table, so a backend and its
/// clients can hold the same hub.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Rc<RefCell<HubInner>>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for one video. Comment inserts are filtered to
    /// that video; reaction changes are delivered to every subscriber.
    #[must_use]
    pub fn subscribe(&self, video_id: impl Into<String>) -> Subscription {
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(Slot {
            id,
            video_id: video_id.into(),
            queue: Rc::clone(&queue),
        });
        Subscription {
            hub: Rc::downgrade(&self.inner),
            id,
            queue,
        }
    }

    /// Deliver an event to every matching subscriber.
    pub fn publish(&self, event: &RealtimeEvent) {
        let inner = self.inner.borrow();
        for slot in &inner.subscribers {
            let matches = match event {
                RealtimeEvent::CommentInserted(comment) => comment.video_id == slot.video_id,
                RealtimeEvent::ReactionChanged { .. } => true,
            };
            if matches {
                slot.queue.borrow_mut().push_back(event.clone());
            }
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

impl std::fmt::Debug for RealtimeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A live subscription. Dropping it detaches from the hub.
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<RefCell<HubInner>>,
    id: u64,
    queue: Rc<RefCell<VecDeque<RealtimeEvent>>>,
}

impl Subscription {
    /// Take all pending events, in delivery order.
    #[must_use]
    pub fn drain(&self) -> Vec<RealtimeEvent> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Number of undelivered events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner
                .borrow_mut()
                .subscribers
                .retain(|slot| slot.id != self.id);
        }
    }
}
