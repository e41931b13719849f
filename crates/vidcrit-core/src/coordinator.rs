//! Mutation coordinator — optimistic writes reconciled against the
//! authoritative backend.
//!
//! Every add runs the state machine `Composing -> Optimistic ->
//! Confirmed | RolledBack`. `begin_add` applies the optimistic insert and
//! hands back the authoritative request; the caller issues the network
//! call and feeds the result to `confirm_add` or `fail_add`. Confirmed ids
//! are remembered in the de-dup set so the realtime echo of a local write
//! never double-inserts.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::dedup::DedupSet;
use crate::errors::{CoreError, CoreResult};
use crate::model::{new_provisional_id, ActorIdentity, ActorKey, Comment, NewComment};
use crate::store::CommentStore;

/// The user's in-progress comment: text, timeline position, and reply
/// target. This is the `Composing` state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: String,
    pub timestamp_seconds: f64,
    pub replying_to: Option<String>,
}

/// An optimistic add awaiting its authoritative result.
///
/// Holds the provisional id (for reconciliation or rollback), the create
/// request to send, and the draft backup restored on failure.
#[derive(Debug, Clone)]
pub struct PendingAdd {
    pub provisional_id: String,
    pub request: NewComment,
    draft: Draft,
}

/// Orchestrates optimistic add/delete/react operations for one video.
#[derive(Debug)]
pub struct MutationCoordinator {
    project_id: String,
    video_id: String,
    draft: Draft,
    dedup: DedupSet,
}

impl MutationCoordinator {
    #[must_use]
    pub fn new(project_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            video_id: video_id.into(),
            draft: Draft::default(),
            dedup: DedupSet::default(),
        }
    }

    // ========================================================================
    // Draft editing (Composing)
    // ========================================================================

    #[must_use]
    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.draft.text = text.into();
    }

    /// Set the video-timeline position for the draft. Negative or
    /// non-finite positions are rejected before anything else happens.
    pub fn set_draft_timestamp(&mut self, seconds: f64) -> CoreResult<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CoreError::InvalidTimestamp { seconds });
        }
        self.draft.timestamp_seconds = seconds;
        Ok(())
    }

    /// Enter reply mode targeting an existing comment.
    pub fn begin_reply(&mut self, parent_comment_id: impl Into<String>) {
        self.draft.replying_to = Some(parent_comment_id.into());
    }

    /// Leave reply mode without submitting.
    pub fn cancel_reply(&mut self) {
        self.draft.replying_to = None;
    }

    #[must_use]
    pub fn replying_to(&self) -> Option<&str> {
        self.draft.replying_to.as_deref()
    }

    // ========================================================================
    // Add state machine
    // ========================================================================

    /// Composing -> Optimistic.
    ///
    /// Validates the draft (trimmed non-empty text, non-negative timestamp)
    /// and requires a resolved identity — submission without one is a hard
    /// precondition failure, not best-effort. On success the provisional
    /// comment is already in the store, the draft is cleared, reply mode is
    /// exited, and the returned [`PendingAdd`] carries the authoritative
    /// create request.
    pub fn begin_add(
        &mut self,
        store: &mut CommentStore,
        identity: Option<&ActorIdentity>,
        now: DateTime<Utc>,
    ) -> CoreResult<PendingAdd> {
        let text = self.draft.text.trim();
        if text.is_empty() {
            return Err(CoreError::EmptyDraft);
        }
        let seconds = self.draft.timestamp_seconds;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CoreError::InvalidTimestamp { seconds });
        }
        let identity = identity.ok_or(CoreError::IdentityRequired)?;

        // Same-millisecond adds would collide on the raw timestamp id.
        let mut stamp = now;
        let mut provisional_id = new_provisional_id(stamp);
        while store.contains(&provisional_id) {
            stamp += Duration::milliseconds(1);
            provisional_id = new_provisional_id(stamp);
        }

        let (author_id, guest_session_id) = match &identity.key {
            ActorKey::User(id) => (Some(id.clone()), None),
            ActorKey::Guest(id) => (None, Some(id.clone())),
        };

        let request = NewComment {
            project_id: self.project_id.clone(),
            video_id: self.video_id.clone(),
            content: text.to_string(),
            timestamp_seconds: seconds,
            author_name: identity.name.clone(),
            author_id: author_id.clone(),
            guest_session_id: guest_session_id.clone(),
            parent_comment_id: self.draft.replying_to.clone(),
        };

        store.apply_insert(Comment {
            id: provisional_id.clone(),
            project_id: request.project_id.clone(),
            video_id: request.video_id.clone(),
            content: request.content.clone(),
            timestamp_seconds: seconds,
            author_name: request.author_name.clone(),
            author_id,
            guest_session_id,
            parent_comment_id: request.parent_comment_id.clone(),
            created_at: now,
            is_deleted: false,
            replies: Vec::new(),
        });

        let backup = self.draft.clone();
        self.draft.text.clear();
        self.draft.replying_to = None;

        Ok(PendingAdd {
            provisional_id,
            request,
            draft: backup,
        })
    }

    /// Optimistic -> Confirmed.
    ///
    /// Replaces the provisional comment with the server row and registers
    /// the real id for echo suppression.
    pub fn confirm_add(
        &mut self,
        store: &mut CommentStore,
        pending: &PendingAdd,
        confirmed: Comment,
        now: DateTime<Utc>,
    ) {
        let confirmed_id = confirmed.id.clone();
        store.apply_replace(&pending.provisional_id, confirmed);
        self.dedup.insert(confirmed_id.clone(), now);
        debug!(
            provisional_id = %pending.provisional_id,
            comment_id = %confirmed_id,
            "comment add confirmed"
        );
    }

    /// Optimistic -> RolledBack.
    ///
    /// Removes the provisional comment and restores the draft verbatim so
    /// no input is lost on retry.
    pub fn fail_add(&mut self, store: &mut CommentStore, pending: PendingAdd) {
        store.apply_remove(&pending.provisional_id);
        self.draft = pending.draft;
    }

    // ========================================================================
    // Delete & realtime intake
    // ========================================================================

    /// Ownership check performed before any delete call or store mutation:
    /// the requester's guest session must match the comment's, or the
    /// requester's user id must match the comment's author id.
    pub fn ensure_owner(comment: &Comment, requester: &ActorIdentity) -> CoreResult<()> {
        if comment.is_owned_by(requester) {
            Ok(())
        } else {
            Err(CoreError::NotCommentOwner {
                comment_id: comment.id.clone(),
            })
        }
    }

    /// Apply a realtime comment-insert push.
    ///
    /// Inserts echoing a locally confirmed write (de-dup window) or an id
    /// already present are discarded silently. Returns whether the store
    /// changed.
    pub fn handle_realtime_insert(
        &mut self,
        store: &mut CommentStore,
        comment: Comment,
        now: DateTime<Utc>,
    ) -> bool {
        if self.dedup.contains(&comment.id, now) {
            debug!(comment_id = %comment.id, "discarding echoed realtime insert");
            return false;
        }
        if store.contains(&comment.id) {
            return false;
        }
        store.apply_insert(comment);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_provisional_id;

    fn guest_identity() -> ActorIdentity {
        ActorIdentity::guest("gs1", "Guest #1234")
    }

    fn server_comment(id: &str, request: &NewComment) -> Comment {
        Comment {
            id: id.to_string(),
            project_id: request.project_id.clone(),
            video_id: request.video_id.clone(),
            content: request.content.clone(),
            timestamp_seconds: request.timestamp_seconds,
            author_name: request.author_name.clone(),
            author_id: request.author_id.clone(),
            guest_session_id: request.guest_session_id.clone(),
            parent_comment_id: request.parent_comment_id.clone(),
            created_at: Utc::now(),
            is_deleted: false,
            replies: Vec::new(),
        }
    }

    fn setup() -> (MutationCoordinator, CommentStore) {
        (MutationCoordinator::new("p1", "v1"), CommentStore::new("v1"))
    }

    #[test]
    fn test_begin_add_inserts_provisional() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("hello");
        coordinator.set_draft_timestamp(12.3).unwrap();

        let pending = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap();

        assert!(is_provisional_id(&pending.provisional_id));
        let optimistic = store.get(&pending.provisional_id).unwrap();
        assert_eq!(optimistic.content, "hello");
        assert!((optimistic.timestamp_seconds - 12.3).abs() < f64::EPSILON);
        assert!(coordinator.draft().text.is_empty());
    }

    #[test]
    fn test_confirm_add_swaps_to_server_id() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("hello");
        coordinator.set_draft_timestamp(12.3).unwrap();

        let pending = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap();
        let confirmed = server_comment("real-1", &pending.request);
        coordinator.confirm_add(&mut store, &pending, confirmed, Utc::now());

        assert_eq!(store.len(), 1);
        assert!(store.contains("real-1"));
        assert!(!store.contains(&pending.provisional_id));
    }

    #[test]
    fn test_fail_add_rolls_back_and_restores_draft() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("hello");
        coordinator.set_draft_timestamp(12.3).unwrap();

        let pending = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap();
        coordinator.fail_add(&mut store, pending);

        assert!(store.is_empty());
        assert_eq!(coordinator.draft().text, "hello");
    }

    #[test]
    fn test_begin_add_requires_identity() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("hello");

        let err = coordinator
            .begin_add(&mut store, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::IdentityRequired));
        assert!(store.is_empty());
        // Draft untouched: the user resolves identity, then retries.
        assert_eq!(coordinator.draft().text, "hello");
    }

    #[test]
    fn test_begin_add_rejects_blank_text() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("   \n  ");

        let err = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyDraft));
        assert!(store.is_empty());
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let (mut coordinator, _) = setup();
        let err = coordinator.set_draft_timestamp(-0.5).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_non_finite_timestamp_rejected() {
        let (mut coordinator, mut store) = setup();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = coordinator.set_draft_timestamp(bad).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTimestamp { .. }));
        }

        // A non-finite value smuggled into the draft is still caught at
        // submit time.
        coordinator.draft.timestamp_seconds = f64::NAN;
        coordinator.set_draft_text("hello");
        let err = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reply_mode_cleared_on_submit() {
        let (mut coordinator, mut store) = setup();
        store.apply_insert(server_comment(
            "root-1",
            &NewComment {
                project_id: "p1".to_string(),
                video_id: "v1".to_string(),
                content: "root".to_string(),
                timestamp_seconds: 1.0,
                author_name: "ada".to_string(),
                author_id: Some("u1".to_string()),
                guest_session_id: None,
                parent_comment_id: None,
            },
        ));

        coordinator.begin_reply("root-1");
        coordinator.set_draft_text("a reply");
        let pending = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap();

        assert_eq!(pending.request.parent_comment_id.as_deref(), Some("root-1"));
        assert!(coordinator.replying_to().is_none());
        assert_eq!(store.tree()[0].replies.len(), 1);
    }

    #[test]
    fn test_same_millisecond_adds_get_distinct_ids() {
        let (mut coordinator, mut store) = setup();
        let now = Utc::now();

        coordinator.set_draft_text("first");
        let first = coordinator
            .begin_add(&mut store, Some(&guest_identity()), now)
            .unwrap();
        coordinator.set_draft_text("second");
        let second = coordinator
            .begin_add(&mut store, Some(&guest_identity()), now)
            .unwrap();

        assert_ne!(first.provisional_id, second.provisional_id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_realtime_echo_discarded_after_confirm() {
        let (mut coordinator, mut store) = setup();
        coordinator.set_draft_text("hello");

        let pending = coordinator
            .begin_add(&mut store, Some(&guest_identity()), Utc::now())
            .unwrap();
        let confirmed = server_comment("real-1", &pending.request);
        coordinator.confirm_add(&mut store, &pending, confirmed.clone(), Utc::now());

        let applied = coordinator.handle_realtime_insert(&mut store, confirmed, Utc::now());
        assert!(!applied);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_realtime_insert_from_other_actor_applies() {
        let (mut coordinator, mut store) = setup();
        let other = server_comment(
            "real-9",
            &NewComment {
                project_id: "p1".to_string(),
                video_id: "v1".to_string(),
                content: "from elsewhere".to_string(),
                timestamp_seconds: 4.0,
                author_name: "bob".to_string(),
                author_id: Some("u2".to_string()),
                guest_session_id: None,
                parent_comment_id: None,
            },
        );

        assert!(coordinator.handle_realtime_insert(&mut store, other.clone(), Utc::now()));
        // At-least-once delivery: a duplicate push is a no-op.
        assert!(!coordinator.handle_realtime_insert(&mut store, other, Utc::now()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ensure_owner() {
        let request = NewComment {
            project_id: "p1".to_string(),
            video_id: "v1".to_string(),
            content: "mine".to_string(),
            timestamp_seconds: 0.0,
            author_name: "Guest #1234".to_string(),
            author_id: None,
            guest_session_id: Some("gs1".to_string()),
            parent_comment_id: None,
        };
        let comment = server_comment("real-1", &request);

        assert!(MutationCoordinator::ensure_owner(&comment, &guest_identity()).is_ok());

        let stranger = ActorIdentity::guest("gs2", "Guest #9999");
        let err = MutationCoordinator::ensure_owner(&comment, &stranger).unwrap_err();
        assert!(matches!(err, CoreError::NotCommentOwner { .. }));

        let user = ActorIdentity::user("u1", "ada");
        assert!(MutationCoordinator::ensure_owner(&comment, &user).is_err());
    }
}
