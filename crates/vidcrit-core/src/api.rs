//! External interface traits.
//!
//! The core consumes the authoritative store abstractly: a write API, a
//! read API for the initial snapshot and reaction re-fetches, and the
//! guest identity API. `SqliteBackend` implements all three; tests inject
//! failing or delegating doubles at the same seams.

use crate::errors::CoreResult;
use crate::model::{
    ActorIdentity, Comment, GuestSession, NewComment, ReactionKind, ReactionRow, ToggleOutcome,
};

/// The initial server-rendered state for one video: comments ordered by
/// `(timestamp_seconds, created_at)` plus all associated raw reaction rows.
#[derive(Debug, Clone)]
pub struct CommentSnapshot {
    pub comments: Vec<Comment>,
    pub reactions: Vec<ReactionRow>,
}

/// Authoritative comment writes.
pub trait CommentWriteApi {
    /// Create a comment; the server assigns the id and canonical
    /// `created_at`.
    fn create_comment(&self, new_comment: &NewComment) -> CoreResult<Comment>;

    /// Soft-delete a comment. Ownership is re-checked server-side.
    fn soft_delete_comment(&self, comment_id: &str, requester: &ActorIdentity) -> CoreResult<()>;

    /// Toggle a reaction with replace/remove semantics.
    fn toggle_reaction(
        &self,
        comment_id: &str,
        kind: ReactionKind,
        requester: &ActorIdentity,
    ) -> CoreResult<ToggleOutcome>;
}

/// Authoritative comment reads.
pub trait CommentReadApi {
    /// Fetch the initial snapshot for a video.
    fn comment_snapshot(&self, video_id: &str) -> CoreResult<CommentSnapshot>;

    /// Fetch one comment's current raw reaction rows. Used on every
    /// realtime reaction-change event so aggregation is always a full
    /// recompute.
    fn reaction_rows(&self, comment_id: &str) -> CoreResult<Vec<ReactionRow>>;
}

/// Guest identity for share-link visitors.
pub trait GuestSessionApi {
    /// Create a session scoped to a project's share link.
    fn create_session(&self, project_id: &str, name: &str) -> CoreResult<GuestSession>;

    /// Look up a session by cookie token. Returns `None` when the token is
    /// unknown or the session has expired — callers treat both as "no
    /// session" and re-prompt for identity on the next write.
    fn get_session(&self, token: &str) -> CoreResult<Option<GuestSession>>;

    /// Rename the guest behind a token. Returns the stored name.
    fn update_name(&self, token: &str, new_name: &str) -> CoreResult<String>;
}
