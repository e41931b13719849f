//! Typed error types for the vidcrit core.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the vidcrit core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The comment draft is empty (after trimming) at submit time.
    #[error("Comment draft is empty. Nothing to submit.")]
    EmptyDraft,

    /// A negative or non-finite video-timeline position was supplied.
    #[error("Invalid comment timestamp: {seconds}s")]
    InvalidTimestamp { seconds: f64 },

    /// A write was attempted before an actor identity was resolved.
    #[error("No actor identity resolved. Resolve a guest session or user before writing.")]
    IdentityRequired,

    /// A comment was not found.
    #[error("Comment not found: {comment_id}")]
    CommentNotFound { comment_id: String },

    /// The requesting actor does not own the comment.
    #[error("Comment {comment_id} is not owned by the requesting actor")]
    NotCommentOwner { comment_id: String },

    /// A project was not found.
    #[error("Project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    /// A guest session was not found for the given token.
    #[error("Guest session not found for token")]
    SessionNotFound,

    /// An internal storage or transport error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
