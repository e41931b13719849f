//! Domain types for vidcrit — comments, reactions, actors, guest sessions.
//!
//! These are the wire shapes exchanged with the authoritative backend and
//! the in-memory shapes held by the comment store. Field names follow the
//! backend's relational columns.

pub mod ids;

pub use ids::{is_provisional_id, new_provisional_id, PROVISIONAL_PREFIX};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content placed on a comment once it is soft-deleted. The row itself is
/// never removed; ordering position and replies stay visible.
pub const DELETED_MARKER: &str = "[deleted]";

// ============================================================================
// Actors
// ============================================================================

/// The identity used to test ownership and "did this actor already react".
///
/// Exactly one of a registered user id or a guest session id identifies an
/// actor; there is no anonymous-without-session actor on the write path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ActorKey {
    /// A registered user id.
    User(String),
    /// A guest session id.
    Guest(String),
}

impl ActorKey {
    /// The user id, if this is a registered actor.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Guest(_) => None,
        }
    }

    /// The guest session id, if this is a guest actor.
    #[must_use]
    pub fn guest_session_id(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Guest(id) => Some(id),
        }
    }
}

/// A resolved actor: key plus display name.
///
/// Resolution itself (sign-in, guest name prompt) happens outside the core;
/// writes require one of these as a hard precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub key: ActorKey,
    pub name: String,
}

impl ActorIdentity {
    /// Identity for a registered user.
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ActorKey::User(id.into()),
            name: name.into(),
        }
    }

    /// Identity for a guest session.
    pub fn guest(session_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ActorKey::Guest(session_id.into()),
            name: name.into(),
        }
    }
}

// ============================================================================
// Comments
// ============================================================================

/// A single comment on a video timeline.
///
/// `replies` is derived: it is empty in flat lists and populated only in the
/// organized two-level tree. `author_id` and `guest_session_id` are mutually
/// exclusive for any comment authored after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub project_id: String,
    pub video_id: String,
    pub content: String,
    pub timestamp_seconds: f64,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Whether this comment anchors a thread (has no parent).
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    /// The authoring actor's key, when recorded.
    #[must_use]
    pub fn author_key(&self) -> Option<ActorKey> {
        if let Some(id) = &self.author_id {
            return Some(ActorKey::User(id.clone()));
        }
        self.guest_session_id.clone().map(ActorKey::Guest)
    }

    /// Whether the requesting actor owns this comment: a guest-session
    /// match, or a user-id match when the requester is registered.
    #[must_use]
    pub fn is_owned_by(&self, requester: &ActorIdentity) -> bool {
        match &requester.key {
            ActorKey::User(id) => self.author_id.as_deref() == Some(id.as_str()),
            ActorKey::Guest(id) => self.guest_session_id.as_deref() == Some(id.as_str()),
        }
    }

    /// A stable rendering key that survives the provisional-to-server id
    /// swap: the id changes on confirmation, but these fields do not.
    #[must_use]
    pub fn ui_key(&self) -> String {
        let prefix: String = self.content.chars().take(20).collect();
        format!(
            "{}-{}-{}-{prefix}",
            self.timestamp_seconds,
            self.author_name,
            self.created_at.to_rfc3339()
        )
    }
}

/// Parameters for the authoritative create-comment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub project_id: String,
    pub video_id: String,
    pub content: String,
    pub timestamp_seconds: f64,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
}

// ============================================================================
// Reactions
// ============================================================================

/// The fixed reaction vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Celebrate,
    Insightful,
    Fire,
}

impl ReactionKind {
    /// All kinds in picker order. Aggregates are emitted in this order so
    /// the rendered chip row is stable.
    pub const ALL: [Self; 6] = [
        Self::Like,
        Self::Love,
        Self::Laugh,
        Self::Celebrate,
        Self::Insightful,
        Self::Fire,
    ];

    /// Lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Laugh => "laugh",
            Self::Celebrate => "celebrate",
            Self::Insightful => "insightful",
            Self::Fire => "fire",
        }
    }

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Like => "\u{1f44d}",
            Self::Love => "\u{2764}\u{fe0f}",
            Self::Laugh => "\u{1f602}",
            Self::Celebrate => "\u{1f389}",
            Self::Insightful => "\u{1f4a1}",
            Self::Fire => "\u{1f525}",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Like => "Like",
            Self::Love => "Love",
            Self::Laugh => "Laugh",
            Self::Celebrate => "Celebrate",
            Self::Insightful => "Insightful",
            Self::Fire => "Fire",
        }
    }
}

impl std::fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReactionKind {
    type Err = UnknownReactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownReactionKind(s.to_string()))
    }
}

/// Error for a reaction-type string outside the fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown reaction kind: {0}")]
pub struct UnknownReactionKind(pub String);

/// One raw reaction event row. At most one row exists per
/// `(comment_id, reactor)` pair; the aggregator folds these into counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRow {
    pub comment_id: String,
    pub reactor: ActorKey,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

/// Per-comment, per-kind aggregate for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub kind: ReactionKind,
    pub count: usize,
    pub has_reacted: bool,
}

/// Result of an authoritative reaction toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    /// No prior row from this actor; one was created.
    Added,
    /// A row of a different kind existed; it was replaced.
    Updated,
    /// A row of the same kind existed; it was removed (toggle-off).
    Removed,
}

// ============================================================================
// Guest sessions
// ============================================================================

/// A cookie-backed anonymous identity scoped to one shared project link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSession {
    pub session_id: String,
    pub project_id: String,
    pub name: String,
    pub cookie_token: String,
    pub expires_at: DateTime<Utc>,
}

impl GuestSession {
    /// Whether the session has passed its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// The actor identity this session resolves to.
    #[must_use]
    pub fn identity(&self) -> ActorIdentity {
        ActorIdentity::guest(self.session_id.clone(), self.name.clone())
    }
}
