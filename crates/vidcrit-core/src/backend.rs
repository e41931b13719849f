//! SQLite-backed authoritative store.
//!
//! `SqliteBackend` implements the comment write/read APIs and the guest
//! session API over a single SQLite database, and publishes realtime
//! events through an attached [`RealtimeHub`] after each committed write.
//! Reads return flat rows; threading and aggregation are client concerns.

use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension as _, Row};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::api::{CommentReadApi, CommentSnapshot, CommentWriteApi, GuestSessionApi};
use crate::errors::{CoreError, CoreResult};
use crate::model::{
    ActorIdentity, ActorKey, Comment, GuestSession, NewComment, ReactionKind, ReactionRow,
    ToggleOutcome, DELETED_MARKER,
};
use crate::realtime::{RealtimeEvent, RealtimeHub};

/// How long a temporary (no-account) project lives.
const TEMP_PROJECT_TTL_HOURS: i64 = 24;

/// Guest sessions on permanent projects expire after a year.
const GUEST_SESSION_TTL_DAYS: i64 = 365;

const SCHEMA_SQL: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    is_temp INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(project_id),
    video_id TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp_seconds REAL NOT NULL,
    author_name TEXT NOT NULL,
    author_id TEXT,
    guest_session_id TEXT,
    parent_comment_id TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_video
    ON comments(video_id, timestamp_seconds, created_at);

CREATE TABLE IF NOT EXISTS comment_reactions (
    comment_id TEXT NOT NULL REFERENCES comments(comment_id),
    user_id TEXT,
    guest_session_id TEXT,
    reaction_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK ((user_id IS NULL) != (guest_session_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_by_user
    ON comment_reactions(comment_id, user_id) WHERE user_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_by_guest
    ON comment_reactions(comment_id, guest_session_id) WHERE guest_session_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS guest_sessions (
    session_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(project_id),
    guest_name TEXT NOT NULL,
    cookie_token TEXT NOT NULL UNIQUE,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

const COMMENT_COLUMNS: &str = "comment_id, project_id, video_id, content, timestamp_seconds, \
     author_name, author_id, guest_session_id, parent_comment_id, is_deleted, created_at";

const REACTION_COLUMNS: &str = "comment_id, user_id, guest_session_id, reaction_type, created_at";

/// A review project: the container comments and guest sessions hang off.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub project_id: String,
    pub title: String,
    pub is_temp: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Whether the project has passed its expiry (temporary projects only).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// The authoritative store over a SQLite database.
pub struct SqliteBackend {
    conn: Connection,
    realtime: RealtimeHub,
}

impl SqliteBackend {
    /// Open (creating if needed) a backend database at `path`.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory backend. Used by tests.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize schema")?;
        Ok(Self {
            conn,
            realtime: RealtimeHub::new(),
        })
    }

    /// The hub this backend publishes realtime events on.
    #[must_use]
    pub const fn realtime(&self) -> &RealtimeHub {
        &self.realtime
    }

    /// Direct connection access, for callers that need ad-hoc queries.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create a project. Temporary projects get an expiry stamp.
    pub fn create_project(&self, title: &str, is_temp: bool) -> CoreResult<Project> {
        let now = Utc::now();
        let project = Project {
            project_id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            is_temp,
            expires_at: is_temp.then(|| now + Duration::hours(TEMP_PROJECT_TTL_HOURS)),
            created_at: now,
        };
        self.conn
            .execute(
                "INSERT INTO projects (project_id, title, is_temp, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &project.project_id,
                    &project.title,
                    project.is_temp,
                    project.expires_at,
                    project.created_at,
                ),
            )
            .context("failed to insert project")?;
        Ok(project)
    }

    /// Look up a project by id.
    pub fn project(&self, project_id: &str) -> CoreResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT project_id, title, is_temp, expires_at, created_at
                 FROM projects WHERE project_id = ?1",
                [project_id],
                |row| {
                    Ok(Project {
                        project_id: row.get(0)?,
                        title: row.get(1)?,
                        is_temp: row.get(2)?,
                        expires_at: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to query project")?;
        Ok(project)
    }

    fn require_project(&self, project_id: &str) -> CoreResult<Project> {
        self.project(project_id)?
            .ok_or_else(|| CoreError::ProjectNotFound {
                project_id: project_id.to_string(),
            })
    }

    fn get_comment(&self, comment_id: &str) -> CoreResult<Option<Comment>> {
        let comment = self
            .conn
            .query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE comment_id = ?1"),
                [comment_id],
                comment_from_row,
            )
            .optional()
            .context("failed to query comment")?;
        Ok(comment)
    }

    fn require_comment(&self, comment_id: &str) -> CoreResult<Comment> {
        self.get_comment(comment_id)?
            .ok_or_else(|| CoreError::CommentNotFound {
                comment_id: comment_id.to_string(),
            })
    }
}

impl CommentWriteApi for SqliteBackend {
    fn create_comment(&self, new_comment: &NewComment) -> CoreResult<Comment> {
        if new_comment.content.trim().is_empty() {
            return Err(CoreError::EmptyDraft);
        }
        if !new_comment.timestamp_seconds.is_finite() || new_comment.timestamp_seconds < 0.0 {
            return Err(CoreError::InvalidTimestamp {
                seconds: new_comment.timestamp_seconds,
            });
        }
        // Exactly one authoring identity column may be set.
        if new_comment.author_id.is_some() == new_comment.guest_session_id.is_some() {
            return Err(CoreError::IdentityRequired);
        }
        self.require_project(&new_comment.project_id)?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            project_id: new_comment.project_id.clone(),
            video_id: new_comment.video_id.clone(),
            content: new_comment.content.clone(),
            timestamp_seconds: new_comment.timestamp_seconds,
            author_name: new_comment.author_name.clone(),
            author_id: new_comment.author_id.clone(),
            guest_session_id: new_comment.guest_session_id.clone(),
            parent_comment_id: new_comment.parent_comment_id.clone(),
            created_at: Utc::now(),
            is_deleted: false,
            replies: Vec::new(),
        };
        self.conn
            .execute(
                "INSERT INTO comments (comment_id, project_id, video_id, content, \
                 timestamp_seconds, author_name, author_id, guest_session_id, \
                 parent_comment_id, is_deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                (
                    &comment.id,
                    &comment.project_id,
                    &comment.video_id,
                    &comment.content,
                    comment.timestamp_seconds,
                    &comment.author_name,
                    &comment.author_id,
                    &comment.guest_session_id,
                    &comment.parent_comment_id,
                    comment.is_deleted,
                    comment.created_at,
                ),
            )
            .context("failed to insert comment")?;
        debug!(comment_id = %comment.id, video_id = %comment.video_id, "comment created");

        self.realtime
            .publish(&RealtimeEvent::CommentInserted(comment.clone()));
        Ok(comment)
    }

    fn soft_delete_comment(&self, comment_id: &str, requester: &ActorIdentity) -> CoreResult<()> {
        let comment = self.require_comment(comment_id)?;
        if !comment.is_owned_by(requester) {
            return Err(CoreError::NotCommentOwner {
                comment_id: comment_id.to_string(),
            });
        }
        self.conn
            .execute(
                "UPDATE comments SET is_deleted = 1, content = ?1 WHERE comment_id = ?2",
                (DELETED_MARKER, comment_id),
            )
            .context("failed to soft-delete comment")?;
        debug!(comment_id, "comment soft-deleted");
        Ok(())
    }

    fn toggle_reaction(
        &self,
        comment_id: &str,
        kind: ReactionKind,
        requester: &ActorIdentity,
    ) -> CoreResult<ToggleOutcome> {
        self.require_comment(comment_id)?;

        // The actor column the unique index keys on.
        let (actor_column, actor_id) = match &requester.key {
            ActorKey::User(id) => ("user_id", id.as_str()),
            ActorKey::Guest(id) => ("guest_session_id", id.as_str()),
        };
        let existing: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT reaction_type FROM comment_reactions
                     WHERE comment_id = ?1 AND {actor_column} = ?2"
                ),
                (comment_id, actor_id),
                |row| row.get(0),
            )
            .optional()
            .context("failed to query existing reaction")?;

        let outcome = match existing.as_deref() {
            Some(current) if current == kind.as_str() => {
                self.conn
                    .execute(
                        &format!(
                            "DELETE FROM comment_reactions
                             WHERE comment_id = ?1 AND {actor_column} = ?2"
                        ),
                        (comment_id, actor_id),
                    )
                    .context("failed to remove reaction")?;
                ToggleOutcome::Removed
            }
            Some(_) => {
                self.conn
                    .execute(
                        &format!(
                            "UPDATE comment_reactions SET reaction_type = ?1, created_at = ?2
                             WHERE comment_id = ?3 AND {actor_column} = ?4"
                        ),
                        (kind.as_str(), Utc::now(), comment_id, actor_id),
                    )
                    .context("failed to update reaction")?;
                ToggleOutcome::Updated
            }
            None => {
                self.conn
                    .execute(
                        &format!(
                            "INSERT INTO comment_reactions \
                             (comment_id, {actor_column}, reaction_type, created_at)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        (comment_id, actor_id, kind.as_str(), Utc::now()),
                    )
                    .context("failed to insert reaction")?;
                ToggleOutcome::Added
            }
        };
        debug!(comment_id, kind = %kind, ?outcome, "reaction toggled");

        self.realtime.publish(&RealtimeEvent::ReactionChanged {
            comment_id: comment_id.to_string(),
        });
        Ok(outcome)
    }
}

impl CommentReadApi for SqliteBackend {
    fn comment_snapshot(&self, video_id: &str) -> CoreResult<CommentSnapshot> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE video_id = ?1
                 ORDER BY timestamp_seconds, created_at"
            ))
            .context("failed to prepare snapshot query")?;
        let comments = stmt
            .query_map([video_id], comment_from_row)
            .context("failed to query comments")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read comment rows")?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT r.{} FROM comment_reactions r
                 JOIN comments c ON c.comment_id = r.comment_id
                 WHERE c.video_id = ?1",
                REACTION_COLUMNS.replace(", ", ", r.")
            ))
            .context("failed to prepare reaction snapshot query")?;
        let reactions = stmt
            .query_map([video_id], reaction_from_row)
            .context("failed to query reactions")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read reaction rows")?;

        Ok(CommentSnapshot {
            comments,
            reactions,
        })
    }

    fn reaction_rows(&self, comment_id: &str) -> CoreResult<Vec<ReactionRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {REACTION_COLUMNS} FROM comment_reactions WHERE comment_id = ?1"
            ))
            .context("failed to prepare reaction query")?;
        let rows = stmt
            .query_map([comment_id], reaction_from_row)
            .context("failed to query reactions")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read reaction rows")?;
        Ok(rows)
    }
}

impl GuestSessionApi for SqliteBackend {
    fn create_session(&self, project_id: &str, name: &str) -> CoreResult<GuestSession> {
        let project = self.require_project(project_id)?;
        let now = Utc::now();
        // Sessions on a temporary project die with the project; on a
        // permanent project they get a long fixed lease.
        let expires_at = if project.is_temp {
            project
                .expires_at
                .unwrap_or_else(|| now + Duration::hours(TEMP_PROJECT_TTL_HOURS))
        } else {
            now + Duration::days(GUEST_SESSION_TTL_DAYS)
        };
        let session = GuestSession {
            session_id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            cookie_token: Uuid::new_v4().to_string(),
            expires_at,
        };
        self.conn
            .execute(
                "INSERT INTO guest_sessions \
                 (session_id, project_id, guest_name, cookie_token, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    &session.session_id,
                    &session.project_id,
                    &session.name,
                    &session.cookie_token,
                    session.expires_at,
                    now,
                ),
            )
            .context("failed to insert guest session")?;
        debug!(session_id = %session.session_id, project_id, "guest session created");
        Ok(session)
    }

    fn get_session(&self, token: &str) -> CoreResult<Option<GuestSession>> {
        let session = self
            .conn
            .query_row(
                "SELECT session_id, project_id, guest_name, cookie_token, expires_at
                 FROM guest_sessions WHERE cookie_token = ?1",
                [token],
                |row| {
                    Ok(GuestSession {
                        session_id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        cookie_token: row.get(3)?,
                        expires_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to query guest session")?;
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    fn update_name(&self, token: &str, new_name: &str) -> CoreResult<String> {
        let changed = self
            .conn
            .execute(
                "UPDATE guest_sessions SET guest_name = ?1 WHERE cookie_token = ?2",
                (new_name, token),
            )
            .context("failed to rename guest session")?;
        if changed == 0 {
            return Err(CoreError::SessionNotFound);
        }
        Ok(new_name.to_string())
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        video_id: row.get(2)?,
        content: row.get(3)?,
        timestamp_seconds: row.get(4)?,
        author_name: row.get(5)?,
        author_id: row.get(6)?,
        guest_session_id: row.get(7)?,
        parent_comment_id: row.get(8)?,
        is_deleted: row.get(9)?,
        created_at: row.get(10)?,
        replies: Vec::new(),
    })
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    let comment_id: String = row.get(0)?;
    let user_id: Option<String> = row.get(1)?;
    let guest_session_id: Option<String> = row.get(2)?;
    let kind_raw: String = row.get(3)?;
    let created_at: DateTime<Utc> = row.get(4)?;

    let reactor = match (user_id, guest_session_id) {
        (Some(id), None) => ActorKey::User(id),
        (None, Some(id)) => ActorKey::Guest(id),
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                "reaction row must have exactly one actor column".into(),
            ))
        }
    };
    let kind = kind_raw.parse::<ReactionKind>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(ReactionRow {
        comment_id,
        reactor,
        kind,
        created_at,
    })
}
