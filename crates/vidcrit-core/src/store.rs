//! Comment store — the reconciled in-memory view for one open video.
//!
//! Holds the authoritative flat comment list plus two derived views: the
//! organized two-level tree (recomputed on every mutation) and per-comment
//! reaction aggregates (folded on demand from raw rows). Local optimistic
//! writes, server confirmations, and realtime pushes all land here through
//! the `apply_*` operations; each one is synchronous and leaves the store
//! valid, with every comment reachable from a root.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::errors::{CoreError, CoreResult};
use crate::model::{
    ActorKey, Comment, ReactionRow, ReactionSummary, ToggleOutcome, DELETED_MARKER,
};
use crate::reactions::{aggregate, toggle_row};
use crate::thread::organize;

/// Reconciled cache of comments and reaction rows for one video.
#[derive(Debug)]
pub struct CommentStore {
    video_id: String,
    /// Flat list; `replies` is always empty here.
    comments: Vec<Comment>,
    /// Derived tree, rebuilt via `organize` after every mutation.
    tree: Vec<Comment>,
    /// Raw reaction rows keyed by comment id.
    reactions: HashMap<String, Vec<ReactionRow>>,
}

impl CommentStore {
    /// Create an empty store for a video.
    #[must_use]
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            comments: Vec::new(),
            tree: Vec::new(),
            reactions: HashMap::new(),
        }
    }

    /// Build a store from the server-rendered initial snapshot.
    #[must_use]
    pub fn from_snapshot(
        video_id: impl Into<String>,
        comments: Vec<Comment>,
        reaction_rows: Vec<ReactionRow>,
    ) -> Self {
        let mut store = Self::new(video_id);
        for comment in comments {
            store.comments.push(Self::flat(comment));
        }
        for row in reaction_rows {
            store
                .reactions
                .entry(row.comment_id.clone())
                .or_default()
                .push(row);
        }
        store.reorganize();
        store
    }

    /// The video this store is scoped to.
    #[must_use]
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// The current organized tree (roots with nested replies).
    #[must_use]
    pub fn tree(&self) -> &[Comment] {
        &self.tree
    }

    /// Look up a comment by id in the flat list.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    /// Whether a comment with this id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of comments (including soft-deleted ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Insert a comment. Idempotent: an id already present is left alone.
    pub fn apply_insert(&mut self, comment: Comment) {
        if self.contains(&comment.id) {
            return;
        }
        self.comments.push(Self::flat(comment));
        self.reorganize();
    }

    /// Replace the comment identified by `old_id` with the server-confirmed
    /// row, keeping its list position. Reaction rows keyed by the old id
    /// follow the comment. Returns `false` when `old_id` is not present.
    ///
    /// If a realtime echo already inserted the confirmed id, the stale copy
    /// is removed instead, so exactly one comment remains either way.
    pub fn apply_replace(&mut self, old_id: &str, comment: Comment) -> bool {
        let Some(pos) = self.comments.iter().position(|c| c.id == old_id) else {
            return false;
        };

        if old_id != comment.id && self.contains(&comment.id) {
            self.comments.remove(pos);
            self.reactions.remove(old_id);
        } else {
            if old_id != comment.id {
                if let Some(rows) = self.reactions.remove(old_id) {
                    self.reactions.insert(comment.id.clone(), rows);
                }
            }
            self.comments[pos] = Self::flat(comment);
        }
        self.reorganize();
        true
    }

    /// Remove a comment outright (rollback of an optimistic insert).
    ///
    /// Its replies, if any arrived in the meantime, are re-rooted by the
    /// organizer's orphan fallback. Returns `false` when absent.
    pub fn apply_remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.comments.iter().position(|c| c.id == id) else {
            return false;
        };
        self.comments.remove(pos);
        self.reactions.remove(id);
        self.reorganize();
        true
    }

    /// Soft-delete a comment: content becomes the deletion marker, ordering
    /// position and replies are preserved. Returns `false` when absent.
    pub fn apply_soft_delete(&mut self, id: &str) -> bool {
        let Some(comment) = self.comments.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        comment.is_deleted = true;
        comment.content = DELETED_MARKER.to_string();
        self.reorganize();
        true
    }

    /// Replace one comment's raw reaction rows with a freshly fetched set.
    pub fn apply_reaction_update(&mut self, comment_id: &str, rows: Vec<ReactionRow>) {
        if rows.is_empty() {
            self.reactions.remove(comment_id);
        } else {
            self.reactions.insert(comment_id.to_string(), rows);
        }
    }

    /// Optimistically toggle a reaction, applying the same fold rule the
    /// backend enforces.
    pub fn toggle_local_reaction(
        &mut self,
        comment_id: &str,
        reactor: &ActorKey,
        kind: crate::model::ReactionKind,
        now: DateTime<Utc>,
    ) -> CoreResult<ToggleOutcome> {
        if !self.contains(comment_id) {
            return Err(CoreError::CommentNotFound {
                comment_id: comment_id.to_string(),
            });
        }
        let rows = self.reactions.entry(comment_id.to_string()).or_default();
        let outcome = toggle_row(rows, comment_id, reactor, kind, now);
        if rows.is_empty() {
            self.reactions.remove(comment_id);
        }
        Ok(outcome)
    }

    /// Raw reaction rows for a comment.
    #[must_use]
    pub fn reaction_rows(&self, comment_id: &str) -> &[ReactionRow] {
        self.reactions.get(comment_id).map_or(&[], Vec::as_slice)
    }

    /// Aggregated reactions for a comment, from the current viewer's
    /// perspective.
    #[must_use]
    pub fn reactions_for(
        &self,
        comment_id: &str,
        actor: Option<&ActorKey>,
    ) -> Vec<ReactionSummary> {
        aggregate(self.reaction_rows(comment_id), actor)
    }

    fn reorganize(&mut self) {
        self.tree = organize(self.comments.clone());
    }

    fn flat(mut comment: Comment) -> Comment {
        comment.replies.clear();
        comment
    }
}
