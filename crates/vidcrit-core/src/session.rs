//! A review session: one viewer's live view of one video.
//!
//! Wires the comment store, the mutation coordinator, and a realtime
//! subscription to an authoritative backend. Opening a session subscribes
//! before fetching the snapshot so no event falls between the two; closing
//! (or dropping) the session detaches the subscription, so a torn-down
//! view never applies another event.

use chrono::Utc;
use tracing::warn;

use crate::api::{CommentReadApi, CommentWriteApi};
use crate::coordinator::MutationCoordinator;
use crate::errors::{CoreError, CoreResult};
use crate::model::{ActorIdentity, Comment, ReactionKind, ReactionSummary, ToggleOutcome};
use crate::realtime::{RealtimeEvent, RealtimeHub, Subscription};
use crate::store::CommentStore;

/// One viewer's reconciled session on a video.
pub struct ReviewSession<'a, B> {
    backend: &'a B,
    subscription: Subscription,
    store: CommentStore,
    coordinator: MutationCoordinator,
    identity: Option<ActorIdentity>,
}

impl<'a, B> ReviewSession<'a, B>
where
    B: CommentReadApi + CommentWriteApi,
{
    /// Open a session: subscribe to the hub, then load the snapshot.
    pub fn open(
        backend: &'a B,
        hub: &RealtimeHub,
        project_id: impl Into<String>,
        video_id: impl Into<String>,
    ) -> CoreResult<Self> {
        let video_id = video_id.into();
        let subscription = hub.subscribe(video_id.clone());
        let snapshot = backend.comment_snapshot(&video_id)?;
        Ok(Self {
            backend,
            subscription,
            store: CommentStore::from_snapshot(
                video_id.clone(),
                snapshot.comments,
                snapshot.reactions,
            ),
            coordinator: MutationCoordinator::new(project_id, video_id),
            identity: None,
        })
    }

    /// Set or clear the acting identity. Reads never need one; every write
    /// path checks it first.
    pub fn set_identity(&mut self, identity: Option<ActorIdentity>) {
        self.identity = identity;
    }

    #[must_use]
    pub fn identity(&self) -> Option<&ActorIdentity> {
        self.identity.as_ref()
    }

    /// The reconciled store, for rendering.
    #[must_use]
    pub const fn store(&self) -> &CommentStore {
        &self.store
    }

    /// The organized thread tree.
    #[must_use]
    pub fn tree(&self) -> &[Comment] {
        self.store.tree()
    }

    /// Aggregated reactions for a comment from this viewer's perspective.
    #[must_use]
    pub fn reactions_for(&self, comment_id: &str) -> Vec<ReactionSummary> {
        self.store
            .reactions_for(comment_id, self.identity.as_ref().map(|i| &i.key))
    }

    // ========================================================================
    // Draft editing
    // ========================================================================

    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.coordinator.set_draft_text(text);
    }

    pub fn set_draft_timestamp(&mut self, seconds: f64) -> CoreResult<()> {
        self.coordinator.set_draft_timestamp(seconds)
    }

    pub fn begin_reply(&mut self, parent_comment_id: impl Into<String>) {
        self.coordinator.begin_reply(parent_comment_id);
    }

    pub fn cancel_reply(&mut self) {
        self.coordinator.cancel_reply();
    }

    #[must_use]
    pub fn draft_text(&self) -> &str {
        &self.coordinator.draft().text
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Submit the current draft: optimistic insert, authoritative create,
    /// then confirmation or rollback. On failure the draft is restored and
    /// the error surfaces to the caller for retry.
    pub fn submit_comment(&mut self) -> CoreResult<Comment> {
        let pending =
            self.coordinator
                .begin_add(&mut self.store, self.identity.as_ref(), Utc::now())?;
        match self.backend.create_comment(&pending.request) {
            Ok(confirmed) => {
                self.coordinator
                    .confirm_add(&mut self.store, &pending, confirmed.clone(), Utc::now());
                Ok(confirmed)
            }
            Err(err) => {
                warn!(%err, "comment create failed, rolling back optimistic insert");
                self.coordinator.fail_add(&mut self.store, pending);
                Err(err)
            }
        }
    }

    /// Toggle a reaction, applying the fold locally first. A persistence
    /// failure keeps the optimistic state; the next reaction-change event
    /// or snapshot reload converges it.
    pub fn toggle_reaction(
        &mut self,
        comment_id: &str,
        kind: ReactionKind,
    ) -> CoreResult<ToggleOutcome> {
        let identity = self
            .identity
            .clone()
            .ok_or(CoreError::IdentityRequired)?;
        let outcome =
            self.store
                .toggle_local_reaction(comment_id, &identity.key, kind, Utc::now())?;
        if let Err(err) = self.backend.toggle_reaction(comment_id, kind, &identity) {
            warn!(comment_id, %err, "reaction toggle not persisted, keeping local state");
        }
        Ok(outcome)
    }

    /// Soft-delete an owned comment. The ownership check runs locally
    /// before the call; the backend re-checks it.
    pub fn delete_comment(&mut self, comment_id: &str) -> CoreResult<()> {
        let identity = self
            .identity
            .clone()
            .ok_or(CoreError::IdentityRequired)?;
        let comment = self
            .store
            .get(comment_id)
            .cloned()
            .ok_or_else(|| CoreError::CommentNotFound {
                comment_id: comment_id.to_string(),
            })?;
        MutationCoordinator::ensure_owner(&comment, &identity)?;
        self.backend.soft_delete_comment(comment_id, &identity)?;
        self.store.apply_soft_delete(comment_id);
        Ok(())
    }

    // ========================================================================
    // Realtime intake
    // ========================================================================

    /// Drain and apply pending realtime events. Comment inserts go through
    /// the coordinator's echo suppression; reaction changes trigger a
    /// re-fetch of the affected comment's raw rows. A failed re-fetch keeps
    /// the current rows and the drain continues, so a transient read error
    /// never discards queued inserts. Returns how many events changed the
    /// store.
    pub fn pump_realtime(&mut self) -> usize {
        let mut applied = 0;
        for event in self.subscription.drain() {
            match event {
                RealtimeEvent::CommentInserted(comment) => {
                    if self
                        .coordinator
                        .handle_realtime_insert(&mut self.store, comment, Utc::now())
                    {
                        applied += 1;
                    }
                }
                RealtimeEvent::ReactionChanged { comment_id } => {
                    if !self.store.contains(&comment_id) {
                        continue;
                    }
                    match self.backend.reaction_rows(&comment_id) {
                        Ok(rows) => {
                            self.store.apply_reaction_update(&comment_id, rows);
                            applied += 1;
                        }
                        Err(err) => {
                            warn!(comment_id, %err, "reaction re-fetch failed, keeping current rows");
                        }
                    }
                }
            }
        }
        applied
    }

    /// Tear the session down, detaching its subscription.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use anyhow::anyhow;
    use crate::api::CommentSnapshot;
    use crate::backend::SqliteBackend;
    use crate::model::{NewComment, ReactionRow};

    /// Read-API double whose reaction re-fetch can be made to fail.
    struct RefetchFlaky<'a> {
        inner: &'a SqliteBackend,
        fail_refetch: Cell<bool>,
    }

    impl CommentWriteApi for RefetchFlaky<'_> {
        fn create_comment(&self, new_comment: &NewComment) -> CoreResult<Comment> {
            self.inner.create_comment(new_comment)
        }

        fn soft_delete_comment(
            &self,
            comment_id: &str,
            requester: &ActorIdentity,
        ) -> CoreResult<()> {
            self.inner.soft_delete_comment(comment_id, requester)
        }

        fn toggle_reaction(
            &self,
            comment_id: &str,
            kind: ReactionKind,
            requester: &ActorIdentity,
        ) -> CoreResult<ToggleOutcome> {
            self.inner.toggle_reaction(comment_id, kind, requester)
        }
    }

    impl CommentReadApi for RefetchFlaky<'_> {
        fn comment_snapshot(&self, video_id: &str) -> CoreResult<CommentSnapshot> {
            self.inner.comment_snapshot(video_id)
        }

        fn reaction_rows(&self, comment_id: &str) -> CoreResult<Vec<ReactionRow>> {
            if self.fail_refetch.get() {
                return Err(crate::CoreError::Internal(anyhow!("backend unavailable")));
            }
            self.inner.reaction_rows(comment_id)
        }
    }

    fn open_pair<'a>(
        backend: &'a SqliteBackend,
        project_id: &str,
    ) -> (
        ReviewSession<'a, SqliteBackend>,
        ReviewSession<'a, SqliteBackend>,
    ) {
        let a = ReviewSession::open(backend, backend.realtime(), project_id, "v1").unwrap();
        let b = ReviewSession::open(backend, backend.realtime(), project_id, "v1").unwrap();
        (a, b)
    }

    #[test]
    fn test_submit_propagates_without_self_duplicate() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();
        let (mut ada, mut bob) = open_pair(&backend, &project.project_id);
        ada.set_identity(Some(ActorIdentity::user("u1", "ada")));

        ada.set_draft_text("check the color grade");
        ada.set_draft_timestamp(14.0).unwrap();
        let confirmed = ada.submit_comment().unwrap();

        // Ada's own echo is suppressed; Bob applies it.
        assert_eq!(ada.pump_realtime(), 0);
        assert_eq!(ada.store().len(), 1);
        assert_eq!(bob.pump_realtime(), 1);
        assert_eq!(bob.store().get(&confirmed.id).unwrap().content, confirmed.content);
    }

    #[test]
    fn test_refetch_failure_keeps_queued_inserts() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();
        let mut ada =
            ReviewSession::open(&backend, backend.realtime(), &project.project_id, "v1").unwrap();
        ada.set_identity(Some(ActorIdentity::user("u1", "ada")));

        ada.set_draft_text("first note");
        let existing = ada.submit_comment().unwrap();

        let flaky = RefetchFlaky {
            inner: &backend,
            fail_refetch: Cell::new(false),
        };
        let mut bob =
            ReviewSession::open(&flaky, backend.realtime(), &project.project_id, "v1").unwrap();

        // Queue for Bob: a reaction change on the snapshot comment, then an
        // insert of a new comment.
        ada.toggle_reaction(&existing.id, ReactionKind::Like).unwrap();
        ada.set_draft_text("second note");
        let second = ada.submit_comment().unwrap();

        flaky.fail_refetch.set(true);
        // The failed re-fetch is skipped; the queued insert still applies.
        assert_eq!(bob.pump_realtime(), 1);
        assert!(bob.store().contains(&second.id));
        assert!(bob.reactions_for(&existing.id).is_empty());

        // Once reads recover, the next reaction event converges the rows.
        flaky.fail_refetch.set(false);
        ada.toggle_reaction(&existing.id, ReactionKind::Fire).unwrap();
        assert_eq!(bob.pump_realtime(), 1);
        let summaries = bob.reactions_for(&existing.id);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].kind, ReactionKind::Fire);
    }

    #[test]
    fn test_write_without_identity_is_rejected() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();
        let mut session =
            ReviewSession::open(&backend, backend.realtime(), &project.project_id, "v1").unwrap();

        session.set_draft_text("hello");
        assert!(matches!(
            session.submit_comment(),
            Err(CoreError::IdentityRequired)
        ));
        assert!(matches!(
            session.toggle_reaction("c1", ReactionKind::Like),
            Err(CoreError::IdentityRequired)
        ));
        assert!(matches!(
            session.delete_comment("c1"),
            Err(CoreError::IdentityRequired)
        ));
    }

    #[test]
    fn test_close_detaches_subscription() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();
        let session =
            ReviewSession::open(&backend, backend.realtime(), &project.project_id, "v1").unwrap();

        assert_eq!(backend.realtime().subscriber_count(), 1);
        session.close();
        assert_eq!(backend.realtime().subscriber_count(), 0);
    }
}
