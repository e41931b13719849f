//! Reaction aggregator — fold raw reaction rows into per-kind summaries.
//!
//! Aggregates are always recomputed from the raw row set, never patched
//! with +1/-1 arithmetic, so out-of-order or duplicated realtime deliveries
//! converge to the same view.

use chrono::{DateTime, Utc};

use crate::model::{ActorKey, ReactionKind, ReactionRow, ReactionSummary, ToggleOutcome};

/// Fold raw rows into per-kind aggregates for one comment.
///
/// `actor` is the current viewer's reactor key; `has_reacted` is `false`
/// everywhere when the viewer's identity is unresolved. Kinds with no rows
/// are absent from the output. Output follows the fixed picker order of
/// [`ReactionKind::ALL`].
#[must_use]
pub fn aggregate(rows: &[ReactionRow], actor: Option<&ActorKey>) -> Vec<ReactionSummary> {
    ReactionKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let count = rows.iter().filter(|r| r.kind == kind).count();
            if count == 0 {
                return None;
            }
            let has_reacted = actor.is_some_and(|key| {
                rows.iter().any(|r| r.kind == kind && r.reactor == *key)
            });
            Some(ReactionSummary {
                kind,
                count,
                has_reacted,
            })
        })
        .collect()
}

/// Apply toggle semantics to one comment's row set.
///
/// At most one row per reactor: same kind again removes the row, a
/// different kind replaces it, no prior row inserts one. This is the single
/// fold rule shared by the optimistic local path and the authoritative
/// backend.
pub fn toggle_row(
    rows: &mut Vec<ReactionRow>,
    comment_id: &str,
    reactor: &ActorKey,
    kind: ReactionKind,
    now: DateTime<Utc>,
) -> ToggleOutcome {
    if let Some(pos) = rows.iter().position(|r| r.reactor == *reactor) {
        if rows[pos].kind == kind {
            rows.remove(pos);
            ToggleOutcome::Removed
        } else {
            rows[pos].kind = kind;
            rows[pos].created_at = now;
            ToggleOutcome::Updated
        }
    } else {
        rows.push(ReactionRow {
            comment_id: comment_id.to_string(),
            reactor: reactor.clone(),
            kind,
            created_at: now,
        });
        ToggleOutcome::Added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(reactor: ActorKey, kind: ReactionKind) -> ReactionRow {
        ReactionRow {
            comment_id: "c1".to_string(),
            reactor,
            kind,
            created_at: Utc::now(),
        }
    }

    fn guest(id: &str) -> ActorKey {
        ActorKey::Guest(id.to_string())
    }

    #[test]
    fn test_aggregate_groups_by_kind() {
        let rows = vec![
            row(guest("a"), ReactionKind::Like),
            row(guest("b"), ReactionKind::Like),
            row(guest("c"), ReactionKind::Fire),
        ];

        let summary = aggregate(&rows, Some(&guest("b")));
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].kind, ReactionKind::Like);
        assert_eq!(summary[0].count, 2);
        assert!(summary[0].has_reacted);
        assert_eq!(summary[1].kind, ReactionKind::Fire);
        assert_eq!(summary[1].count, 1);
        assert!(!summary[1].has_reacted);
    }

    #[test]
    fn test_aggregate_unresolved_actor_never_has_reacted() {
        let rows = vec![row(guest("a"), ReactionKind::Love)];
        let summary = aggregate(&rows, None);
        assert!(!summary[0].has_reacted);
    }

    #[test]
    fn test_aggregate_empty_rows_empty_output() {
        assert!(aggregate(&[], Some(&guest("a"))).is_empty());
    }

    #[test]
    fn test_toggle_same_kind_removes() {
        let mut rows = Vec::new();
        let now = Utc::now();

        let outcome = toggle_row(&mut rows, "c1", &guest("a"), ReactionKind::Like, now);
        assert_eq!(outcome, ToggleOutcome::Added);
        assert_eq!(aggregate(&rows, Some(&guest("a")))[0].count, 1);

        let outcome = toggle_row(&mut rows, "c1", &guest("a"), ReactionKind::Like, now);
        assert_eq!(outcome, ToggleOutcome::Removed);
        // Toggled-off kind is absent entirely, not present with count 0.
        assert!(aggregate(&rows, Some(&guest("a"))).is_empty());
    }

    #[test]
    fn test_toggle_different_kind_replaces() {
        let mut rows = Vec::new();
        let now = Utc::now();

        toggle_row(&mut rows, "c1", &guest("a"), ReactionKind::Like, now);
        let outcome = toggle_row(&mut rows, "c1", &guest("a"), ReactionKind::Love, now);
        assert_eq!(outcome, ToggleOutcome::Updated);

        let summary = aggregate(&rows, Some(&guest("a")));
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].kind, ReactionKind::Love);
        assert!(summary[0].has_reacted);
    }

    #[test]
    fn test_toggle_off_with_other_reactors_decrements() {
        let mut rows = vec![
            row(guest("other"), ReactionKind::Like),
            row(guest("a"), ReactionKind::Like),
        ];
        toggle_row(&mut rows, "c1", &guest("a"), ReactionKind::Like, Utc::now());

        let summary = aggregate(&rows, Some(&guest("a")));
        assert_eq!(summary[0].count, 1);
        assert!(!summary[0].has_reacted);
    }

    #[test]
    fn test_aggregate_is_recompute_not_patch() {
        // Same row multiset in any order folds to the same aggregate.
        let a = row(guest("a"), ReactionKind::Like);
        let b = row(guest("b"), ReactionKind::Fire);
        let c = row(guest("c"), ReactionKind::Like);

        let forward = aggregate(&[a.clone(), b.clone(), c.clone()], None);
        let backward = aggregate(&[c, b, a], None);
        assert_eq!(forward, backward);
    }
}
