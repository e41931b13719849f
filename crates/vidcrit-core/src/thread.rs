//! Thread organizer — flat comment list to ordered two-level tree.
//!
//! The displayed tree has exactly two levels: roots and their replies.
//! Deeper parent chains (possible when a reply's parent is itself a reply)
//! collapse onto the nearest present root, and replies whose parent is
//! absent from the working set are promoted to roots rather than dropped.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::Comment;

/// Build the ordered two-level tree from a flat comment list.
///
/// Pure and idempotent: pre-populated `replies` on the input are
/// re-flattened first, so calling `organize` on its own output reproduces
/// the same tree.
///
/// Root order: `floor(timestamp_seconds)` ascending, then `created_at`
/// ascending — near-simultaneous comments at the same whole second of the
/// video cluster together in arrival order. Reply order: `created_at`
/// ascending.
#[must_use]
pub fn organize(comments: Vec<Comment>) -> Vec<Comment> {
    let flat = flatten(comments);

    let parent_by_id: HashMap<String, Option<String>> = flat
        .iter()
        .map(|c| (c.id.clone(), c.parent_comment_id.clone()))
        .collect();

    let mut roots: Vec<Comment> = Vec::new();
    let mut replies: Vec<(String, Comment)> = Vec::new();

    for comment in flat {
        match resolve_root(&comment.id, &parent_by_id) {
            None => roots.push(comment),
            Some(root_id) => replies.push((root_id, comment)),
        }
    }

    roots.sort_by_key(|c| (timeline_bucket(c), c.created_at));
    replies.sort_by_key(|(_, c)| c.created_at);

    let index: HashMap<String, usize> = roots
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    for (root_id, reply) in replies {
        if let Some(&i) = index.get(&root_id) {
            roots[i].replies.push(reply);
        }
    }

    roots
}

/// Invert a tree back into a flat list, preserving `parent_comment_id`.
#[must_use]
pub fn flatten(comments: Vec<Comment>) -> Vec<Comment> {
    let mut flat = Vec::new();
    let mut queue: VecDeque<Comment> = comments.into();
    while let Some(mut comment) = queue.pop_front() {
        let replies = std::mem::take(&mut comment.replies);
        flat.push(comment);
        queue.extend(replies);
    }
    flat
}

/// Find the root a comment should attach to.
///
/// Returns `None` when the comment is itself a root: either its parent is
/// `None`, its parent is absent from the working set (orphan fallback), or
/// its parent chain is cyclic (malformed data).
fn resolve_root(id: &str, parent_by_id: &HashMap<String, Option<String>>) -> Option<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = id;
    loop {
        if !seen.insert(current) {
            // Parent cycle; promote to root instead of looping.
            return None;
        }
        match parent_by_id.get(current) {
            None | Some(None) => break,
            Some(Some(parent)) if !parent_by_id.contains_key(parent.as_str()) => break,
            Some(Some(parent)) => current = parent.as_str(),
        }
    }
    if current == id {
        None
    } else {
        Some(current.to_string())
    }
}

/// Whole-second bucket used as the primary root sort key.
#[allow(clippy::cast_possible_truncation)]
fn timeline_bucket(comment: &Comment) -> i64 {
    comment.timestamp_seconds.floor() as i64
}
