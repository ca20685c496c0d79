//! Placeholder synthesis and cached-collection splicing for optimistic
//! updates.
//!
//! A user action should redraw the screen before the provider confirms
//! it. These helpers fabricate pending-id stand-ins matching the cached
//! shapes and splice them in and out of cached collections; they perform
//! no I/O and touch no cache. The calling mutation flow records the
//! result into whatever collection backs the screen, issues the real
//! request (directly or through the action queue), and on settlement
//! swaps the placeholder for the provider's answer or removes it.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::{
  Author, DiffSide, Identified, IssueComment, RemoteId, Review, ReviewComment, ReviewEvent,
  ReviewThread,
};

/// Placeholder ids count down from -1; provider ids are positive, so a
/// placeholder can never collide with a confirmed object, and ids stay
/// distinct across every synthesis call in the process.
static NEXT_PENDING_ID: AtomicI64 = AtomicI64::new(-1);

fn next_pending_id() -> RemoteId {
  RemoteId::Pending(NEXT_PENDING_ID.fetch_sub(1, Ordering::Relaxed))
}

/// Input for [`new_comment`].
#[derive(Debug, Clone, Default)]
pub struct NewComment {
  pub body: String,
  pub path: Option<String>,
  pub line: Option<u64>,
  pub side: Option<DiffSide>,
  pub in_reply_to_id: Option<RemoteId>,
}

/// Fabricate an inline review comment as it will look once the provider
/// accepts it: pending id, pending author, empty canonical URL, stamped
/// with the synthesis instant.
pub fn new_comment(input: NewComment) -> ReviewComment {
  let now = Utc::now();
  ReviewComment {
    id: next_pending_id(),
    body: input.body,
    path: input.path,
    line: input.line,
    side: input.side,
    in_reply_to_id: input.in_reply_to_id,
    user: Author::pending(),
    created_at: now,
    updated_at: now,
    html_url: String::new(),
  }
}

/// Fabricate a top-level conversation comment.
pub fn new_issue_comment(body: impl Into<String>) -> IssueComment {
  let now = Utc::now();
  IssueComment {
    id: next_pending_id(),
    body: body.into(),
    user: Author::pending(),
    created_at: now,
    updated_at: now,
    html_url: String::new(),
  }
}

/// Input for [`new_review`].
#[derive(Debug, Clone)]
pub struct NewReview {
  pub body: Option<String>,
  pub event: ReviewEvent,
}

/// Fabricate a submitted review; the review state is derived from the
/// submitted event.
pub fn new_review(input: NewReview) -> Review {
  Review {
    id: next_pending_id(),
    body: input.body,
    state: input.event.into(),
    user: Author::pending(),
    submitted_at: Utc::now(),
    html_url: String::new(),
  }
}

/// Append `item` to a cached collection, treating an absent list as
/// empty. Returns a fresh vector; the input is never touched. Optimistic
/// entities are only ever appended, never inserted elsewhere.
pub fn append<T: Clone>(list: Option<&[T]>, item: T) -> Vec<T> {
  let mut next = list.map(<[T]>::to_vec).unwrap_or_default();
  next.push(item);
  next
}

/// Swap the entry whose id matches `id` for `replacement`, wholesale.
/// This is the reconciliation step once the provider hands back the
/// authoritative object.
pub fn replace_by_id<T: Identified + Clone>(list: &[T], id: RemoteId, replacement: T) -> Vec<T> {
  list
    .iter()
    .map(|item| {
      if item.remote_id() == id {
        replacement.clone()
      } else {
        item.clone()
      }
    })
    .collect()
}

/// Drop the entry whose id matches `id`: the rollback path for a
/// mutation that ultimately failed.
pub fn remove_by_id<T: Identified + Clone>(list: &[T], id: RemoteId) -> Vec<T> {
  list
    .iter()
    .filter(|item| item.remote_id() != id)
    .cloned()
    .collect()
}

/// Set `is_resolved` on the thread matching `thread_id`, leaving every
/// other thread unchanged. An unmatched id is a no-op and an absent list
/// yields an empty vector; the result is always a fresh vector.
pub fn resolve_thread(
  threads: Option<&[ReviewThread]>,
  thread_id: &str,
  resolved: bool,
) -> Vec<ReviewThread> {
  threads
    .unwrap_or_default()
    .iter()
    .map(|thread| {
      if thread.id == thread_id {
        ReviewThread {
          is_resolved: resolved,
          ..thread.clone()
        }
      } else {
        thread.clone()
      }
    })
    .collect()
}
