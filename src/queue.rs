//! Durable queue of user-initiated pull request mutations.
//!
//! Approvals, comments, and merges issued while the provider is slow or
//! unreachable land here instead of being dropped. The queue is a pure
//! state container: it performs no network I/O and no backoff. Attempting
//! the actions is delegated to an executor supplied by the transport
//! layer, and scheduling the next `process` call (connectivity changes,
//! exponential backoff) belongs to the caller, which keeps the queue
//! deterministic to test.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::model::PullRef;

/// What a queued action does to its pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActionKind {
  Approve { body: Option<String> },
  RequestChanges { body: String },
  Comment { body: String, path: Option<String>, line: Option<u64> },
  Merge { method: MergeMethod },
  Close,
  Reopen,
  Label { labels: Vec<String> },
  Assign { assignees: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMethod {
  Merge,
  Squash,
  Rebase,
}

/// Where an action is in its lifecycle.
///
/// `Completed` and `Failed` are terminal: `process` never touches them
/// again. Only an explicit [`ActionQueue::retry`] re-enters a failed
/// action into the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl ActionStatus {
  /// Display ordering: live work first, terminal states last.
  fn priority(self) -> u8 {
    match self {
      Self::Pending => 0,
      Self::Processing => 1,
      Self::Failed => 2,
      Self::Completed => 3,
    }
  }
}

/// A user mutation waiting for the provider to accept it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id: String,
  pub pull: PullRef,
  pub kind: ActionKind,
  pub status: ActionStatus,
  pub created_at: DateTime<Utc>,
  /// Failed attempts so far; never exceeds `max_retries`.
  pub retry_count: u32,
  pub max_retries: u32,
  /// Stringified rejection from the most recent failed attempt.
  pub error: Option<String>,
}

/// Ordered collection of pending actions with bounded retry.
#[derive(Debug, Default)]
pub struct ActionQueue {
  actions: Vec<QueuedAction>,
  config: QueueConfig,
  next_seq: u64,
}

impl ActionQueue {
  pub fn new(config: QueueConfig) -> Self {
    Self {
      actions: Vec::new(),
      config,
      next_seq: 0,
    }
  }

  /// Enqueue a mutation; returns the fresh action id. Insertion order is
  /// preserved and is the order `process` attempts actions in.
  pub fn add(&mut self, pull: PullRef, kind: ActionKind) -> String {
    self.next_seq += 1;
    let now = Utc::now();
    let id = format!("{}-{}", now.timestamp_millis(), self.next_seq);

    self.actions.push(QueuedAction {
      id: id.clone(),
      pull,
      kind,
      status: ActionStatus::Pending,
      created_at: now,
      retry_count: 0,
      max_retries: self.config.max_retries,
      error: None,
    });

    id
  }

  /// Attempt every pending action once, sequentially, in queue order.
  ///
  /// A failure with retries remaining re-queues the action for a later
  /// `process` call; it is not retried within this one. Exhausting
  /// `max_retries` parks the action as failed with the rejection captured
  /// on it. Completed and failed actions are skipped entirely.
  pub async fn process<F, Fut>(&mut self, executor: F)
  where
    F: Fn(QueuedAction) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    for index in 0..self.actions.len() {
      if self.actions[index].status != ActionStatus::Pending {
        continue;
      }

      self.actions[index].status = ActionStatus::Processing;
      let attempt = self.actions[index].clone();
      let outcome = executor(attempt).await;

      let action = &mut self.actions[index];
      match outcome {
        Ok(()) => {
          action.status = ActionStatus::Completed;
          action.error = None;
          debug!(id = %action.id, "queued action completed");
        }
        Err(err) => {
          if action.retry_count < action.max_retries {
            action.retry_count += 1;
          }
          action.error = Some(err.to_string());
          if action.retry_count >= action.max_retries {
            action.status = ActionStatus::Failed;
            warn!(
              id = %action.id,
              retries = action.retry_count,
              "queued action exhausted its retries"
            );
          } else {
            action.status = ActionStatus::Pending;
            debug!(
              id = %action.id,
              retries = action.retry_count,
              "queued action failed, re-queued"
            );
          }
        }
      }
    }
  }

  /// Put a failed action back into the cycle for a fresh manual attempt.
  /// The retry counter is left where it was; only the status resets.
  pub fn retry(&mut self, id: &str) -> bool {
    match self.actions.iter_mut().find(|a| a.id == id) {
      Some(action) if action.status == ActionStatus::Failed => {
        action.status = ActionStatus::Pending;
        action.error = None;
        true
      }
      _ => false,
    }
  }

  /// Remove an action outright; true iff it was present.
  pub fn remove(&mut self, id: &str) -> bool {
    let before = self.actions.len();
    self.actions.retain(|a| a.id != id);
    self.actions.len() != before
  }

  pub fn clear(&mut self) {
    self.actions.clear();
  }

  pub fn clear_completed(&mut self) {
    self.actions.retain(|a| a.status != ActionStatus::Completed);
  }

  pub fn clear_failed(&mut self) {
    self.actions.retain(|a| a.status != ActionStatus::Failed);
  }

  pub fn get_by_id(&self, id: &str) -> Option<&QueuedAction> {
    self.actions.iter().find(|a| a.id == id)
  }

  /// The queue in insertion order.
  pub fn actions(&self) -> &[QueuedAction] {
    &self.actions
  }

  pub fn pending_count(&self) -> usize {
    self
      .actions
      .iter()
      .filter(|a| a.status == ActionStatus::Pending)
      .count()
  }

  pub fn failed_count(&self) -> usize {
    self
      .actions
      .iter()
      .filter(|a| a.status == ActionStatus::Failed)
      .count()
  }

  pub fn has_pending(&self) -> bool {
    self
      .actions
      .iter()
      .any(|a| a.status == ActionStatus::Pending)
  }
}

/// Display ordering for queue screens: live work first, then failures
/// awaiting a manual retry, then history; creation time breaks ties
/// within a status. Never used for processing, which walks insertion
/// order.
pub fn sort_by_priority(queue: &[QueuedAction]) -> Vec<QueuedAction> {
  let mut sorted = queue.to_vec();
  sorted.sort_by_key(|a| (a.status.priority(), a.created_at));
  sorted
}
