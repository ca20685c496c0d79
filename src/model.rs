//! Domain types shared by the cache, queue, and optimistic layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a provider-side object.
///
/// Optimistic placeholders carry a `Pending` id until the provider confirms
/// the mutation. Every supported provider assigns positive ids, so the wire
/// encoding is a signed integer with negative values marking placeholders;
/// in code the two cases are a pattern match, not a sign check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteId {
  /// Locally allocated placeholder id; strictly negative.
  Pending(i64),
  /// Authoritative id assigned by the provider.
  Confirmed(u64),
}

impl RemoteId {
  pub fn is_pending(&self) -> bool {
    matches!(self, Self::Pending(_))
  }

  /// Signed form used on the wire and in cached payloads.
  pub fn as_i64(&self) -> i64 {
    match self {
      Self::Pending(id) => *id,
      Self::Confirmed(id) => *id as i64,
    }
  }
}

impl Serialize for RemoteId {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(self.as_i64())
  }
}

impl<'de> Deserialize<'de> for RemoteId {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    if raw < 0 {
      Ok(Self::Pending(raw))
    } else {
      Ok(Self::Confirmed(raw as u64))
    }
  }
}

/// Types addressable by provider id, for placeholder reconciliation.
pub trait Identified {
  fn remote_id(&self) -> RemoteId;
}

/// Comment or review author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
  pub login: String,
}

impl Author {
  /// Sentinel identity attached to optimistic placeholders until the
  /// provider reports the real author.
  pub fn pending() -> Self {
    Self {
      login: "pending".to_string(),
    }
  }
}

/// Which side of the diff an inline comment is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffSide {
  Left,
  Right,
}

/// Inline review comment anchored to a file location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
  pub id: RemoteId,
  pub body: String,
  pub path: Option<String>,
  pub line: Option<u64>,
  pub side: Option<DiffSide>,
  pub in_reply_to_id: Option<RemoteId>,
  pub user: Author,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Canonical provider URL; empty until the object exists server-side.
  pub html_url: String,
}

impl Identified for ReviewComment {
  fn remote_id(&self) -> RemoteId {
    self.id
  }
}

/// Top-level conversation comment on a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
  pub id: RemoteId,
  pub body: String,
  pub user: Author,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub html_url: String,
}

impl Identified for IssueComment {
  fn remote_id(&self) -> RemoteId {
    self.id
  }
}

/// The verdict a review submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
  Approve,
  RequestChanges,
  Comment,
}

/// The state a submitted review ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
  Approved,
  ChangesRequested,
  Commented,
}

impl From<ReviewEvent> for ReviewState {
  fn from(event: ReviewEvent) -> Self {
    match event {
      ReviewEvent::Approve => Self::Approved,
      ReviewEvent::RequestChanges => Self::ChangesRequested,
      ReviewEvent::Comment => Self::Commented,
    }
  }
}

/// A submitted pull request review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id: RemoteId,
  pub body: Option<String>,
  pub state: ReviewState,
  pub user: Author,
  pub submitted_at: DateTime<Utc>,
  pub html_url: String,
}

impl Identified for Review {
  fn remote_id(&self) -> RemoteId {
    self.id
  }
}

/// Reference to a comment from its thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadComment {
  pub database_id: RemoteId,
}

/// Thread of inline comments tracked for resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewThread {
  pub id: String,
  pub is_resolved: bool,
  pub comments: Vec<ThreadComment>,
}

/// Coordinates of a pull request on its hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRef {
  pub owner: String,
  pub repo: String,
  pub number: u64,
}
