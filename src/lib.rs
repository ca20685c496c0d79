//! Offline-resilience core for a terminal pull request review client.
//!
//! Provider APIs are slow, rate-limited, and sometimes unreachable; the
//! UI must stay responsive and never block on them. Three subsystems
//! cover that together:
//!
//! - [`cache`] — a generic TTL cache with oldest-first eviction, running
//!   stats, and a background sweep, plus a persistence bridge that
//!   carries query state across sessions.
//! - [`queue`] — a durable queue of user mutations (approve, comment,
//!   merge, ...) with bounded retry, driven by an executor the transport
//!   layer supplies.
//! - [`optimistic`] — pure helpers that fabricate placeholder comments
//!   and reviews the instant the user acts, so screens redraw ahead of
//!   the network, and splice them back out once the provider answers.
//!
//! The mutation flow ties them together: queue the action, apply the
//! optimistic update, reconcile when the action settles. Screens,
//! keybindings, and per-provider request shaping live in the host
//! application.

pub mod cache;
pub mod config;
pub mod model;
pub mod optimistic;
pub mod queue;
