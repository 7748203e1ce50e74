// src/runtime/mailbox/overflow.rs

//! Overflow policies: what a full mailbox does with an incoming entry.

use std::fmt;

/// Outcome of an overflow evaluation on a full mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowDecision {
  /// Evict the head (oldest entry), then admit the incoming one.
  DropOldest,
  /// Evict the tail (newest entry), then admit the incoming one.
  DropNewest,
  /// Reject the incoming entry; the queue is left untouched.
  DropIncoming,
  /// Clear the queue, then admit the incoming entry.
  DropPending,
  /// Clear the queue and reject the incoming entry as well.
  DropAll,
  /// No policy: plain backpressure. Non-blocking producers are rejected,
  /// bounded producers wait for a consumer to free a slot.
  #[default]
  Unspecified,
}

impl OverflowDecision {
  /// Whether the incoming entry gets a slot under this decision.
  pub fn admits_incoming(self) -> bool {
    matches!(
      self,
      OverflowDecision::DropOldest | OverflowDecision::DropNewest | OverflowDecision::DropPending
    )
  }
}

/// Decides what happens to an insertion into a full mailbox.
///
/// Evaluated under the mailbox lock, so implementations must be quick and
/// must not touch the mailbox. Only fullness is available; payloads are
/// never shown to a policy.
pub trait OverflowPolicy: Send + Sync + fmt::Debug {
  fn on_full(&self, size: usize, capacity: usize) -> OverflowDecision;
}

impl OverflowPolicy for OverflowDecision {
  fn on_full(&self, _size: usize, _capacity: usize) -> OverflowDecision {
    *self
  }
}

/// Delegate-defined policy backed by a closure.
pub struct FnOverflowPolicy<F> {
  decide: F,
}

impl<F> FnOverflowPolicy<F>
where
  F: Fn(usize, usize) -> OverflowDecision + Send + Sync,
{
  pub fn new(decide: F) -> Self {
    Self { decide }
  }
}

impl<F> OverflowPolicy for FnOverflowPolicy<F>
where
  F: Fn(usize, usize) -> OverflowDecision + Send + Sync,
{
  fn on_full(&self, size: usize, capacity: usize) -> OverflowDecision {
    (self.decide)(size, capacity)
  }
}

impl<F> fmt::Debug for FnOverflowPolicy<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnOverflowPolicy").finish_non_exhaustive()
  }
}
