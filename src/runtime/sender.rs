// src/runtime/sender.rs

//! Ordered, optionally atomic delivery of one message to every subscriber of
//! an event.

use crate::message::{EventKey, Payload};
use crate::runtime::deadline_after;
use crate::runtime::mailbox::{Mailbox, Token};
use crate::runtime::registry::SubscriptionRegistry;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

/// Delivers messages to all mailboxes subscribed to an event.
///
/// Every operation on one sender runs under that sender's ordering lock, so
/// two messages sent through the same instance reach every common
/// destination in the same relative order, whatever the delivery mode.
/// Separate instances make no ordering promise to each other; share one
/// instance (behind an `Arc`) to share an ordering domain.
pub struct AtomicSender<E, M> {
  id: u64,
  registry: Arc<dyn SubscriptionRegistry<E, M>>,
  order: Mutex<()>,
}

impl<E: EventKey, M: Payload> AtomicSender<E, M> {
  pub fn new(registry: Arc<dyn SubscriptionRegistry<E, M>>) -> Self {
    let id = NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(sender_id = id, "Created sender");
    Self {
      id,
      registry,
      order: Mutex::new(()),
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  /// Number of mailboxes the registry currently resolves `event` to.
  pub fn destination_count(&self, event: &E) -> usize {
    self.registry.destinations(event).len()
  }

  /// Best-effort delivery: every destination that can be locked without
  /// waiting receives the message, the others are skipped. Nothing is rolled
  /// back. Returns the number of destinations that received it.
  pub fn broadcast(&self, event: E, msg: M) -> usize {
    let _order = self.order.lock();
    let destinations = self.registry.destinations(&event);
    let tokens: Vec<Option<Token>> = destinations.iter().map(|mb| mb.lock()).collect();
    let delivered = commit_all(&destinations, tokens, &event, &msg);
    if delivered < destinations.len() {
      tracing::trace!(
        sender_id = self.id,
        event = ?event,
        delivered,
        destinations = destinations.len(),
        "Broadcast partially delivered"
      );
    }
    delivered
  }

  /// All-or-nothing delivery without waiting. If any destination cannot be
  /// locked immediately, every lock taken so far is released and `false` is
  /// returned with nothing delivered.
  pub fn send_async(&self, event: E, msg: M) -> bool {
    let _order = self.order.lock();
    let destinations = self.registry.destinations(&event);
    let Some(tokens) = self.lock_all(&destinations, &event, |mb, _| mb.lock()) else {
      return false;
    };
    commit_all(&destinations, tokens, &event, &msg);
    true
  }

  /// All-or-nothing delivery waiting at most `timeout` in total.
  ///
  /// Destinations are locked one after another; each attempt may wait for
  /// an even share of what is left of the budget (`remaining / locks_left`),
  /// so a slow first destination cannot starve the later ones and the whole
  /// call stays within `timeout`.
  ///
  /// Only a full mailbox is waited on. A destination whose token is held by
  /// another transaction (another sender mid-delivery, say) fails the call
  /// at once, without spending the budget.
  pub fn send_sync(&self, event: E, msg: M, timeout: Duration) -> bool {
    let deadline = deadline_after(timeout);
    // Waiting for the ordering lock spends the same budget.
    let Some(_order) = self.order.try_lock_until(deadline) else {
      tracing::trace!(sender_id = self.id, event = ?event, "send_sync timed out waiting for sender");
      return false;
    };
    let destinations = self.registry.destinations(&event);
    let total = destinations.len();
    let Some(tokens) = self.lock_all(&destinations, &event, |mb, index| {
      let remaining = deadline.saturating_duration_since(Instant::now());
      let share = remaining / (total - index) as u32;
      mb.lock_timeout(share)
    }) else {
      return false;
    };
    commit_all(&destinations, tokens, &event, &msg);
    true
  }

  /// Locks every destination in order with `attempt`, rolling back on the
  /// first failure.
  fn lock_all(
    &self,
    destinations: &[Arc<Mailbox<E, M>>],
    event: &E,
    mut attempt: impl FnMut(&Mailbox<E, M>, usize) -> Option<Token>,
  ) -> Option<Vec<Option<Token>>> {
    let mut tokens = Vec::with_capacity(destinations.len());
    for (index, mailbox) in destinations.iter().enumerate() {
      match attempt(mailbox, index) {
        Some(token) => tokens.push(Some(token)),
        None => {
          tracing::trace!(
            sender_id = self.id,
            event = ?event,
            mailbox_id = mailbox.id(),
            locked = index,
            "Atomic send failed to lock destination, rolling back"
          );
          for (held, token) in destinations.iter().zip(tokens) {
            held.unlock(token);
          }
          return None;
        }
      }
    }
    Some(tokens)
  }
}

/// Commits `msg` to each destination holding a token. Returns the number of
/// commits that landed.
fn commit_all<E: EventKey, M: Payload>(
  destinations: &[Arc<Mailbox<E, M>>],
  tokens: Vec<Option<Token>>,
  event: &E,
  msg: &M,
) -> usize {
  let mut delivered = 0;
  for (mailbox, token) in destinations.iter().zip(tokens) {
    if token.is_some() && mailbox.commit(token, event.clone(), msg.clone()) {
      delivered += 1;
    }
  }
  delivered
}

impl<E, M> fmt::Debug for AtomicSender<E, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AtomicSender").field("id", &self.id).finish_non_exhaustive()
  }
}
