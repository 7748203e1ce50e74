// src/runtime/registry.rs

//! Event-id → subscriber mailbox lookup used by the sender.

use crate::message::{EventKey, Payload};
use crate::runtime::mailbox::Mailbox;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Resolves the mailboxes currently subscribed to an event.
///
/// Called synchronously on every send attempt. The returned list is a
/// snapshot: later subscription changes must not affect it.
pub trait SubscriptionRegistry<E, M>: Send + Sync {
  fn destinations(&self, event: &E) -> Vec<Arc<Mailbox<E, M>>>;
}

/// Default in-memory registry.
///
/// Subscribers of one event are kept in subscription order, so snapshots are
/// deterministic and senders lock destinations in a stable order.
pub struct SubscriptionTable<E, M> {
  routes: RwLock<BTreeMap<E, Vec<Arc<Mailbox<E, M>>>>>,
}

impl<E: EventKey, M: Payload> SubscriptionTable<E, M> {
  pub fn new() -> Self {
    Self {
      routes: RwLock::new(BTreeMap::new()),
    }
  }

  /// Adds `mailbox` as a subscriber of `event`. Returns `false` if it was
  /// already subscribed.
  pub fn subscribe(&self, event: E, mailbox: Arc<Mailbox<E, M>>) -> bool {
    let mut routes = self.routes.write();
    let subscribers = routes.entry(event.clone()).or_default();
    if subscribers.iter().any(|mb| mb.id() == mailbox.id()) {
      return false;
    }
    tracing::trace!(event = ?event, mailbox_id = mailbox.id(), "Subscribed mailbox");
    subscribers.push(mailbox);
    true
  }

  /// Removes one mailbox from one event. Returns whether it was subscribed.
  pub fn unsubscribe(&self, event: &E, mailbox_id: u64) -> bool {
    let mut routes = self.routes.write();
    let Some(subscribers) = routes.get_mut(event) else {
      return false;
    };
    let before = subscribers.len();
    subscribers.retain(|mb| mb.id() != mailbox_id);
    let removed = subscribers.len() != before;
    if subscribers.is_empty() {
      routes.remove(event);
    }
    if removed {
      tracing::trace!(event = ?event, mailbox_id, "Unsubscribed mailbox");
    }
    removed
  }

  /// Removes a mailbox from every event. Returns the number of routes dropped.
  pub fn unsubscribe_all(&self, mailbox_id: u64) -> usize {
    let mut routes = self.routes.write();
    let mut removed = 0;
    routes.retain(|_, subscribers| {
      let before = subscribers.len();
      subscribers.retain(|mb| mb.id() != mailbox_id);
      removed += before - subscribers.len();
      !subscribers.is_empty()
    });
    removed
  }

  pub fn subscriber_count(&self, event: &E) -> usize {
    self.routes.read().get(event).map_or(0, Vec::len)
  }

  /// Events with at least one subscriber, in key order.
  pub fn events(&self) -> Vec<E> {
    self.routes.read().keys().cloned().collect()
  }
}

impl<E: EventKey, M: Payload> Default for SubscriptionTable<E, M> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E: EventKey, M: Payload> SubscriptionRegistry<E, M> for SubscriptionTable<E, M> {
  fn destinations(&self, event: &E) -> Vec<Arc<Mailbox<E, M>>> {
    self.routes.read().get(event).cloned().unwrap_or_default()
  }
}
