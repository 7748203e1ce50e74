// src/runtime/event_bus.rs

use super::system_events::SystemEvent;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Default capacity for the bus.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Broadcasts stage lifecycle events to any number of monitors.
///
/// Backed by `tokio::sync::broadcast`, whose send and `try_recv`/`blocking_recv`
/// paths work from plain threads; no async runtime is needed.
#[derive(Debug, Clone)]
pub struct EventBus {
  sender: Sender<SystemEvent>,
}

impl EventBus {
  /// Creates a new EventBus with default capacity.
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_EVENT_BUS_CAPACITY)
  }

  /// Creates a new EventBus with specific capacity (at least 1).
  pub fn with_capacity(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    tracing::debug!(capacity = capacity.max(1), "Created new EventBus");
    Self { sender }
  }

  /// Publishes an event. Returns the number of monitors that will see it;
  /// publishing with nobody listening is normal and returns 0.
  pub fn publish(&self, event: SystemEvent) -> usize {
    tracing::trace!(event = ?event, "Publishing event");
    self.sender.send(event).unwrap_or(0)
  }

  /// Creates a new receiver. It sees every event published *after* this call;
  /// a receiver that lags more than the bus capacity misses the oldest events.
  pub fn subscribe(&self) -> Receiver<SystemEvent> {
    tracing::trace!("Creating new event bus subscription");
    self.sender.subscribe()
  }

  /// Returns the number of active subscribers.
  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}
