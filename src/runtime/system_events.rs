// src/runtime/system_events.rs

/// Lifecycle events published on a stage's `EventBus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
  /// An actor was registered and its mailbox and stream created.
  ActorRegistered {
    actor_id: usize,
    name: String,
  },

  /// An actor was closed. `discarded` is the number of entries still pending
  /// in its mailbox, which were dropped.
  ActorClosed {
    actor_id: usize,
    discarded: usize,
  },

  /// An actor's message handler panicked. The message is lost; the actor
  /// stays registered and keeps receiving.
  ActorPanicked {
    actor_id: usize,
    reason: String,
  },

  /// A pump thread entered its loop.
  PumpStarted {
    pump_id: usize,
  },

  /// A pump thread left its loop.
  PumpStopped {
    pump_id: usize,
  },

  /// The stage is shutting down: pumps stop and every actor is closed.
  StageTerminating,
}
