// src/runtime/mod.rs

//! Core concurrency primitives: mailboxes, the atomic sender, the fair
//! scheduler and the pumps that drive it.

pub mod event_bus;
pub mod mailbox;
pub(crate) mod pump;
pub mod registry;
pub mod scheduler;
pub mod sender;
pub mod system_events;
pub(crate) mod waitgroup;

pub use mailbox::{
  Entry, FnOverflowPolicy, Mailbox, MailboxBuilder, OverflowDecision, OverflowPolicy, StorageKind, Token,
  DEFAULT_MAILBOX_CAPACITY,
};
pub use registry::{SubscriptionRegistry, SubscriptionTable};
pub use scheduler::{FairScheduler, StreamHandle, StreamPhase, WeakStreamHandle};
pub use sender::AtomicSender;

// System Coordination
pub use event_bus::EventBus;
pub use system_events::SystemEvent;

// Pumps
pub(crate) use pump::PumpPool;

use std::time::{Duration, Instant};

/// Absolute deadline for a relative timeout. Timeouts too large to represent
/// are clamped to roughly a century, which every caller treats as "forever".
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
  let now = Instant::now();
  now
    .checked_add(timeout)
    .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 60 * 60))
}
