// src/config.rs

//! Stage-wide configuration and per-actor overrides.

use crate::error::ActorError;
use crate::runtime::event_bus::DEFAULT_EVENT_BUS_CAPACITY;
use crate::runtime::{OverflowDecision, OverflowPolicy, StorageKind, DEFAULT_MAILBOX_CAPACITY};

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Pump count used when the available parallelism cannot be queried.
pub const FALLBACK_PUMP_COUNT: usize = 4;

/// Validated settings for a [`Stage`](crate::Stage).
#[derive(Clone)]
pub struct StageConfig {
  /// Number of pump threads.
  pub pump_count: usize,
  /// How long an idle pump blocks in the scheduler before rechecking its
  /// stop flag.
  pub poll_timeout: Duration,
  /// Default mailbox capacity for actors that do not override it.
  pub mailbox_capacity: usize,
  /// Default overflow policy.
  pub overflow: Arc<dyn OverflowPolicy>,
  pub storage: StorageKind,
  /// Default scheduler priority. Lower runs first.
  pub default_priority: u32,
  /// Upper bound on how long `shutdown` waits for pumps to finish.
  pub termination_timeout: Duration,
  /// Slots in the system event channel; slow monitors lag beyond this.
  pub event_bus_capacity: usize,
}

impl Default for StageConfig {
  fn default() -> Self {
    let pump_count = thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(FALLBACK_PUMP_COUNT);
    Self {
      pump_count,
      poll_timeout: DEFAULT_POLL_TIMEOUT,
      mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
      overflow: Arc::new(OverflowDecision::Unspecified),
      storage: StorageKind::default(),
      default_priority: 0,
      termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
      event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
    }
  }
}

impl StageConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn pump_count(mut self, count: usize) -> Self {
    self.pump_count = count;
    self
  }

  pub fn poll_timeout(mut self, timeout: Duration) -> Self {
    self.poll_timeout = timeout;
    self
  }

  pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
    self.mailbox_capacity = capacity;
    self
  }

  pub fn overflow(mut self, policy: impl OverflowPolicy + 'static) -> Self {
    self.overflow = Arc::new(policy);
    self
  }

  pub fn storage(mut self, kind: StorageKind) -> Self {
    self.storage = kind;
    self
  }

  pub fn default_priority(mut self, priority: u32) -> Self {
    self.default_priority = priority;
    self
  }

  pub fn termination_timeout(mut self, timeout: Duration) -> Self {
    self.termination_timeout = timeout;
    self
  }

  pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
    self.event_bus_capacity = capacity;
    self
  }

  /// Rejects settings the stage cannot run with.
  pub fn validate(&self) -> Result<(), ActorError> {
    if self.pump_count == 0 {
      return Err(ActorError::invalid_argument("pump_count must be at least 1"));
    }
    if self.mailbox_capacity == 0 {
      return Err(ActorError::invalid_argument("mailbox_capacity must be at least 1"));
    }
    if self.poll_timeout.is_zero() {
      return Err(ActorError::invalid_argument("poll_timeout must be non-zero"));
    }
    if self.event_bus_capacity == 0 {
      return Err(ActorError::invalid_argument("event_bus_capacity must be at least 1"));
    }
    Ok(())
  }
}

impl fmt::Debug for StageConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StageConfig")
      .field("pump_count", &self.pump_count)
      .field("poll_timeout", &self.poll_timeout)
      .field("mailbox_capacity", &self.mailbox_capacity)
      .field("overflow", &self.overflow)
      .field("storage", &self.storage)
      .field("default_priority", &self.default_priority)
      .field("termination_timeout", &self.termination_timeout)
      .field("event_bus_capacity", &self.event_bus_capacity)
      .finish()
  }
}

/// Per-actor overrides of the stage defaults. Unset fields fall back to
/// [`StageConfig`].
#[derive(Clone, Default)]
pub struct ActorOptions {
  pub capacity: Option<usize>,
  pub overflow: Option<Arc<dyn OverflowPolicy>>,
  pub storage: Option<StorageKind>,
  pub priority: Option<u32>,
}

impl ActorOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = Some(capacity);
    self
  }

  pub fn overflow(mut self, policy: impl OverflowPolicy + 'static) -> Self {
    self.overflow = Some(Arc::new(policy));
    self
  }

  pub fn storage(mut self, kind: StorageKind) -> Self {
    self.storage = Some(kind);
    self
  }

  pub fn priority(mut self, priority: u32) -> Self {
    self.priority = Some(priority);
    self
  }

  pub(crate) fn resolve_capacity(&self, config: &StageConfig) -> usize {
    self.capacity.unwrap_or(config.mailbox_capacity)
  }

  pub(crate) fn resolve_overflow(&self, config: &StageConfig) -> Arc<dyn OverflowPolicy> {
    self.overflow.clone().unwrap_or_else(|| config.overflow.clone())
  }

  pub(crate) fn resolve_storage(&self, config: &StageConfig) -> StorageKind {
    self.storage.unwrap_or(config.storage)
  }

  pub(crate) fn resolve_priority(&self, config: &StageConfig) -> u32 {
    self.priority.unwrap_or(config.default_priority)
  }
}

impl fmt::Debug for ActorOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActorOptions")
      .field("capacity", &self.capacity)
      .field("overflow", &self.overflow)
      .field("storage", &self.storage)
      .field("priority", &self.priority)
      .finish()
  }
}
