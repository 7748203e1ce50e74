// src/runtime/waitgroup.rs

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::runtime::deadline_after;

/// A blocking WaitGroup, similar to Go's `sync.WaitGroup`.
///
/// Pump threads register themselves (`add`) before they start and signal
/// completion (`done`) on exit; the stage waits (`wait_timeout`) until the
/// counter returns to zero.
#[derive(Debug, Clone)]
pub(crate) struct WaitGroup {
  inner: Arc<WaitGroupInner>,
}

#[derive(Debug)]
struct WaitGroupInner {
  count: Mutex<usize>,
  zero: Condvar,
}

impl WaitGroup {
  /// Creates a new WaitGroup with an initial count of zero.
  pub fn new() -> Self {
    Self {
      inner: Arc::new(WaitGroupInner {
        count: Mutex::new(0),
        zero: Condvar::new(),
      }),
    }
  }

  /// Adds a delta to the WaitGroup counter.
  pub fn add(&self, delta: usize) {
    if delta == 0 {
      return;
    }
    let mut count = self.inner.count.lock();
    if *count == 0 {
      tracing::trace!(delta, "WaitGroup count increased from zero");
    }
    *count += delta;
  }

  /// Decrements the counter by one, waking waiters when it reaches zero.
  ///
  /// Panics if the counter would drop below zero.
  pub fn done(&self) {
    let mut count = self.inner.count.lock();
    if *count == 0 {
      panic!("WaitGroup::done() called when count was already zero!");
    }
    *count -= 1;
    if *count == 0 {
      self.inner.zero.notify_all();
      tracing::trace!("WaitGroup count reached zero, notifying waiters");
    }
  }

  /// Blocks until the counter is zero or `timeout` elapses. Returns whether
  /// the counter reached zero.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let deadline = deadline_after(timeout);
    let mut count = self.inner.count.lock();
    while *count != 0 {
      if self.inner.zero.wait_until(&mut count, deadline).timed_out() {
        return *count == 0;
      }
    }
    true
  }

  /// Returns the current count. Primarily for debugging/testing.
  pub fn get_count(&self) -> usize {
    *self.inner.count.lock()
  }
}
