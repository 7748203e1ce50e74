// src/runtime/pump.rs

//! Pumps: the OS threads that drain the fair scheduler.
//!
//! Each pump loops on `poll_task` → `run_once` → `release`. The scheduler
//! hands a stream to one pump at a time, so `run_once` never runs
//! concurrently for the same stream.

use crate::error::ActorError;
use crate::runtime::event_bus::EventBus;
use crate::runtime::scheduler::FairScheduler;
use crate::runtime::system_events::SystemEvent;
use crate::runtime::waitgroup::WaitGroup;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work item a pump runs for each stream it is handed.
pub(crate) trait Runnable: Send + Sync + 'static {
  /// Identifier used in logs and panic events.
  fn id(&self) -> usize;

  /// Performs one unit of work.
  fn run_once(&self);
}

/// Marks a pump as finished even if its loop unwinds.
struct PumpExitGuard {
  pump_id: usize,
  event_bus: EventBus,
  wait_group: WaitGroup,
}

impl Drop for PumpExitGuard {
  fn drop(&mut self) {
    if thread::panicking() {
      tracing::error!(pump_id = self.pump_id, "Pump exiting abnormally");
    } else {
      tracing::debug!(pump_id = self.pump_id, "Pump stopped");
    }
    self.event_bus.publish(SystemEvent::PumpStopped { pump_id: self.pump_id });
    self.wait_group.done();
  }
}

/// A fixed set of pump threads sharing one scheduler.
pub(crate) struct PumpPool {
  stop: Arc<AtomicBool>,
  threads: Vec<JoinHandle<()>>,
  wait_group: WaitGroup,
}

impl PumpPool {
  /// Spawns `count` pumps. If a spawn fails, the pumps already running are
  /// stopped again before the error is returned.
  pub fn start<T: Runnable>(
    scheduler: &FairScheduler<T>,
    count: usize,
    poll_timeout: Duration,
    event_bus: &EventBus,
  ) -> Result<Self, ActorError> {
    let mut pool = PumpPool {
      stop: Arc::new(AtomicBool::new(false)),
      threads: Vec::with_capacity(count),
      wait_group: WaitGroup::new(),
    };
    for pump_id in 0..count {
      let worker_scheduler = scheduler.clone();
      let stop = pool.stop.clone();
      let event_bus = event_bus.clone();
      let wait_group = pool.wait_group.clone();
      pool.wait_group.add(1);
      let spawned = thread::Builder::new()
        .name(format!("rzactor-pump-{}", pump_id))
        .spawn(move || {
          let guard = PumpExitGuard {
            pump_id,
            event_bus,
            wait_group,
          };
          pump_loop(&guard, &worker_scheduler, &stop, poll_timeout);
        });
      match spawned {
        Ok(handle) => pool.threads.push(handle),
        Err(e) => {
          tracing::error!(pump_id, error = %e, "Failed to spawn pump thread");
          // The closure never ran, so its guard never registered completion.
          pool.wait_group.done();
          pool.stop(scheduler, poll_timeout * 2);
          return Err(ActorError::Io(e));
        }
      }
    }
    tracing::debug!(pumps = count, ?poll_timeout, "Pump pool started");
    Ok(pool)
  }

  pub fn len(&self) -> usize {
    self.threads.len()
  }

  /// Signals every pump to stop, wakes those blocked in `poll_task` and waits
  /// up to `timeout` for them to leave their loops. Returns `false` if some
  /// pump is still busy when the timeout expires; those threads are detached.
  pub fn stop<T>(self, scheduler: &FairScheduler<T>, timeout: Duration) -> bool {
    self.stop.store(true, Ordering::Release);
    scheduler.interrupt();
    let finished = self.wait_group.wait_timeout(timeout);
    if finished {
      for handle in self.threads {
        if handle.join().is_err() {
          tracing::error!("Pump thread terminated by panic");
        }
      }
      tracing::debug!("Pump pool stopped");
    } else {
      tracing::error!(
        still_running = self.wait_group.get_count(),
        ?timeout,
        "Pump pool did not stop in time; detaching remaining pumps"
      );
    }
    finished
  }
}

fn pump_loop<T: Runnable>(guard: &PumpExitGuard, scheduler: &FairScheduler<T>, stop: &AtomicBool, poll_timeout: Duration) {
  let pump_id = guard.pump_id;
  tracing::debug!(pump_id, "Pump started");
  guard.event_bus.publish(SystemEvent::PumpStarted { pump_id });

  while !stop.load(Ordering::Acquire) {
    let Some(stream) = scheduler.poll_task(poll_timeout) else {
      continue;
    };
    let task = stream.user();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run_once())) {
      let reason = panic_reason(payload.as_ref());
      tracing::error!(pump_id, actor_id = task.id(), %reason, "Actor panicked while handling a message");
      guard.event_bus.publish(SystemEvent::ActorPanicked {
        actor_id: task.id(),
        reason,
      });
    }
    // Always released: a stream that is never released is never scheduled again.
    scheduler.release(&stream);
  }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
