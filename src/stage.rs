// src/stage.rs

//! The stage: a single-process host that owns the subscription table, the
//! scheduler and the pump pool, and registers actors against them.

use crate::actor::{Actor, ActorCell, ActorId};
use crate::config::{ActorOptions, StageConfig};
use crate::error::ActorError;
use crate::message::{EventId, EventKey, Msg, Payload};
use crate::runtime::pump::Runnable;
use crate::runtime::{
  AtomicSender, EventBus, FairScheduler, Mailbox, MailboxBuilder, PumpPool, StreamHandle, SubscriptionTable, SystemEvent,
  WeakStreamHandle,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

/// How long `shutdown` waits for a busy actor before skipping its `on_stop`
/// when the pumps failed to stop in time.
const STOP_HOOK_GRACE: Duration = Duration::from_millis(50);

/// State shared by every handle to one stage.
struct StageInner<E: EventKey, M: Payload> {
  config: StageConfig,
  next_handle: AtomicUsize,
  scheduler: FairScheduler<ActorCell<E, M>>,
  subscriptions: Arc<SubscriptionTable<E, M>>,
  actors: RwLock<HashMap<ActorId, StreamHandle<ActorCell<E, M>>>>,
  event_bus: EventBus,
  pumps: Mutex<Option<PumpPool>>,
  shutdown_initiated: AtomicBool,
}

impl<E: EventKey, M: Payload> StageInner<E, M> {
  fn next_handle(&self) -> ActorId {
    self.next_handle.fetch_add(1, Ordering::Relaxed)
  }

  fn stream(&self, actor_id: ActorId) -> Result<StreamHandle<ActorCell<E, M>>, ActorError> {
    self
      .actors
      .read()
      .get(&actor_id)
      .cloned()
      .ok_or(ActorError::UnknownActor(actor_id))
  }

  /// Detaches one actor: no further deliveries, queued entries discarded,
  /// `on_stop` called. Returns the number of discarded entries.
  fn close_stream(&self, stream: &StreamHandle<ActorCell<E, M>>, stop_hook_wait: Option<Duration>) -> usize {
    let cell = stream.user();
    let mailbox = cell.mailbox();
    let routes = self.subscriptions.unsubscribe_all(mailbox.id());
    let discarded = mailbox.close();
    match stop_hook_wait {
      None => cell.stop(),
      Some(wait) => {
        if !cell.try_stop(wait) {
          tracing::warn!(actor_id = cell.id(), "Actor still busy; skipping on_stop");
        }
      }
    }
    let actor_id = cell.id();
    tracing::debug!(actor_id, name = cell.name(), routes, discarded, "Actor closed");
    self.event_bus.publish(SystemEvent::ActorClosed { actor_id, discarded });
    discarded
  }

  fn shutdown(&self) -> Result<(), ActorError> {
    if self
      .shutdown_initiated
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!("Stage shutdown already initiated");
      return Ok(());
    }
    tracing::info!("Stage shutdown initiated");
    self.event_bus.publish(SystemEvent::StageTerminating);

    let pool = self.pumps.lock().take();
    let pumps_stopped = match pool {
      Some(pool) => pool.stop(&self.scheduler, self.config.termination_timeout),
      None => true,
    };

    // Queued streams hold their cells; release them before closing.
    let drained = self.scheduler.drain_ready();
    if drained > 0 {
      tracing::debug!(drained, "Dropped scheduled work on shutdown");
    }

    let streams: Vec<_> = self.actors.write().drain().map(|(_, stream)| stream).collect();
    let stop_hook_wait = if pumps_stopped { None } else { Some(STOP_HOOK_GRACE) };
    for stream in &streams {
      self.close_stream(stream, stop_hook_wait);
    }

    if pumps_stopped {
      tracing::info!(actors = streams.len(), "Stage terminated");
      Ok(())
    } else {
      tracing::warn!(timeout = ?self.config.termination_timeout, "Stage terminated with pumps still running");
      Err(ActorError::Timeout)
    }
  }
}

impl<E: EventKey, M: Payload> Drop for StageInner<E, M> {
  fn drop(&mut self) {
    if let Err(e) = self.shutdown() {
      tracing::warn!(error = %e, "Stage shutdown on drop did not complete cleanly");
    }
  }
}

/// A handle to a stage. Cloning shares the same stage; the stage shuts down
/// when `shutdown` is called or the last handle is dropped.
pub struct Stage<E: EventKey = EventId, M: Payload = Msg> {
  inner: Arc<StageInner<E, M>>,
}

impl<E: EventKey, M: Payload> Stage<E, M> {
  /// Creates a stopped stage. Call [`start`](Self::start) to launch pumps.
  pub fn new(config: StageConfig) -> Result<Self, ActorError> {
    config.validate()?;
    tracing::debug!(?config, "Creating stage");
    let event_bus = EventBus::with_capacity(config.event_bus_capacity);
    Ok(Self {
      inner: Arc::new(StageInner {
        config,
        next_handle: AtomicUsize::new(1),
        scheduler: FairScheduler::new(),
        subscriptions: Arc::new(SubscriptionTable::new()),
        actors: RwLock::new(HashMap::new()),
        event_bus,
        pumps: Mutex::new(None),
        shutdown_initiated: AtomicBool::new(false),
      }),
    })
  }

  pub fn config(&self) -> &StageConfig {
    &self.inner.config
  }

  /// Registers an actor with no subscriptions. Its `on_start` hook runs
  /// before this returns.
  pub fn register(
    &self,
    name: impl Into<String>,
    actor: impl Actor<E, M>,
    options: ActorOptions,
  ) -> Result<ActorId, ActorError> {
    if self.inner.shutdown_initiated.load(Ordering::Acquire) {
      return Err(ActorError::InvalidState("stage is shut down"));
    }
    let config = &self.inner.config;
    let capacity = options.resolve_capacity(config);
    if capacity == 0 {
      return Err(ActorError::invalid_argument("mailbox capacity must be at least 1"));
    }
    let name = name.into();
    let actor_id = self.inner.next_handle();

    // The mailbox wakes the actor's stream on every commit. The stream owns
    // the mailbox, so the callback only holds a weak reference back.
    let stream_slot: Arc<OnceLock<WeakStreamHandle<ActorCell<E, M>>>> = Arc::new(OnceLock::new());
    let wake = {
      let scheduler = self.inner.scheduler.clone();
      let stream_slot = stream_slot.clone();
      move || {
        if let Some(stream) = stream_slot.get().and_then(WeakStreamHandle::upgrade) {
          scheduler.add_task(&stream);
        }
      }
    };
    let mailbox: Arc<Mailbox<E, M>> = Arc::new(
      MailboxBuilder::new(capacity)
        .storage(options.resolve_storage(config))
        .overflow_policy(options.resolve_overflow(config))
        .on_new_entry(wake)
        .build(),
    );

    let cell = ActorCell::new(
      actor_id,
      name.clone(),
      mailbox,
      Box::new(actor),
      AtomicSender::new(self.inner.subscriptions.clone()),
    );
    let stream = self.inner.scheduler.new_stream(options.resolve_priority(config), cell);
    // Set exactly once, before the mailbox can be subscribed anywhere.
    let _ = stream_slot.set(stream.downgrade());

    stream.user().start();
    {
      // Shutdown raises the flag before draining under this lock, so an
      // actor inserted here is always seen by the drain.
      let mut actors = self.inner.actors.write();
      if self.inner.shutdown_initiated.load(Ordering::Acquire) {
        drop(actors);
        stream.user().mailbox().close();
        stream.user().stop();
        tracing::debug!(actor_id, name = %name, "Stage shut down during registration; actor stopped");
        return Err(ActorError::InvalidState("stage is shut down"));
      }
      actors.insert(actor_id, stream);
    }
    tracing::debug!(actor_id, name = %name, capacity, "Actor registered");
    self.inner.event_bus.publish(SystemEvent::ActorRegistered { actor_id, name });
    Ok(actor_id)
  }

  /// Routes `event` to the actor's mailbox. Returns `false` if it was
  /// already subscribed.
  pub fn subscribe(&self, actor_id: ActorId, event: E) -> Result<bool, ActorError> {
    let stream = self.inner.stream(actor_id)?;
    Ok(self.inner.subscriptions.subscribe(event, stream.user().mailbox().clone()))
  }

  /// Stops routing `event` to the actor. Returns whether it was subscribed.
  pub fn unsubscribe(&self, actor_id: ActorId, event: &E) -> Result<bool, ActorError> {
    let stream = self.inner.stream(actor_id)?;
    Ok(self.inner.subscriptions.unsubscribe(event, stream.user().mailbox().id()))
  }

  /// Removes an actor from the stage. Queued entries are discarded and the
  /// count returned; `on_stop` runs once any in-flight message completes.
  pub fn close(&self, actor_id: ActorId) -> Result<usize, ActorError> {
    let stream = self
      .inner
      .actors
      .write()
      .remove(&actor_id)
      .ok_or(ActorError::UnknownActor(actor_id))?;
    Ok(self.inner.close_stream(&stream, None))
  }

  /// A new sender over this stage's subscriptions, with its own ordering
  /// domain.
  pub fn sender(&self) -> AtomicSender<E, M> {
    AtomicSender::new(self.inner.subscriptions.clone())
  }

  /// The actor's mailbox, for diagnostics.
  pub fn mailbox(&self, actor_id: ActorId) -> Option<Arc<Mailbox<E, M>>> {
    self
      .inner
      .actors
      .read()
      .get(&actor_id)
      .map(|stream| stream.user().mailbox().clone())
  }

  pub fn actor_count(&self) -> usize {
    self.inner.actors.read().len()
  }

  pub fn subscriptions(&self) -> &Arc<SubscriptionTable<E, M>> {
    &self.inner.subscriptions
  }

  /// Launches the pump pool.
  pub fn start(&self) -> Result<(), ActorError> {
    // Checked under the pumps lock: shutdown raises the flag before taking
    // the pool out, so a pool installed here is always stopped by it.
    let mut pumps = self.inner.pumps.lock();
    if self.inner.shutdown_initiated.load(Ordering::Acquire) {
      return Err(ActorError::InvalidState("stage is shut down"));
    }
    if pumps.is_some() {
      return Err(ActorError::InvalidState("stage is already running"));
    }
    let config = &self.inner.config;
    let pool = PumpPool::start(&self.inner.scheduler, config.pump_count, config.poll_timeout, &self.inner.event_bus)?;
    tracing::info!(pumps = pool.len(), "Stage started");
    *pumps = Some(pool);
    Ok(())
  }

  pub fn is_running(&self) -> bool {
    self.inner.pumps.lock().is_some()
  }

  /// Stops the pumps and closes every actor. Idempotent: later calls return
  /// `Ok(())` at once. Fails with [`ActorError::Timeout`] if some pump was
  /// still busy after the termination timeout; actors are closed regardless.
  pub fn shutdown(&self) -> Result<(), ActorError> {
    self.inner.shutdown()
  }

  /// Subscribes to the stage's system events.
  pub fn monitor(&self) -> broadcast::Receiver<SystemEvent> {
    self.inner.event_bus.subscribe()
  }
}

impl<E: EventKey, M: Payload> Clone for Stage<E, M> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<E: EventKey, M: Payload> fmt::Debug for Stage<E, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stage")
      .field("actors", &self.actor_count())
      .field("running", &self.is_running())
      .field("shutdown", &self.inner.shutdown_initiated.load(Ordering::Relaxed))
      .finish()
  }
}
