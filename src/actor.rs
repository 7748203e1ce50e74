// src/actor.rs

//! The user-facing actor trait and the cell that binds an actor to its
//! mailbox and scheduler stream.

use crate::message::{EventKey, Payload};
use crate::runtime::pump::Runnable;
use crate::runtime::{AtomicSender, Mailbox};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Stage-local identifier of a registered actor.
pub type ActorId = usize;

/// A unit of behaviour driven by the stage's pumps.
///
/// `on_message` is never called concurrently for one actor, but successive
/// calls may run on different pump threads.
pub trait Actor<E, M>: Send + 'static {
  fn on_message(&mut self, ctx: &ActorContext<'_, E, M>, event: E, msg: M);

  /// Called once from `Stage::register`, before any message is delivered.
  fn on_start(&mut self, _ctx: &ActorContext<'_, E, M>) {}

  /// Called once when the actor is closed or the stage shuts down.
  fn on_stop(&mut self, _ctx: &ActorContext<'_, E, M>) {}
}

/// What an actor can see of itself while handling a message.
pub struct ActorContext<'a, E, M> {
  actor_id: ActorId,
  name: &'a str,
  sender: &'a AtomicSender<E, M>,
}

impl<'a, E, M> ActorContext<'a, E, M> {
  pub fn actor_id(&self) -> ActorId {
    self.actor_id
  }

  pub fn name(&self) -> &'a str {
    self.name
  }

  /// The actor's own sender. Everything an actor sends through it reaches
  /// common destinations in the order it was sent.
  pub fn sender(&self) -> &'a AtomicSender<E, M> {
    self.sender
  }
}

impl<E, M> fmt::Debug for ActorContext<'_, E, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActorContext")
      .field("actor_id", &self.actor_id)
      .field("name", &self.name)
      .finish()
  }
}

/// Scheduler user object for one actor.
pub(crate) struct ActorCell<E, M> {
  id: ActorId,
  name: String,
  mailbox: Arc<Mailbox<E, M>>,
  actor: Mutex<Box<dyn Actor<E, M>>>,
  sender: AtomicSender<E, M>,
}

impl<E: EventKey, M: Payload> ActorCell<E, M> {
  pub fn new(
    id: ActorId,
    name: String,
    mailbox: Arc<Mailbox<E, M>>,
    actor: Box<dyn Actor<E, M>>,
    sender: AtomicSender<E, M>,
  ) -> Self {
    Self {
      id,
      name,
      mailbox,
      actor: Mutex::new(actor),
      sender,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn mailbox(&self) -> &Arc<Mailbox<E, M>> {
    &self.mailbox
  }

  fn context(&self) -> ActorContext<'_, E, M> {
    ActorContext {
      actor_id: self.id,
      name: &self.name,
      sender: &self.sender,
    }
  }

  pub fn start(&self) {
    let ctx = self.context();
    self.actor.lock().on_start(&ctx);
  }

  pub fn stop(&self) {
    let ctx = self.context();
    self.actor.lock().on_stop(&ctx);
  }

  /// Like `stop`, but gives up if the actor is still busy on a pump after
  /// `wait`. Returns whether `on_stop` ran.
  pub fn try_stop(&self, wait: Duration) -> bool {
    let Some(mut actor) = self.actor.try_lock_for(wait) else {
      return false;
    };
    let ctx = self.context();
    actor.on_stop(&ctx);
    true
  }
}

impl<E: EventKey, M: Payload> Runnable for ActorCell<E, M> {
  fn id(&self) -> usize {
    self.id
  }

  fn run_once(&self) {
    // One wake-up per committed entry; overflow may have evicted it since.
    let Some(entry) = self.mailbox.poll_oldest() else {
      tracing::trace!(actor_id = self.id, "Woken with an empty mailbox");
      return;
    };
    let (event, msg) = entry.into_parts();
    let ctx = self.context();
    self.actor.lock().on_message(&ctx, event, msg);
  }
}

impl<E, M> fmt::Debug for ActorCell<E, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActorCell")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("mailbox", &self.mailbox)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::SubscriptionTable;

  struct Recorder {
    seen: Arc<Mutex<Vec<(&'static str, u32)>>>,
    started: Arc<Mutex<bool>>,
  }

  impl Actor<&'static str, u32> for Recorder {
    fn on_message(&mut self, ctx: &ActorContext<'_, &'static str, u32>, event: &'static str, msg: u32) {
      assert_eq!(ctx.name(), "recorder");
      self.seen.lock().push((event, msg));
    }

    fn on_start(&mut self, ctx: &ActorContext<'_, &'static str, u32>) {
      assert_eq!(ctx.actor_id(), 7);
      *self.started.lock() = true;
    }
  }

  fn cell() -> (ActorCell<&'static str, u32>, Arc<Mutex<Vec<(&'static str, u32)>>>, Arc<Mutex<bool>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(Mutex::new(false));
    let table: Arc<SubscriptionTable<&'static str, u32>> = Arc::new(SubscriptionTable::new());
    let cell = ActorCell::new(
      7,
      "recorder".to_string(),
      Arc::new(Mailbox::new(4)),
      Box::new(Recorder {
        seen: seen.clone(),
        started: started.clone(),
      }),
      AtomicSender::new(table),
    );
    (cell, seen, started)
  }

  #[test]
  fn run_once_dispatches_oldest_entry() {
    let (cell, seen, started) = cell();
    cell.start();
    assert!(*started.lock());
    for (ev, n) in [("a", 1), ("b", 2)] {
      let token = cell.mailbox().lock();
      assert!(cell.mailbox().commit(token, ev, n));
    }
    cell.run_once();
    assert_eq!(*seen.lock(), vec![("a", 1)]);
    cell.run_once();
    assert_eq!(*seen.lock(), vec![("a", 1), ("b", 2)]);
  }

  #[test]
  fn run_once_on_empty_mailbox_is_a_no_op() {
    let (cell, seen, _) = cell();
    cell.run_once();
    assert!(seen.lock().is_empty());
  }
}
