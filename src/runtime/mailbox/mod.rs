// src/runtime/mailbox/mod.rs

//! Bounded per-actor mailbox with a two-phase (`lock` / `commit` | `unlock`)
//! insertion protocol.
//!
//! Producers first reserve a slot with [`Mailbox::lock`], which hands out the
//! mailbox's single transaction [`Token`]. The reservation is then either
//! published with [`Mailbox::commit`] or abandoned with [`Mailbox::unlock`].
//! Only one transaction can be open per mailbox at a time; this is what lets
//! the sender lock several mailboxes and then commit to all or none of them.
//!
//! The consumer side (`poll_oldest` / `poll_newest`) is only ever driven by the
//! pump currently running the owning actor.

mod overflow;
mod storage;
mod token;

pub use overflow::{FnOverflowPolicy, OverflowDecision, OverflowPolicy};
pub use storage::{LinkedStorage, MailboxStorage, RingStorage, StorageKind};
pub use token::Token;

use crate::runtime::deadline_after;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Default capacity for mailboxes created without an explicit capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Callback fired after every successful commit. Wired to the scheduler.
pub type NewEntryCallback = Arc<dyn Fn() + Send + Sync>;

/// One queued (event, message) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<E, M> {
  pub event: E,
  pub msg: M,
}

impl<E, M> Entry<E, M> {
  pub fn into_parts(self) -> (E, M) {
    (self.event, self.msg)
  }
}

/// The open transaction. `evict` is the overflow decision to apply when the
/// reservation is committed into a still-full queue.
#[derive(Debug)]
struct Transaction {
  generation: u64,
  evict: Option<OverflowDecision>,
}

struct MailboxState<E, M> {
  storage: Box<dyn MailboxStorage<Entry<E, M>>>,
  txn: Option<Transaction>,
  next_generation: u64,
  closed: bool,
}

/// Result of one admission attempt under the state lock.
enum Admission {
  Granted(Token),
  Rejected,
  /// Full with no policy: a bounded `lock` may wait for a consumer.
  Backpressure,
}

/// Bounded FIFO of pending entries for one actor.
pub struct Mailbox<E, M> {
  id: u64,
  capacity: usize,
  state: Mutex<MailboxState<E, M>>,
  space_available: Condvar,
  policy: Arc<dyn OverflowPolicy>,
  on_new_entry: Option<NewEntryCallback>,
}

impl<E: Send + 'static, M: Send + 'static> Mailbox<E, M> {
  /// Creates a mailbox with ring storage, no overflow policy and no callback.
  pub fn new(capacity: usize) -> Self {
    MailboxBuilder::new(capacity).build()
  }
}

impl<E, M> Mailbox<E, M> {
  /// Process-unique id of this mailbox; also stamped into every token it issues.
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of committed entries. An open transaction is not counted.
  pub fn size(&self) -> usize {
    self.state.lock().storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.size() == 0
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Whether a transaction token is currently outstanding.
  pub fn has_transaction(&self) -> bool {
    self.state.lock().txn.is_some()
  }

  /// Attempts to reserve one slot without blocking.
  ///
  /// Returns `None` when the mailbox is full and the overflow policy rejects
  /// the insertion, when another transaction holds the token (including one
  /// held by the calling thread: transactions do not nest), or when the
  /// mailbox has been closed.
  pub fn lock(&self) -> Option<Token> {
    let mut state = self.state.lock();
    match self.admit(&mut state) {
      Admission::Granted(token) => Some(token),
      Admission::Rejected | Admission::Backpressure => None,
    }
  }

  /// Like [`lock`](Self::lock), but waits up to `timeout` for a consumer to
  /// free a slot when the mailbox applies plain backpressure.
  ///
  /// A held token is never waited on: if another transaction is open the
  /// call fails at once without consuming the timeout.
  pub fn lock_timeout(&self, timeout: Duration) -> Option<Token> {
    let deadline = deadline_after(timeout);
    let mut state = self.state.lock();
    loop {
      match self.admit(&mut state) {
        Admission::Granted(token) => return Some(token),
        Admission::Rejected => return None,
        Admission::Backpressure => {
          if self.space_available.wait_until(&mut state, deadline).timed_out() {
            return match self.admit(&mut state) {
              Admission::Granted(token) => Some(token),
              _ => {
                tracing::trace!(mailbox_id = self.id, ?timeout, "Mailbox lock timed out");
                None
              }
            };
          }
        }
      }
    }
  }

  /// Publishes the reserved slot as `(event, msg)` at the tail and fires the
  /// new-entry callback.
  ///
  /// `None` is a no-op returning `false`: it stands for a lock attempt that
  /// already failed. Returns `false` as well if the mailbox was closed while
  /// the transaction was open (the message is discarded).
  ///
  /// # Panics
  /// If `token` was not issued by this mailbox for the open transaction.
  pub fn commit(&self, token: Option<Token>, event: E, msg: M) -> bool {
    let Some(token) = token else {
      return false;
    };
    {
      let mut state = self.state.lock();
      let txn = self.take_transaction(&mut state, &token, "commit");
      if state.closed {
        tracing::trace!(mailbox_id = self.id, "Commit into closed mailbox discarded");
        return false;
      }
      if state.storage.len() >= self.capacity {
        self.evict_for_commit(&mut state, txn.evict);
      }
      state.storage.push_back(Entry { event, msg });
      tracing::trace!(
        mailbox_id = self.id,
        generation = token.generation(),
        size = state.storage.len(),
        "Mailbox commit"
      );
    }
    // Outside the state lock: the callback takes scheduler locks.
    if let Some(callback) = &self.on_new_entry {
      callback();
    }
    true
  }

  /// Abandons the open transaction without publishing anything. `None` is a
  /// no-op.
  ///
  /// # Panics
  /// If `token` was not issued by this mailbox for the open transaction.
  pub fn unlock(&self, token: Option<Token>) {
    let Some(token) = token else {
      return;
    };
    let mut state = self.state.lock();
    self.take_transaction(&mut state, &token, "unlock");
    tracing::trace!(mailbox_id = self.id, generation = token.generation(), "Mailbox unlock");
    // The reserved slot is free again.
    self.space_available.notify_all();
  }

  /// Removes and returns the oldest entry.
  pub fn poll_oldest(&self) -> Option<Entry<E, M>> {
    let mut state = self.state.lock();
    let entry = state.storage.pop_front();
    if entry.is_some() {
      self.space_available.notify_all();
    }
    entry
  }

  /// Removes and returns the newest entry.
  pub fn poll_newest(&self) -> Option<Entry<E, M>> {
    let mut state = self.state.lock();
    let entry = state.storage.pop_back();
    if entry.is_some() {
      self.space_available.notify_all();
    }
    entry
  }

  /// Visits every queued entry, oldest first, while holding the mailbox lock.
  /// The visitor must not call back into this mailbox.
  pub fn for_each(&self, mut visitor: impl FnMut(&E, &M)) {
    let state = self.state.lock();
    state.storage.for_each(&mut |entry| visitor(&entry.event, &entry.msg));
  }

  /// Discards everything pending and rejects all future `lock` calls.
  /// Returns the number of discarded entries.
  pub fn close(&self) -> usize {
    let mut state = self.state.lock();
    if state.closed {
      return 0;
    }
    state.closed = true;
    let discarded = state.storage.clear();
    self.space_available.notify_all();
    tracing::debug!(mailbox_id = self.id, discarded, "Mailbox closed");
    discarded
  }

  fn admit(&self, state: &mut MailboxState<E, M>) -> Admission {
    if state.closed || state.txn.is_some() || self.capacity == 0 {
      return Admission::Rejected;
    }
    let size = state.storage.len();
    let evict = if size < self.capacity {
      None
    } else {
      let decision = self.policy.on_full(size, self.capacity);
      match decision {
        decision if decision.admits_incoming() => Some(decision),
        OverflowDecision::DropIncoming => {
          tracing::trace!(mailbox_id = self.id, size, "Mailbox full, dropping incoming");
          return Admission::Rejected;
        }
        OverflowDecision::DropAll => {
          let dropped = state.storage.clear();
          self.space_available.notify_all();
          tracing::debug!(mailbox_id = self.id, dropped, "Mailbox full, dropped all pending and incoming");
          return Admission::Rejected;
        }
        // Unspecified: the caller waits for space.
        _ => return Admission::Backpressure,
      }
    };
    let generation = state.next_generation;
    state.next_generation += 1;
    state.txn = Some(Transaction { generation, evict });
    Admission::Granted(Token::new(self.id, generation))
  }

  fn take_transaction(&self, state: &mut MailboxState<E, M>, token: &Token, op: &'static str) -> Transaction {
    match state.txn.take() {
      Some(txn) if token.mailbox_id() == self.id && token.generation() == txn.generation => txn,
      other => {
        let open = other.as_ref().map(|txn| txn.generation);
        state.txn = other;
        panic!(
          "Mailbox {}: {} called with foreign token (token mailbox {}, generation {}; open transaction {:?})",
          self.id,
          op,
          token.mailbox_id(),
          token.generation(),
          open
        );
      }
    }
  }

  /// Makes room for a commit into a full queue. A commit only reaches a full
  /// queue through a reservation that was granted with an evicting decision,
  /// because a granted reservation counts against capacity.
  fn evict_for_commit(&self, state: &mut MailboxState<E, M>, evict: Option<OverflowDecision>) {
    match evict {
      Some(OverflowDecision::DropOldest) => {
        state.storage.pop_front();
        tracing::debug!(mailbox_id = self.id, "Mailbox full, evicted oldest entry");
      }
      Some(OverflowDecision::DropNewest) => {
        state.storage.pop_back();
        tracing::debug!(mailbox_id = self.id, "Mailbox full, evicted newest entry");
      }
      Some(OverflowDecision::DropPending) => {
        let dropped = state.storage.clear();
        tracing::debug!(mailbox_id = self.id, dropped, "Mailbox full, dropped pending entries");
      }
      other => unreachable!("Mailbox {} reached commit while full with {:?}", self.id, other),
    }
  }
}

impl<E, M> fmt::Debug for Mailbox<E, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Mailbox")
      .field("id", &self.id)
      .field("capacity", &self.capacity)
      .field("size", &state.storage.len())
      .field("in_transaction", &state.txn.is_some())
      .field("closed", &state.closed)
      .field("policy", &self.policy)
      .finish()
  }
}

/// Assembles a [`Mailbox`] from its injected parts.
pub struct MailboxBuilder {
  capacity: usize,
  storage: StorageKind,
  policy: Arc<dyn OverflowPolicy>,
  on_new_entry: Option<NewEntryCallback>,
}

impl MailboxBuilder {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      storage: StorageKind::default(),
      policy: Arc::new(OverflowDecision::Unspecified),
      on_new_entry: None,
    }
  }

  pub fn storage(mut self, kind: StorageKind) -> Self {
    self.storage = kind;
    self
  }

  pub fn overflow(self, policy: impl OverflowPolicy + 'static) -> Self {
    self.overflow_policy(Arc::new(policy))
  }

  pub fn overflow_policy(mut self, policy: Arc<dyn OverflowPolicy>) -> Self {
    self.policy = policy;
    self
  }

  /// Sets the callback fired after each successful commit. Fixed for the
  /// lifetime of the mailbox.
  pub fn on_new_entry(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
    self.on_new_entry = Some(Arc::new(callback));
    self
  }

  pub fn build<E: Send + 'static, M: Send + 'static>(self) -> Mailbox<E, M> {
    let id = NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(mailbox_id = id, capacity = self.capacity, storage = ?self.storage, "Created mailbox");
    Mailbox {
      id,
      capacity: self.capacity,
      state: Mutex::new(MailboxState {
        storage: self.storage.create(self.capacity),
        txn: None,
        next_generation: 1,
        closed: false,
      }),
      space_available: Condvar::new(),
      policy: self.policy,
      on_new_entry: self.on_new_entry,
    }
  }
}
