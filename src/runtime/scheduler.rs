// src/runtime/scheduler.rs

//! Fair scheduler multiplexing schedulable streams (one per actor) over a
//! pool of pumps.
//!
//! Each stream moves through an explicit state machine:
//!
//! ```text
//!   Idle --add_task--> Ready --poll_task--> Running --release--> Idle
//!                        ^                     |
//!                        +---release, pending>0+
//! ```
//!
//! A stream sits in the ready queue at most once. Work arriving while it is
//! Ready or Running only bumps its pending count, which is what keeps two
//! pumps from ever running the same actor at once. Running is simply
//! "dequeued and not yet released": no scheduler lock is held while the
//! actor executes.
//!
//! The ready queue is ordered by `(priority, sequence)`. The sequence is
//! stamped on every enqueue, so a re-enqueued stream goes to the back of its
//! priority class.

use crate::runtime::deadline_after;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Where a stream is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
  /// Nothing pending, not queued.
  Idle,
  /// Queued, waiting for a pump.
  Ready,
  /// Handed to exactly one pump, not yet released.
  Running,
}

#[derive(Debug)]
struct StreamState {
  phase: StreamPhase,
  pending: usize,
}

struct StreamInner<T> {
  id: u64,
  priority: u32,
  user: T,
  state: Mutex<StreamState>,
  live_streams: Arc<AtomicUsize>,
}

impl<T> Drop for StreamInner<T> {
  fn drop(&mut self) {
    self.live_streams.fetch_sub(1, Ordering::Relaxed);
  }
}

/// Shared handle to one schedulable stream.
pub struct StreamHandle<T> {
  inner: Arc<StreamInner<T>>,
}

impl<T> StreamHandle<T> {
  pub fn id(&self) -> u64 {
    self.inner.id
  }

  pub fn priority(&self) -> u32 {
    self.inner.priority
  }

  /// The user object the stream was created with.
  pub fn user(&self) -> &T {
    &self.inner.user
  }

  pub fn phase(&self) -> StreamPhase {
    self.inner.state.lock().phase
  }

  /// Wake-ups recorded but not yet matched by a `release`.
  pub fn pending(&self) -> usize {
    self.inner.state.lock().pending
  }

  pub fn downgrade(&self) -> WeakStreamHandle<T> {
    WeakStreamHandle {
      inner: Arc::downgrade(&self.inner),
    }
  }

  pub fn ptr_eq(&self, other: &StreamHandle<T>) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl<T> Clone for StreamHandle<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T> fmt::Debug for StreamHandle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("StreamHandle")
      .field("id", &self.inner.id)
      .field("priority", &self.inner.priority)
      .field("phase", &state.phase)
      .field("pending", &state.pending)
      .finish()
  }
}

/// Non-owning stream handle, used where holding a strong handle would form a
/// reference cycle (a mailbox callback that wakes its own actor's stream).
pub struct WeakStreamHandle<T> {
  inner: Weak<StreamInner<T>>,
}

impl<T> WeakStreamHandle<T> {
  pub fn upgrade(&self) -> Option<StreamHandle<T>> {
    self.inner.upgrade().map(|inner| StreamHandle { inner })
  }
}

impl<T> Clone for WeakStreamHandle<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

struct ReadyEntry<T> {
  priority: u32,
  sequence: u64,
  stream: Arc<StreamInner<T>>,
}

impl<T> PartialEq for ReadyEntry<T> {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority && self.sequence == other.sequence
  }
}

impl<T> Eq for ReadyEntry<T> {}

impl<T> PartialOrd for ReadyEntry<T> {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl<T> Ord for ReadyEntry<T> {
  // BinaryHeap is a max-heap: the lowest (priority, sequence) must compare greatest.
  fn cmp(&self, other: &Self) -> CmpOrdering {
    (other.priority, other.sequence).cmp(&(self.priority, self.sequence))
  }
}

struct ReadyQueue<T> {
  heap: BinaryHeap<ReadyEntry<T>>,
  next_sequence: u64,
  interrupt_epoch: u64,
}

struct SchedulerShared<T> {
  ready: Mutex<ReadyQueue<T>>,
  available: Condvar,
  next_stream_id: AtomicU64,
  live_streams: Arc<AtomicUsize>,
}

/// Round-robin-within-priority scheduler. Cloning shares the same queue.
pub struct FairScheduler<T> {
  shared: Arc<SchedulerShared<T>>,
}

impl<T> FairScheduler<T> {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(SchedulerShared {
        ready: Mutex::new(ReadyQueue {
          heap: BinaryHeap::new(),
          next_sequence: 0,
          interrupt_epoch: 0,
        }),
        available: Condvar::new(),
        next_stream_id: AtomicU64::new(1),
        live_streams: Arc::new(AtomicUsize::new(0)),
      }),
    }
  }

  /// Creates an Idle stream. Lower `priority` values run first.
  pub fn new_stream(&self, priority: u32, user: T) -> StreamHandle<T> {
    let id = self.shared.next_stream_id.fetch_add(1, Ordering::Relaxed);
    self.shared.live_streams.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(stream_id = id, priority, "Created scheduler stream");
    StreamHandle {
      inner: Arc::new(StreamInner {
        id,
        priority,
        user,
        state: Mutex::new(StreamState {
          phase: StreamPhase::Idle,
          pending: 0,
        }),
        live_streams: self.shared.live_streams.clone(),
      }),
    }
  }

  /// Records one unit of work for `stream`. An Idle stream becomes Ready and
  /// is queued; a Ready or Running stream only has its pending count bumped.
  pub fn add_task(&self, stream: &StreamHandle<T>) {
    let mut state = stream.inner.state.lock();
    match state.phase {
      StreamPhase::Idle => {
        state.phase = StreamPhase::Ready;
        state.pending = 1;
        self.enqueue(&stream.inner);
      }
      StreamPhase::Ready | StreamPhase::Running => {
        state.pending += 1;
      }
    }
  }

  /// Marks one unit of work done for a stream obtained from `poll_task`.
  /// With work still pending the stream is queued again at the back of its
  /// priority class; otherwise it goes Idle.
  ///
  /// # Panics
  /// If the stream is not Running or has nothing pending (for example a
  /// double release).
  pub fn release(&self, stream: &StreamHandle<T>) {
    let mut state = stream.inner.state.lock();
    if state.phase != StreamPhase::Running || state.pending == 0 {
      panic!(
        "FairScheduler::release on stream {} without a matching schedule (phase {:?}, pending {})",
        stream.inner.id, state.phase, state.pending
      );
    }
    state.pending -= 1;
    if state.pending > 0 {
      state.phase = StreamPhase::Ready;
      self.enqueue(&stream.inner);
    } else {
      state.phase = StreamPhase::Idle;
    }
  }

  /// Waits up to `timeout` for a Ready stream and hands it to the caller,
  /// which now owns it until `release`. Returns `None` on timeout or when
  /// interrupted.
  pub fn poll_task(&self, timeout: Duration) -> Option<StreamHandle<T>> {
    let deadline = deadline_after(timeout);
    let mut queue = self.shared.ready.lock();
    let epoch = queue.interrupt_epoch;
    let entry = loop {
      if let Some(entry) = queue.heap.pop() {
        break entry;
      }
      if queue.interrupt_epoch != epoch {
        return None;
      }
      if self.shared.available.wait_until(&mut queue, deadline).timed_out() {
        break queue.heap.pop()?;
      }
    };
    drop(queue);

    // Only the caller can release this stream, so nothing can move it out of
    // Ready between the pop and this point; add_task merely counts.
    let mut state = entry.stream.state.lock();
    debug_assert_eq!(state.phase, StreamPhase::Ready);
    state.phase = StreamPhase::Running;
    drop(state);
    Some(StreamHandle { inner: entry.stream })
  }

  /// Wakes every thread blocked in `poll_task`; they return `None`.
  pub fn interrupt(&self) {
    let mut queue = self.shared.ready.lock();
    queue.interrupt_epoch = queue.interrupt_epoch.wrapping_add(1);
    self.shared.available.notify_all();
  }

  /// Empties the ready queue, returning the drained streams to Idle with
  /// nothing pending. Teardown only: call once no pump is polling.
  pub fn drain_ready(&self) -> usize {
    let drained: Vec<ReadyEntry<T>> = self.shared.ready.lock().heap.drain().collect();
    for entry in &drained {
      let mut state = entry.stream.state.lock();
      state.phase = StreamPhase::Idle;
      state.pending = 0;
    }
    drained.len()
  }

  /// Streams currently queued.
  pub fn ready_len(&self) -> usize {
    self.shared.ready.lock().heap.len()
  }

  /// Streams created by this scheduler that are still alive.
  pub fn stream_count(&self) -> usize {
    self.shared.live_streams.load(Ordering::Relaxed)
  }

  fn enqueue(&self, stream: &Arc<StreamInner<T>>) {
    let mut queue = self.shared.ready.lock();
    let sequence = queue.next_sequence;
    queue.next_sequence += 1;
    queue.heap.push(ReadyEntry {
      priority: stream.priority,
      sequence,
      stream: stream.clone(),
    });
    self.shared.available.notify_one();
  }
}

impl<T> Default for FairScheduler<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for FairScheduler<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> fmt::Debug for FairScheduler<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FairScheduler")
      .field("ready", &self.ready_len())
      .field("streams", &self.stream_count())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicBool;
  use std::thread;
  use std::time::Instant;

  const POLL: Duration = Duration::from_millis(20);

  #[test]
  fn add_twice_merges_into_one_schedule() {
    let sched = FairScheduler::new();
    let s = sched.new_stream(0, "S");
    sched.add_task(&s);
    sched.add_task(&s);
    assert_eq!(sched.ready_len(), 1);
    assert_eq!(s.pending(), 2);

    let first = sched.poll_task(POLL).expect("S should be ready");
    assert!(first.ptr_eq(&s));
    assert_eq!(s.phase(), StreamPhase::Running);
    assert!(sched.poll_task(POLL).is_none(), "S must not be handed out twice");

    sched.release(&first);
    assert_eq!(s.phase(), StreamPhase::Ready);
    let second = sched.poll_task(POLL).expect("S should be ready again");
    assert!(second.ptr_eq(&s));
    sched.release(&second);
    assert_eq!(s.phase(), StreamPhase::Idle);
    assert_eq!(s.pending(), 0);
    assert!(sched.poll_task(POLL).is_none());
  }

  #[test]
  fn equal_priority_runs_in_submission_order() {
    let sched = FairScheduler::new();
    let a = sched.new_stream(0, "A");
    let b = sched.new_stream(0, "B");
    sched.add_task(&a);
    sched.add_task(&b);
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "A");
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "B");
  }

  #[test]
  fn lower_priority_value_runs_first() {
    let sched = FairScheduler::new();
    let low = sched.new_stream(5, "low");
    let high = sched.new_stream(1, "high");
    sched.add_task(&low);
    sched.add_task(&high);
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "high");
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "low");
  }

  #[test]
  fn re_enqueued_stream_goes_to_back_of_its_class() {
    let sched = FairScheduler::new();
    let a = sched.new_stream(0, "A");
    let b = sched.new_stream(0, "B");
    sched.add_task(&a);
    sched.add_task(&a);
    sched.add_task(&b);
    let run = sched.poll_task(POLL).unwrap();
    assert_eq!(*run.user(), "A");
    sched.release(&run);
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "B");
    assert_eq!(*sched.poll_task(POLL).unwrap().user(), "A");
  }

  #[test]
  fn work_added_while_running_is_kept() {
    let sched = FairScheduler::new();
    let s = sched.new_stream(0, ());
    sched.add_task(&s);
    let run = sched.poll_task(POLL).unwrap();
    sched.add_task(&s);
    assert_eq!(sched.ready_len(), 0);
    sched.release(&run);
    assert!(sched.poll_task(POLL).is_some());
  }

  #[test]
  #[should_panic(expected = "without a matching schedule")]
  fn release_of_idle_stream_panics() {
    let sched = FairScheduler::new();
    let s = sched.new_stream(0, ());
    sched.release(&s);
  }

  #[test]
  #[should_panic(expected = "without a matching schedule")]
  fn double_release_panics() {
    let sched = FairScheduler::new();
    let s = sched.new_stream(0, ());
    sched.add_task(&s);
    let run = sched.poll_task(POLL).unwrap();
    sched.release(&run);
    sched.release(&run);
  }

  #[test]
  fn poll_times_out_when_nothing_is_ready() {
    let sched: FairScheduler<()> = FairScheduler::new();
    let start = Instant::now();
    assert!(sched.poll_task(Duration::from_millis(30)).is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
  }

  #[test]
  fn blocked_poll_wakes_on_add() {
    let sched = FairScheduler::new();
    let s = sched.new_stream(0, 7u32);
    let poller = {
      let sched = sched.clone();
      thread::spawn(move || sched.poll_task(Duration::from_secs(5)).map(|h| *h.user()))
    };
    thread::sleep(Duration::from_millis(20));
    sched.add_task(&s);
    assert_eq!(poller.join().unwrap(), Some(7));
  }

  #[test]
  fn interrupt_releases_blocked_pollers() {
    let sched: FairScheduler<()> = FairScheduler::new();
    let poller = {
      let sched = sched.clone();
      thread::spawn(move || {
        let start = Instant::now();
        let got = sched.poll_task(Duration::from_secs(10));
        (got.is_none(), start.elapsed())
      })
    };
    thread::sleep(Duration::from_millis(30));
    sched.interrupt();
    let (none, waited) = poller.join().unwrap();
    assert!(none);
    assert!(waited < Duration::from_secs(5));
  }

  #[test]
  fn drain_ready_resets_queued_streams() {
    let sched = FairScheduler::new();
    let a = sched.new_stream(0, ());
    let b = sched.new_stream(0, ());
    sched.add_task(&a);
    sched.add_task(&a);
    sched.add_task(&b);
    assert_eq!(sched.drain_ready(), 2);
    assert_eq!(a.phase(), StreamPhase::Idle);
    assert_eq!(a.pending(), 0);
    assert!(sched.poll_task(Duration::from_millis(5)).is_none());
    sched.add_task(&b);
    assert!(sched.poll_task(POLL).unwrap().ptr_eq(&b));
  }

  #[test]
  fn stream_count_tracks_live_streams() {
    let sched = FairScheduler::new();
    let a = sched.new_stream(0, ());
    let b = sched.new_stream(0, ());
    assert_eq!(sched.stream_count(), 2);
    drop(a);
    assert_eq!(sched.stream_count(), 1);
    let weak = b.downgrade();
    drop(b);
    assert!(weak.upgrade().is_none());
    assert_eq!(sched.stream_count(), 0);
  }

  #[test]
  fn workers_never_share_a_stream_and_lose_no_work() {
    const STREAMS: usize = 8;
    const ADDS_PER_STREAM: usize = 500;

    struct Probe {
      running: AtomicBool,
      runs: AtomicUsize,
    }

    let sched = FairScheduler::new();
    let streams: Vec<_> = (0..STREAMS)
      .map(|_| {
        sched.new_stream(
          0,
          Arc::new(Probe {
            running: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
          }),
        )
      })
      .collect();
    let done = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..4)
      .map(|_| {
        let sched = sched.clone();
        let done = done.clone();
        thread::spawn(move || loop {
          match sched.poll_task(Duration::from_millis(10)) {
            Some(stream) => {
              let cell = stream.user();
              assert!(
                !cell.running.swap(true, Ordering::SeqCst),
                "stream {} run by two workers",
                stream.id()
              );
              cell.runs.fetch_add(1, Ordering::SeqCst);
              thread::yield_now();
              cell.running.store(false, Ordering::SeqCst);
              sched.release(&stream);
            }
            None if done.load(Ordering::SeqCst) => break,
            None => {}
          }
        })
      })
      .collect();

    let producers: Vec<_> = streams
      .chunks(2)
      .map(|chunk| {
        let sched = sched.clone();
        let chunk = chunk.to_vec();
        thread::spawn(move || {
          for _ in 0..ADDS_PER_STREAM {
            for s in &chunk {
              sched.add_task(s);
            }
          }
        })
      })
      .collect();
    for p in producers {
      p.join().unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while streams.iter().any(|s| s.phase() != StreamPhase::Idle) && Instant::now() < deadline {
      thread::sleep(Duration::from_millis(5));
    }
    done.store(true, Ordering::SeqCst);
    for w in workers {
      w.join().unwrap();
    }

    for s in &streams {
      assert_eq!(s.phase(), StreamPhase::Idle);
      assert_eq!(s.user().runs.load(Ordering::SeqCst), ADDS_PER_STREAM);
    }
  }
}
