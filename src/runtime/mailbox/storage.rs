// src/runtime/mailbox/storage.rs

//! Pluggable backing stores for a `Mailbox`.
//!
//! The mailbox owns all capacity and admission bookkeeping; a storage only has
//! to be an ordered double-ended sequence. Callers never push past the
//! capacity the storage was created with.

use std::collections::LinkedList;

/// Ordered entry sequence used behind a mailbox lock.
pub trait MailboxStorage<T>: Send {
  fn push_back(&mut self, item: T);
  fn pop_front(&mut self) -> Option<T>;
  fn pop_back(&mut self) -> Option<T>;
  /// Removes every entry, returning how many were dropped.
  fn clear(&mut self) -> usize;
  fn len(&self) -> usize;
  /// Visits entries oldest first.
  fn for_each(&self, visitor: &mut dyn FnMut(&T));

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Selects the storage strategy used when a mailbox is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
  /// Fixed ring buffer allocated up front to the mailbox capacity.
  #[default]
  Ring,
  /// One heap node per entry; nothing is allocated while the mailbox is empty.
  Linked,
}

impl StorageKind {
  pub(crate) fn create<T: Send + 'static>(self, capacity: usize) -> Box<dyn MailboxStorage<T>> {
    match self {
      StorageKind::Ring => Box::new(RingStorage::with_capacity(capacity)),
      StorageKind::Linked => Box::new(LinkedStorage::new()),
    }
  }
}

/// Fixed-size circular buffer.
#[derive(Debug)]
pub struct RingStorage<T> {
  slots: Box<[Option<T>]>,
  head: usize,
  len: usize,
}

impl<T> RingStorage<T> {
  pub fn with_capacity(capacity: usize) -> Self {
    let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
    Self { slots, head: 0, len: 0 }
  }

  fn slot_index(&self, offset: usize) -> usize {
    (self.head + offset) % self.slots.len()
  }
}

impl<T: Send> MailboxStorage<T> for RingStorage<T> {
  fn push_back(&mut self, item: T) {
    assert!(
      self.len < self.slots.len(),
      "RingStorage overflow: push_back beyond capacity {}",
      self.slots.len()
    );
    let idx = self.slot_index(self.len);
    self.slots[idx] = Some(item);
    self.len += 1;
  }

  fn pop_front(&mut self) -> Option<T> {
    if self.len == 0 {
      return None;
    }
    let item = self.slots[self.head].take();
    self.head = (self.head + 1) % self.slots.len();
    self.len -= 1;
    item
  }

  fn pop_back(&mut self) -> Option<T> {
    if self.len == 0 {
      return None;
    }
    let idx = self.slot_index(self.len - 1);
    self.len -= 1;
    self.slots[idx].take()
  }

  fn clear(&mut self) -> usize {
    let dropped = self.len;
    while self.pop_front().is_some() {}
    self.head = 0;
    dropped
  }

  fn len(&self) -> usize {
    self.len
  }

  fn for_each(&self, visitor: &mut dyn FnMut(&T)) {
    for offset in 0..self.len {
      if let Some(item) = &self.slots[self.slot_index(offset)] {
        visitor(item);
      }
    }
  }
}

/// Linked-list storage.
#[derive(Debug)]
pub struct LinkedStorage<T> {
  list: LinkedList<T>,
}

impl<T> LinkedStorage<T> {
  pub fn new() -> Self {
    Self { list: LinkedList::new() }
  }
}

impl<T> Default for LinkedStorage<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send> MailboxStorage<T> for LinkedStorage<T> {
  fn push_back(&mut self, item: T) {
    self.list.push_back(item);
  }

  fn pop_front(&mut self) -> Option<T> {
    self.list.pop_front()
  }

  fn pop_back(&mut self) -> Option<T> {
    self.list.pop_back()
  }

  fn clear(&mut self) -> usize {
    let dropped = self.list.len();
    self.list.clear();
    dropped
  }

  fn len(&self) -> usize {
    self.list.len()
  }

  fn for_each(&self, visitor: &mut dyn FnMut(&T)) {
    for item in self.list.iter() {
      visitor(item);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn collect(storage: &dyn MailboxStorage<u32>) -> Vec<u32> {
    let mut out = Vec::new();
    storage.for_each(&mut |v| out.push(*v));
    out
  }

  #[test]
  fn ring_wraps_around() {
    let mut ring = RingStorage::with_capacity(3);
    ring.push_back(1);
    ring.push_back(2);
    ring.push_back(3);
    assert_eq!(ring.pop_front(), Some(1));
    ring.push_back(4);
    assert_eq!(collect(&ring), vec![2, 3, 4]);
    assert_eq!(ring.pop_back(), Some(4));
    assert_eq!(ring.pop_front(), Some(2));
    assert_eq!(ring.len(), 1);
  }

  #[test]
  #[should_panic(expected = "RingStorage overflow")]
  fn ring_rejects_push_past_capacity() {
    let mut ring = RingStorage::with_capacity(1);
    ring.push_back(1);
    ring.push_back(2);
  }

  #[test]
  fn both_kinds_behave_the_same() {
    for kind in [StorageKind::Ring, StorageKind::Linked] {
      let mut storage = kind.create::<u32>(4);
      assert!(storage.is_empty());
      storage.push_back(10);
      storage.push_back(20);
      storage.push_back(30);
      assert_eq!(storage.pop_back(), Some(30), "{:?}", kind);
      assert_eq!(storage.pop_front(), Some(10), "{:?}", kind);
      storage.push_back(40);
      assert_eq!(collect(&*storage), vec![20, 40], "{:?}", kind);
      assert_eq!(storage.clear(), 2);
      assert_eq!(storage.pop_front(), None);
    }
  }

  #[test]
  fn zero_capacity_ring_is_always_empty() {
    let mut ring = RingStorage::<u32>::with_capacity(0);
    assert_eq!(ring.pop_front(), None);
    assert_eq!(ring.pop_back(), None);
    assert_eq!(ring.clear(), 0);
  }
}
