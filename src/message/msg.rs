use bytes::Bytes;
use std::fmt;

/// An immutable, reference-counted message payload.
///
/// Cloning a `Msg` bumps a reference count; the bytes themselves are shared by
/// every mailbox the message was delivered to.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  data: Bytes,
}

impl Msg {
  /// Creates an empty message.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a message from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self { data: Bytes::from(data) }
  }

  /// Creates a message from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self { data }
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      data: Bytes::from_static(data),
    }
  }

  /// Returns the payload bytes.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the size of the payload in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Returns a handle to the underlying `Bytes`. Cheap: reference counted.
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }
}

impl From<&'static str> for Msg {
  fn from(s: &'static str) -> Self {
    Self::from_static(s.as_bytes())
  }
}

impl From<Vec<u8>> for Msg {
  fn from(v: Vec<u8>) -> Self {
    Self::from_vec(v)
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Avoid dumping large payloads into logs
    f.debug_struct("Msg").field("size", &self.size()).finish()
  }
}
