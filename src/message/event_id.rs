use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Default event identifier: a named channel such as `"orders.created"`.
///
/// Backed by `Arc<str>` so the per-send clones made while resolving
/// subscriptions do not allocate.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(Arc<str>);

impl EventId {
  pub fn new(name: impl AsRef<str>) -> Self {
    Self(Arc::from(name.as_ref()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for EventId {
  fn from(name: &str) -> Self {
    Self::new(name)
  }
}

impl From<String> for EventId {
  fn from(name: String) -> Self {
    Self(Arc::from(name))
  }
}

impl Borrow<str> for EventId {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "EventId({})", &self.0)
  }
}
