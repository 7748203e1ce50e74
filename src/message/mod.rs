//! Message-related types (`Msg`, `EventId`) and the bounds the runtime places on them.

mod event_id;
mod msg;

pub use event_id::EventId;
pub use msg::Msg;

use std::fmt::Debug;
use std::hash::Hash;

/// Bound for event identifiers routed through the runtime.
///
/// Identifiers are map keys in the subscription table, so they need a total
/// order and equality; they are cloned once per lookup.
pub trait EventKey: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> EventKey for T where T: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

/// Bound for message payload handles.
///
/// The runtime never looks inside a payload. A single send may place the same
/// payload in several mailboxes, so cloning must be cheap (reference counted).
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + Send + Sync + 'static {}
