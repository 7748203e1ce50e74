//! rzactor - An in-process actor runtime with bounded transactional
//! mailboxes, atomic ordered multi-destination sends and a fair scheduler
//! driving actors from a pool of pump threads.

pub mod actor;
pub mod config;
pub mod error;
pub mod message;
pub mod runtime;
pub mod stage;

// Re-export core types for user convenience
pub use actor::{Actor, ActorContext, ActorId};
pub use config::{ActorOptions, StageConfig};
pub use error::ActorError;
pub use message::{EventId, EventKey, Msg, Payload};
pub use runtime::{
  AtomicSender, FairScheduler, FnOverflowPolicy, Mailbox, OverflowDecision, OverflowPolicy, StorageKind,
  SubscriptionRegistry, SubscriptionTable, SystemEvent, Token,
};
pub use stage::Stage;

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}

/// Creates a stage with default settings, carrying `EventId`/`Msg` pairs.
pub fn stage() -> Result<Stage, ActorError> {
  Stage::new(StageConfig::default())
}
