// src/error.rs

use std::io;
use thiserror::Error;

/// Errors surfaced by the host-facing API (stage setup, registration, pumps).
///
/// The mailbox, sender and scheduler never return these: backpressure and
/// timeouts are reported through `bool`/`Option` results, and protocol
/// violations (foreign tokens, unmatched releases) panic.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ActorError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error), // Thread spawning failures

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Timeouts ---
  #[error("Operation timed out")]
  Timeout,

  // --- State Errors ---
  #[error("Operation is invalid for the current stage state: {0}")]
  InvalidState(&'static str),

  #[error("No actor registered with id {0}")]
  UnknownActor(usize),
}

impl ActorError {
  pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
    ActorError::InvalidArgument(msg.into())
  }
}
