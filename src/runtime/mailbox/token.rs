// src/runtime/mailbox/token.rs

/// Capability for one reserved mailbox slot.
///
/// Returned by `Mailbox::lock` and consumed by exactly one `commit` or
/// `unlock`. Tokens carry the issuing mailbox id and a per-mailbox
/// generation and are checked by value, so a token presented to the wrong
/// mailbox is detected. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a token reserves mailbox capacity until it is committed or unlocked"]
pub struct Token {
  mailbox_id: u64,
  generation: u64,
}

impl Token {
  pub(crate) fn new(mailbox_id: u64, generation: u64) -> Self {
    Self { mailbox_id, generation }
  }

  /// Id of the mailbox that issued this token.
  pub fn mailbox_id(&self) -> u64 {
    self.mailbox_id
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }
}
