//! Error types carried through the terminal slot of an [`Observer`].
//!
//! Every stream in this crate terminates with at most one [`RxError`]. Errors
//! raised by producers travel verbatim (`Upstream`/`Message`); the remaining
//! variants are produced by the runtime itself.
//!
//! [`Observer`]: crate::observer::Observer

use std::{error::Error as StdError, fmt, sync::Arc};

/// Result alias used across the crate.
pub type Result<T, E = RxError> = std::result::Result<T, E>;

/// Kind of observer contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  /// Two notifications were delivered at the same time.
  ConcurrentNotification,
  /// A notification followed a terminal notification.
  AfterTerminal,
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Violation::ConcurrentNotification => f.write_str("concurrent notification"),
      Violation::AfterTerminal => f.write_str("notification after terminal"),
    }
  }
}

/// The single error type observed by observers and returned by
/// [`Subscriber::wait`](crate::subscription::Subscriber::wait).
///
/// It is cheap to clone: a terminal error recorded in a replay buffer is
/// handed to every endpoint that reaches it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RxError {
  /// An opaque error raised by a producer.
  #[error("{0}")]
  Upstream(Arc<dyn StdError + Send + Sync>),

  /// An opaque error described only by a message.
  #[error("{0}")]
  Message(Arc<str>),

  /// The observer calling convention was broken.
  #[error("contract violation: {0}")]
  Violation(Violation),

  /// An endpoint fell behind a drop-on-overflow buffer and missed values.
  #[error("missing backpressure")]
  MissingBackpressure,

  /// A bounded operator buffer received more values than it may hold.
  #[error("buffer overflow: capacity {capacity} exceeded")]
  BufferOverflow { capacity: usize },

  /// A one-shot subscription was subscribed twice.
  #[error("already subscribed")]
  AlreadySubscribed,

  /// An operator was re-entered while it was still running.
  #[error("recursion detected")]
  Recursion,

  /// No notification arrived within the allowed duration.
  #[error("timeout")]
  Timeout,
}

impl RxError {
  /// Create an opaque error from a message.
  pub fn msg(message: impl Into<Arc<str>>) -> Self { RxError::Message(message.into()) }

  /// Wrap an arbitrary error raised by a producer.
  pub fn upstream(err: impl StdError + Send + Sync + 'static) -> Self {
    RxError::Upstream(Arc::new(err))
  }

  /// Whether this error was raised by the runtime for a backpressure failure.
  pub fn is_backpressure(&self) -> bool {
    matches!(self, RxError::MissingBackpressure | RxError::BufferOverflow { .. })
  }
}

impl PartialEq for RxError {
  fn eq(&self, other: &Self) -> bool {
    use RxError::*;
    match (self, other) {
      (Upstream(a), Upstream(b)) => Arc::ptr_eq(a, b),
      (Message(a), Message(b)) => a == b,
      (Violation(a), Violation(b)) => a == b,
      (MissingBackpressure, MissingBackpressure)
      | (AlreadySubscribed, AlreadySubscribed)
      | (Recursion, Recursion)
      | (Timeout, Timeout) => true,
      (BufferOverflow { capacity: a }, BufferOverflow { capacity: b }) => a == b,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("disk on fire")]
  struct DiskError;

  #[test]
  fn display() {
    assert_eq!(RxError::msg("boom").to_string(), "boom");
    assert_eq!(RxError::upstream(DiskError).to_string(), "disk on fire");
    assert_eq!(
      RxError::Violation(Violation::AfterTerminal).to_string(),
      "contract violation: notification after terminal"
    );
    assert_eq!(
      RxError::BufferOverflow { capacity: 1 }.to_string(),
      "buffer overflow: capacity 1 exceeded"
    );
  }

  #[test]
  fn equality() {
    let upstream = RxError::upstream(DiskError);
    assert_eq!(upstream, upstream.clone());
    assert_ne!(upstream, RxError::upstream(DiskError));
    assert_eq!(RxError::msg("a"), RxError::msg(String::from("a")));
    assert!(RxError::MissingBackpressure.is_backpressure());
    assert!(!RxError::Timeout.is_backpressure());
  }
}
