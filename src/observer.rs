//! Observer type and notifications
//!
//! An [`Observer`] is the callback a producer drives. It receives any number
//! of [`Notification::Next`] values followed by at most one terminal
//! notification (`Error` or `Complete`). Nothing may follow a terminal
//! notification and no two notifications may be delivered at the same time;
//! [`Observable::validate`](crate::observable::Observable::validate) checks
//! both rules at runtime.

use std::{fmt, sync::Arc};

use crate::error::RxError;

// ============================================================================
// Notification
// ============================================================================

/// One call into an observer.
pub enum Notification<T> {
  /// A value.
  Next(T),
  /// Terminal failure.
  Error(RxError),
  /// Terminal success.
  Complete,
}

impl<T> Notification<T> {
  /// Whether this notification ends the stream.
  #[inline]
  pub fn is_terminal(&self) -> bool { !matches!(self, Notification::Next(_)) }

  /// Transform the carried value, keeping terminal notifications as they are.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Notification<U> {
    match self {
      Notification::Next(v) => Notification::Next(f(v)),
      Notification::Error(e) => Notification::Error(e),
      Notification::Complete => Notification::Complete,
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Notification<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Notification::Next(v) => f.debug_tuple("Next").field(v).finish(),
      Notification::Error(e) => f.debug_tuple("Error").field(e).finish(),
      Notification::Complete => f.write_str("Complete"),
    }
  }
}

impl<T: PartialEq> PartialEq for Notification<T> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Notification::Next(a), Notification::Next(b)) => a == b,
      (Notification::Error(a), Notification::Error(b)) => a == b,
      (Notification::Complete, Notification::Complete) => true,
      _ => false,
    }
  }
}

// ============================================================================
// Observer
// ============================================================================

/// The consumer side of the calling convention.
///
/// Observers are cheap to clone; clones share the same callback. The callback
/// is `Fn + Send + Sync` because producers on a parallel scheduler may call it
/// from any worker thread (never concurrently, per the contract).
pub struct Observer<T> {
  callback: Arc<dyn Fn(Notification<T>) + Send + Sync>,
}

impl<T> Clone for Observer<T> {
  #[inline]
  fn clone(&self) -> Self { Self { callback: self.callback.clone() } }
}

impl<T> Observer<T> {
  /// Create an observer from a notification callback.
  pub fn new(callback: impl Fn(Notification<T>) + Send + Sync + 'static) -> Self {
    Self { callback: Arc::new(callback) }
  }

  /// Create an observer from three separate handlers.
  pub fn from_fns(
    next: impl Fn(T) + Send + Sync + 'static,
    error: impl Fn(RxError) + Send + Sync + 'static,
    complete: impl Fn() + Send + Sync + 'static,
  ) -> Self {
    Self::new(move |n| match n {
      Notification::Next(v) => next(v),
      Notification::Error(e) => error(e),
      Notification::Complete => complete(),
    })
  }

  /// Observer that only looks at values.
  pub fn on_next(next: impl Fn(T) + Send + Sync + 'static) -> Self {
    Self::new(move |n| {
      if let Notification::Next(v) = n {
        next(v)
      }
    })
  }

  /// Observer that drops everything.
  pub fn ignore() -> Self { Self::new(|_| {}) }

  #[inline]
  pub fn notify(&self, notification: Notification<T>) { (self.callback)(notification) }

  #[inline]
  pub fn next(&self, value: T) { self.notify(Notification::Next(value)) }

  #[inline]
  pub fn error(&self, err: RxError) { self.notify(Notification::Error(err)) }

  #[inline]
  pub fn complete(&self) { self.notify(Notification::Complete) }

  /// Deliver `Complete` for `None` and `Error` for `Some`.
  pub fn done(&self, err: Option<RxError>) {
    match err {
      Some(e) => self.error(e),
      None => self.complete(),
    }
  }
}

impl<T> fmt::Debug for Observer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Observer") }
}
