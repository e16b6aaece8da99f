//! Lock-guarded decision state with serialized downstream delivery.
//!
//! Multi-source operators keep their shared state in a [`Serialized`]. Each
//! source notification locks it, updates the state and queues the
//! notifications it decided to send. Queued notifications are delivered by
//! whichever caller holds the emitting role, with the lock released, so the
//! downstream observer never sees two notifications at once and may
//! re-enter the operator without deadlocking. Queue order is decision order.
//!
//! Once the terminal notification has been delivered the operator's scope
//! subscriber is unsubscribed, which tears down every source it still holds.

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};

use crate::{
  error::RxError,
  observer::{Notification, Observer},
  subscription::Subscriber,
};

struct Inner<S, T> {
  state: S,
  outbox: VecDeque<Notification<T>>,
  emitting: bool,
  terminated: bool,
  released: bool,
}

/// Decision state plus the downstream observer it feeds.
pub(crate) struct Serialized<S, T> {
  observer: Observer<T>,
  scope: Subscriber,
  inner: Mutex<Inner<S, T>>,
}

/// Queues downstream notifications from inside [`Serialized::with`].
pub(crate) struct Emit<'a, T> {
  outbox: &'a mut VecDeque<Notification<T>>,
  terminated: &'a mut bool,
}

impl<T> Emit<'_, T> {
  pub(crate) fn next(&mut self, value: T) {
    if !*self.terminated {
      self.outbox.push_back(Notification::Next(value));
    }
  }

  pub(crate) fn error(&mut self, err: RxError) {
    if !*self.terminated {
      *self.terminated = true;
      self.outbox.push_back(Notification::Error(err));
    }
  }

  pub(crate) fn complete(&mut self) {
    if !*self.terminated {
      *self.terminated = true;
      self.outbox.push_back(Notification::Complete);
    }
  }

  pub(crate) fn notify(&mut self, n: Notification<T>) {
    match n {
      Notification::Next(v) => self.next(v),
      Notification::Error(e) => self.error(e),
      Notification::Complete => self.complete(),
    }
  }

  #[inline]
  pub(crate) fn is_terminated(&self) -> bool { *self.terminated }
}

impl<S, T> Serialized<S, T> {
  pub(crate) fn new(state: S, observer: Observer<T>, scope: Subscriber) -> Self {
    Self {
      observer,
      scope,
      inner: Mutex::new(Inner {
        state,
        outbox: VecDeque::new(),
        emitting: false,
        terminated: false,
        released: false,
      }),
    }
  }

  /// Run `f` on the state under the lock, then flush queued notifications.
  pub(crate) fn with<R>(&self, f: impl FnOnce(&mut S, &mut Emit<'_, T>) -> R) -> R {
    let mut inner = self.inner.lock();
    let result = {
      let Inner { state, outbox, terminated, .. } = &mut *inner;
      f(state, &mut Emit { outbox, terminated })
    };
    if inner.emitting {
      return result;
    }
    inner.emitting = true;
    while let Some(n) = inner.outbox.pop_front() {
      MutexGuard::unlocked(&mut inner, || self.observer.notify(n));
    }
    inner.emitting = false;
    let release = inner.terminated && !std::mem::replace(&mut inner.released, true);
    drop(inner);
    if release {
      self.scope.unsubscribe();
    }
    result
  }

  #[cfg(test)]
  pub(crate) fn is_terminated(&self) -> bool { self.inner.lock().terminated }

  /// The subscriber every source of this operator is subscribed under.
  #[inline]
  pub(crate) fn scope(&self) -> &Subscriber { &self.scope }
}
