//! Link: a guarded connection to one inner subscription.
//!
//! Operators that must tear down an inner subscription and only then start a
//! new one (`switch_all`, `auto_connect`) route the inner notifications
//! through a [`Link`]. The link tracks where the inner subscription is in its
//! lifecycle:
//!
//! ```text
//! Unsubscribed -> Subscribing -> Idle <-> Busy -> Errored
//!                                  |             -> Completing -> Completed
//!                                  +-> Canceled
//! ```
//!
//! Two notifications in flight at once, from two threads or by reentrance,
//! break the observer contract; the link turns that into a
//! [`Violation::ConcurrentNotification`] error instead of passing both on.
//! A cancel requested while a notification is in flight is deferred until it
//! settles, and the `on_settled` callback given to [`Link::cancel`] runs
//! exactly once.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{
  error::{Result, RxError, Violation},
  observable::Observable,
  observer::{Notification, Observer},
  scheduler::SharedScheduler,
  subscription::Subscriber,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
  Unsubscribed,
  Subscribing,
  Idle,
  Busy,
  Errored,
  Completing,
  Completed,
  Canceled,
}

impl LinkState {
  /// No further notification will be forwarded.
  #[inline]
  pub fn is_settled(self) -> bool {
    matches!(self, LinkState::Errored | LinkState::Completed | LinkState::Canceled)
  }
}

type Settled = Box<dyn FnOnce() + Send>;

struct Inner {
  state: LinkState,
  subscriber: Option<Subscriber>,
  cancel_requested: bool,
  violated: bool,
  on_settled: Vec<Settled>,
}

pub struct Link<T> {
  observer: Observer<T>,
  inner: Mutex<Inner>,
}

impl<T: 'static> Link<T> {
  pub fn new(observer: Observer<T>) -> Arc<Self> {
    Arc::new(Link {
      observer,
      inner: Mutex::new(Inner {
        state: LinkState::Unsubscribed,
        subscriber: None,
        cancel_requested: false,
        violated: false,
        on_settled: Vec::new(),
      }),
    })
  }

  pub fn state(&self) -> LinkState { self.inner.lock().state }

  /// Subscribe `source` under a child of `parent` and forward its
  /// notifications through this link.
  ///
  /// A link subscribes once. Subscribing a canceled link does nothing, any
  /// other state yields [`RxError::AlreadySubscribed`].
  pub fn subscribe(
    self: &Arc<Self>,
    source: &Observable<T>,
    scheduler: &SharedScheduler,
    parent: &Subscriber,
  ) -> Result<()> {
    let child = {
      let mut inner = self.inner.lock();
      match inner.state {
        LinkState::Unsubscribed => {}
        LinkState::Canceled => return Ok(()),
        _ => return Err(RxError::AlreadySubscribed),
      }
      inner.state = LinkState::Subscribing;
      let child = parent.add();
      inner.subscriber = Some(child.clone());
      child
    };

    let link = self.clone();
    source.subscribe_with(Observer::new(move |n| link.deliver(n)), scheduler, &child);

    let mut inner = self.inner.lock();
    if inner.state == LinkState::Subscribing {
      inner.state = LinkState::Idle;
    }
    Ok(())
  }

  /// Forward one notification downstream, guarding the observer contract.
  pub fn deliver(&self, n: Notification<T>) {
    let terminal = n.is_terminal();
    let completing = matches!(n, Notification::Complete);
    {
      let mut inner = self.inner.lock();
      match inner.state {
        LinkState::Subscribing | LinkState::Idle => {
          inner.state = if completing { LinkState::Completing } else { LinkState::Busy };
        }
        LinkState::Busy | LinkState::Completing => {
          inner.violated = true;
          return;
        }
        state => {
          trace!(?state, "link dropped notification");
          return;
        }
      }
    }

    self.observer.notify(n);

    let (callbacks, release) = {
      let mut inner = self.inner.lock();
      let violated = std::mem::take(&mut inner.violated);
      inner.state = match inner.state {
        LinkState::Completing => LinkState::Completed,
        _ if terminal || violated => LinkState::Errored,
        _ if inner.cancel_requested => LinkState::Canceled,
        _ => LinkState::Idle,
      };
      if violated && !terminal {
        drop(inner);
        warn!("link received overlapping notifications");
        self
          .observer
          .error(RxError::Violation(Violation::ConcurrentNotification));
        inner = self.inner.lock();
      }
      let settled = inner.state.is_settled();
      let callbacks = if settled { std::mem::take(&mut inner.on_settled) } else { Vec::new() };
      let release = if settled { inner.subscriber.take() } else { None };
      (callbacks, release)
    };
    if let Some(subscriber) = release {
      subscriber.unsubscribe();
    }
    for callback in callbacks {
      callback();
    }
  }

  /// Cancel the inner subscription, then run `on_settled`.
  ///
  /// While a notification is in flight the cancel is deferred until that
  /// notification has been delivered.
  pub fn cancel(&self, on_settled: impl FnOnce() + Send + 'static) {
    let release = {
      let mut inner = self.inner.lock();
      match inner.state {
        LinkState::Busy | LinkState::Completing => {
          inner.cancel_requested = true;
          inner.on_settled.push(Box::new(on_settled));
          return;
        }
        LinkState::Errored | LinkState::Completed | LinkState::Canceled => None,
        LinkState::Unsubscribed | LinkState::Subscribing | LinkState::Idle => {
          inner.state = LinkState::Canceled;
          inner.subscriber.take()
        }
      }
    };
    if let Some(subscriber) = release {
      subscriber.unsubscribe();
    }
    on_settled();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex as StdMutex,
  };

  use super::*;
  use crate::{observable, scheduler};

  fn recorder<T: Send + 'static>() -> (Observer<T>, Arc<StdMutex<Vec<Notification<T>>>>) {
    let log = Arc::new(StdMutex::new(vec![]));
    let c_log = log.clone();
    (Observer::new(move |n| c_log.lock().unwrap().push(n)), log)
  }

  #[test]
  fn forwards_and_completes() {
    let scheduler = scheduler::trampoline();
    let (observer, log) = recorder();
    let link = Link::new(observer);
    let parent = Subscriber::new();
    assert_eq!(link.subscribe(&observable::from_iter(1..=2), &scheduler, &parent), Ok(()));
    assert_eq!(link.state(), LinkState::Completed);
    assert_eq!(
      *log.lock().unwrap(),
      vec![Notification::Next(1), Notification::Next(2), Notification::Complete]
    );
  }

  #[test]
  fn subscribe_twice_is_an_error() {
    let scheduler = scheduler::trampoline();
    let link = Link::new(Observer::<i32>::ignore());
    let parent = Subscriber::new();
    let source = observable::never();
    assert_eq!(link.subscribe(&source, &scheduler, &parent), Ok(()));
    assert_eq!(link.state(), LinkState::Idle);
    assert_eq!(
      link.subscribe(&source, &scheduler, &parent),
      Err(RxError::AlreadySubscribed)
    );
  }

  #[test]
  fn canceled_link_ignores_subscribe_and_late_values() {
    let scheduler = scheduler::trampoline();
    let (observer, log) = recorder();
    let link = Link::new(observer);
    let settled = Arc::new(AtomicUsize::new(0));
    let c_settled = settled.clone();
    link.cancel(move || {
      c_settled.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(link.state(), LinkState::Canceled);
    assert_eq!(
      link.subscribe(&observable::of(1), &scheduler, &Subscriber::new()),
      Ok(())
    );
    link.deliver(Notification::Next(2));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(settled.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn cancel_during_delivery_waits_for_it() {
    let settled = Arc::new(AtomicUsize::new(0));
    let slot: Arc<StdMutex<Option<Arc<Link<i32>>>>> = Arc::default();
    let (c_slot, c_settled) = (slot.clone(), settled.clone());
    let link = Link::new(Observer::on_next(move |_| {
      let link = c_slot.lock().unwrap().clone().unwrap();
      let settled = c_settled.clone();
      link.cancel(move || {
        settled.fetch_add(1, Ordering::SeqCst);
      });
      // Still delivering, so the callback has to wait.
      assert_eq!(c_settled.load(Ordering::SeqCst), 0);
    }));
    *slot.lock().unwrap() = Some(link.clone());

    link
      .subscribe(&observable::never(), &scheduler::trampoline(), &Subscriber::new())
      .unwrap();
    link.deliver(Notification::Next(1));
    assert_eq!(settled.load(Ordering::SeqCst), 1);
    assert_eq!(link.state(), LinkState::Canceled);
    *slot.lock().unwrap() = None;
  }

  #[test]
  fn reentrant_notification_is_a_violation() {
    let log = Arc::new(StdMutex::new(vec![]));
    let slot: Arc<StdMutex<Option<Arc<Link<i32>>>>> = Arc::default();
    let (c_slot, c_log) = (slot.clone(), log.clone());
    let link = Link::new(Observer::new(move |n| {
      let reenter = matches!(n, Notification::Next(1));
      c_log.lock().unwrap().push(n);
      if reenter {
        let link = c_slot.lock().unwrap().clone().unwrap();
        link.deliver(Notification::Next(2));
      }
    }));
    *slot.lock().unwrap() = Some(link.clone());

    let parent = Subscriber::new();
    link
      .subscribe(&observable::never(), &scheduler::trampoline(), &parent)
      .unwrap();
    link.deliver(Notification::Next(1));
    link.deliver(Notification::Next(3));

    assert_eq!(link.state(), LinkState::Errored);
    assert_eq!(
      *log.lock().unwrap(),
      vec![
        Notification::Next(1),
        Notification::Error(RxError::Violation(Violation::ConcurrentNotification)),
      ]
    );
    *slot.lock().unwrap() = None;
  }
}
