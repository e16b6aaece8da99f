//! Multicasting a cold observable through a [`Subject`].
//!
//! [`Observable::publish`] returns a [`Connectable`]: subscribers attach to
//! its subject, and the source only starts when [`Connectable::connect`] is
//! called. [`Connectable::auto_connect`] connects by itself once enough
//! subscribers have arrived, and [`Observable::share`] is the common
//! `publish` + `auto_connect(1)` pair.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{
  observable::Observable,
  observer::Observer,
  ops::Link,
  scheduler::SharedScheduler,
  subject::{Subject, SubjectConfig},
  subscription::Subscriber,
};

/// An observable that shares one subscription of its source among all of
/// its subscribers, but only subscribes that source when connected.
pub struct Connectable<T> {
  source: Observable<T>,
  config: SubjectConfig,
  subject: Subject<T>,
}

impl<T> Clone for Connectable<T> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      config: self.config.clone(),
      subject: self.subject.clone(),
    }
  }
}

impl<T: Clone + Send + Sync + 'static> Connectable<T> {
  /// Subscribe the source into the subject. The returned subscriber
  /// disconnects the source; subscribers of [`Connectable::observable`]
  /// are not affected.
  pub fn connect(&self, scheduler: &SharedScheduler) -> Subscriber {
    debug!("connecting published source");
    self.source.subscribe(self.subject.observer(), scheduler)
  }

  /// The shared side. Subscribing never starts the source.
  pub fn observable(&self) -> Observable<T> { self.subject.observable() }

  pub fn subject(&self) -> &Subject<T> { &self.subject }

  /// Connect automatically once `count` subscribers have subscribed.
  ///
  /// The connection outlives its subscribers: unsubscribing all of them does
  /// not disconnect the source. Once the source has terminated, the next
  /// subscriber starts over with an empty subject and a new connection.
  pub fn auto_connect(&self, count: usize) -> Observable<T> {
    let shared = Arc::new(AutoConnect {
      source: self.source.clone(),
      config: self.config.clone(),
      count,
      state: Mutex::new(AutoState {
        subject: self.subject.clone(),
        waiting: 0,
        connected: false,
      }),
    });
    Observable::new(move |observer, scheduler, subscriber| {
      shared.subscribe(observer, scheduler, subscriber)
    })
  }
}

struct AutoConnect<T> {
  source: Observable<T>,
  config: SubjectConfig,
  count: usize,
  state: Mutex<AutoState<T>>,
}

struct AutoState<T> {
  subject: Subject<T>,
  waiting: usize,
  connected: bool,
}

impl<T: Clone + Send + Sync + 'static> AutoConnect<T> {
  fn subscribe(
    &self,
    observer: Observer<T>,
    scheduler: &SharedScheduler,
    subscriber: &Subscriber,
  ) {
    let (subject, connect) = {
      let mut state = self.state.lock();
      if state.connected && state.subject.is_closed() {
        debug!("source terminated, activating a fresh subject");
        state.subject = Subject::new(self.config.clone());
        state.connected = false;
        state.waiting = 0;
      }
      state.waiting += 1;
      let connect = !state.connected && state.waiting >= self.count;
      state.connected |= connect;
      (state.subject.clone(), connect)
    };

    subject.observable().subscribe_with(observer, scheduler, subscriber);

    if connect {
      debug!(subscribers = self.count, "auto-connecting source");
      let link = Link::new(subject.observer());
      if let Err(err) = link.subscribe(&self.source, scheduler, &Subscriber::new()) {
        subject.error(err);
      }
    }
  }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
  /// Turn this observable into a hot [`Connectable`] backed by a subject
  /// built from `config`.
  ///
  /// ```rust
  /// use rxcore::prelude::*;
  ///
  /// let scheduler = scheduler::trampoline();
  /// let published = observable::from_iter(0..3).publish(SubjectConfig::new());
  /// let squares = published.observable().map(|v| v * v);
  /// let sub = squares.subscribe(Observer::on_next(|v| println!("{v}")), &scheduler);
  /// published.connect(&scheduler);
  /// assert_eq!(sub.wait(), Ok(()));
  /// ```
  pub fn publish(&self, config: SubjectConfig) -> Connectable<T> {
    Connectable {
      source: self.clone(),
      subject: Subject::new(config.clone()),
      config,
    }
  }

  /// Share one subscription of this observable among all subscribers,
  /// connecting on the first one.
  pub fn share(&self) -> Observable<T> { self.publish(SubjectConfig::default()).auto_connect(1) }
}
