//! Subject: one replay buffer, written through an observer-shaped side and
//! read through an observable-shaped side.
//!
//! Every subscription to [`Subject::observable`] gets its own [`Endpoint`]
//! and is paced independently: it drains whatever is buffered from a task on
//! its own scheduler, then parks a waker in the buffer until the next send
//! or close.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  error::RxError,
  observable::Observable,
  observer::{Notification, Observer},
  scheduler::{Duration, SharedScheduler},
  subscription::Subscriber,
};

mod replay_buffer;
pub use replay_buffer::{Endpoint, OverflowPolicy, ReplayBuffer};

/// Buffer settings of a [`Subject`].
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let config = SubjectConfig::new()
///   .capacity(64)
///   .policy(OverflowPolicy::EvictOldest)
///   .max_age(Duration::from_secs(5));
/// let subject = Subject::<u32>::new(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfig {
  capacity: usize,
  policy: OverflowPolicy,
  max_age: Option<Duration>,
}

impl SubjectConfig {
  /// Capacity 16, [`OverflowPolicy::DropOnOverflow`], values never expire.
  pub fn new() -> Self {
    Self { capacity: 16, policy: OverflowPolicy::DropOnOverflow, max_age: None }
  }

  /// Number of values kept for replay.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn policy(mut self, policy: OverflowPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Values older than `max_age` are no longer replayed.
  pub fn max_age(mut self, max_age: Duration) -> Self {
    self.max_age = Some(max_age);
    self
  }
}

impl Default for SubjectConfig {
  fn default() -> Self { Self::new() }
}

/// A hot source backed by a [`ReplayBuffer`]. Clones share the buffer.
pub struct Subject<T> {
  buffer: Arc<ReplayBuffer<T>>,
}

impl<T> Clone for Subject<T> {
  fn clone(&self) -> Self { Self { buffer: self.buffer.clone() } }
}

impl<T: Clone + Send + Sync + 'static> Default for Subject<T> {
  fn default() -> Self { Self::new(SubjectConfig::default()) }
}

impl<T> std::fmt::Debug for Subject<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Subject").field(&self.buffer).finish()
  }
}

impl<T: Clone + Send + Sync + 'static> Subject<T> {
  pub fn new(config: SubjectConfig) -> Self {
    Self {
      buffer: Arc::new(ReplayBuffer::new(config.capacity, config.policy, config.max_age)),
    }
  }

  /// Append `value` for every subscriber. Ignored once closed.
  pub fn send(&self, value: T) { self.buffer.send(value); }

  /// Terminate the subject; `None` completes it. Later sends are ignored.
  pub fn close(&self, err: Option<RxError>) { self.buffer.close(err); }

  #[inline]
  pub fn complete(&self) { self.close(None) }

  #[inline]
  pub fn error(&self, err: RxError) { self.close(Some(err)) }

  pub fn is_closed(&self) -> bool { self.buffer.is_closed() }

  /// A raw read cursor, for consumers that poll instead of subscribing.
  pub fn endpoint(&self) -> Endpoint<T> { self.buffer.endpoint() }

  pub fn buffer(&self) -> &Arc<ReplayBuffer<T>> { &self.buffer }

  /// The send side as an [`Observer`], to feed the subject from a source.
  pub fn observer(&self) -> Observer<T> {
    let buffer = self.buffer.clone();
    Observer::new(move |n| match n {
      Notification::Next(v) => {
        buffer.send(v);
      }
      Notification::Error(e) => {
        buffer.close(Some(e));
      }
      Notification::Complete => {
        buffer.close(None);
      }
    })
  }

  /// The subscribe side. Each subscription replays what is buffered, then
  /// follows live values until the subject is closed.
  pub fn observable(&self) -> Observable<T> {
    let buffer = self.buffer.clone();
    Observable::new(move |observer, scheduler, subscriber| {
      let delivery = Arc::new(Delivery {
        endpoint: Mutex::new(buffer.endpoint()),
        observer,
        scheduler: scheduler.clone(),
        subscriber: subscriber.clone(),
      });
      let c_delivery = delivery.clone();
      subscriber.on_unsubscribe(move || c_delivery.endpoint.lock().detach());
      delivery.schedule();
    })
  }
}

/// Per-subscription state of one subject reader.
struct Delivery<T> {
  endpoint: Mutex<Endpoint<T>>,
  observer: Observer<T>,
  scheduler: SharedScheduler,
  subscriber: Subscriber,
}

impl<T: Clone + Send + Sync + 'static> Delivery<T> {
  fn schedule(self: &Arc<Self>) {
    let delivery = self.clone();
    self.scheduler.schedule(Box::new(move || delivery.drain()));
  }

  /// Deliver everything readable, then wait for the buffer to change.
  fn drain(self: &Arc<Self>) {
    loop {
      if !self.subscriber.subscribed() {
        return;
      }
      let mut endpoint = self.endpoint.lock();
      if let Some(value) = endpoint.recv() {
        drop(endpoint);
        self.observer.next(value);
        continue;
      }
      if let Some(result) = endpoint.closed() {
        drop(endpoint);
        match result {
          Ok(()) => self.observer.complete(),
          Err(err) => self.observer.error(err),
        }
        return;
      }
      let delivery = self.clone();
      if endpoint.notify_on_change(move || delivery.schedule()) {
        return;
      }
    }
  }
}
