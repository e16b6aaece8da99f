//! Observable type and the subscribe entry points
//!
//! An [`Observable`] is an immutable, repeatable description of a producer: a
//! function of `(Observer, Scheduler, Subscriber)`. Subscribing simply calls
//! that function; all per-subscription state is created inside it.
//!
//! ```rust
//! use rxcore::prelude::*;
//!
//! let scheduler = scheduler::trampoline();
//! let values = observable::from_iter(vec![1, 2, 3])
//!   .map(|v| v * 10)
//!   .to_vec(&scheduler)
//!   .unwrap();
//! assert_eq!(values, vec![10, 20, 30]);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  error::Result,
  observer::{Notification, Observer},
  scheduler::SharedScheduler,
  subscription::Subscriber,
};

mod create;
mod defer;
mod from_iter;
mod interval;
mod timer;
mod trivial;

pub use create::{create, Emitter};
pub use defer::defer;
pub use from_iter::{from_iter, of};
pub use interval::interval;
pub use timer::timer;
pub use trivial::{empty, never, throw_err};

type SubscribeFn<T> = dyn Fn(Observer<T>, &SharedScheduler, &Subscriber) + Send + Sync;

/// A lazy, repeatable description of a push based producer.
pub struct Observable<T> {
  subscribe: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
  #[inline]
  fn clone(&self) -> Self { Self { subscribe: self.subscribe.clone() } }
}

impl<T: 'static> Observable<T> {
  /// param `subscribe`: the function that is called when the Observable is
  /// subscribed to. It receives the observer to notify, the scheduler to run
  /// work on and the subscriber whose cancellation it must honour.
  pub fn new(
    subscribe: impl Fn(Observer<T>, &SharedScheduler, &Subscriber) + Send + Sync + 'static,
  ) -> Self {
    Self { subscribe: Arc::new(subscribe) }
  }

  /// Invoke the producer. All effects are the observer calls it makes, now or
  /// from tasks scheduled on `scheduler`.
  #[inline]
  pub fn subscribe_with(
    &self,
    observer: Observer<T>,
    scheduler: &SharedScheduler,
    subscriber: &Subscriber,
  ) {
    (self.subscribe)(observer, scheduler, subscriber)
  }

  /// Subscribe under a fresh root [`Subscriber`] and return it.
  ///
  /// The returned subscriber is finished with the stream's outcome, so
  /// [`Subscriber::wait`] yields the terminal error. On a non-concurrent
  /// scheduler `wait` drives the scheduler first, and fails with
  /// [`RxError::Recursion`](crate::error::RxError::Recursion) when called from one of that scheduler's own
  /// tasks on a stream the drain could not finish. Notifications arriving
  /// after the subscriber was cancelled are dropped.
  pub fn subscribe(&self, observer: Observer<T>, scheduler: &SharedScheduler) -> Subscriber {
    let subscriber = Subscriber::new();
    if !scheduler.is_concurrent() {
      let scheduler = scheduler.clone();
      subscriber.on_wait(move || {
        scheduler.wait();
        !scheduler.is_running_here()
      });
    }
    let done = subscriber.clone();
    let sink = Observer::new(move |n: Notification<T>| {
      if !done.subscribed() {
        return;
      }
      match n {
        Notification::Next(v) => observer.next(v),
        Notification::Error(e) => {
          observer.error(e.clone());
          done.done(Some(e));
        }
        Notification::Complete => {
          observer.complete();
          done.done(None);
        }
      }
    });
    self.subscribe_with(sink, scheduler, &subscriber);
    subscriber
  }

  /// Subscribe, ignore values and block until the stream terminates.
  pub fn wait(&self, scheduler: &SharedScheduler) -> Result<()> {
    self.subscribe(Observer::ignore(), scheduler).wait()
  }

  /// Subscribe and collect every value until the stream terminates.
  pub fn to_vec(&self, scheduler: &SharedScheduler) -> Result<Vec<T>>
  where
    T: Send,
  {
    let values = Arc::new(Mutex::new(Vec::new()));
    let c_values = values.clone();
    self
      .subscribe(Observer::on_next(move |v| c_values.lock().push(v)), scheduler)
      .wait()?;
    let mut values = values.lock();
    Ok(std::mem::take(&mut *values))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex as StdMutex;

  use super::*;
  use crate::{error::RxError, scheduler};

  #[test]
  fn proxy_call() {
    let log = Arc::new(StdMutex::new(vec![]));
    let c_log = log.clone();
    let o = Observable::new(|observer, _, _| {
      observer.next(1);
      observer.next(2);
      observer.complete();
      // Dropped by `subscribe`: the subscriber is already finished.
      observer.next(3);
      observer.error(RxError::msg("never dispatch error"));
    });
    let s = o.subscribe(
      Observer::new(move |n| c_log.lock().unwrap().push(n)),
      &scheduler::trampoline(),
    );
    assert_eq!(s.wait(), Ok(()));
    assert_eq!(
      *log.lock().unwrap(),
      vec![Notification::Next(1), Notification::Next(2), Notification::Complete]
    );
  }

  #[test]
  fn repeatable() {
    let scheduler = scheduler::trampoline();
    let o = from_iter(vec![1, 2, 3]);
    assert_eq!(o.to_vec(&scheduler), Ok(vec![1, 2, 3]));
    assert_eq!(o.clone().to_vec(&scheduler), Ok(vec![1, 2, 3]));
  }

  #[test]
  fn wait_yields_error() {
    let scheduler = scheduler::trampoline();
    assert_eq!(
      throw_err::<i32>(RxError::msg("bad")).wait(&scheduler),
      Err(RxError::msg("bad"))
    );
  }

  #[test]
  fn wait_inside_a_task() {
    let scheduler = scheduler::trampoline();
    let subject = crate::subject::Subject::<i32>::default();
    let results = Arc::new(StdMutex::new(vec![]));
    let (c_results, c_scheduler) = (results.clone(), scheduler.clone());
    scheduler.schedule(Box::new(move || {
      let mut results = c_results.lock().unwrap();
      // Finishes within the nested drain.
      results.push(from_iter(0..3).to_vec(&c_scheduler).map(|v| v.len()));
      // Would need this very task to return first.
      results.push(subject.observable().to_vec(&c_scheduler).map(|v| v.len()));
    }));
    assert_eq!(*results.lock().unwrap(), vec![Ok(3), Err(RxError::Recursion)]);
  }
}
