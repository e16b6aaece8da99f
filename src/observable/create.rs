use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  error::RxError, observable::Observable, observer::Observer, subscription::Subscriber,
};

/// Handle given to a [`create`] producer.
///
/// It can be cloned and moved to other threads. After the first terminal call,
/// or once the subscription is cancelled, every call is ignored.
pub struct Emitter<T> {
  observer: Observer<T>,
  subscriber: Subscriber,
  finished: Arc<AtomicBool>,
}

impl<T> Clone for Emitter<T> {
  fn clone(&self) -> Self {
    Self {
      observer: self.observer.clone(),
      subscriber: self.subscriber.clone(),
      finished: self.finished.clone(),
    }
  }
}

impl<T> Emitter<T> {
  pub fn next(&self, value: T) {
    if !self.is_closed() {
      self.observer.next(value);
    }
  }

  pub fn error(&self, err: RxError) {
    if self.subscriber.subscribed() && !self.finished.swap(true, Ordering::AcqRel) {
      self.observer.error(err);
    }
  }

  pub fn complete(&self) {
    if self.subscriber.subscribed() && !self.finished.swap(true, Ordering::AcqRel) {
      self.observer.complete();
    }
  }

  /// Whether the consumer is gone or a terminal notification was sent.
  pub fn is_closed(&self) -> bool {
    self.finished.load(Ordering::Acquire) || !self.subscriber.subscribed()
  }

  /// The subscriber of this subscription, to register teardown logic.
  pub fn subscriber(&self) -> &Subscriber { &self.subscriber }
}

/// Creates an observable from a producer function.
///
/// `f` runs once per subscription, as a scheduled task, and pushes values
/// through the [`Emitter`]. It may keep the emitter and push later from
/// another thread.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let o = observable::create(|emitter: Emitter<i32>| {
///   emitter.next(1);
///   emitter.next(2);
///   emitter.complete();
/// });
/// assert_eq!(o.to_vec(&scheduler::trampoline()), Ok(vec![1, 2]));
/// ```
pub fn create<T, F>(f: F) -> Observable<T>
where
  T: 'static,
  F: Fn(Emitter<T>) + Send + Sync + 'static,
{
  let f = Arc::new(f);
  Observable::new(move |observer, scheduler, subscriber| {
    let emitter = Emitter {
      observer,
      subscriber: subscriber.clone(),
      finished: Arc::new(AtomicBool::new(false)),
    };
    let f = f.clone();
    let handle = scheduler.schedule(Box::new(move || f(emitter)));
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::scheduler;

  #[test]
  fn emitter_ignores_after_terminal() {
    let scheduler = scheduler::trampoline();
    let o = create(|emitter: Emitter<i32>| {
      emitter.next(1);
      emitter.error(RxError::msg("first"));
      emitter.next(2);
      emitter.complete();
      assert!(emitter.is_closed());
    });
    let seen = Arc::new(Mutex::new(vec![]));
    let c_seen = seen.clone();
    let result = o
      .subscribe(Observer::on_next(move |v| c_seen.lock().unwrap().push(v)), &scheduler)
      .wait();
    assert_eq!(result, Err(RxError::msg("first")));
    assert_eq!(*seen.lock().unwrap(), vec![1]);
  }

  #[test]
  fn emitter_from_another_thread() {
    let scheduler = scheduler::trampoline();
    let o = create(|emitter: Emitter<i32>| {
      std::thread::spawn(move || {
        for i in 0..3 {
          emitter.next(i);
        }
        emitter.complete();
      });
    });
    assert_eq!(o.to_vec(&scheduler), Ok(vec![0, 1, 2]));
  }
}
