//! Retry operator implementation
//!
//! `retry` resubscribes to its source when the source errors, up to a limit,
//! waiting a caller-supplied backoff between attempts. Resubscription always
//! happens from a task on the subscriber's scheduler, never from inside the
//! failing source's own call stack.
//!
//! ```rust
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//!
//! use rxcore::prelude::*;
//!
//! let attempts = Arc::new(AtomicUsize::new(0));
//! let c_attempts = attempts.clone();
//! let flaky = observable::create(move |emitter: Emitter<i32>| {
//!   if c_attempts.fetch_add(1, Ordering::SeqCst) < 2 {
//!     emitter.error(RxError::msg("not yet"));
//!   } else {
//!     emitter.next(1);
//!     emitter.complete();
//!   }
//! });
//!
//! let count: usize = 3;
//! assert_eq!(flaky.retry(count).to_vec(&scheduler::trampoline()), Ok(vec![1]));
//! assert_eq!(attempts.load(Ordering::SeqCst), 3);
//! ```

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
  error::RxError,
  observable::Observable,
  observer::{Notification, Observer},
  scheduler::{Duration, SharedScheduler, TaskHandle},
  subscription::Subscriber,
};

type Backoff = Arc<dyn Fn(usize) -> Duration + Send + Sync>;

/// A configuration struct for Retry.
///
/// Builder pattern for creating a retry policy.
///
/// # Examples
///
/// ```rust
/// use rxcore::{ops::RetryConfig, scheduler::Duration};
///
/// let config = RetryConfig::new()
///   .count(5)
///   .backoff(|attempt| Duration::from_millis(10 << attempt))
///   .reset_on_success();
/// ```
#[derive(Clone)]
pub struct RetryConfig {
  count: usize,
  backoff: Option<Backoff>,
  reset_on_success: bool,
}

impl RetryConfig {
  /// Creates a new default configuration (no retries, no delay).
  pub fn new() -> Self { Self { count: 0, backoff: None, reset_on_success: false } }

  /// Sets the maximum number of retry attempts.
  ///
  /// `count(3)` allows for 3 retries, resulting in a maximum of 4 total
  /// subscription attempts (1 initial + 3 retries).
  pub fn count(mut self, count: usize) -> Self {
    self.count = count;
    self
  }

  /// Wait the same `delay` before every retry.
  pub fn delay(self, delay: Duration) -> Self { self.backoff(move |_| delay) }

  /// Compute the wait before a retry from the attempt index (0 for the
  /// first retry).
  pub fn backoff(mut self, backoff: impl Fn(usize) -> Duration + Send + Sync + 'static) -> Self {
    self.backoff = Some(Arc::new(backoff));
    self
  }

  /// Reset the attempt counter whenever the source emits a value.
  pub fn reset_on_success(mut self) -> Self {
    self.reset_on_success = true;
    self
  }

  fn delay_for(&self, attempt: usize) -> Duration {
    self
      .backoff
      .as_ref()
      .map_or(Duration::ZERO, |backoff| backoff(attempt))
  }
}

impl Default for RetryConfig {
  fn default() -> Self { Self::new() }
}

impl From<usize> for RetryConfig {
  fn from(count: usize) -> Self { Self::new().count(count) }
}

impl fmt::Debug for RetryConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryConfig")
      .field("count", &self.count)
      .field("backoff", &self.backoff.is_some())
      .field("reset_on_success", &self.reset_on_success)
      .finish()
  }
}

/// Per-subscription state of one `retry`.
struct RetryContext<T> {
  source: Observable<T>,
  config: RetryConfig,
  observer: Observer<T>,
  scheduler: SharedScheduler,
  subscriber: Subscriber,
  attempts: Mutex<usize>,
  /// The resubscription waiting for its backoff, if any.
  pending: Arc<Mutex<Option<TaskHandle>>>,
}

impl<T: 'static> RetryContext<T> {
  fn subscribe(self: &Arc<Self>) {
    let attempt = self.subscriber.add();
    let ctx = self.clone();
    let attempt_c = attempt.clone();
    self.source.subscribe_with(
      Observer::new(move |n| match n {
        Notification::Next(v) => {
          if ctx.config.reset_on_success {
            *ctx.attempts.lock() = 0;
          }
          ctx.observer.next(v);
        }
        Notification::Error(err) => {
          attempt_c.unsubscribe();
          ctx.on_error(err);
        }
        Notification::Complete => {
          ctx.observer.complete();
          attempt_c.unsubscribe();
        }
      }),
      &self.scheduler,
      &attempt,
    );
  }

  fn on_error(self: &Arc<Self>, err: RxError) {
    let attempt = {
      let mut attempts = self.attempts.lock();
      let attempt = *attempts;
      *attempts += 1;
      attempt
    };
    if attempt >= self.config.count || !self.subscriber.subscribed() {
      self.observer.error(err);
      return;
    }
    let delay = self.config.delay_for(attempt);
    debug!(attempt = attempt + 1, ?delay, error = %err, "retrying source");
    let ctx = self.clone();
    let handle = self
      .scheduler
      .schedule_future(delay, Box::new(move || ctx.subscribe()));
    *self.pending.lock() = Some(handle);
  }
}

impl<T: 'static> Observable<T> {
  /// Resubscribe to this observable when it errors, following `config`.
  ///
  /// Once the retries are used up the last error is forwarded.
  pub fn retry(&self, config: impl Into<RetryConfig>) -> Observable<T> {
    let source = self.clone();
    let config = config.into();
    Observable::new(move |observer, scheduler, subscriber| {
      let pending: Arc<Mutex<Option<TaskHandle>>> = Arc::default();
      let c_pending = pending.clone();
      subscriber.on_unsubscribe(move || {
        if let Some(handle) = c_pending.lock().take() {
          handle.cancel();
        }
      });
      let ctx = Arc::new(RetryContext {
        source: source.clone(),
        config: config.clone(),
        observer,
        scheduler: scheduler.clone(),
        subscriber: subscriber.clone(),
        attempts: Mutex::new(0),
        pending,
      });
      ctx.subscribe();
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex as StdMutex,
  };

  use super::*;
  use crate::{observable, scheduler, subscription::PRUNE_FLOOR};

  fn failing(attempts: Arc<AtomicUsize>, succeed_at: usize) -> Observable<usize> {
    observable::create(move |emitter| {
      let n = attempts.fetch_add(1, Ordering::SeqCst);
      emitter.next(n);
      if n + 1 >= succeed_at {
        emitter.complete();
      } else {
        emitter.error(RxError::msg("flaky"));
      }
    })
  }

  #[test]
  fn retries_until_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let values = failing(attempts.clone(), 3)
      .retry(RetryConfig::new().count(5))
      .to_vec(&scheduler::trampoline());
    assert_eq!(values, Ok(vec![0, 1, 2]));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn gives_up_after_count() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let count: usize = 2;
    let result = failing(attempts.clone(), usize::MAX)
      .retry(count)
      .wait(&scheduler::trampoline());
    assert_eq!(result, Err(RxError::msg("flaky")));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn backoff_delays_resubscription() {
    let scheduler = scheduler::virtual_time();
    let start = scheduler.now();
    let stamps = Arc::new(StdMutex::new(vec![]));
    let (c_stamps, c_scheduler) = (stamps.clone(), scheduler.clone());
    let attempts = Arc::new(AtomicUsize::new(0));
    let result = failing(attempts, usize::MAX)
      .retry(
        RetryConfig::new()
          .count(3)
          .backoff(|attempt| Duration::from_millis(10 * (attempt as u64 + 1))),
      )
      .subscribe(
        Observer::on_next(move |_| {
          c_stamps
            .lock()
            .unwrap()
            .push(c_scheduler.since(start).as_millis())
        }),
        &scheduler,
      )
      .wait();
    assert_eq!(result, Err(RxError::msg("flaky")));
    assert_eq!(*stamps.lock().unwrap(), vec![0, 10, 30, 60]);
  }

  #[test]
  fn many_retries_keep_teardown_flat() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let root = Subscriber::new();
    failing(attempts.clone(), 500)
      .retry(RetryConfig::new().count(usize::MAX))
      .subscribe_with(Observer::ignore(), &scheduler::trampoline(), &root);
    assert_eq!(attempts.load(Ordering::SeqCst), 500);
    // Finished attempts are pruned in batches; only the cancel callback stays.
    assert!(root.teardown_size() <= PRUNE_FLOOR);
  }

  #[test]
  fn unsubscribe_cancels_pending_retry() {
    let scheduler = scheduler::virtual_time();
    let attempts = Arc::new(AtomicUsize::new(0));
    let subscription = failing(attempts.clone(), usize::MAX)
      .retry(RetryConfig::new().count(3).delay(Duration::from_millis(10)))
      .subscribe(Observer::ignore(), &scheduler);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    subscription.unsubscribe();
    scheduler.wait();
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn reset_on_success_restarts_the_count() {
    let attempts = Arc::new(AtomicUsize::new(0));
    // Every attempt emits once before failing, so one retry is always left.
    let values = failing(attempts.clone(), 4)
      .retry(RetryConfig::new().count(1).reset_on_success())
      .to_vec(&scheduler::trampoline());
    assert_eq!(values, Ok(vec![0, 1, 2, 3]));
  }
}
