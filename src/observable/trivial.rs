use crate::{error::RxError, observable::Observable};

/// Creates an observable that emits no items, just terminates with an error.
///
/// # Arguments
///
/// * `err` - An error to emit and terminate with
pub fn throw_err<T: 'static>(err: RxError) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let err = err.clone();
    let handle = scheduler.schedule(Box::new(move || observer.error(err)));
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

/// Creates an observable that produces no values.
///
/// Completes immediately. Never emits an error.
pub fn empty<T: 'static>() -> Observable<T> {
  Observable::new(|observer, scheduler, subscriber| {
    let handle = scheduler.schedule(Box::new(move || observer.complete()));
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

/// Creates an observable that never emits anything.
///
/// Neither emits a value, nor completes, nor emits an error.
pub fn never<T: 'static>() -> Observable<T> { Observable::new(|_, _, _| {}) }

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  };

  use super::*;
  use crate::{observer::Observer, scheduler};

  #[test]
  fn throw() {
    let scheduler = scheduler::trampoline();
    let value_emitted = Arc::new(AtomicBool::new(false));
    let c_value = value_emitted.clone();
    let result = throw_err::<i32>(RxError::msg("error"))
      .subscribe(
        Observer::on_next(move |_| c_value.store(true, Ordering::SeqCst)),
        &scheduler,
      )
      .wait();
    assert_eq!(result, Err(RxError::msg("error")));
    assert!(!value_emitted.load(Ordering::SeqCst));
  }

  #[test]
  fn empty_completes() {
    assert_eq!(empty::<i32>().to_vec(&scheduler::trampoline()), Ok(vec![]));
  }

  #[test]
  fn never_stays_subscribed() {
    let scheduler = scheduler::trampoline();
    let subscriber = never::<i32>().subscribe(Observer::ignore(), &scheduler);
    scheduler.wait();
    assert!(subscriber.subscribed());
    subscriber.unsubscribe();
  }
}
