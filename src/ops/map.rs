use std::sync::Arc;

use crate::observable::Observable;

impl<T: 'static> Observable<T> {
  /// Creates a new observable that applies `f` to every value of the source.
  ///
  /// ```rust
  /// use rxcore::prelude::*;
  ///
  /// let doubled = observable::from_iter(1..=3).map(|v| v * 2);
  /// assert_eq!(doubled.to_vec(&scheduler::trampoline()), Ok(vec![2, 4, 6]));
  /// ```
  pub fn map<U, F>(&self, f: F) -> Observable<U>
  where
    U: 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Observable::new(move |observer, scheduler, subscriber| {
      let f = f.clone();
      source.subscribe_with(
        crate::observer::Observer::new(move |n| observer.notify(n.map(|v| f(v)))),
        scheduler,
        subscriber,
      );
    })
  }
}

#[cfg(test)]
mod tests {
  use crate::{error::RxError, observable, scheduler};

  #[test]
  fn primitive_type() {
    let sum = observable::from_iter(100..101)
      .map(|v| v * 2)
      .to_vec(&scheduler::trampoline());
    assert_eq!(sum, Ok(vec![200]));
  }

  #[test]
  fn reference_lifetime_should_work() {
    let values = observable::of(vec![1, 2, 3])
      .map(|v| v.len())
      .to_vec(&scheduler::trampoline());
    assert_eq!(values, Ok(vec![3]));
  }

  #[test]
  fn errors_pass_through() {
    let result = observable::throw_err::<i32>(RxError::msg("boom"))
      .map(|v| v + 1)
      .wait(&scheduler::trampoline());
    assert_eq!(result, Err(RxError::msg("boom")));
  }
}
