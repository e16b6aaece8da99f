use std::sync::Arc;

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
};

impl<T: 'static> Observable<T> {
  /// Emit only the values for which `predicate` returns `true`.
  pub fn filter<F>(&self, predicate: F) -> Observable<T>
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    let source = self.clone();
    let predicate = Arc::new(predicate);
    Observable::new(move |observer, scheduler, subscriber| {
      let predicate = predicate.clone();
      source.subscribe_with(
        Observer::new(move |n| match n {
          Notification::Next(v) if !predicate(&v) => {}
          n => observer.notify(n),
        }),
        scheduler,
        subscriber,
      );
    })
  }
}

#[cfg(test)]
mod tests {
  use crate::{observable, scheduler};

  #[test]
  fn fork_and_shared() {
    let even = observable::from_iter(0..10).filter(|v| v % 2 == 0);
    let scheduler = scheduler::trampoline();
    assert_eq!(even.to_vec(&scheduler), Ok(vec![0, 2, 4, 6, 8]));
    assert_eq!(
      even.filter(|v| *v > 4).to_vec(&scheduler),
      Ok(vec![6, 8])
    );
  }
}
