use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
};

impl<T: 'static> Observable<T> {
  /// Emits only the first `count` values emitted by the source, then
  /// completes and cancels the source.
  ///
  /// If the source emits fewer than `count` values then all of its values are
  /// emitted, followed by its own terminal notification.
  ///
  /// ```rust
  /// use rxcore::prelude::*;
  ///
  /// let first = observable::interval(Duration::from_millis(1)).take(3);
  /// assert_eq!(first.to_vec(&scheduler::virtual_time()), Ok(vec![0, 1, 2]));
  /// ```
  pub fn take(&self, count: usize) -> Observable<T> {
    let source = self.clone();
    Observable::new(move |observer, scheduler, subscriber| {
      if count == 0 {
        observer.complete();
        return;
      }
      let upstream = subscriber.add();
      let hits = Arc::new(AtomicUsize::new(0));
      let upstream_c = upstream.clone();
      source.subscribe_with(
        Observer::new(move |n| match n {
          Notification::Next(v) => {
            let seen = hits.fetch_add(1, Ordering::AcqRel) + 1;
            if seen <= count {
              observer.next(v);
            }
            if seen == count {
              observer.complete();
              upstream_c.unsubscribe();
            }
          }
          n => {
            if hits.load(Ordering::Acquire) < count {
              observer.notify(n);
            }
          }
        }),
        scheduler,
        &upstream,
      );
    })
  }
}
