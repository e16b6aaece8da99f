use std::sync::{
  atomic::{AtomicU8, Ordering},
  Arc,
};

use tracing::error;

use crate::{
  error::Violation,
  observable::Observable,
  observer::{Notification, Observer},
};

const IDLE: u8 = 0;
const BUSY: u8 = 1;
const TERMINATED: u8 = 2;

type Handler = Arc<dyn Fn(Violation) + Send + Sync>;

fn validated<T: 'static>(source: &Observable<T>, handler: Option<Handler>) -> Observable<T> {
  let source = source.clone();
  Observable::new(move |observer, scheduler, subscriber| {
    let state = Arc::new(AtomicU8::new(IDLE));
    let handler = handler.clone();
    source.subscribe_with(
      Observer::new(move |n: Notification<T>| {
        let entered = state.compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire);
        if let Err(current) = entered {
          let violation = if current == BUSY {
            Violation::ConcurrentNotification
          } else {
            Violation::AfterTerminal
          };
          error!(%violation, "observer contract violated");
          match &handler {
            Some(handler) => return handler(violation),
            None => panic!("observer contract violated: {violation}"),
          }
        }
        let next = if n.is_terminal() { TERMINATED } else { IDLE };
        observer.notify(n);
        state.store(next, Ordering::Release);
      }),
      scheduler,
      subscriber,
    );
  })
}

impl<T: 'static> Observable<T> {
  /// Check every notification of this observable against the observer
  /// contract. Overlapping or post-terminal notifications are dropped and
  /// reported by panicking.
  pub fn validate(&self) -> Observable<T> { validated(self, None) }

  /// Like [`Observable::validate`], but hands violations to `handler`
  /// instead of panicking.
  pub fn validate_with(
    &self,
    handler: impl Fn(Violation) + Send + Sync + 'static,
  ) -> Observable<T> {
    validated(self, Some(Arc::new(handler)))
  }
}
