use crate::{observable::Observable, scheduler::Duration};

/// Creates an observable that emits `0` after `due` and then completes.
pub fn timer(due: Duration) -> Observable<usize> {
  Observable::new(move |observer, scheduler, subscriber| {
    let handle = scheduler.schedule_future(
      due,
      Box::new(move || {
        observer.next(0);
        observer.complete();
      }),
    );
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{observer::Observer, scheduler};

  #[test]
  fn fires_once_at_due_time() {
    let scheduler = scheduler::virtual_time();
    let start = scheduler.now();
    assert_eq!(timer(Duration::from_secs(3)).to_vec(&scheduler), Ok(vec![0]));
    assert_eq!(scheduler.since(start), Duration::from_secs(3));
  }

  #[test]
  fn cancelled_timer_stays_silent() {
    let scheduler = scheduler::virtual_time();
    let subscriber = timer(Duration::from_secs(1)).subscribe(
      Observer::new(|_| unreachable!("cancelled timer fired")),
      &scheduler,
    );
    subscriber.unsubscribe();
    scheduler.wait();
  }
}
