use crate::{observable::Observable, scheduler::Duration};

/// Creates an observable which will fire at `period` into the future, and will
/// repeat every `period` after. Emits the sequence number starting at 0.
pub fn interval(period: Duration) -> Observable<usize> {
  Observable::new(move |observer, scheduler, subscriber| {
    let subscriber_c = subscriber.clone();
    let mut seq = 0;
    let handle = scheduler.schedule_future_recursive(
      period,
      Box::new(move |recur| {
        if !subscriber_c.subscribed() {
          return;
        }
        observer.next(seq);
        seq += 1;
        recur.again_in(period);
      }),
    );
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{observer::Observer, scheduler};

  #[test]
  fn ticks_on_virtual_time() {
    let scheduler = scheduler::virtual_time();
    let start = scheduler.now();
    let ticks = Arc::new(Mutex::new(vec![]));
    let (c_ticks, c_scheduler) = (ticks.clone(), scheduler.clone());
    let result = interval(Duration::from_millis(10))
      .take(4)
      .subscribe(
        Observer::on_next(move |v| {
          let at = c_scheduler.since(start).as_millis();
          c_ticks.lock().unwrap().push((v, at))
        }),
        &scheduler,
      )
      .wait();
    assert_eq!(result, Ok(()));
    assert_eq!(
      *ticks.lock().unwrap(),
      vec![(0, 10), (1, 20), (2, 30), (3, 40)]
    );
    assert_eq!(scheduler.count(), 0);
  }

  #[cfg(feature = "futures-scheduler")]
  #[test]
  fn shared() {
    let scheduler = scheduler::thread_pool();
    let stamp = std::time::Instant::now();
    let values = interval(Duration::from_millis(1)).take(5).to_vec(&scheduler);
    assert_eq!(values, Ok(vec![0, 1, 2, 3, 4]));
    assert!(stamp.elapsed() >= Duration::from_millis(5));
  }
}
