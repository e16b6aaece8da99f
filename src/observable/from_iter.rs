use crate::observable::Observable;

/// Creates an observable that produces values from an iterator.
///
/// Completes when all elements have been emitted. Never emits an error. Each
/// element is a separately scheduled step, so a cooperative scheduler
/// interleaves it fairly with other producers and cancellation is checked
/// before every value.
///
/// # Arguments
///
/// * `iter` - An iterator to get all the values from.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let values = observable::from_iter(0..3).to_vec(&scheduler::trampoline());
/// assert_eq!(values, Ok(vec![0, 1, 2]));
/// ```
pub fn from_iter<I>(iter: I) -> Observable<I::Item>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  Observable::new(move |observer, scheduler, subscriber| {
    let subscriber_c = subscriber.clone();
    let handle = scheduler.schedule_loop(iter.clone().into_iter(), move |mut it, recur| {
      if !subscriber_c.subscribed() {
        return;
      }
      match it.next() {
        Some(v) => {
          observer.next(v);
          recur.again(it);
        }
        None => observer.complete(),
      }
    });
    subscriber.on_unsubscribe(move || handle.cancel());
  })
}

/// Creates an observable producing a single value.
pub fn of<T>(v: T) -> Observable<T>
where
  T: Clone + Send + Sync + 'static,
{
  from_iter([v])
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{observer::Observer, scheduler};

  #[test]
  fn from_range() {
    let scheduler = scheduler::trampoline();
    let hit_count = Arc::new(Mutex::new(0));
    let completed = Arc::new(Mutex::new(false));
    let (c_hit, c_completed) = (hit_count.clone(), completed.clone());
    from_iter(0..100)
      .subscribe(
        Observer::from_fns(
          move |_| *c_hit.lock().unwrap() += 1,
          |_| {},
          move || *c_completed.lock().unwrap() = true,
        ),
        &scheduler,
      )
      .wait()
      .unwrap();

    assert_eq!(*hit_count.lock().unwrap(), 100);
    assert!(*completed.lock().unwrap());
  }

  #[test]
  fn of_single() {
    assert_eq!(of(7).to_vec(&scheduler::trampoline()), Ok(vec![7]));
  }

  #[test]
  fn large_iterators_do_not_grow_the_stack() {
    let count = from_iter(0..200_000)
      .to_vec(&scheduler::trampoline())
      .map(|v| v.len());
    assert_eq!(count, Ok(200_000));
  }

  #[test]
  fn stops_when_unsubscribed() {
    let scheduler = scheduler::virtual_time();
    let seen = Arc::new(Mutex::new(vec![]));
    let c_seen = seen.clone();
    let subscriber = crate::subscription::Subscriber::new();
    let c_subscriber = subscriber.clone();
    from_iter(0..10).subscribe_with(
      Observer::on_next(move |v| {
        c_seen.lock().unwrap().push(v);
        if v == 2 {
          c_subscriber.unsubscribe();
        }
      }),
      &scheduler,
      &subscriber,
    );
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
  }
}
