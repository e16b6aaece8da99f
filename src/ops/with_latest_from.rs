use std::sync::Arc;

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
  ops::{gather, Serialized},
};

struct LatestState<T> {
  /// Latest value per secondary source.
  latest: Vec<Option<T>>,
  missing: usize,
}

/// Emits on every value of the first source, combined with the latest value
/// of every other source.
///
/// Values of the first source are dropped until each of the other sources has
/// emitted at least once. Completes when the first source completes; any
/// error terminates right away.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let scheduler = scheduler::virtual_time();
/// let primary = observable::interval(Duration::from_millis(10)).take(2);
/// let values = ops::with_latest_from(vec![primary, observable::of(7)]).to_vec(&scheduler);
/// assert_eq!(values, Ok(vec![vec![0, 7], vec![1, 7]]));
/// ```
pub fn with_latest_from<T>(sources: Vec<Observable<T>>) -> Observable<Vec<T>>
where
  T: Clone + Send + 'static,
{
  Observable::new(move |observer, scheduler, subscriber| {
    let secondaries = sources.len().saturating_sub(1);
    let state = LatestState { latest: vec![None; secondaries], missing: secondaries };
    let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
    if sources.is_empty() {
      gate.with(|_, emit| emit.complete());
      return;
    }

    let (sources, scheduler_c, gate_c) = (sources.clone(), scheduler.clone(), gate.clone());
    let handle = scheduler.schedule(Box::new(move || {
      for (idx, source) in sources.iter().enumerate() {
        let child = gate_c.scope().add();
        let (gate, child_c) = (gate_c.clone(), child.clone());
        let observer = Observer::new(move |n| match (idx, n) {
          (0, Notification::Next(v)) => gate.with(|st, emit| {
            if st.missing == 0 {
              let mut values = Vec::with_capacity(st.latest.len() + 1);
              values.push(v);
              values.extend(st.latest.iter().flatten().cloned());
              emit.next(values);
            }
          }),
          (0, Notification::Complete) => gate.with(|_, emit| emit.complete()),
          (_, Notification::Next(v)) => gate.with(|st, _| {
            if st.latest[idx - 1].replace(v).is_none() {
              st.missing -= 1;
            }
          }),
          (_, Notification::Complete) => child_c.unsubscribe(),
          (_, Notification::Error(e)) => gate.with(|_, emit| emit.error(e)),
        });
        source.subscribe_with(observer, &scheduler_c, &child);
      }
    }));
    gate.scope().on_unsubscribe(move || handle.cancel());
  })
}

/// Like [`with_latest_from`], taking the sources from an outer observable.
/// The first inner observable is the primary one.
pub fn with_latest_from_all<T>(sources: Observable<Observable<T>>) -> Observable<Vec<T>>
where
  T: Clone + Send + 'static,
{
  gather(sources, with_latest_from)
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::{error::RxError, observable, scheduler, subject::Subject};

  #[test]
  fn primary_drives_emission() {
    let scheduler = scheduler::trampoline();
    let primary = Subject::<i32>::default();
    let other = Subject::<i32>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();
    let subscription = with_latest_from(vec![primary.observable(), other.observable()])
      .subscribe(Observer::on_next(move |v| c_log.lock().unwrap().push(v)), &scheduler);

    primary.send(1);
    other.send(10);
    other.send(20);
    primary.send(2);
    other.complete();
    primary.send(3);
    primary.complete();

    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(*log.lock().unwrap(), vec![vec![2, 20], vec![3, 20]]);
  }

  #[test]
  fn secondary_error_terminates() {
    let scheduler = scheduler::trampoline();
    let result = with_latest_from(vec![
      observable::never(),
      observable::throw_err::<i32>(RxError::msg("secondary")),
    ])
    .wait(&scheduler);
    assert_eq!(result, Err(RxError::msg("secondary")));
  }

  #[test]
  fn single_source_passes_through() {
    let values = with_latest_from(vec![observable::from_iter([1, 2])])
      .to_vec(&scheduler::trampoline());
    assert_eq!(values, Ok(vec![vec![1], vec![2]]));
  }

  #[test]
  fn all_variant() {
    let scheduler = scheduler::virtual_time();
    let sources = observable::from_iter(vec![
      observable::timer(scheduler::Duration::from_millis(5)),
      observable::of(9),
    ]);
    assert_eq!(with_latest_from_all(sources).to_vec(&scheduler), Ok(vec![vec![0, 9]]));
  }
}
