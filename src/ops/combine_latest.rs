use std::sync::Arc;

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
  ops::{gather, Either, Serialized},
};

type Project<T, U> = Arc<dyn Fn(Vec<T>) -> Option<U> + Send + Sync>;

struct CombineState<T> {
  latest: Vec<Option<T>>,
  /// Sources that have not produced a value yet.
  missing: usize,
  active: usize,
}

fn combine_with<T, U>(sources: Vec<Observable<T>>, project: Project<T, U>) -> Observable<U>
where
  T: Clone + Send + 'static,
  U: Send + 'static,
{
  Observable::new(move |observer, scheduler, subscriber| {
    let count = sources.len();
    let state = CombineState { latest: vec![None; count], missing: count, active: count };
    let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
    if count == 0 {
      gate.with(|_, emit| emit.complete());
      return;
    }

    let (sources, scheduler_c, gate_c, project) =
      (sources.clone(), scheduler.clone(), gate.clone(), project.clone());
    let handle = scheduler.schedule(Box::new(move || {
      for (idx, source) in sources.iter().enumerate() {
        let child = gate_c.scope().add();
        let (gate, project, child_c) = (gate_c.clone(), project.clone(), child.clone());
        source.subscribe_with(
          Observer::new(move |n| {
            if !child_c.subscribed() {
              return;
            }
            match n {
              Notification::Next(v) => gate.with(|st, emit| {
                if st.latest[idx].replace(v).is_none() {
                  st.missing = st.missing.saturating_sub(1);
                }
                if st.missing == 0 {
                  let values = st.latest.iter().flatten().cloned().collect();
                  if let Some(out) = project(values) {
                    emit.next(out);
                  }
                }
              }),
              Notification::Error(e) => gate.with(|_, emit| emit.error(e)),
              Notification::Complete => {
                gate.with(|st, emit| {
                  st.active = st.active.saturating_sub(1);
                  if st.active == 0 {
                    emit.complete();
                  }
                });
                child_c.unsubscribe();
              }
            }
          }),
          &scheduler_c,
          &child,
        );
      }
    }));
    gate.scope().on_unsubscribe(move || handle.cancel());
  })
}

/// Emits the latest value of every source whenever any source emits, once
/// every source has emitted at least once.
///
/// Completes when all sources have completed; any error terminates right
/// away.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let pairs = ops::combine_latest(vec![
///   observable::from_iter([1]),
///   observable::from_iter([10, 20]),
/// ]);
/// assert_eq!(
///   pairs.to_vec(&scheduler::trampoline()),
///   Ok(vec![vec![1, 10], vec![1, 20]])
/// );
/// ```
pub fn combine_latest<T>(sources: Vec<Observable<T>>) -> Observable<Vec<T>>
where
  T: Clone + Send + 'static,
{
  combine_with(sources, Arc::new(Some))
}

/// Like [`combine_latest`], taking the sources from an outer observable.
///
/// The inner observables are collected until the outer one completes, and
/// only then subscribed together.
pub fn combine_latest_all<T>(sources: Observable<Observable<T>>) -> Observable<Vec<T>>
where
  T: Clone + Send + 'static,
{
  gather(sources, combine_latest)
}

/// Combine the latest values of two differently typed sources into pairs.
pub fn combine_latest2<A, B>(a: &Observable<A>, b: &Observable<B>) -> Observable<(A, B)>
where
  A: Clone + Send + 'static,
  B: Clone + Send + 'static,
{
  combine_with(
    vec![a.map(Either::Left), b.map(Either::Right)],
    Arc::new(|values: Vec<Either<A, B>>| {
      let mut values = values.into_iter();
      match (values.next(), values.next()) {
        (Some(Either::Left(a)), Some(Either::Right(b))) => Some((a, b)),
        _ => None,
      }
    }),
  )
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::{error::RxError, observable, scheduler, subject::Subject};

  #[test]
  fn waits_for_every_source() {
    let scheduler = scheduler::trampoline();
    let values = combine_latest(vec![
      observable::from_iter([1]),
      observable::from_iter([10, 20]),
    ])
    .to_vec(&scheduler);
    assert_eq!(values, Ok(vec![vec![1, 10], vec![1, 20]]));
  }

  #[test]
  fn emits_on_every_source_after_gate_opens() {
    let scheduler = scheduler::trampoline();
    let a = Subject::<i32>::default();
    let b = Subject::<&'static str>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();
    let subscription = combine_latest2(&a.observable(), &b.observable()).subscribe(
      Observer::on_next(move |pair| c_log.lock().unwrap().push(pair)),
      &scheduler,
    );

    a.send(1);
    a.send(2);
    assert!(log.lock().unwrap().is_empty());
    b.send("x");
    a.send(3);
    b.send("y");
    a.complete();
    assert!(subscription.subscribed());
    b.complete();

    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(*log.lock().unwrap(), vec![(2, "x"), (3, "x"), (3, "y")]);
  }

  #[test]
  fn error_terminates() {
    let scheduler = scheduler::trampoline();
    let result = combine_latest(vec![
      observable::never(),
      observable::throw_err::<i32>(RxError::msg("broken")),
    ])
    .wait(&scheduler);
    assert_eq!(result, Err(RxError::msg("broken")));
  }

  #[test]
  fn all_variant_collects_sources_first() {
    let scheduler = scheduler::trampoline();
    let sources = observable::from_iter(vec![observable::of(1), observable::of(2)]);
    assert_eq!(combine_latest_all(sources).to_vec(&scheduler), Ok(vec![vec![1, 2]]));
  }

  #[test]
  fn repeated_completion_counts_once() {
    let scheduler = scheduler::trampoline();
    let noisy = Observable::new(|observer: Observer<i32>, _, _| {
      observer.next(1);
      observer.complete();
      observer.complete();
    });
    let b = Subject::<i32>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();
    let subscription = combine_latest(vec![noisy, b.observable()]).subscribe(
      Observer::on_next(move |v| c_log.lock().unwrap().push(v)),
      &scheduler,
    );
    assert!(subscription.subscribed());
    b.send(2);
    assert!(subscription.subscribed());
    b.complete();
    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(*log.lock().unwrap(), vec![vec![1, 2]]);
  }
}
