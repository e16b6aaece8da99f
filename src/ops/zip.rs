use std::{collections::VecDeque, sync::Arc};

use tracing::debug;

use crate::{
  error::RxError,
  observable::Observable,
  observer::{Notification, Observer},
  ops::{gather, serialized::Emit, Either, Serialized},
};

type Project<T, U> = Arc<dyn Fn(Vec<T>) -> Option<U> + Send + Sync>;

struct ZipState<T> {
  queues: Vec<VecDeque<T>>,
  completed: Vec<bool>,
  capacity: Option<usize>,
}

impl<T> ZipState<T> {
  /// A source that has completed with nothing left buffered ends the zip.
  fn exhausted(&self) -> bool {
    self
      .queues
      .iter()
      .zip(&self.completed)
      .any(|(queue, completed)| *completed && queue.is_empty())
  }

  fn push<U>(&mut self, idx: usize, value: T, project: &Project<T, U>, emit: &mut Emit<'_, U>) {
    if let Some(capacity) = self.capacity {
      if self.queues[idx].len() >= capacity {
        debug!(source = idx, capacity, "zip buffer overflow");
        emit.error(RxError::BufferOverflow { capacity });
        return;
      }
    }
    self.queues[idx].push_back(value);
    if self.queues.iter().all(|q| !q.is_empty()) {
      let values = self.queues.iter_mut().filter_map(VecDeque::pop_front).collect();
      if let Some(out) = project(values) {
        emit.next(out);
      }
      if self.exhausted() {
        emit.complete();
      }
    }
  }
}

fn zip_with<T, U>(
  sources: Vec<Observable<T>>,
  capacity: Option<usize>,
  project: Project<T, U>,
) -> Observable<U>
where
  T: Send + 'static,
  U: Send + 'static,
{
  Observable::new(move |observer, scheduler, subscriber| {
    let count = sources.len();
    let state = ZipState {
      queues: (0..count).map(|_| VecDeque::new()).collect(),
      completed: vec![false; count],
      capacity,
    };
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
          Observer::new(move |n| match n {
            Notification::Next(v) => gate.with(|st, emit| st.push(idx, v, &project, emit)),
            Notification::Error(e) => gate.with(|_, emit| emit.error(e)),
            Notification::Complete => {
              gate.with(|st, emit| {
                st.completed[idx] = true;
                if st.exhausted() {
                  emit.complete();
                }
              });
              child_c.unsubscribe();
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

/// Pairs up the values of every source by index.
///
/// Each source gets its own buffer; a combined value is emitted once every
/// buffer holds at least one value. Completes as soon as a completed source
/// has nothing left buffered.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let zipped = ops::zip(vec![observable::from_iter(1..=5), observable::from_iter(10..=12)]);
/// assert_eq!(
///   zipped.to_vec(&scheduler::trampoline()),
///   Ok(vec![vec![1, 10], vec![2, 11], vec![3, 12]])
/// );
/// ```
pub fn zip<T: Send + 'static>(sources: Vec<Observable<T>>) -> Observable<Vec<T>> {
  zip_with(sources, None, Arc::new(Some))
}

/// Like [`zip`], but a source that gets more than `capacity` values ahead of
/// its slowest sibling fails the zip with [`RxError::BufferOverflow`].
pub fn zip_with_capacity<T: Send + 'static>(
  sources: Vec<Observable<T>>,
  capacity: usize,
) -> Observable<Vec<T>> {
  zip_with(sources, Some(capacity), Arc::new(Some))
}

/// Like [`zip`], taking the sources from an outer observable.
pub fn zip_all<T: Send + 'static>(sources: Observable<Observable<T>>) -> Observable<Vec<T>> {
  gather(sources, zip)
}

/// Zip two differently typed sources into pairs.
pub fn zip2<A, B>(a: &Observable<A>, b: &Observable<B>) -> Observable<(A, B)>
where
  A: Send + 'static,
  B: Send + 'static,
{
  zip_with(
    vec![a.map(Either::Left), b.map(Either::Right)],
    None,
    Arc::new(|values: Vec<Either<A, B>>| {
      let mut values = values.into_iter();
      match (values.next(), values.next()) {
        (Some(Either::Left(a)), Some(Either::Right(b))) => Some((a, b)),
        _ => None,
      }
    }),
  )
}

impl<T: Send + 'static> Observable<T> {
  /// Pair every value of this observable with the value at the same index of
  /// `other`.
  pub fn zip<U: Send + 'static>(&self, other: &Observable<U>) -> Observable<(T, U)> {
    zip2(self, other)
  }
}
