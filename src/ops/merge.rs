use std::sync::Arc;

use crate::{
  error::RxError,
  observable::Observable,
  observer::{Notification, Observer},
  ops::{serialized::Emit, Serialized},
  scheduler::SharedScheduler,
};

struct MergeState {
  active: usize,
  delay_error: bool,
  error: Option<RxError>,
}

impl MergeState {
  fn fail<T>(&mut self, err: RxError, emit: &mut Emit<'_, T>) {
    if self.delay_error {
      self.error.get_or_insert(err);
      self.finish_one(emit);
    } else {
      emit.error(err);
    }
  }

  fn finish_one<T>(&mut self, emit: &mut Emit<'_, T>) {
    self.active = self.active.saturating_sub(1);
    if self.active == 0 {
      match self.error.take() {
        Some(err) => emit.error(err),
        None => emit.complete(),
      }
    }
  }
}

type Gate<T> = Arc<Serialized<MergeState, T>>;

fn subscribe_inner<T: Send + 'static>(
  gate: &Gate<T>,
  source: &Observable<T>,
  scheduler: &SharedScheduler,
) {
  let child = gate.scope().add();
  let (gate, child_c) = (gate.clone(), child.clone());
  source.subscribe_with(
    Observer::new(move |n| {
      // A source counts as finished once, however often it terminates.
      if !child_c.subscribed() {
        return;
      }
      match n {
        Notification::Next(v) => gate.with(|_, emit| emit.next(v)),
        Notification::Error(e) => {
          gate.with(|st, emit| st.fail(e, emit));
          child_c.unsubscribe();
        }
        Notification::Complete => {
          gate.with(|st, emit| st.finish_one(emit));
          child_c.unsubscribe();
        }
      }
    }),
    scheduler,
    &child,
  );
}

fn merge_sources<T: Send + 'static>(
  sources: Vec<Observable<T>>,
  delay_error: bool,
) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let state = MergeState { active: sources.len(), delay_error, error: None };
    let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
    if sources.is_empty() {
      gate.with(|_, emit| emit.complete());
      return;
    }
    let (sources, scheduler_c, gate_c) = (sources.clone(), scheduler.clone(), gate.clone());
    let handle = scheduler.schedule(Box::new(move || {
      for source in &sources {
        subscribe_inner(&gate_c, source, &scheduler_c);
      }
    }));
    gate.scope().on_unsubscribe(move || handle.cancel());
  })
}

fn merge_outer<T: Send + 'static>(
  sources: Observable<Observable<T>>,
  delay_error: bool,
) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    // The outer source counts as one active source.
    let state = MergeState { active: 1, delay_error, error: None };
    let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
    let outer = gate.scope().add();
    let (gate_c, scheduler_c, outer_c) = (gate.clone(), scheduler.clone(), outer.clone());
    sources.subscribe_with(
      Observer::new(move |n| {
        if !outer_c.subscribed() {
          return;
        }
        match n {
          Notification::Next(inner) => {
            let accepted = gate_c.with(|st, emit| {
              if !emit.is_terminated() {
                st.active += 1;
              }
              !emit.is_terminated()
            });
            if accepted {
              subscribe_inner(&gate_c, &inner, &scheduler_c);
            }
          }
          Notification::Error(e) => {
            gate_c.with(|st, emit| st.fail(e, emit));
            outer_c.unsubscribe();
          }
          Notification::Complete => {
            gate_c.with(|st, emit| st.finish_one(emit));
            outer_c.unsubscribe();
          }
        }
      }),
      scheduler,
      &outer,
    );
  })
}

/// Forwards every value from every source in arrival order.
///
/// All sources are subscribed at once. The first error terminates the merged
/// observable and cancels the other sources; completion comes after every
/// source completed.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let merged = ops::merge(vec![observable::from_iter([1, 2]), observable::of(3)]);
/// let mut values = merged.to_vec(&scheduler::trampoline()).unwrap();
/// values.sort();
/// assert_eq!(values, vec![1, 2, 3]);
/// ```
pub fn merge<T: Send + 'static>(sources: Vec<Observable<T>>) -> Observable<T> {
  merge_sources(sources, false)
}

/// Like [`merge`], but an error is held back until every source has
/// terminated. Only the first error is reported.
pub fn merge_delay_error<T: Send + 'static>(sources: Vec<Observable<T>>) -> Observable<T> {
  merge_sources(sources, true)
}

/// Merges every inner observable emitted by `sources` as it arrives.
pub fn merge_all<T: Send + 'static>(sources: Observable<Observable<T>>) -> Observable<T> {
  merge_outer(sources, false)
}

pub fn merge_all_delay_error<T: Send + 'static>(
  sources: Observable<Observable<T>>,
) -> Observable<T> {
  merge_outer(sources, true)
}

impl<T: Send + 'static> Observable<T> {
  /// Merge this observable with `other`.
  pub fn merge_with(&self, other: Observable<T>) -> Observable<T> {
    merge(vec![self.clone(), other])
  }
}
