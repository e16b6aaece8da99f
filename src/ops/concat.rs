use std::{collections::VecDeque, sync::Arc};

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
  ops::Serialized,
  scheduler::{SharedScheduler, TaskHandle},
  subscription::Subscriber,
};

struct ConcatState<T> {
  queue: VecDeque<Observable<T>>,
  active: bool,
  outer_done: bool,
  /// The hand-off task that starts the next source.
  pending: Option<TaskHandle>,
}

impl<T> ConcatState<T> {
  fn new(queue: VecDeque<Observable<T>>, outer_done: bool) -> Self {
    Self { queue, active: false, outer_done, pending: None }
  }
}

type Gate<T> = Arc<Serialized<ConcatState<T>, T>>;

fn new_gate<T: Send + 'static>(
  state: ConcatState<T>,
  observer: Observer<T>,
  subscriber: &Subscriber,
) -> Gate<T> {
  let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
  let c_gate = gate.clone();
  gate.scope().on_unsubscribe(move || {
    if let Some(handle) = c_gate.with(|st, _| st.pending.take()) {
      handle.cancel();
    }
  });
  gate
}

/// Subscribe the next queued source if none is running.
fn drive<T: Send + 'static>(gate: &Gate<T>, scheduler: &SharedScheduler) {
  let next = gate.with(|st, emit| {
    if st.active || emit.is_terminated() {
      return None;
    }
    let next = st.queue.pop_front();
    match &next {
      Some(_) => st.active = true,
      None if st.outer_done => emit.complete(),
      None => {}
    }
    next
  });
  let Some(source) = next else { return };

  let child = gate.scope().add();
  let (gate, scheduler_c, child_c) = (gate.clone(), scheduler.clone(), child.clone());
  source.subscribe_with(
    Observer::new(move |n| match n {
      Notification::Next(v) => gate.with(|_, emit| emit.next(v)),
      Notification::Error(e) => gate.with(|_, emit| emit.error(e)),
      Notification::Complete => {
        gate.with(|st, _| st.active = false);
        child_c.unsubscribe();
        // The next source starts from a fresh task, not from inside this one.
        let (next_gate, scheduler) = (gate.clone(), scheduler_c.clone());
        let handle = scheduler_c.schedule(Box::new(move || drive(&next_gate, &scheduler)));
        gate.with(|st, _| st.pending = Some(handle.clone()));
        if !gate.scope().subscribed() {
          handle.cancel();
        }
      }
    }),
    scheduler,
    &child,
  );
}

/// Subscribes the sources one after another, each only once the previous one
/// completed.
///
/// The first error terminates the result; sources after it are never
/// subscribed.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let all = ops::concat(vec![
///   observable::from_iter([1, 2]),
///   observable::of(3),
///   observable::from_iter([4, 5]),
/// ]);
/// assert_eq!(all.to_vec(&scheduler::trampoline()), Ok(vec![1, 2, 3, 4, 5]));
/// ```
pub fn concat<T: Send + 'static>(sources: Vec<Observable<T>>) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let state = ConcatState::new(sources.iter().cloned().collect(), true);
    drive(&new_gate(state, observer, subscriber), scheduler);
  })
}

/// Concatenates the inner observables emitted by `sources` in the order they
/// arrive. Inner observables that arrive while another one is running wait
/// in a queue.
pub fn concat_all<T: Send + 'static>(sources: Observable<Observable<T>>) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let gate = new_gate(ConcatState::new(VecDeque::new(), false), observer, subscriber);
    let outer = gate.scope().add();
    let (gate_c, scheduler_c) = (gate.clone(), scheduler.clone());
    sources.subscribe_with(
      Observer::new(move |n| match n {
        Notification::Next(inner) => {
          gate_c.with(|st, _| st.queue.push_back(inner));
          drive(&gate_c, &scheduler_c);
        }
        Notification::Error(e) => gate_c.with(|_, emit| emit.error(e)),
        Notification::Complete => {
          gate_c.with(|st, _| st.outer_done = true);
          drive(&gate_c, &scheduler_c);
        }
      }),
      scheduler,
      &outer,
    );
  })
}

impl<T: Send + 'static> Observable<T> {
  /// Emit every value of this observable, then every value of `other`.
  pub fn concat_with(&self, other: Observable<T>) -> Observable<T> {
    concat(vec![self.clone(), other])
  }
}
