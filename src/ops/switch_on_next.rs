use std::sync::Arc;

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
  ops::{Link, Serialized},
  scheduler::SharedScheduler,
};

struct SwitchState<T> {
  current: Option<(u64, Arc<Link<T>>)>,
  next_id: u64,
  inner_active: bool,
  outer_done: bool,
}

type Gate<T> = Arc<Serialized<SwitchState<T>, T>>;

fn inner_observer<T: Send + 'static>(gate: &Gate<T>, id: u64) -> Observer<T> {
  let gate = gate.clone();
  Observer::new(move |n| {
    gate.with(|st, emit| {
      if !matches!(st.current, Some((current, _)) if current == id) {
        return;
      }
      match n {
        Notification::Next(v) => emit.next(v),
        Notification::Error(e) => emit.error(e),
        Notification::Complete => {
          st.inner_active = false;
          if st.outer_done {
            emit.complete();
          }
        }
      }
    })
  })
}

fn switch_to<T: Send + 'static>(
  gate: &Gate<T>,
  inner: Observable<T>,
  scheduler: &SharedScheduler,
) {
  let switched = gate.with(|st, emit| {
    if emit.is_terminated() {
      return None;
    }
    let id = st.next_id;
    st.next_id += 1;
    let link = Link::new(inner_observer(gate, id));
    st.inner_active = true;
    let previous = st.current.replace((id, link.clone()));
    Some((previous, link))
  });
  let Some((previous, link)) = switched else { return };

  let (gate_c, scheduler_c) = (gate.clone(), scheduler.clone());
  let start = move || {
    if let Err(e) = link.subscribe(&inner, &scheduler_c, gate_c.scope()) {
      gate_c.with(|_, emit| emit.error(e));
    }
  };
  match previous {
    // The new inner starts only after the previous one has settled.
    Some((_, previous)) => previous.cancel(start),
    None => start(),
  }
}

/// Mirrors the most recent inner observable emitted by `sources`.
///
/// Each new inner observable cancels the previous one; the new one is
/// subscribed once the cancellation has settled. Completes once the outer
/// observable and the active inner observable have both completed. An error
/// from the outer or the active inner observable terminates right away.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let latest = ops::switch_all(observable::of(observable::from_iter([1, 2, 3])));
/// assert_eq!(latest.to_vec(&scheduler::trampoline()), Ok(vec![1, 2, 3]));
/// ```
pub fn switch_all<T: Send + 'static>(sources: Observable<Observable<T>>) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let state =
      SwitchState { current: None, next_id: 0, inner_active: false, outer_done: false };
    let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
    let outer = gate.scope().add();
    let (gate_c, scheduler_c) = (gate.clone(), scheduler.clone());
    sources.subscribe_with(
      Observer::new(move |n| match n {
        Notification::Next(inner) => switch_to(&gate_c, inner, &scheduler_c),
        Notification::Error(e) => gate_c.with(|_, emit| emit.error(e)),
        Notification::Complete => gate_c.with(|st, emit| {
          st.outer_done = true;
          if !st.inner_active {
            emit.complete();
          }
        }),
      }),
      scheduler,
      &outer,
    );
  })
}

impl<T: Send + 'static> Observable<T> {
  /// Map every value to an inner observable and mirror the most recent one.
  pub fn switch_map<U, F>(&self, f: F) -> Observable<U>
  where
    U: Send + 'static,
    F: Fn(T) -> Observable<U> + Send + Sync + 'static,
  {
    switch_all(self.map(f))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::{error::RxError, observable, scheduler, subject::Subject};

  #[test]
  fn only_latest_inner_is_forwarded() {
    let scheduler = scheduler::trampoline();
    let outer = Subject::<Observable<i32>>::default();
    let first = Subject::<i32>::default();
    let second = Subject::<i32>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();
    let subscription = switch_all(outer.observable()).subscribe(
      Observer::new(move |n| c_log.lock().unwrap().push(n)),
      &scheduler,
    );

    outer.send(first.observable());
    first.send(1);
    outer.send(second.observable());
    first.send(2);
    second.send(10);
    outer.complete();
    second.send(20);
    assert!(subscription.subscribed());
    second.complete();

    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(
      *log.lock().unwrap(),
      vec![
        Notification::Next(1),
        Notification::Next(10),
        Notification::Next(20),
        Notification::Complete
      ]
    );
  }

  #[test]
  fn switch_while_previous_inner_is_delivering() {
    let scheduler = scheduler::trampoline();
    let outer_slot: Arc<Mutex<Option<Observer<Observable<i32>>>>> = Arc::default();
    let c_slot = outer_slot.clone();
    let outer = Observable::new(move |observer: Observer<Observable<i32>>, _, _| {
      *c_slot.lock().unwrap() = Some(observer);
    });
    let first = Subject::<i32>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let (c_log, c_slot) = (log.clone(), outer_slot.clone());
    let subscription = switch_all(outer).subscribe(
      Observer::new(move |n: Notification<i32>| {
        let switch = n == Notification::Next(1);
        c_log.lock().unwrap().push(n);
        if switch {
          // The first inner is still mid-delivery here.
          let outer = c_slot.lock().unwrap().clone();
          if let Some(outer) = outer {
            outer.next(observable::from_iter([10, 11]));
          }
        }
      }),
      &scheduler,
    );
    let outer = outer_slot.lock().unwrap().clone().unwrap();

    outer.next(first.observable());
    first.send(1);
    first.send(2);
    outer.complete();

    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(
      *log.lock().unwrap(),
      vec![
        Notification::Next(1),
        Notification::Next(10),
        Notification::Next(11),
        Notification::Complete
      ]
    );
  }

  #[test]
  fn inner_error_terminates() {
    let scheduler = scheduler::trampoline();
    let result = observable::from_iter([1, 2])
      .switch_map(|v| {
        if v == 2 {
          observable::throw_err(RxError::msg("inner"))
        } else {
          observable::of(v)
        }
      })
      .wait(&scheduler);
    assert_eq!(result, Err(RxError::msg("inner")));
  }

  #[test]
  fn switch_map_on_virtual_time() {
    let scheduler = scheduler::virtual_time();
    let values = observable::interval(scheduler::Duration::from_millis(10))
      .take(3)
      .switch_map(|i| observable::timer(scheduler::Duration::from_millis(15)).map(move |_| i))
      .to_vec(&scheduler);
    // Each timer is cut short by the next tick except the last one.
    assert_eq!(values, Ok(vec![2]));
  }
}
