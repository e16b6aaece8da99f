use std::sync::Arc;

use crate::{
  error::RxError,
  observable::Observable,
  observer::{Notification, Observer},
  ops::{serialized::Emit, Serialized},
  subscription::Subscriber,
};

struct RaceState {
  winner: Option<usize>,
  children: Vec<Subscriber>,
  /// Sources still in the race.
  remaining: usize,
  first_error: Option<RxError>,
}

impl RaceState {
  /// A source that terminates before any value was seen leaves the race.
  /// When the last one leaves, the first error seen (if any) ends the race.
  fn drop_out<T>(&mut self, err: Option<RxError>, emit: &mut Emit<'_, T>) {
    self.remaining = self.remaining.saturating_sub(1);
    if let Some(err) = err {
      self.first_error.get_or_insert(err);
    }
    if self.remaining == 0 {
      match self.first_error.take() {
        Some(err) => emit.error(err),
        None => emit.complete(),
      }
    }
  }
}

/// Mirrors the first source to emit a value.
///
/// Every source is subscribed under its own child subscription. The first
/// value decides the race: the other sources are canceled and only the
/// winner is forwarded from then on, including its terminal notification.
/// A source that errors or completes before any value was emitted just leaves
/// the race.
///
/// ```rust
/// use rxcore::prelude::*;
///
/// let scheduler = scheduler::virtual_time();
/// let slow = observable::timer(Duration::from_millis(20)).map(|_| "slow");
/// let fast = observable::timer(Duration::from_millis(10)).map(|_| "fast");
/// assert_eq!(ops::race(vec![slow, fast]).to_vec(&scheduler), Ok(vec!["fast"]));
/// ```
pub fn race<T: Send + 'static>(sources: Vec<Observable<T>>) -> Observable<T> {
  Observable::new(move |observer, scheduler, subscriber| {
    let scope = subscriber.add();
    let children: Vec<_> = sources.iter().map(|_| scope.add()).collect();
    let state = RaceState {
      winner: None,
      children: children.clone(),
      remaining: sources.len(),
      first_error: None,
    };
    let gate = Arc::new(Serialized::new(state, observer, scope));
    if sources.is_empty() {
      gate.with(|_, emit| emit.complete());
      return;
    }

    let (sources, scheduler_c, gate_c) = (sources.clone(), scheduler.clone(), gate.clone());
    let handle = scheduler.schedule(Box::new(move || {
      for (idx, (source, child)) in sources.iter().zip(children).enumerate() {
        let (gate, child_c) = (gate_c.clone(), child.clone());
        let observer = Observer::new(move |n| {
          if !child_c.subscribed() {
            return;
          }
          let losers = gate.with(|st, emit| match (st.winner, n) {
            (None, Notification::Next(v)) => {
              st.winner = Some(idx);
              emit.next(v);
              let mut losers = std::mem::take(&mut st.children);
              losers.remove(idx);
              losers
            }
            (Some(w), n) if w == idx => {
              emit.notify(n);
              vec![]
            }
            (None, Notification::Error(e)) => {
              st.drop_out(Some(e), emit);
              vec![st.children[idx].clone()]
            }
            (None, Notification::Complete) => {
              st.drop_out(None, emit);
              vec![st.children[idx].clone()]
            }
            _ => vec![],
          });
          for loser in losers {
            loser.unsubscribe();
          }
        });
        source.subscribe_with(observer, &scheduler_c, &child);
      }
    }));
    gate.scope().on_unsubscribe(move || handle.cancel());
  })
}

impl<T: Send + 'static> Observable<T> {
  /// Race this observable against `other`.
  pub fn race_with(&self, other: Observable<T>) -> Observable<T> {
    race(vec![self.clone(), other])
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
  };

  use super::*;
  use crate::{observable, scheduler, subject::Subject};

  #[test]
  fn first_value_wins_and_cancels_siblings() {
    let scheduler = scheduler::trampoline();
    let a = Subject::<i32>::default();
    let b = Subject::<i32>::default();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();
    let subscription = a
      .observable()
      .race_with(b.observable())
      .subscribe(Observer::new(move |n| c_log.lock().unwrap().push(n)), &scheduler);

    b.send(1);
    a.send(100);
    b.send(2);
    b.complete();

    assert_eq!(subscription.wait(), Ok(()));
    assert_eq!(
      *log.lock().unwrap(),
      vec![Notification::Next(1), Notification::Next(2), Notification::Complete]
    );
  }

  #[test]
  fn early_error_does_not_decide() {
    let scheduler = scheduler::virtual_time();
    let values = observable::throw_err(RxError::msg("early"))
      .race_with(observable::timer(scheduler::Duration::from_millis(5)))
      .to_vec(&scheduler);
    assert_eq!(values, Ok(vec![0]));
  }

  #[test]
  fn all_failing_sources_report_first_error() {
    let scheduler = scheduler::trampoline();
    let result = race(vec![
      observable::throw_err::<i32>(RxError::msg("one")),
      observable::throw_err(RxError::msg("two")),
    ])
    .wait(&scheduler);
    assert_eq!(result, Err(RxError::msg("one")));
  }

  #[test]
  fn loser_is_unsubscribed() {
    let scheduler = scheduler::trampoline();
    let released = Arc::new(AtomicBool::new(false));
    let c_released = released.clone();
    let loser = observable::create(move |emitter: observable::Emitter<i32>| {
      let released = c_released.clone();
      emitter
        .subscriber()
        .on_unsubscribe(move || released.store(true, Ordering::SeqCst));
    });
    let subscription = race(vec![loser, observable::of(1).concat_with(observable::never())])
      .subscribe(Observer::ignore(), &scheduler);
    assert!(released.load(Ordering::SeqCst));
    assert!(subscription.subscribed());
    subscription.unsubscribe();
  }

  #[test]
  fn source_leaves_the_race_once() {
    let scheduler = scheduler::trampoline();
    let noisy = Observable::new(|observer: Observer<i32>, _, _| {
      observer.complete();
      observer.complete();
    });
    let subscription =
      race(vec![noisy, observable::never()]).subscribe(Observer::ignore(), &scheduler);
    assert!(subscription.subscribed());
    subscription.unsubscribe();
  }
}
