use std::sync::Arc;

use tracing::debug;

use crate::{
  error::RxError,
  observable::Observable,
  observer::Observer,
  ops::Serialized,
  scheduler::{Duration, SharedScheduler, TaskHandle},
};

#[derive(Default)]
struct TimeoutState {
  /// Bumped on every value; a timer only fires for the generation it was
  /// armed for.
  generation: u64,
  timer: Option<TaskHandle>,
}

type Gate<T> = Arc<Serialized<TimeoutState, T>>;

fn arm<T: Send + 'static>(gate: &Gate<T>, scheduler: &SharedScheduler, due: Duration, gen: u64) {
  let gate_c = gate.clone();
  let handle = scheduler.schedule_future(
    due,
    Box::new(move || {
      gate_c.with(|st, emit| {
        if st.generation == gen {
          debug!(?due, "source timed out");
          emit.error(RxError::Timeout);
        }
      })
    }),
  );
  gate.with(|st, _| {
    if st.generation == gen {
      st.timer = Some(handle);
    } else {
      handle.cancel();
    }
  });
}

impl<T: Send + 'static> Observable<T> {
  /// Fail with [`RxError::Timeout`] when the source stays silent for `due`,
  /// counted from the subscription and again from every value.
  ///
  /// ```rust
  /// use rxcore::prelude::*;
  ///
  /// let scheduler = scheduler::virtual_time();
  /// let late = observable::timer(Duration::from_secs(2)).timeout(Duration::from_secs(1));
  /// assert_eq!(late.wait(&scheduler), Err(RxError::Timeout));
  /// ```
  pub fn timeout(&self, due: Duration) -> Observable<T> {
    let source = self.clone();
    Observable::new(move |observer, scheduler, subscriber| {
      let state = TimeoutState::default();
      let gate = Arc::new(Serialized::new(state, observer, subscriber.add()));
      let gate_c = gate.clone();
      gate.scope().on_unsubscribe(move || {
        if let Some(timer) = gate_c.with(|st, _| st.timer.take()) {
          timer.cancel();
        }
      });
      arm(&gate, scheduler, due, 0);

      let upstream = gate.scope().add();
      let (gate, scheduler_c) = (gate.clone(), scheduler.clone());
      source.subscribe_with(
        Observer::new(move |n| {
          let rearm = gate.with(|st, emit| {
            if emit.is_terminated() {
              return None;
            }
            st.generation += 1;
            if let Some(timer) = st.timer.take() {
              timer.cancel();
            }
            let terminal = n.is_terminal();
            emit.notify(n);
            (!terminal).then_some(st.generation)
          });
          if let Some(gen) = rearm {
            arm(&gate, &scheduler_c, due, gen);
          }
        }),
        scheduler,
        &upstream,
      );
    })
  }
}
