//! Parallel scheduler on a shared futures thread pool.
//!
//! Each scheduled task becomes one future on the pool. Delays are async
//! sleeps, so a waiting task does not hold a worker. Ordering between
//! independently scheduled tasks is not guaranteed.

use std::sync::Arc;

use futures::executor::ThreadPool;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{Duration, Instant, Recur, RecursiveTask, Scheduler, TaskHandle};

static DEFAULT_RUNTIME: Lazy<ThreadPool> = Lazy::new(|| {
  ThreadPool::builder()
    .name_prefix("rxcore-worker-")
    .create()
    .expect("create the default thread pool")
});

#[derive(Default)]
struct Active {
  count: Mutex<usize>,
  idle: Condvar,
}

/// Decrements the in-flight count when the task future is dropped, including
/// when the task panicked.
struct InFlight(Arc<Active>);

impl InFlight {
  fn enter(active: &Arc<Active>) -> Self {
    *active.count.lock() += 1;
    InFlight(active.clone())
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    let mut count = self.0.count.lock();
    *count -= 1;
    if *count == 0 {
      self.0.idle.notify_all();
    }
  }
}

/// Scheduler that runs every task as an independent unit on a worker thread.
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
  active: Arc<Active>,
}

impl Default for ThreadPoolScheduler {
  fn default() -> Self { Self::new() }
}

impl ThreadPoolScheduler {
  /// A scheduler on the process-wide default pool.
  pub fn new() -> Self { Self::with_pool(DEFAULT_RUNTIME.clone()) }

  /// A scheduler on a caller supplied pool.
  pub fn with_pool(pool: ThreadPool) -> Self { Self { pool, active: Arc::default() } }
}

impl Scheduler for ThreadPoolScheduler {
  fn now(&self) -> Instant { Instant::now() }

  fn schedule_future_recursive(&self, due: Duration, mut task: RecursiveTask) -> TaskHandle {
    let handle = TaskHandle::default();
    let c_handle = handle.clone();
    let in_flight = InFlight::enter(&self.active);
    self.pool.spawn_ok(async move {
      let _in_flight = in_flight;
      let mut delay = due;
      loop {
        if !delay.is_zero() {
          futures_time::task::sleep(delay.into()).await;
        }
        if c_handle.is_cancelled() {
          trace!("thread pool task cancelled");
          break;
        }
        let mut recur = Recur::default();
        task(&mut recur);
        match recur.take() {
          Some(next) if !c_handle.is_cancelled() => delay = next,
          _ => break,
        }
      }
    });
    handle
  }

  fn wait(&self) {
    let mut count = self.active.count.lock();
    while *count > 0 {
      self.active.idle.wait(&mut count);
    }
  }

  fn is_concurrent(&self) -> bool { true }

  fn count(&self) -> usize { *self.active.count.lock() }

  fn name(&self) -> &'static str { "ThreadPoolScheduler" }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::scheduler::SharedScheduler;

  #[test]
  fn wait_blocks_until_tasks_finish() {
    let scheduler: SharedScheduler = Arc::new(ThreadPoolScheduler::new());
    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
      let hits = hits.clone();
      scheduler.schedule(Box::new(move || {
        hits.fetch_add(1, Ordering::SeqCst);
      }));
    }
    scheduler.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 16);
    assert_eq!(scheduler.count(), 0);
  }

  #[test]
  fn recursive_task_with_delay() {
    let scheduler: SharedScheduler = Arc::new(ThreadPoolScheduler::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let c_hits = hits.clone();
    let start = Instant::now();
    scheduler.schedule_future_recursive(
      Duration::from_millis(1),
      Box::new(move |recur| {
        if c_hits.fetch_add(1, Ordering::SeqCst) < 4 {
          recur.again_in(Duration::from_millis(1));
        }
      }),
    );
    scheduler.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    assert!(start.elapsed() >= Duration::from_millis(5));
  }

  #[test]
  fn cancel_stops_rescheduling() {
    let scheduler: SharedScheduler = Arc::new(ThreadPoolScheduler::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let c_hits = hits.clone();
    let handle = scheduler.schedule_future_recursive(
      Duration::from_millis(50),
      Box::new(move |recur| {
        c_hits.fetch_add(1, Ordering::SeqCst);
        recur.again();
      }),
    );
    handle.cancel();
    scheduler.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
  }
}
