//! Scheduler abstraction
//!
//! A [`Scheduler`] is an execution context plus a logical clock. Operators never
//! spawn work themselves; they hand tasks to the scheduler they were
//! subscribed with, which decides whether a task runs cooperatively on the
//! current logical thread ([`Trampoline`]) or concurrently on a worker
//! ([`ThreadPoolScheduler`]).
//!
//! Every scheduling call returns a [`TaskHandle`]. Cancelling the handle turns
//! every future invocation of that task into a no-op; an invocation already in
//! flight runs to completion but is never rescheduled.

use std::{
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

pub use std::time::{Duration, Instant};

mod trampoline;
pub use trampoline::Trampoline;

#[cfg(feature = "futures-scheduler")]
mod thread_pool_scheduler;
#[cfg(feature = "futures-scheduler")]
pub use thread_pool_scheduler::ThreadPoolScheduler;

/// Scheduler handle passed around by observables.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// A task that may ask to be invoked again.
pub type RecursiveTask = Box<dyn FnMut(&mut Recur) + Send>;

// ============================================================================
// Task handle
// ============================================================================

/// Cancellation handle returned by every scheduling call.
#[derive(Clone, Default)]
pub struct TaskHandle(Arc<AtomicBool>);

impl TaskHandle {
  #[inline]
  pub fn cancel(&self) { self.0.store(true, Ordering::Release) }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) }
}

impl fmt::Debug for TaskHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

// ============================================================================
// Recursion requests
// ============================================================================

/// Passed to a [`RecursiveTask`]; lets the task ask to run once more.
#[derive(Debug, Default)]
pub struct Recur {
  next: Option<Duration>,
}

impl Recur {
  /// Run the task again as soon as possible.
  #[inline]
  pub fn again(&mut self) { self.next = Some(Duration::ZERO) }

  /// Run the task again after `delay`.
  #[inline]
  pub fn again_in(&mut self, delay: Duration) { self.next = Some(delay) }

  #[inline]
  pub(crate) fn take(&mut self) -> Option<Duration> { self.next.take() }
}

/// Passed to a [`schedule_loop`](Scheduler::schedule_loop) body; carries the
/// state for the next iteration.
#[derive(Debug)]
pub struct LoopRecur<S> {
  next: Option<S>,
}

impl<S> LoopRecur<S> {
  /// Run the loop body again with `state`.
  #[inline]
  pub fn again(&mut self, state: S) { self.next = Some(state) }
}

// ============================================================================
// Scheduler trait
// ============================================================================

/// Execution context plus logical clock.
///
/// Implementors provide [`schedule_future_recursive`]; the other primitives are
/// expressed on top of it.
///
/// [`schedule_future_recursive`]: Scheduler::schedule_future_recursive
pub trait Scheduler: Send + Sync {
  /// Current logical time.
  fn now(&self) -> Instant;

  /// Logical time elapsed since `start`.
  fn since(&self, start: Instant) -> Duration { self.now().saturating_duration_since(start) }

  /// Run `task` after `due`; every time the task calls [`Recur::again_in`] it
  /// is invoked again after the requested delay.
  fn schedule_future_recursive(&self, due: Duration, task: RecursiveTask) -> TaskHandle;

  /// Run `task` once, as soon as possible.
  fn schedule(&self, task: Box<dyn FnOnce() + Send>) -> TaskHandle {
    self.schedule_future(Duration::ZERO, task)
  }

  /// Run `task` once after `due`.
  fn schedule_future(&self, due: Duration, task: Box<dyn FnOnce() + Send>) -> TaskHandle {
    let mut task = Some(task);
    self.schedule_future_recursive(
      due,
      Box::new(move |_| {
        if let Some(task) = task.take() {
          task()
        }
      }),
    )
  }

  /// Run `task` as soon as possible and again whenever it calls
  /// [`Recur::again`].
  fn schedule_recursive(&self, task: RecursiveTask) -> TaskHandle {
    self.schedule_future_recursive(Duration::ZERO, task)
  }

  /// Drive the scheduler until it has no outstanding work.
  ///
  /// A cooperative scheduler runs its queue here; a parallel one blocks until
  /// every in-flight task has finished.
  fn wait(&self);

  /// Whether scheduled tasks may run concurrently with each other.
  fn is_concurrent(&self) -> bool;

  /// Whether the calling thread is inside one of this scheduler's tasks.
  fn is_running_here(&self) -> bool { false }

  /// Number of tasks queued or in flight.
  fn count(&self) -> usize;

  fn name(&self) -> &'static str;
}

impl dyn Scheduler {
  /// Run `task(seed)`; each time the body calls [`LoopRecur::again`] it runs
  /// once more with the new state, as a separately scheduled step.
  pub fn schedule_loop<S: Send + 'static>(
    &self,
    seed: S,
    mut task: impl FnMut(S, &mut LoopRecur<S>) + Send + 'static,
  ) -> TaskHandle {
    let mut state = Some(seed);
    self.schedule_recursive(Box::new(move |recur| {
      if let Some(current) = state.take() {
        let mut next = LoopRecur { next: None };
        task(current, &mut next);
        if let Some(s) = next.next {
          state = Some(s);
          recur.again();
        }
      }
    }))
  }
}

impl fmt::Debug for dyn Scheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct(self.name())
      .field("count", &self.count())
      .finish()
  }
}

/// A fresh cooperative scheduler.
pub fn trampoline() -> SharedScheduler { Arc::new(Trampoline::new()) }

/// A cooperative scheduler driven by a virtual clock.
pub fn virtual_time() -> SharedScheduler { Arc::new(Trampoline::virtual_time()) }

/// A parallel scheduler backed by the shared worker pool.
#[cfg(feature = "futures-scheduler")]
pub fn thread_pool() -> SharedScheduler { Arc::new(ThreadPoolScheduler::new()) }
