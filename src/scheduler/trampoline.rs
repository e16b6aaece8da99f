//! Cooperative scheduler.
//!
//! Tasks run one after another on whichever thread drains the queue. A task
//! scheduled while another task is running is queued behind it instead of
//! being called in place, so long operator chains never grow the stack.
//! Ready tasks scheduled from outside a drain are run before the scheduling
//! call returns; delayed tasks are run by [`Scheduler::wait`].
//!
//! Ordering: earlier due time first, then FIFO by scheduling order.
//!
//! With [`Trampoline::virtual_time`] the clock starts at the moment of
//! creation and only moves when `wait` jumps it to the next due task, which
//! makes time-based operators deterministic under test.
//!
//! Only one thread drains at a time. A thread that schedules while another is
//! draining leaves its task to that drain; a thread that calls `wait` in the
//! meantime blocks until the drain ends and then takes over.

use std::{
  cmp::Ordering,
  collections::BinaryHeap,
  thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{Duration, Instant, Recur, RecursiveTask, Scheduler, TaskHandle};

// ==================== Internal State ====================

struct ScheduledTask {
  due: Instant,
  seq: u64,
  task: RecursiveTask,
  handle: TaskHandle,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool { self.due == other.due && self.seq == other.seq }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by seq
    other
      .due
      .cmp(&self.due)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

#[derive(Default)]
struct State {
  queue: BinaryHeap<ScheduledTask>,
  next_seq: u64,
  /// The thread running the queue, if any.
  drainer: Option<ThreadId>,
}

impl State {
  fn push(&mut self, due: Instant, task: RecursiveTask, handle: TaskHandle) {
    let seq = self.next_seq;
    self.next_seq += 1;
    self.queue.push(ScheduledTask { due, seq, task, handle });
  }
}

// ==================== Trampoline ====================

/// Single logical thread scheduler.
///
/// It is `Send + Sync` so it can sit behind a [`SharedScheduler`], but it is
/// meant to be driven from one thread at a time.
///
/// [`SharedScheduler`]: super::SharedScheduler
pub struct Trampoline {
  state: Mutex<State>,
  /// Signalled whenever the drainer slot is released.
  idle: Condvar,
  /// `Some` when the clock is virtual.
  virtual_now: Option<Mutex<Instant>>,
}

/// Hands the drainer slot back if a task unwinds through the drain.
struct DrainGuard<'a>(&'a Trampoline);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    let mut state = self.0.state.lock();
    if state.drainer == Some(thread::current().id()) {
      state.drainer = None;
      self.0.idle.notify_all();
    }
  }
}

impl Default for Trampoline {
  fn default() -> Self { Self::new() }
}

impl Trampoline {
  /// A trampoline that follows the wall clock and sleeps for delayed tasks.
  pub fn new() -> Self {
    Self { state: Mutex::default(), idle: Condvar::new(), virtual_now: None }
  }

  /// A trampoline whose clock jumps straight to the next due task.
  pub fn virtual_time() -> Self {
    Self {
      state: Mutex::default(),
      idle: Condvar::new(),
      virtual_now: Some(Mutex::new(Instant::now())),
    }
  }

  fn advance_to(&self, due: Instant) {
    match &self.virtual_now {
      Some(now) => {
        let mut now = now.lock();
        if *now < due {
          *now = due;
        }
      }
      None => {
        let now = Instant::now();
        if due > now {
          thread::sleep(due - now);
        }
      }
    }
  }

  /// Run queued tasks. With `block` set, wait for delayed tasks too;
  /// otherwise stop at the first task that is not due yet.
  ///
  /// A drain nested inside a running task shares the outer drain's slot. When
  /// another thread holds the slot, a non-blocking drain leaves the work to it
  /// and a blocking one waits for it to finish first.
  fn drain(&self, block: bool) {
    let me = thread::current().id();
    let owner = {
      let mut state = self.state.lock();
      loop {
        match state.drainer {
          None => {
            state.drainer = Some(me);
            break true;
          }
          Some(id) if id == me => break false,
          Some(_) if block => self.idle.wait(&mut state),
          Some(_) => return,
        }
      }
    };
    let _guard = owner.then(|| DrainGuard(self));
    loop {
      let now = self.now();
      let mut state = self.state.lock();
      let next = state.queue.peek().map(|top| (top.handle.is_cancelled(), top.due));
      match next {
        Some((true, _)) => {
          state.queue.pop();
          continue;
        }
        Some((false, due)) if due > now => {
          if block {
            drop(state);
            self.advance_to(due);
            continue;
          }
        }
        Some(_) => {
          if let Some(scheduled) = state.queue.pop() {
            drop(state);
            self.run(scheduled);
            continue;
          }
        }
        None => {}
      }
      // Released under the lock that saw nothing runnable.
      if owner {
        state.drainer = None;
        self.idle.notify_all();
      }
      return;
    }
  }

  fn run(&self, mut scheduled: ScheduledTask) {
    let mut recur = Recur::default();
    (scheduled.task)(&mut recur);
    if let Some(delay) = recur.take() {
      if !scheduled.handle.is_cancelled() {
        let due = self.now() + delay;
        self
          .state
          .lock()
          .push(due, scheduled.task, scheduled.handle);
      }
    }
  }
}

impl Scheduler for Trampoline {
  fn now(&self) -> Instant {
    match &self.virtual_now {
      Some(now) => *now.lock(),
      None => Instant::now(),
    }
  }

  fn schedule_future_recursive(&self, due: Duration, task: RecursiveTask) -> TaskHandle {
    let handle = TaskHandle::default();
    let due = self.now() + due;
    let idle = {
      let mut state = self.state.lock();
      state.push(due, task, handle.clone());
      state.drainer.is_none()
    };
    if idle {
      self.drain(false);
    } else {
      trace!("trampoline task queued behind running drain");
    }
    handle
  }

  fn wait(&self) { self.drain(true) }

  fn is_concurrent(&self) -> bool { false }

  fn is_running_here(&self) -> bool {
    self.state.lock().drainer == Some(thread::current().id())
  }

  fn count(&self) -> usize { self.state.lock().queue.len() }

  fn name(&self) -> &'static str { "Trampoline" }
}
