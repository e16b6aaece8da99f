//! Bounded multicast replay buffer.
//!
//! One producer appends values, any number of [`Endpoint`]s read them at
//! their own pace. Entries are addressed by absolute, ever-growing indices;
//! `begin..end` is the readable window and never holds more than `capacity`
//! values. The ring has `capacity + 1` physical slots, so the slot at `end`
//! is always free and is where the terminal notification (the tombstone) is
//! written on close.
//!
//! Sends and closes take the state lock exclusively, endpoint reads share
//! it. A separate signal mutex/condvar pair serves the blocking calls; it is
//! always acquired before the state lock.

use std::{
  fmt,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace};

use crate::{
  error::{Result, RxError},
  scheduler::{Duration, Instant},
};

/// What a send does when the buffer already holds `capacity` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
  /// Wait until the slowest attached endpoint frees a slot, or the buffer is
  /// closed. Without any endpoint attached the oldest value is evicted.
  Block,
  /// Evict the oldest value. An endpoint that had not read it yet fails with
  /// [`RxError::MissingBackpressure`] on its next read; siblings carry on.
  #[default]
  DropOnOverflow,
  /// Evict the oldest value. Lagging endpoints skip ahead silently.
  EvictOldest,
}

type Waker = Box<dyn FnOnce() + Send + Sync>;

enum Slot<T> {
  Empty,
  Value { value: T, deadline: Option<Instant> },
  Tombstone(Option<RxError>),
}

struct BufferState<T> {
  slots: Vec<Slot<T>>,
  begin: u64,
  end: u64,
  closed: bool,
  cursors: Vec<Arc<AtomicU64>>,
  /// Parked wakers, keyed by the cursor of the endpoint that parked them.
  wakers: Vec<(Arc<AtomicU64>, Waker)>,
}

impl<T> BufferState<T> {
  #[inline]
  fn slot(&self, idx: u64) -> &Slot<T> { &self.slots[(idx % self.slots.len() as u64) as usize] }

  #[inline]
  fn slot_mut(&mut self, idx: u64) -> &mut Slot<T> {
    let len = self.slots.len() as u64;
    &mut self.slots[(idx % len) as usize]
  }

  #[inline]
  fn len(&self) -> u64 { self.end - self.begin }

  fn take_wakers(&mut self) -> Vec<Waker> {
    std::mem::take(&mut self.wakers)
      .into_iter()
      .map(|(_, waker)| waker)
      .collect()
  }

  fn evict_oldest(&mut self) {
    let begin = self.begin;
    *self.slot_mut(begin) = Slot::Empty;
    self.begin += 1;
  }

  /// Drop the entries every attached endpoint has already read.
  fn reclaim(&mut self) {
    let Some(min) = self
      .cursors
      .iter()
      .map(|c| c.load(Ordering::Acquire))
      .min()
    else {
      return;
    };
    while self.begin < min.min(self.end) {
      self.evict_oldest();
    }
  }
}

pub struct ReplayBuffer<T> {
  capacity: usize,
  policy: OverflowPolicy,
  max_age: Option<Duration>,
  state: RwLock<BufferState<T>>,
  signal: Mutex<()>,
  changed: Condvar,
}

impl<T> ReplayBuffer<T> {
  pub fn new(capacity: usize, policy: OverflowPolicy, max_age: Option<Duration>) -> Self {
    Self {
      capacity,
      policy,
      max_age,
      state: RwLock::new(BufferState {
        slots: (0..=capacity).map(|_| Slot::Empty).collect(),
        begin: 0,
        end: 0,
        closed: false,
        cursors: Vec::new(),
        wakers: Vec::new(),
      }),
      signal: Mutex::new(()),
      changed: Condvar::new(),
    }
  }

  #[inline]
  pub fn capacity(&self) -> usize { self.capacity }

  #[inline]
  pub fn policy(&self) -> OverflowPolicy { self.policy }

  pub fn is_closed(&self) -> bool { self.state.read().closed }

  /// Number of values currently held.
  pub fn len(&self) -> usize { self.state.read().len() as usize }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Append `value`. Returns `false` when the value was not stored: the
  /// buffer is closed (possibly while this send was blocked) or has zero
  /// capacity.
  pub fn send(&self, value: T) -> bool {
    let deadline = self.max_age.map(|age| Instant::now() + age);
    let wakers = match self.policy {
      OverflowPolicy::Block => {
        let mut signal = self.signal.lock();
        loop {
          let mut st = self.state.write();
          if st.closed || self.capacity == 0 {
            return false;
          }
          st.reclaim();
          if st.len() < self.capacity as u64 || st.cursors.is_empty() {
            break self.push(&mut st, value, deadline);
          }
          drop(st);
          trace!("blocking send waits for the slowest endpoint");
          self.changed.wait(&mut signal);
        }
      }
      OverflowPolicy::DropOnOverflow | OverflowPolicy::EvictOldest => {
        let mut st = self.state.write();
        if st.closed || self.capacity == 0 {
          return false;
        }
        self.push(&mut st, value, deadline)
      }
    };
    self.announce(wakers);
    true
  }

  fn push(&self, st: &mut BufferState<T>, value: T, deadline: Option<Instant>) -> Vec<Waker> {
    if st.len() >= self.capacity as u64 {
      st.evict_oldest();
    }
    let end = st.end;
    *st.slot_mut(end) = Slot::Value { value, deadline };
    st.end += 1;
    st.take_wakers()
  }

  /// Write the tombstone. `None` means normal completion. Only the first
  /// close has an effect.
  pub fn close(&self, err: Option<RxError>) -> bool {
    let wakers = {
      let mut st = self.state.write();
      if st.closed {
        return false;
      }
      st.closed = true;
      let end = st.end;
      *st.slot_mut(end) = Slot::Tombstone(err);
      st.take_wakers()
    };
    trace!("replay buffer closed");
    self.announce(wakers);
    true
  }

  /// Wake blocked callers and registered wakers. Called without the state
  /// lock held.
  fn announce(&self, wakers: Vec<Waker>) {
    self.notify_waiters();
    for waker in wakers {
      waker();
    }
  }

  fn notify_waiters(&self) {
    let _signal = self.signal.lock();
    self.changed.notify_all();
  }

  /// Attach a new endpoint starting at the oldest value still held.
  pub fn endpoint(self: &Arc<Self>) -> Endpoint<T> {
    let mut st = self.state.write();
    let cursor = Arc::new(AtomicU64::new(st.begin));
    st.cursors.push(cursor.clone());
    Endpoint {
      buffer: self.clone(),
      cursor,
      overflow: None,
      attached: true,
    }
  }
}

impl<T> fmt::Debug for ReplayBuffer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let st = self.state.read();
    f.debug_struct("ReplayBuffer")
      .field("capacity", &self.capacity)
      .field("policy", &self.policy)
      .field("begin", &st.begin)
      .field("end", &st.end)
      .field("closed", &st.closed)
      .field("endpoints", &st.cursors.len())
      .finish()
  }
}

// ============================================================================
// Endpoint
// ============================================================================

/// One consumer's read cursor into a [`ReplayBuffer`].
///
/// Dropping the endpoint detaches it, which may unblock a waiting sender.
pub struct Endpoint<T> {
  buffer: Arc<ReplayBuffer<T>>,
  cursor: Arc<AtomicU64>,
  overflow: Option<RxError>,
  attached: bool,
}

impl<T: Clone> Endpoint<T> {
  /// The next buffered value that is still fresh, or `None` at the write
  /// frontier. Expired values are skipped.
  pub fn recv(&mut self) -> Option<T> {
    if self.overflow.is_some() {
      return None;
    }
    let (value, advanced) = {
      let st = self.buffer.state.read();
      let start = self.cursor.load(Ordering::Acquire);
      let mut cursor = start;
      if cursor < st.begin {
        if self.buffer.policy == OverflowPolicy::DropOnOverflow {
          debug!(missed = st.begin - cursor, "endpoint fell behind the buffer");
          self.overflow = Some(RxError::MissingBackpressure);
          return None;
        }
        cursor = st.begin;
      }
      let now = Instant::now();
      let mut value = None;
      while cursor < st.end {
        let slot = st.slot(cursor);
        cursor += 1;
        if let Slot::Value { value: v, deadline } = slot {
          if deadline.map_or(true, |d| d > now) {
            value = Some(v.clone());
            break;
          }
        }
      }
      self.cursor.store(cursor, Ordering::Release);
      (value, cursor != start)
    };
    if advanced && self.buffer.policy == OverflowPolicy::Block {
      self.buffer.notify_waiters();
    }
    value
  }
}

impl<T> Endpoint<T> {
  /// The terminal state seen by this endpoint: `None` while values may still
  /// arrive, the tombstone once every value before it was read, or
  /// [`RxError::MissingBackpressure`] if this endpoint fell behind.
  pub fn closed(&self) -> Option<Result<()>> {
    if let Some(err) = &self.overflow {
      return Some(Err(err.clone()));
    }
    let st = self.buffer.state.read();
    let cursor = self.cursor.load(Ordering::Acquire);
    if cursor < st.begin && self.buffer.policy == OverflowPolicy::DropOnOverflow {
      return Some(Err(RxError::MissingBackpressure));
    }
    if !st.closed || cursor < st.end {
      return None;
    }
    match st.slot(st.end) {
      Slot::Tombstone(Some(err)) => Some(Err(err.clone())),
      _ => Some(Ok(())),
    }
  }

  fn has_news(&self, st: &BufferState<T>) -> bool {
    let cursor = self.cursor.load(Ordering::Acquire);
    self.overflow.is_some() || cursor < st.end || cursor < st.begin || st.closed
  }

  /// Block until a value past this endpoint's cursor or the tombstone is
  /// available.
  pub fn wait(&self) {
    let mut signal = self.buffer.signal.lock();
    while !self.has_news(&self.buffer.state.read()) {
      self.buffer.changed.wait(&mut signal);
    }
  }

  /// Register `waker` to run on the next send or close.
  ///
  /// Returns `false`, without registering, when there is already something
  /// to read; the caller should read instead of waiting.
  pub fn notify_on_change(&self, waker: impl FnOnce() + Send + Sync + 'static) -> bool {
    let mut st = self.buffer.state.write();
    if self.has_news(&st) {
      return false;
    }
    st.wakers.push((self.cursor.clone(), Box::new(waker)));
    true
  }

  /// Stop taking part in the buffer's flow control.
  pub fn detach(&mut self) {
    if !std::mem::replace(&mut self.attached, false) {
      return;
    }
    // Parked wakers may own this endpoint's reader; drop them unlocked.
    let parked: Vec<_> = {
      let mut st = self.buffer.state.write();
      st.cursors.retain(|c| !Arc::ptr_eq(c, &self.cursor));
      let (parked, others) = std::mem::take(&mut st.wakers)
        .into_iter()
        .partition(|(c, _)| Arc::ptr_eq(c, &self.cursor));
      st.wakers = others;
      parked
    };
    drop(parked);
    self.buffer.notify_waiters();
  }
}

impl<T> Drop for Endpoint<T> {
  fn drop(&mut self) { self.detach() }
}

impl<T> fmt::Debug for Endpoint<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Endpoint")
      .field("cursor", &self.cursor.load(Ordering::Relaxed))
      .field("overflow", &self.overflow)
      .finish()
  }
}
