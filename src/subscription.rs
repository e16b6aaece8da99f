//! Subscription tree
//!
//! A [`Subscriber`] is a node in a cancellation tree. It starts subscribed and
//! flips to unsubscribed exactly once; at that moment its teardown list runs
//! in registration order. Children created with [`Subscriber::add`] are
//! unsubscribed with their parent, while unsubscribing a child leaves the
//! parent untouched.

use std::{fmt, sync::Arc};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::{Result, RxError};

type Callback = Box<dyn FnOnce() + Send>;
type WaitHook = Arc<dyn Fn() -> bool + Send + Sync>;

/// Teardown length at which finished children are first pruned.
pub(crate) const PRUNE_FLOOR: usize = 8;

enum Teardown {
  Callback(Callback),
  Child(Subscriber),
}

impl Teardown {
  fn run(self) {
    match self {
      Teardown::Callback(f) => f(),
      Teardown::Child(child) => child.unsubscribe(),
    }
  }
}

struct State {
  subscribed: bool,
  /// Set once every teardown entry has run.
  released: bool,
  teardown: SmallVec<[Teardown; 2]>,
  /// Teardown length that triggers the next prune.
  prune_at: usize,
  err: Option<RxError>,
  wait_hook: Option<WaitHook>,
}

struct Inner {
  state: Mutex<State>,
  released: Condvar,
}

/// A cancellation tree node. Clones are handles to the same node.
#[derive(Clone)]
pub struct Subscriber(Arc<Inner>);

impl Default for Subscriber {
  fn default() -> Self { Self::new() }
}

impl Subscriber {
  /// Create a new root node in the subscribed state.
  pub fn new() -> Self {
    Subscriber(Arc::new(Inner {
      state: Mutex::new(State {
        subscribed: true,
        released: false,
        teardown: SmallVec::new(),
        prune_at: PRUNE_FLOOR,
        err: None,
        wait_hook: None,
      }),
      released: Condvar::new(),
    }))
  }

  #[inline]
  pub fn subscribed(&self) -> bool { self.0.state.lock().subscribed }

  /// Flip to unsubscribed and run the teardown list.
  ///
  /// Only the first call does any work, no matter how many threads race on
  /// it; the others return immediately.
  pub fn unsubscribe(&self) {
    let teardown = {
      let mut state = self.0.state.lock();
      if !state.subscribed {
        return;
      }
      state.subscribed = false;
      std::mem::take(&mut state.teardown)
    };
    trace!(callbacks = teardown.len(), "subscriber released");
    for entry in teardown {
      entry.run();
    }
    self.0.state.lock().released = true;
    self.0.released.notify_all();
  }

  /// Create a child node.
  ///
  /// If this node is already unsubscribed the child is unsubscribed before
  /// `add` returns.
  pub fn add(&self) -> Subscriber {
    let child = Subscriber::new();
    self.push(Teardown::Child(child.clone()));
    child
  }

  /// Create a child node whose teardown list starts with `callback`.
  pub fn add_with(&self, callback: impl FnOnce() + Send + 'static) -> Subscriber {
    let child = Subscriber::new();
    child.on_unsubscribe(callback);
    self.push(Teardown::Child(child.clone()));
    child
  }

  /// Append a release callback to this node, or run it right away when the
  /// node is already unsubscribed.
  pub fn on_unsubscribe(&self, callback: impl FnOnce() + Send + 'static) {
    self.push(Teardown::Callback(Box::new(callback)));
  }

  fn push(&self, entry: Teardown) {
    let mut state = self.0.state.lock();
    if state.subscribed {
      // Children that went away on their own only hold memory.
      if state.teardown.len() >= state.prune_at {
        state
          .teardown
          .retain(|t| !matches!(t, Teardown::Child(c) if !c.subscribed()));
        state.prune_at = PRUNE_FLOOR.max(state.teardown.len() * 2);
      }
      state.teardown.push(entry);
    } else {
      drop(state);
      entry.run();
    }
  }

  /// Record `err` as the outcome (`None` means success), then unsubscribe.
  ///
  /// The outcome of an already unsubscribed node does not change.
  pub fn done(&self, err: Option<RxError>) {
    {
      let mut state = self.0.state.lock();
      if state.subscribed && state.err.is_none() {
        state.err = err;
      }
    }
    self.unsubscribe();
  }

  /// Install the strategy `wait` runs before blocking.
  ///
  /// A cooperative scheduler installs its own `wait` here so that waiting on a
  /// subscription drives the queue instead of deadlocking on it. The hook
  /// returns `false` when nothing could wake a blocked caller, which is the
  /// case inside a task of the very scheduler that would have to finish it.
  pub fn on_wait(&self, hook: impl Fn() -> bool + Send + Sync + 'static) {
    self.0.state.lock().wait_hook = Some(Arc::new(hook));
  }

  /// Block until this node is unsubscribed and return the recorded outcome.
  ///
  /// Fails with [`RxError::Recursion`] instead of blocking when the wait hook
  /// reports that the node could never be released.
  pub fn wait(&self) -> Result<()> {
    let hook = self.0.state.lock().wait_hook.clone();
    let may_block = hook.map_or(true, |hook| hook());
    let mut state = self.0.state.lock();
    if !state.released && !may_block {
      warn!("wait from inside a running task would never return");
      return Err(RxError::Recursion);
    }
    while !state.released {
      self.0.released.wait(&mut state);
    }
    match state.err.clone() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// The recorded error, if the node was finished with one.
  pub fn err(&self) -> Option<RxError> { self.0.state.lock().err.clone() }

  /// Activate RAII behavior: the returned guard unsubscribes when dropped.
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard { SubscriptionGuard(self) }

  #[cfg(test)]
  pub(crate) fn teardown_size(&self) -> usize { self.0.state.lock().teardown.len() }

  #[cfg(test)]
  pub(crate) fn children(&self) -> Vec<Subscriber> {
    let state = self.0.state.lock();
    state
      .teardown
      .iter()
      .filter_map(|t| match t {
        Teardown::Child(child) => Some(child.clone()),
        Teardown::Callback(_) => None,
      })
      .collect()
  }
}

impl fmt::Debug for Subscriber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscriber")
      .field("subscribed", &self.subscribed())
      .finish()
  }
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be unsubscribed.
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard(Subscriber);

impl SubscriptionGuard {
  pub fn subscriber(&self) -> &Subscriber { &self.0 }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.unsubscribe() }
}
