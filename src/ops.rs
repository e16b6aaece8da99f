//! Operators
//!
//! Every operator is a method on [`Observable`] or a free function returning
//! one, built only on the subscribe contract, the subscription tree and the
//! scheduler. Multi-source operators keep their per-subscription state in a
//! [`Serialized`] gate so the downstream observer is never called
//! concurrently.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  observable::Observable,
  observer::{Notification, Observer},
};

mod combine_latest;
mod concat;
mod filter;
mod link;
mod map;
mod merge;
mod publish;
mod race;
mod retry;
mod serialized;
mod switch_on_next;
mod take;
mod timeout;
mod validate;
mod with_latest_from;
mod zip;

pub use combine_latest::{combine_latest, combine_latest2, combine_latest_all};
pub use concat::{concat, concat_all};
pub use link::{Link, LinkState};
pub use merge::{merge, merge_all, merge_all_delay_error, merge_delay_error};
pub use publish::Connectable;
pub use race::race;
pub use retry::RetryConfig;
pub use switch_on_next::switch_all;
pub use with_latest_from::{with_latest_from, with_latest_from_all};
pub use zip::{zip, zip2, zip_all, zip_with_capacity};

pub(crate) use serialized::Serialized;

/// Carries values of two differently typed sources through one
/// homogeneous operator.
#[derive(Clone)]
pub(crate) enum Either<A, B> {
  Left(A),
  Right(B),
}

/// Collects every inner observable of `sources`, then hands the full list to
/// `combine` and subscribes the observable it builds.
///
/// Errors of the outer observable terminate right away.
pub(crate) fn gather<T, U>(
  sources: Observable<Observable<T>>,
  combine: impl Fn(Vec<Observable<T>>) -> Observable<U> + Send + Sync + 'static,
) -> Observable<U>
where
  T: 'static,
  U: 'static,
{
  let combine = Arc::new(combine);
  Observable::new(move |observer, scheduler, subscriber| {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let outer = subscriber.add();
    let (combine, scheduler_c, parent) = (combine.clone(), scheduler.clone(), subscriber.clone());
    sources.subscribe_with(
      Observer::new(move |n: Notification<Observable<T>>| match n {
        Notification::Next(source) => collected.lock().push(source),
        Notification::Error(e) => observer.error(e),
        Notification::Complete => {
          let all = std::mem::take(&mut *collected.lock());
          combine(all).subscribe_with(observer.clone(), &scheduler_c, &parent);
        }
      }),
      scheduler,
      &outer,
    );
  })
}
