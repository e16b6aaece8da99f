use crate::observable::Observable;

/// Creates an observable that will on subscription defer to another
/// observable that is supplied by a supplier-function which will be run once
/// at each subscription.
pub fn defer<T, F>(factory: F) -> Observable<T>
where
  T: 'static,
  F: Fn() -> Observable<T> + Send + Sync + 'static,
{
  Observable::new(move |observer, scheduler, subscriber| {
    factory().subscribe_with(observer, scheduler, subscriber)
  })
}
