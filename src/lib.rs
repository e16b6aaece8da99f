//! # rxcore: the execution core of a reactive streams runtime
//!
//! Observables, pluggable schedulers, multi-source combination operators and
//! replay subjects, all thread safe.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxcore::prelude::*;
//!
//! let scheduler = scheduler::trampoline();
//! let evens = observable::from_iter(0..10)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 2)
//!   .to_vec(&scheduler);
//! assert_eq!(evens, Ok(vec![0, 4, 8, 12, 16]));
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Observable`] | A repeatable producer description |
//! | [`Observer`] | Consumes `next`, `error`, and `complete` notifications |
//! | [`Subscriber`] | Node of the cancellation tree behind every subscription |
//! | [`Scheduler`] | Where work runs: cooperatively or on a thread pool |
//! | [`Subject`] | A hot source multicasting through a replay buffer |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): the parallel [`ThreadPoolScheduler`]
//!
//! [`Observable`]: observable::Observable
//! [`Observer`]: observer::Observer
//! [`Subscriber`]: subscription::Subscriber
//! [`Scheduler`]: scheduler::Scheduler
//! [`Subject`]: subject::Subject
//! [`ThreadPoolScheduler`]: scheduler::ThreadPoolScheduler

pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod subject;
pub mod subscription;

pub use prelude::*;

#[cfg(doctest)]
mod __readme_doctests {
  #![doc = include_str!("../README.md")]
}
