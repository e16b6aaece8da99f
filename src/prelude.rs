//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Creation functions are reached through the module: `observable::of(1)`.
pub use crate::observable::{self, Emitter, Observable};
// Observer and notifications
pub use crate::observer::{Notification, Observer};
// Errors
pub use crate::error::{Result, RxError, Violation};
// Operators
pub use crate::ops::{self, Connectable, RetryConfig};
// Scheduler core types
pub use crate::scheduler::{self, Duration, Instant, Scheduler, SharedScheduler, TaskHandle};
// Subject
pub use crate::subject::{Endpoint, OverflowPolicy, Subject, SubjectConfig};
// Subscription
pub use crate::subscription::{Subscriber, SubscriptionGuard};
