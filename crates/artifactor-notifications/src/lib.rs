//! artifactor-notifications — the Notification Service described in
//! SPEC_FULL.md §4.5: create, store, deliver, and query user notifications.

pub mod error;
pub mod service;
pub mod store;

pub use error::{NotificationError, Result};
pub use service::{Callback, NewNotification, NotificationService, SubscriberId};
