//! Change notification: lifecycle events, subscribers and file watching.
//!
//! File watching requires the `file-watch` feature (enabled by default).

pub mod events;
pub mod subscriber;

#[cfg(feature = "file-watch")]
pub mod watcher;

pub use events::{EventSink, LifecycleEvent, TracingSink};
pub use subscriber::{SubscriberRegistry, SubscriptionHandle};

#[cfg(feature = "file-watch")]
pub use watcher::{ChangeHandler, ChangeKind, UnitWatcher};
