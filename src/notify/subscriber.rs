//! Subscriber-based notifications for configuration changes.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle for a subscription that can be dropped to unsubscribe.
///
/// When the handle is dropped, the subscription is removed immediately.
pub struct SubscriptionHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandle {
    /// Keep the subscription alive for the lifetime of the registry.
    pub fn forget(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

struct SubscriberRegistryInner<T> {
    subscribers: Vec<(usize, Callback<T>)>,
    next_id: usize,
}

/// Registry of callbacks invoked with the new value whenever a live value is
/// replaced.
///
/// Notification is synchronous and may happen on a blocking worker thread;
/// callbacks should be quick. Callbacks run outside the registry lock, so a
/// callback may itself subscribe or unsubscribe.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::notify::SubscriberRegistry;
///
/// let registry = SubscriberRegistry::<u16>::new();
/// let handle = registry.subscribe(|port| println!("port is now {}", port));
///
/// registry.notify_all(&9000);
/// drop(handle);
/// assert_eq!(registry.subscriber_count(), 0);
/// ```
pub struct SubscriberRegistry<T> {
    inner: Arc<RwLock<SubscriberRegistryInner<T>>>,
}

impl<T: 'static> SubscriberRegistry<T> {
    /// Create a new subscriber registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SubscriberRegistryInner {
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register `callback`; it runs on every [`notify_all`](Self::notify_all)
    /// until the returned handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: Send + Sync,
    {
        let id = {
            let mut inner = self.inner.write();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<RwLock<SubscriberRegistryInner<T>>> = Arc::downgrade(&self.inner);
        SubscriptionHandle {
            unsubscribe: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.write().subscribers.retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    /// Invoke every subscriber with `value`, in subscription order.
    pub fn notify_all(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .read()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

impl<T: 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
