//! Listener registration primitives
//!
//! Every event source in this crate (provider adapters, the connection
//! store, the discovery channel) hands out a [`Subscription`] when a
//! listener is registered. Dropping the subscription removes the listener,
//! so whoever owns the handle owns the cleanup.

use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Handle to a registered listener; dropping it unregisters the listener
#[must_use = "dropping a Subscription immediately unregisters its listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription running `cancel` when dropped
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to unregister
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unregister the listener now
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Listener<K, L> {
    id: u64,
    key: K,
    listener: L,
}

struct ListenerTable<K, L> {
    next_id: u64,
    listeners: Vec<Listener<K, L>>,
}

/// Ordered listener list shared between an event source and its subscriptions
pub(crate) struct Listeners<K, L> {
    table: Arc<Mutex<ListenerTable<K, L>>>,
}

impl<K, L> Listeners<K, L>
where
    K: Send + 'static,
    L: Clone + Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener; listeners are notified in registration order
    pub(crate) fn add(&self, key: K, listener: L) -> Subscription {
        let id = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            let id = table.next_id;
            table.next_id += 1;
            table.listeners.push(Listener { id, key, listener });
            id
        };

        let weak: Weak<Mutex<ListenerTable<K, L>>> = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = weak.upgrade() {
                let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
                table.listeners.retain(|entry| entry.id != id);
            }
        })
    }

    /// Listeners whose key matches, cloned so they can run without the lock
    pub(crate) fn matching(&self, mut filter: impl FnMut(&K) -> bool) -> Vec<L> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .listeners
            .iter()
            .filter(|entry| filter(&entry.key))
            .map(|entry| entry.listener.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.listeners.len()
    }
}

impl<K, L> Default for Listeners<K, L>
where
    K: Send + 'static,
    L: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Callback = Arc<dyn Fn() + Send + Sync>;

    #[test]
    fn test_drop_unregisters() {
        let listeners: Listeners<&'static str, Callback> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let sub = listeners.add("a", Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(listeners.len(), 1);

        for callback in listeners.matching(|key| *key == "a") {
            callback();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(sub);
        assert_eq!(listeners.len(), 0);
        assert!(listeners.matching(|_| true).is_empty());
    }

    #[test]
    fn test_registration_order_and_filter() {
        let listeners: Listeners<u8, u8> = Listeners::new();
        let _a = listeners.add(1, 10);
        let _b = listeners.add(2, 20);
        let _c = listeners.add(1, 30);

        assert_eq!(listeners.matching(|key| *key == 1), vec![10, 30]);
        assert_eq!(listeners.matching(|_| true), vec![10, 20, 30]);
    }

    #[test]
    fn test_subscription_outliving_source() {
        let listeners: Listeners<u8, u8> = Listeners::new();
        let sub = listeners.add(1, 1);
        drop(listeners);
        sub.unsubscribe();
        Subscription::noop().unsubscribe();
    }
}
