//! Versioned settings with change notification.
//!
//! `SettingsStore<T>` publishes immutable `Arc<T>` values through a
//! `watch` channel. Readers take a cheap snapshot with
//! [`current`](SettingsStore::current); long-running processors hold a
//! [`SettingsWatcher`] and react when a reload lands.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared, versioned settings value.
pub struct SettingsStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Receives notifications when a [`SettingsStore`] is updated.
pub struct SettingsWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> SettingsStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SettingsWatcher<T> {
        SettingsWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for SettingsStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> SettingsWatcher<T> {
    /// Wait until the store is updated.
    ///
    /// Returns `Err` once every [`SettingsStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// The latest value, marking it as seen.
    pub fn current(&mut self) -> Arc<T> {
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_sees_update() {
        let store = SettingsStore::new(1u32);
        let mut watcher = store.subscribe();
        assert_eq!(*watcher.current(), 1);

        store.update(2);
        watcher.changed().await.unwrap();
        assert_eq!(*watcher.current(), 2);
        assert_eq!(*store.current(), 2);
    }

    #[tokio::test]
    async fn test_watcher_errors_when_store_dropped() {
        let store = SettingsStore::new("a");
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
