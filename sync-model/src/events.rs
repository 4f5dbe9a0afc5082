//! Observer fan-out for registry notifications

use crate::models::SyncSetting;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Filesystem conditions that get a one-time warning on activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemWarning {
    /// FAT: unreliable modification times and no large files
    Fat,
    /// VMWare shared folder: no change notifications, continuous scanning
    Hgfs,
}

/// Notifications emitted by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A sync was removed; carries the last state of the record
    Removed(Arc<SyncSetting>),
    /// A sync was reconciled with SDK state
    StateChanged(Arc<SyncSetting>),
    /// The unattended-disabled set changed
    DisabledListUpdated,
    /// The folder's overlay state should go back to "none"
    ItemStateReset { local_folder: String },
    /// Ask the user to acknowledge a filesystem limitation
    FilesystemWarning {
        kind: FilesystemWarning,
        local_folder: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&SyncEvent) -> bool + Send + Sync>;

/// Registered observers, notified synchronously in subscription order
pub struct SyncEvents {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Callback)>>,
}

impl SyncEvents {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.add(Arc::new(move |event: &SyncEvent| {
            callback(event);
            true
        }))
    }

    /// Registers a channel; the subscription ends when the receiver is dropped
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add(Arc::new(move |event: &SyncEvent| {
            tx.send(event.clone()).is_ok()
        }));
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers an event to every subscriber
    pub fn emit(&self, event: &SyncEvent) {
        // Snapshot so callbacks may subscribe or unsubscribe
        let subscribers: Vec<(SubscriptionId, Callback)> = self.subscribers.read().clone();

        let mut closed = Vec::new();
        for (id, callback) in subscribers {
            if !callback(event) {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            log::debug!("Dropping {} closed event channel(s)", closed.len());
            self.subscribers
                .write()
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    fn add(&self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, callback));
        id
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}
