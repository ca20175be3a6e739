// ── External change observation ──
//
// Cross-instance sync: another widget instance (or tab, or process)
// writing the same storage keys is surfaced to this store as a key-level
// change notification. The transport behind the notifications is
// swappable -- the store only ever sees `StorageChange` values. The
// shipped implementation polls backend fingerprints on an interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::store::StorageBackend;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A storage-key change notification. Carries no payload: notifications
/// are possibly stale, so consumers re-read the backend.
#[derive(Debug, Clone)]
pub struct StorageChange {
    pub key: String,
}

/// Source of storage-key change notifications.
pub trait ChangeObserver: Send + Sync {
    fn changes(&self) -> broadcast::Receiver<StorageChange>;
}

// ── Polling implementation ───────────────────────────────────────────

/// Fingerprint-polling observer.
///
/// Watches a fixed key set and broadcasts a [`StorageChange`] whenever a
/// key's backend fingerprint moves. Changes made through this process's
/// own store also move fingerprints; the store's version comparison
/// filters those echoes out downstream.
pub struct PollingObserver {
    tx: broadcast::Sender<StorageChange>,
    cancel: CancellationToken,
}

impl PollingObserver {
    /// Spawn the polling task and return the observer handle.
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        keys: Vec<String>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let task_tx = tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            poll_loop(backend, keys, interval, task_tx, task_cancel).await;
        });
        Self { tx, cancel }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl ChangeObserver for PollingObserver {
    fn changes(&self) -> broadcast::Receiver<StorageChange> {
        self.tx.subscribe()
    }
}

async fn poll_loop(
    backend: Arc<dyn StorageBackend>,
    keys: Vec<String>,
    interval: Duration,
    tx: broadcast::Sender<StorageChange>,
    cancel: CancellationToken,
) {
    // Baseline first so pre-existing data doesn't fire a storm of
    // notifications at startup.
    let mut fingerprints: HashMap<String, Option<u64>> = keys
        .iter()
        .map(|key| (key.clone(), backend.fingerprint(key)))
        .collect();

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for key in &keys {
                    let current = backend.fingerprint(key);
                    let known = fingerprints.get(key).copied().flatten();
                    if current != known {
                        fingerprints.insert(key.clone(), current);
                        debug!(key, "storage key changed externally");
                        let _ = tx.send(StorageChange { key: key.clone() });
                    }
                }
            }
        }
    }
}
