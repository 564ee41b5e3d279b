//! Sync status event bus
//!
//! Status snapshots are broadcast to every subscriber on each state change
//! (queue growth, pass start/end, connectivity transitions). Subscribers that
//! lag simply miss intermediate snapshots; the latest one always wins, so a
//! UI can render whatever it receives without replaying history.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Point-in-time view of the sync engine, published to subscribers and
/// returned by `SyncManager::status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current connectivity condition
    pub is_online: bool,
    /// Whether a sync pass is running right now
    pub is_syncing: bool,
    /// Mutations waiting for remote confirmation
    pub pending_count: usize,
    /// Epoch milliseconds of the last pass in which any item succeeded
    pub last_sync_time: Option<i64>,
    /// Mutations delivered (or conflict-resolved) since first install
    pub total_synced: u64,
    /// Mutations dropped after exhausting the retry ceiling
    pub failed_count: u64,
    /// Whether the durable queue has been reloaded after construction
    pub is_ready: bool,
}

/// Broadcast bus for [`SyncStatus`] snapshots
///
/// Thin wrapper over `tokio::sync::broadcast`, providing:
/// - Non-blocking publish (slow subscribers don't block the sync loop)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<SyncStatus>,
    capacity: usize,
}

impl StatusBus {
    /// Creates a new bus buffering up to `capacity` snapshots per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future status changes
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Publish a snapshot, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, status: SyncStatus) {
        let _ = self.tx.send(status);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
