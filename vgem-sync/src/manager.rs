//! Sync orchestration
//!
//! Owns the queue mirror, runs the drain-with-backoff sync loop, maintains
//! sync metadata, and publishes status changes to subscribers.
//!
//! One logical worker: all queue mutation and network sending happens
//! through one sequential pass at a time, enforced by an atomic re-entrancy
//! guard. `push()` may race a running pass freely; the pass iterates a
//! snapshot, so concurrent pushes land in the next pass.

use crate::connectivity::ConnectivityMonitor;
use crate::queue::SyncQueue;
use crate::registry::MutationRegistry;
use crate::transport::{SendOutcome, SyncTransport};
use crate::types::{QueueItem, SyncMetadata, METADATA_KEY};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vgem_common::config::SyncConfig;
use vgem_common::db::collections::{INTERNAL_COLLECTIONS, SYNC_METADATA};
use vgem_common::db::PersistentStore;
use vgem_common::events::{StatusBus, SyncStatus};
use vgem_common::Result;

/// Backoff delay before the next pass, computed from the highest attempt
/// count across remaining items: `min(base * 2^(attempts-1), max)`.
///
/// Keying on the maximum means a burst of fresh failures cannot retry
/// faster than the slowest-failing item warrants.
pub fn backoff_delay(config: &SyncConfig, max_attempts: u32) -> Duration {
    let exponent = max_attempts.saturating_sub(1).min(16);
    let delay = config.base_delay.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(config.max_delay)
}

/// The sync orchestrator
///
/// Construct with [`SyncManager::new`], call [`SyncManager::init`] once to
/// reload durable state and start the connectivity listener, and
/// [`SyncManager::close`] on shutdown. Multiple isolated instances can
/// coexist (tests rely on this); nothing here is process-global.
pub struct SyncManager {
    store: Arc<PersistentStore>,
    queue: SyncQueue,
    transport: Arc<dyn SyncTransport>,
    registry: MutationRegistry,
    connectivity: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    status_bus: StatusBus,
    metadata: Mutex<SyncMetadata>,
    syncing: AtomicBool,
    ready: AtomicBool,
    retry_task: StdMutex<Option<JoinHandle<()>>>,
    listener_task: StdMutex<Option<JoinHandle<()>>>,
    weak_self: Weak<SyncManager>,
}

impl SyncManager {
    pub fn new(
        store: Arc<PersistentStore>,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<ConnectivityMonitor>,
        registry: MutationRegistry,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            queue: SyncQueue::new(store.clone()),
            store,
            transport,
            registry,
            connectivity,
            config,
            status_bus: StatusBus::new(64),
            metadata: Mutex::new(SyncMetadata::default()),
            syncing: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            retry_task: StdMutex::new(None),
            listener_task: StdMutex::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Reload durable state and start the connectivity listener
    ///
    /// After `init` returns, the in-memory queue mirror matches the
    /// `sync_queue` collection and `status().is_ready` is true. If items
    /// survived a restart and we are online, a drain starts immediately.
    pub async fn init(&self) -> Result<()> {
        let pending = self.queue.load().await?;

        let metadata = match self.store.get(SYNC_METADATA, METADATA_KEY).await? {
            Some(record) => SyncMetadata::from_record(record).unwrap_or_else(|e| {
                warn!(error = %e, "Resetting unreadable sync metadata");
                SyncMetadata::default()
            }),
            None => SyncMetadata::default(),
        };
        *self.metadata.lock().await = metadata;

        self.ready.store(true, Ordering::SeqCst);
        self.spawn_connectivity_listener();
        info!(pending, "Sync engine initialized");
        self.publish_status().await;

        if pending > 0 && self.connectivity.is_online() {
            self.spawn_sync();
        }
        Ok(())
    }

    /// Stop background tasks; pending queue items stay durable for the next
    /// instance
    pub fn close(&self) {
        if let Some(handle) = self.retry_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.listener_task.lock().unwrap().take() {
            handle.abort();
        }
        self.ready.store(false, Ordering::SeqCst);
        info!("Sync engine shut down");
    }

    /// Enqueue a mutation and opportunistically start a sync
    ///
    /// The item is durable before this returns. The sync attempt itself is
    /// fire-and-forget: its outcome surfaces through the status stream,
    /// never through this call.
    pub async fn push(&self, mutation_type: &str, payload: Value) -> Result<QueueItem> {
        self.registry.validate_push(mutation_type, &payload)?;

        let item = self.queue.enqueue(mutation_type, payload).await?;
        debug!(id = %item.id, mutation_type = %item.mutation_type, "Mutation queued");
        self.publish_status().await;

        if self.connectivity.is_online() {
            self.spawn_sync();
        }
        Ok(item)
    }

    /// Run one sync pass if online, non-empty, and not already syncing
    ///
    /// Returns whether any item succeeded. A call while a pass is running
    /// is a no-op returning `false`; same while offline or empty.
    pub async fn sync(&self) -> Result<bool> {
        if !self.connectivity.is_online() {
            debug!("Sync skipped: offline");
            return Ok(false);
        }
        if self.queue.is_empty().await {
            return Ok(false);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync skipped: pass already running");
            return Ok(false);
        }

        self.publish_status().await;
        let result = self.run_pass().await;
        self.syncing.store(false, Ordering::SeqCst);
        self.publish_status().await;

        // Anything left over waits out the backoff before the next pass
        if !self.queue.is_empty().await {
            let delay = backoff_delay(&self.config, self.queue.max_attempts().await);
            self.schedule_retry(delay);
        }

        result
    }

    /// Manual retry action: cancel any scheduled backoff and sync now
    ///
    /// Fails fast (returns `false`) while offline; never pre-empts a pass
    /// already running.
    pub async fn force_sync_now(&self) -> bool {
        if !self.connectivity.is_online() {
            return false;
        }
        if let Some(handle) = self.retry_task.lock().unwrap().take() {
            handle.abort();
        }
        match self.sync().await {
            Ok(any_succeeded) => any_succeeded,
            Err(e) => {
                error!(error = %e, "Manual sync failed");
                false
            }
        }
    }

    /// Current status snapshot
    pub async fn status(&self) -> SyncStatus {
        let metadata = self.metadata.lock().await.clone();
        SyncStatus {
            is_online: self.connectivity.is_online(),
            is_syncing: self.syncing.load(Ordering::SeqCst),
            pending_count: self.queue.len().await,
            last_sync_time: metadata.last_sync_time,
            total_synced: metadata.total_synced,
            failed_count: metadata.failed_count,
            is_ready: self.ready.load(Ordering::SeqCst),
        }
    }

    /// Subscribe to status changes; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_bus.subscribe()
    }

    /// Restore the full remote user state into the local store (login-time
    /// pull). Engine-internal collections are never overwritten.
    pub async fn pull_remote(&self) -> bool {
        let mut snapshot = match self.transport.fetch_state().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Remote pull failed");
                return false;
            }
        };

        let stripped = snapshot.strip(INTERNAL_COLLECTIONS);
        if stripped > 0 {
            warn!(stripped, "Remote state carried engine-internal collections; ignored");
        }

        match self.store.import_all(&snapshot).await {
            Ok(()) => {
                info!("Remote state restored");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to apply remote state");
                false
            }
        }
    }

    /// Push the full local user state wholesale (logout-time preserve)
    pub async fn push_all(&self) -> bool {
        let mut snapshot = self.store.export_all().await;
        snapshot.strip(INTERNAL_COLLECTIONS);

        match self.transport.push_state(&snapshot).await {
            Ok(()) => {
                info!("Full state pushed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Full state push failed");
                false
            }
        }
    }

    /// One drain over a snapshot of the queue, FIFO
    async fn run_pass(&self) -> Result<bool> {
        let items = self.queue.peek_all().await;
        info!(count = items.len(), "Starting sync pass");

        let mut any_succeeded = false;
        for item in &items {
            match self.transport.send(item).await {
                Ok(SendOutcome::Delivered) => {
                    self.complete(item).await?;
                    any_succeeded = true;
                }
                Ok(SendOutcome::Conflict(server_state)) => {
                    let strategy = self.registry.strategy_for(&item.mutation_type);
                    if strategy.resolve(item, &server_state).handled {
                        self.complete(item).await?;
                        any_succeeded = true;
                    } else {
                        self.record_failure(item).await;
                    }
                }
                // Transport errors and non-2xx responses alike: count the
                // attempt, keep the item, move on to the next one
                Err(e) => {
                    warn!(id = %item.id, error = %e, "Send failed, will retry");
                    self.record_failure(item).await;
                }
            }
        }

        if any_succeeded {
            self.metadata.lock().await.last_sync_time =
                Some(chrono::Utc::now().timestamp_millis());
        }
        self.persist_metadata().await?;

        Ok(any_succeeded)
    }

    /// Confirmed delivery (or resolved conflict): drop from the durable
    /// queue and count it
    async fn complete(&self, item: &QueueItem) -> Result<()> {
        self.queue.dequeue(&item.id).await?;
        self.metadata.lock().await.total_synced += 1;
        debug!(id = %item.id, "Mutation delivered");
        Ok(())
    }

    /// Count a failed attempt; past the retry ceiling the item is dropped
    /// so one poisoned mutation cannot block the queue forever
    async fn record_failure(&self, item: &QueueItem) {
        let attempts = match self.queue.record_attempt(&item.id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                error!(id = %item.id, error = %e, "Failed to persist attempt count");
                return;
            }
        };

        if attempts >= self.config.max_attempts {
            error!(
                id = %item.id,
                mutation_type = %item.mutation_type,
                attempts,
                "Retry ceiling reached, dropping mutation as unrecoverable"
            );
            if let Err(e) = self.queue.dequeue(&item.id).await {
                error!(id = %item.id, error = %e, "Failed to drop poisoned mutation");
                return;
            }
            self.metadata.lock().await.failed_count += 1;
        }
    }

    async fn persist_metadata(&self) -> Result<()> {
        let record = self.metadata.lock().await.to_record()?;
        self.store.put(SYNC_METADATA, &record).await?;
        Ok(())
    }

    async fn publish_status(&self) {
        self.status_bus.emit_lossy(self.status().await);
    }

    /// Fire-and-forget sync attempt
    fn spawn_sync(&self) {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            let Some(manager) = weak.upgrade() else { return };
            if let Err(e) = manager.sync().await {
                error!(error = %e, "Opportunistic sync failed");
            }
        });
    }

    /// Arm (or re-arm) the single backoff timer
    fn schedule_retry(&self, delay: Duration) {
        let weak = self.weak_self.clone();
        let mut slot = self.retry_task.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        debug!(delay_ms = delay.as_millis() as u64, "Next sync attempt scheduled");
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = weak.upgrade() else { return };
            // This timer has fired; leave the slot free for the next one
            manager.retry_task.lock().unwrap().take();
            if let Err(e) = manager.sync().await {
                error!(error = %e, "Scheduled sync failed");
            }
        }));
    }

    /// Watch connectivity; the offline→online edge triggers an immediate
    /// sync without waiting for a push
    fn spawn_connectivity_listener(&self) {
        let mut rx = self.connectivity.subscribe();
        let weak = self.weak_self.clone();
        let handle = tokio::spawn(async move {
            let mut was_online = *rx.borrow();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                let Some(manager) = weak.upgrade() else { break };
                if online == was_online {
                    continue;
                }
                was_online = online;
                manager.publish_status().await;
                if online {
                    info!("Back online, attempting sync");
                    if let Err(e) = manager.sync().await {
                        error!(error = %e, "Sync after reconnect failed");
                    }
                }
            }
        });

        let mut slot = self.listener_task.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(handle);
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        // Background tasks hold only weak references, but aborting here
        // keeps a forgotten close() from leaking a live timer
        if let Some(handle) = self.retry_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.listener_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, max_ms: u64) -> SyncConfig {
        SyncConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let config = config(1000, 60_000);
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let config = config(1000, 30_000);
        let mut previous = Duration::ZERO;
        for attempts in 1..=64 {
            let delay = backoff_delay(&config, attempts);
            assert!(delay >= previous, "delay shrank at attempts={attempts}");
            assert!(delay <= config.max_delay, "cap exceeded at attempts={attempts}");
            previous = delay;
        }
        assert_eq!(backoff_delay(&config, 64), config.max_delay);
    }
}
