//! Durable mutation queue
//!
//! In-memory mirror over the `sync_queue` collection. The collection is the
//! source of truth: every enqueue, attempt bump, and dequeue is a store
//! write, and the mirror is rebuilt from it at startup. The mirror exists so
//! the sync loop and status queries never hit the database for a length
//! check.

use crate::types::QueueItem;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vgem_common::db::collections::SYNC_QUEUE;
use vgem_common::db::PersistentStore;
use vgem_common::Result;

pub struct SyncQueue {
    store: Arc<PersistentStore>,
    items: Mutex<Vec<QueueItem>>,
}

impl SyncQueue {
    /// Empty queue; call [`SyncQueue::load`] to reconcile with the store
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            store,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the mirror from the durable collection, oldest first
    ///
    /// Records that no longer parse are skipped with a warning rather than
    /// wedging the whole queue behind one corrupt row.
    pub async fn load(&self) -> Result<usize> {
        let records = self.store.get_all(SYNC_QUEUE).await?;

        let mut loaded: Vec<QueueItem> = Vec::with_capacity(records.len());
        for record in records {
            match QueueItem::from_record(record) {
                Ok(item) => loaded.push(item),
                Err(e) => warn!(error = %e, "Skipping unreadable queue record"),
            }
        }
        loaded.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let count = loaded.len();
        *self.items.lock().await = loaded;
        debug!(pending = count, "Queue reloaded from store");
        Ok(count)
    }

    /// Create, persist, and mirror a new item; persisted before returning
    pub async fn enqueue(&self, mutation_type: &str, payload: Value) -> Result<QueueItem> {
        let item = QueueItem::new(mutation_type, payload);
        self.store.put(SYNC_QUEUE, &item.to_record()?).await?;
        self.items.lock().await.push(item.clone());
        Ok(item)
    }

    /// Remove an item from the store and the mirror
    ///
    /// Call only after confirmed delivery, a resolved conflict, or a retry
    /// ceiling breach.
    pub async fn dequeue(&self, id: &str) -> Result<()> {
        self.store.delete(SYNC_QUEUE, id).await?;
        self.items.lock().await.retain(|item| item.id != id);
        Ok(())
    }

    /// Bump an item's attempt count in the mirror and the durable copy,
    /// returning the new count
    pub async fn record_attempt(&self, id: &str) -> Result<u32> {
        let mut items = self.items.lock().await;
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            // Already dequeued by the time the failure was recorded
            return Ok(0);
        };
        item.attempts += 1;
        let attempts = item.attempts;
        let record = item.to_record()?;
        drop(items);

        self.store.put(SYNC_QUEUE, &record).await?;
        Ok(attempts)
    }

    /// Snapshot of the queue in FIFO enqueue order
    ///
    /// A pass iterates this copy, so pushes arriving mid-pass are picked up
    /// by the next pass instead of mutating a live iterator.
    pub async fn peek_all(&self) -> Vec<QueueItem> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Highest attempt count across pending items (0 when empty);
    /// drives the backoff delay between passes
    pub async fn max_attempts(&self) -> u32 {
        self.items
            .lock()
            .await
            .iter()
            .map(|item| item.attempts)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use vgem_common::db::init_schema;

    async fn test_queue() -> SyncQueue {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        SyncQueue::new(Arc::new(PersistentStore::new(pool)))
    }

    #[tokio::test]
    async fn test_enqueue_persists_before_returning() {
        let queue = test_queue().await;
        let item = queue.enqueue("STATS_UPDATE", json!({"points": 5})).await.unwrap();

        let persisted = queue.store.get(SYNC_QUEUE, &item.id).await.unwrap();
        assert!(persisted.is_some());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_dequeue_removes_everywhere() {
        let queue = test_queue().await;
        let item = queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();

        queue.dequeue(&item.id).await.unwrap();
        assert!(queue.is_empty().await);
        assert!(queue.store.get(SYNC_QUEUE, &item.id).await.unwrap().is_none());
        // A later getAll on the collection must not resurrect it
        assert!(queue.store.get_all(SYNC_QUEUE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_attempt_is_durable() {
        let queue = test_queue().await;
        let item = queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();

        assert_eq!(queue.record_attempt(&item.id).await.unwrap(), 1);
        assert_eq!(queue.record_attempt(&item.id).await.unwrap(), 2);

        // Rebuild the mirror from the store: attempts survive
        queue.load().await.unwrap();
        let reloaded = queue.peek_all().await;
        assert_eq!(reloaded[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_record_attempt_on_dequeued_item() {
        let queue = test_queue().await;
        let item = queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();
        queue.dequeue(&item.id).await.unwrap();

        assert_eq!(queue.record_attempt(&item.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_orders_by_enqueue_time() {
        let queue = test_queue().await;

        // Write records straight to the collection with out-of-order times
        for (id, at) in [("9-z", 9_i64), ("3-a", 3), ("5-m", 5)] {
            let record = json!({
                "id": id, "type": "STATS_UPDATE", "payload": {},
                "enqueued_at": at, "version": 1, "attempts": 0
            });
            queue.store.put(SYNC_QUEUE, &record).await.unwrap();
        }

        assert_eq!(queue.load().await.unwrap(), 3);
        let order: Vec<i64> = queue.peek_all().await.iter().map(|i| i.enqueued_at).collect();
        assert_eq!(order, vec![3, 5, 9]);
    }

    #[tokio::test]
    async fn test_load_skips_corrupt_records() {
        let queue = test_queue().await;
        queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();
        queue
            .store
            .put(SYNC_QUEUE, &json!({"id": "bad-record"}))
            .await
            .unwrap();

        assert_eq!(queue.load().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_max_attempts() {
        let queue = test_queue().await;
        assert_eq!(queue.max_attempts().await, 0);

        let a = queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();
        let _b = queue.enqueue("STATS_UPDATE", json!({})).await.unwrap();
        queue.record_attempt(&a.id).await.unwrap();
        queue.record_attempt(&a.id).await.unwrap();

        assert_eq!(queue.max_attempts().await, 2);
    }
}
