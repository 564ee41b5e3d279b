//! Queue item and sync bookkeeping types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use vgem_common::{Error, Result};

/// Key of the singleton metadata record in the `sync_metadata` collection
pub const METADATA_KEY: &str = "metadata";

/// One pending mutation awaiting remote confirmation
///
/// Created by `push`, mutated only by incrementing `attempts` on a failed
/// send, destroyed on successful delivery or when `attempts` reaches the
/// retry ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Globally unique id: enqueue time plus a random suffix, so rapid
    /// successive pushes cannot collide
    pub id: String,
    /// Mutation type tag, resolved against the registry at push-time
    #[serde(rename = "type")]
    pub mutation_type: String,
    /// Opaque domain payload
    pub payload: Value,
    /// Enqueue time, epoch milliseconds; defines FIFO order
    pub enqueued_at: i64,
    /// Client schema version carried to the server for conflict detection
    pub version: i64,
    /// Failed send count; only ever increases
    pub attempts: u32,
}

impl QueueItem {
    pub fn new(mutation_type: &str, payload: Value) -> Self {
        let now = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}", now, &suffix[..8]),
            mutation_type: mutation_type.to_string(),
            payload,
            enqueued_at: now,
            version: 1,
            attempts: 0,
        }
    }

    /// Serialize for the `sync_queue` collection
    pub fn to_record(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("failed to serialize queue item: {}", e)))
    }

    /// Deserialize a record read back from the `sync_queue` collection
    pub fn from_record(record: Value) -> Result<Self> {
        serde_json::from_value(record)
            .map_err(|e| Error::Format(format!("corrupt queue record: {}", e)))
    }
}

/// Sync bookkeeping, persisted as a singleton record after every pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Epoch milliseconds of the last pass in which any item succeeded
    pub last_sync_time: Option<i64>,
    /// Lifetime count of delivered (or conflict-resolved) mutations
    pub total_synced: u64,
    /// Lifetime count of mutations dropped at the retry ceiling
    pub failed_count: u64,
}

impl SyncMetadata {
    /// Serialize for the `sync_metadata` collection (adds the record key)
    pub fn to_record(&self) -> Result<Value> {
        let mut record = serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("failed to serialize sync metadata: {}", e)))?;
        record["key"] = Value::String(METADATA_KEY.to_string());
        Ok(record)
    }

    /// Deserialize the singleton record (the key field is ignored)
    pub fn from_record(record: Value) -> Result<Self> {
        serde_json::from_value(record)
            .map_err(|e| Error::Format(format!("corrupt sync metadata record: {}", e)))
    }
}
