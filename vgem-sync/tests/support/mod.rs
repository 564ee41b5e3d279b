//! Shared test support: in-memory stores, a scripted spy transport, and
//! polling helpers for the async sync loop.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vgem_common::config::SyncConfig;
use vgem_common::db::{init_schema, PersistentStore, Snapshot};
use vgem_common::{Error, Result};
use vgem_sync::{
    ConnectivityMonitor, MutationRegistry, QueueItem, SendOutcome, SyncManager, SyncTransport,
};

pub async fn memory_store() -> Arc<PersistentStore> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    Arc::new(PersistentStore::new(pool))
}

pub async fn file_store(path: &Path) -> Arc<PersistentStore> {
    Arc::new(PersistentStore::open(path).await.unwrap())
}

/// One scripted response per send, consumed first-in first-out; an empty
/// script delivers everything.
pub enum Scripted {
    Deliver,
    FailHttp(u16),
    FailNetwork,
    Conflict(Value),
    /// Hold the send open for a while, then deliver (for re-entrancy tests)
    Stall(Duration),
}

#[derive(Default)]
pub struct SpyTransport {
    pub sent: Mutex<Vec<QueueItem>>,
    pub script: Mutex<VecDeque<Scripted>>,
    pub remote_state: Mutex<Option<Snapshot>>,
    pub pushed_state: Mutex<Option<Snapshot>>,
}

impl SpyTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Scripted>) -> Arc<Self> {
        let transport = Self::default();
        *transport.script.lock().unwrap() = script.into();
        Arc::new(transport)
    }

    /// Ids of sent items, in send order
    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|item| item.id.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SyncTransport for SpyTransport {
    async fn send(&self, item: &QueueItem) -> Result<SendOutcome> {
        self.sent.lock().unwrap().push(item.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            None | Some(Scripted::Deliver) => Ok(SendOutcome::Delivered),
            Some(Scripted::FailHttp(status)) => Err(Error::Http(status)),
            Some(Scripted::FailNetwork) => Err(Error::Network("connection reset".to_string())),
            Some(Scripted::Conflict(state)) => Ok(SendOutcome::Conflict(state)),
            Some(Scripted::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(SendOutcome::Delivered)
            }
        }
    }

    async fn fetch_state(&self) -> Result<Snapshot> {
        self.remote_state
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::Http(404))
    }

    async fn push_state(&self, snapshot: &Snapshot) -> Result<()> {
        *self.pushed_state.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}

/// Opt-in test logging: `RUST_LOG=vgem_sync=debug cargo test`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Tight backoff so retry chains complete within a test run
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_attempts: 3,
        ..SyncConfig::default()
    }
}

pub async fn build_manager(
    store: Arc<PersistentStore>,
    transport: Arc<SpyTransport>,
    online: bool,
) -> (Arc<SyncManager>, Arc<ConnectivityMonitor>) {
    build_manager_with(store, transport, online, MutationRegistry::default(), fast_config()).await
}

pub async fn build_manager_with(
    store: Arc<PersistentStore>,
    transport: Arc<SpyTransport>,
    online: bool,
    registry: MutationRegistry,
    config: SyncConfig,
) -> (Arc<SyncManager>, Arc<ConnectivityMonitor>) {
    init_tracing();
    let connectivity = Arc::new(ConnectivityMonitor::new(online));
    let manager = SyncManager::new(store, transport, connectivity.clone(), registry, config);
    manager.init().await.unwrap();
    (manager, connectivity)
}

/// Poll until `predicate(status)` holds or the timeout expires
pub async fn wait_for_status<F>(manager: &SyncManager, timeout: Duration, mut predicate: F)
where
    F: FnMut(&vgem_common::events::SyncStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = manager.status().await;
        if predicate(&status) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for status; last seen: {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the queue drains completely
pub async fn wait_for_drain(manager: &SyncManager, timeout: Duration) {
    wait_for_status(manager, timeout, |status| status.pending_count == 0).await;
}
