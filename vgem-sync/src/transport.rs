//! Remote sync transport
//!
//! HTTP client for the sync wire protocol. The trait seam exists so tests
//! (and alternative shells) can substitute a scripted transport; the engine
//! only ever sees [`SendOutcome`] or an error.

use crate::types::QueueItem;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use vgem_common::db::Snapshot;
use vgem_common::{Error, Result};

/// Result of sending one mutation to the remote service
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Remote accepted the mutation (2xx)
    Delivered,
    /// Remote reported a version conflict (409); carries the server's state
    /// for the conflict resolver
    Conflict(Value),
}

/// Transport seam between the sync loop and the wire
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send one queued mutation. Non-2xx/non-409 statuses and transport
    /// failures are errors; the caller treats both identically.
    async fn send(&self, item: &QueueItem) -> Result<SendOutcome>;

    /// Fetch the full remote user state for a restore-style pull
    async fn fetch_state(&self) -> Result<Snapshot>;

    /// Push the full local user state wholesale (logout-time preserve)
    async fn push_state(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Wire form of a queue item: `enqueued_at` travels as `timestamp`, and the
/// local retry count stays local.
#[derive(Serialize)]
struct WireItem<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    mutation_type: &'a str,
    payload: &'a Value,
    timestamp: i64,
    version: i64,
}

impl<'a> From<&'a QueueItem> for WireItem<'a> {
    fn from(item: &'a QueueItem) -> Self {
        Self {
            id: &item.id,
            mutation_type: &item.mutation_type,
            payload: &item.payload,
            timestamp: item.enqueued_at,
            version: item.version,
        }
    }
}

/// Production transport over HTTP/JSON
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn send(&self, item: &QueueItem) -> Result<SendOutcome> {
        let url = format!("{}/api/sync", self.base_url);
        debug!(id = %item.id, mutation_type = %item.mutation_type, "Sending mutation");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "queue": [WireItem::from(item)] }))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            return Ok(SendOutcome::Delivered);
        }

        if status.as_u16() == 409 {
            // Body carries the server's copy for the conflict resolver;
            // an unreadable body still counts as a conflict
            let server_state = response.json::<Value>().await.unwrap_or(Value::Null);
            return Ok(SendOutcome::Conflict(server_state));
        }

        Err(Error::Http(status.as_u16()))
    }

    async fn fetch_state(&self) -> Result<Snapshot> {
        let url = format!("{}/api/user-data", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(status.as_u16()));
        }

        response
            .json::<Snapshot>()
            .await
            .map_err(|e| Error::Format(format!("unreadable remote state: {}", e)))
    }

    async fn push_state(&self, snapshot: &Snapshot) -> Result<()> {
        let url = format!("{}/api/user-data", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(status.as_u16()));
        }
        Ok(())
    }
}
