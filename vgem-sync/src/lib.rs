//! # Vocal GEM Sync Engine
//!
//! Offline-first synchronization for the Vocal GEM persistent store: a
//! durable mutation queue plus a connectivity-aware push orchestrator with
//! exponential backoff and per-type conflict resolution.
//!
//! The engine is an explicitly constructed service with a defined lifecycle
//! (`new` → `init` → `close`), owned by whatever owns application lifetime.
//! UI code interacts with it through four calls: `push`, `status`,
//! `subscribe`, and `force_sync_now`. None of them ever block on the
//! network.

pub mod connectivity;
pub mod manager;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod types;

pub use connectivity::ConnectivityMonitor;
pub use manager::{backoff_delay, SyncManager};
pub use registry::{mutation, ConflictStrategy, MutationRegistry, Resolution};
pub use transport::{HttpTransport, SendOutcome, SyncTransport};
pub use types::{QueueItem, SyncMetadata};
