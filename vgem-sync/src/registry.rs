//! Mutation type registry and conflict resolution
//!
//! Every mutation type the application can push is declared here, together
//! with the strategy applied when the remote reports a version conflict.
//! Unknown types are rejected at push-time, not discovered at send-time.
//!
//! The default strategies accept that the server's copy wins and rely on the
//! next full data pull to reconcile. That silently discards the losing local
//! write, a known simplification of this domain rather than a general merge.

use crate::types::QueueItem;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};
use vgem_common::{Error, Result};

/// Well-known mutation type tags
pub mod mutation {
    pub const JOURNAL_ENTRY: &str = "JOURNAL_ENTRY";
    pub const RECORDING_META: &str = "RECORDING_META";
    pub const STATS_UPDATE: &str = "STATS_UPDATE";
    pub const GOALS_UPDATE: &str = "GOALS_UPDATE";
    pub const PROFILE_UPDATE: &str = "PROFILE_UPDATE";
    pub const SETTINGS_UPDATE: &str = "SETTINGS_UPDATE";
}

/// Outcome of conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// `true`: the conflict is settled, dequeue the item as if delivered.
    /// `false`: keep the item queued and retry later.
    pub handled: bool,
}

/// What to do when the server rejects a mutation with a version conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Accept the server's copy and drop the local write
    ServerWins,
    /// Keep the mutation queued and retry on the next pass
    RetryLater,
}

impl ConflictStrategy {
    pub fn resolve(&self, item: &QueueItem, _server_state: &Value) -> Resolution {
        match self {
            ConflictStrategy::ServerWins => {
                info!(
                    id = %item.id,
                    mutation_type = %item.mutation_type,
                    "Conflict: accepting server copy, local write discarded"
                );
                Resolution { handled: true }
            }
            ConflictStrategy::RetryLater => {
                debug!(id = %item.id, "Conflict: deferring, will retry");
                Resolution { handled: false }
            }
        }
    }
}

/// Strategy table keyed by mutation type
pub struct MutationRegistry {
    entries: HashMap<String, ConflictStrategy>,
}

impl Default for MutationRegistry {
    /// All known types default to server-wins: append-only user content
    /// (journals, recordings) because the full pull restores it, singleton
    /// state (stats, goals, profile, settings) because the newest full push
    /// supersedes it anyway.
    fn default() -> Self {
        let mut registry = Self { entries: HashMap::new() };
        for mutation_type in [
            mutation::JOURNAL_ENTRY,
            mutation::RECORDING_META,
            mutation::STATS_UPDATE,
            mutation::GOALS_UPDATE,
            mutation::PROFILE_UPDATE,
            mutation::SETTINGS_UPDATE,
        ] {
            registry.register(mutation_type, ConflictStrategy::ServerWins);
        }
        registry
    }
}

impl MutationRegistry {
    /// Empty registry (every push rejected until types are registered)
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Declare a mutation type, replacing any previous strategy for it
    pub fn register(&mut self, mutation_type: impl Into<String>, strategy: ConflictStrategy) {
        self.entries.insert(mutation_type.into(), strategy);
    }

    /// Validate a push against the registry: the type must be declared and
    /// the payload must be a JSON object
    pub fn validate_push(&self, mutation_type: &str, payload: &Value) -> Result<()> {
        if !self.entries.contains_key(mutation_type) {
            return Err(Error::InvalidInput(format!(
                "unknown mutation type '{}'",
                mutation_type
            )));
        }
        if !payload.is_object() {
            return Err(Error::InvalidInput(format!(
                "payload for '{}' must be a JSON object",
                mutation_type
            )));
        }
        Ok(())
    }

    /// Strategy for a type; types validated at push-time always resolve
    pub fn strategy_for(&self, mutation_type: &str) -> ConflictStrategy {
        self.entries
            .get(mutation_type)
            .copied()
            .unwrap_or(ConflictStrategy::ServerWins)
    }
}
