//! Whole-database snapshot export/import
//!
//! Snapshots back the application's "export my data" / "restore backup"
//! features and factory reset. Export is best-effort per collection; import
//! is two-phase: validate everything first, mutate only afterwards. There is
//! no rollback across collections: a failure partway through phase 2 leaves
//! the collections processed before it overwritten. That limitation is
//! deliberate and documented here rather than masked.

use crate::db::collections::COLLECTIONS;
use crate::db::store::PersistentStore;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full export of every collection
///
/// `stores` values are kept as raw JSON so that import can validate their
/// shape before touching the database. Absent collection keys mean "nothing
/// to import for that collection", never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub stores: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Remove collections from the snapshot, returning how many were present
    ///
    /// Used to keep engine-internal collections out of remote state pulls.
    pub fn strip(&mut self, names: &[&str]) -> usize {
        let mut removed = 0;
        for name in names {
            if self.stores.remove(*name).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

impl PersistentStore {
    /// Export every known collection
    ///
    /// A failure reading one collection does not abort the export: that
    /// collection is recorded as empty and a warning raised. A partial
    /// backup beats no backup.
    pub async fn export_all(&self) -> Snapshot {
        let mut stores = BTreeMap::new();

        for spec in COLLECTIONS {
            let records = match self.get_all(spec.name).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        collection = spec.name,
                        error = %e,
                        "Export: failed to read collection, recording it as empty"
                    );
                    Vec::new()
                }
            };
            stores.insert(spec.name.to_string(), Value::Array(records));
        }

        Snapshot {
            version: SNAPSHOT_VERSION,
            timestamp: Utc::now(),
            stores,
        }
    }

    /// Replace collection contents from a snapshot
    ///
    /// Phase 1 validates that every present (known) collection value is an
    /// array; any violation rejects the whole import with no mutation.
    /// Phase 2 clears then repopulates each collection present in the
    /// snapshot. A phase 2 failure names the offending collection; earlier
    /// collections remain overwritten.
    pub async fn import_all(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Format(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        // Phase 1: validate before any destructive write
        for (name, value) in &snapshot.stores {
            if crate::db::collections::collection_spec(name).is_none() {
                warn!(collection = %name, "Import: ignoring unknown collection");
                continue;
            }
            if !value.is_array() {
                return Err(Error::Format(format!(
                    "collection '{}' is not an array",
                    name
                )));
            }
        }

        // Phase 2: clear then repopulate, collection by collection
        for spec in COLLECTIONS {
            let Some(value) = snapshot.stores.get(spec.name) else {
                continue;
            };
            let Some(records) = value.as_array() else {
                continue; // unreachable after phase 1, but stay total
            };

            self.clear(spec.name)
                .await
                .map_err(|e| import_error(spec.name, e))?;

            for record in records {
                self.put(spec.name, record)
                    .await
                    .map_err(|e| import_error(spec.name, e))?;
            }

            info!(collection = spec.name, count = records.len(), "Imported collection");
        }

        Ok(())
    }

    /// Clear every known collection
    ///
    /// Clearing any co-located cache outside the store (e.g. an on-disk
    /// settings file) is the caller's responsibility, not hidden here.
    pub async fn factory_reset(&self) -> Result<()> {
        for spec in COLLECTIONS {
            self.clear(spec.name).await?;
        }
        info!("Factory reset: all collections cleared");
        Ok(())
    }

    /// Write a pretty-printed snapshot to a backup file
    pub async fn export_to_file(&self, path: &Path) -> Result<()> {
        let snapshot = self.export_all().await;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Internal(format!("failed to serialize snapshot: {}", e)))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Backup written");
        Ok(())
    }

    /// Restore a backup file written by [`PersistentStore::export_to_file`]
    pub async fn import_from_file(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|e| Error::Format(format!("unreadable backup file: {}", e)))?;
        self.import_all(&snapshot).await
    }
}

fn import_error(collection: &str, e: Error) -> Error {
    Error::Import {
        collection: collection.to_string(),
        reason: e.to_string(),
    }
}
