//! Collection registry
//!
//! Static catalog of every collection the store knows about. The store
//! refuses to touch a collection that is not listed here, which also means
//! collection names never reach SQL from caller input.

/// Journal entries (append-only user writing)
pub const JOURNALS: &str = "journals";
/// Practice recording metadata
pub const RECORDINGS: &str = "recordings";
/// Aggregate practice statistics (singleton-style records)
pub const STATS: &str = "stats";
/// Daily goals
pub const GOALS: &str = "goals";
/// Application settings (key/value)
pub const SETTINGS: &str = "settings";
/// Voice profiles
pub const PROFILES: &str = "profiles";
/// Durable mutation queue owned by the sync engine
pub const SYNC_QUEUE: &str = "sync_queue";
/// Sync bookkeeping (singleton metadata record)
pub const SYNC_METADATA: &str = "sync_metadata";

/// Shape of one collection
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    /// Table name
    pub name: &'static str,
    /// Field inside the document that holds the record key
    pub key_path: &'static str,
    /// Whether `add` assigns integer keys when the document has none
    pub auto_increment: bool,
    /// Optional integer field materialized into an indexed column,
    /// used only for ordered retrieval
    pub index_field: Option<&'static str>,
}

/// Every collection in the store, in creation order
pub const COLLECTIONS: &[CollectionSpec] = &[
    CollectionSpec { name: JOURNALS, key_path: "id", auto_increment: true, index_field: Some("timestamp") },
    CollectionSpec { name: RECORDINGS, key_path: "id", auto_increment: true, index_field: Some("timestamp") },
    CollectionSpec { name: STATS, key_path: "id", auto_increment: false, index_field: None },
    CollectionSpec { name: GOALS, key_path: "id", auto_increment: true, index_field: None },
    CollectionSpec { name: SETTINGS, key_path: "key", auto_increment: false, index_field: None },
    CollectionSpec { name: PROFILES, key_path: "id", auto_increment: false, index_field: None },
    CollectionSpec { name: SYNC_QUEUE, key_path: "id", auto_increment: false, index_field: Some("enqueued_at") },
    CollectionSpec { name: SYNC_METADATA, key_path: "key", auto_increment: false, index_field: None },
];

/// Collections the sync engine maintains for itself. A remote state pull
/// must never overwrite these.
pub const INTERNAL_COLLECTIONS: &[&str] = &[SYNC_QUEUE, SYNC_METADATA];

/// Look up a collection by name
pub fn collection_spec(name: &str) -> Option<&'static CollectionSpec> {
    COLLECTIONS.iter().find(|spec| spec.name == name)
}
