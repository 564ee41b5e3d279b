//! Collection CRUD operations
//!
//! Records are JSON objects stored as TEXT, keyed by a TEXT key extracted
//! from the document at the collection's key path. Auto-increment
//! collections assign decimal integer keys and inject the assigned key back
//! into the stored document, so retrieved records always carry their key.

use crate::db::collections::{collection_spec, CollectionSpec};
use crate::error::{Error, Result};

use serde_json::Value;
use sqlx::SqlitePool;

/// Handle to the persistent store
///
/// Cheap to clone; all clones share the same connection pool.
#[derive(Clone)]
pub struct PersistentStore {
    pool: SqlitePool,
}

impl PersistentStore {
    /// Wrap an initialized pool (see [`crate::db::init_database`])
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if necessary) the database at `db_path`
    pub async fn open(db_path: &std::path::Path) -> Result<Self> {
        let pool = crate::db::init::init_database(db_path).await?;
        Ok(Self::new(pool))
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch a single record by key, `None` if absent
    pub async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let spec = self.spec(collection)?;
        let doc: Option<String> =
            sqlx::query_scalar(&format!("SELECT doc FROM {} WHERE key = ?", spec.name))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        doc.map(|text| parse_doc(spec.name, &text)).transpose()
    }

    /// Fetch every record in a collection, in unspecified order
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        let spec = self.spec(collection)?;
        let docs: Vec<String> =
            sqlx::query_scalar(&format!("SELECT doc FROM {}", spec.name))
                .fetch_all(&self.pool)
                .await?;

        docs.iter().map(|text| parse_doc(spec.name, text)).collect()
    }

    /// Fetch every record ordered ascending by the collection's index field
    pub async fn get_all_sorted(&self, collection: &str) -> Result<Vec<Value>> {
        let spec = self.spec(collection)?;
        if spec.index_field.is_none() {
            return Err(Error::InvalidInput(format!(
                "collection '{}' has no index field to sort by",
                collection
            )));
        }

        let docs: Vec<String> =
            sqlx::query_scalar(&format!("SELECT doc FROM {} ORDER BY sort_key ASC", spec.name))
                .fetch_all(&self.pool)
                .await?;

        docs.iter().map(|text| parse_doc(spec.name, text)).collect()
    }

    /// Upsert a record by the key carried in the document
    ///
    /// Returns the record's key. The document must contain a value at the
    /// collection's key path.
    pub async fn put(&self, collection: &str, record: &Value) -> Result<String> {
        let spec = self.spec(collection)?;
        require_object(spec.name, record)?;
        let key = extract_key(spec, record).ok_or_else(|| {
            Error::InvalidInput(format!(
                "record for '{}' is missing its key field '{}'",
                spec.name, spec.key_path
            ))
        })?;

        let sql = format!(
            r#"
            INSERT INTO {} (key, doc, sort_key)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                doc = excluded.doc,
                sort_key = excluded.sort_key,
                updated_at = CURRENT_TIMESTAMP
            "#,
            spec.name
        );
        sqlx::query(&sql)
            .bind(&key)
            .bind(record.to_string())
            .bind(extract_sort(spec, record))
            .execute(&self.pool)
            .await?;

        Ok(key)
    }

    /// Insert a record, assigning the next integer key when the collection
    /// auto-increments and the document carries none
    ///
    /// Fails with [`Error::Constraint`] if the key already exists.
    pub async fn add(&self, collection: &str, record: &Value) -> Result<String> {
        let spec = self.spec(collection)?;
        require_object(spec.name, record)?;
        let sort = extract_sort(spec, record);

        if let Some(key) = extract_key(spec, record) {
            let sql = format!("INSERT INTO {} (key, doc, sort_key) VALUES (?, ?, ?)", spec.name);
            sqlx::query(&sql)
                .bind(&key)
                .bind(record.to_string())
                .bind(sort)
                .execute(&self.pool)
                .await
                .map_err(|e| map_insert_error(e, spec.name, &key))?;
            return Ok(key);
        }

        if !spec.auto_increment {
            return Err(Error::InvalidInput(format!(
                "record for '{}' is missing its key field '{}'",
                spec.name, spec.key_path
            )));
        }

        // Single statement so key assignment and insertion are atomic even
        // with concurrent writers: the next key is MAX(existing) + 1, and the
        // assigned key is injected into the stored document.
        let sql = format!(
            r#"
            INSERT INTO {name} (key, doc, sort_key)
            SELECT CAST(next AS TEXT), json_set(?, '$.{key_path}', next), ?
            FROM (SELECT COALESCE(MAX(CAST(key AS INTEGER)), 0) + 1 AS next FROM {name})
            RETURNING key
            "#,
            name = spec.name,
            key_path = spec.key_path,
        );
        let key: String = sqlx::query_scalar(&sql)
            .bind(record.to_string())
            .bind(sort)
            .fetch_one(&self.pool)
            .await?;

        Ok(key)
    }

    /// Delete a record by key (absent keys are not an error)
    pub async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let spec = self.spec(collection)?;
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", spec.name))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every record in a collection
    pub async fn clear(&self, collection: &str) -> Result<()> {
        let spec = self.spec(collection)?;
        sqlx::query(&format!("DELETE FROM {}", spec.name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) fn spec(&self, collection: &str) -> Result<&'static CollectionSpec> {
        collection_spec(collection)
            .ok_or_else(|| Error::NotFound(format!("unknown collection '{}'", collection)))
    }
}

fn require_object(collection: &str, record: &Value) -> Result<()> {
    if record.is_object() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "record for '{}' must be a JSON object",
            collection
        )))
    }
}

/// Key field rendered as TEXT; integer keys keep their decimal form
fn extract_key(spec: &CollectionSpec, record: &Value) -> Option<String> {
    match record.get(spec.key_path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn extract_sort(spec: &CollectionSpec, record: &Value) -> Option<i64> {
    spec.index_field
        .and_then(|field| record.get(field))
        .and_then(Value::as_i64)
}

fn parse_doc(collection: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| {
        Error::Internal(format!("corrupt record in collection '{}': {}", collection, e))
    })
}

fn map_insert_error(e: sqlx::Error, collection: &str, key: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
            Error::Constraint(format!("duplicate key '{}' in collection '{}'", key, collection))
        }
        _ => Error::Storage(e),
    }
}
