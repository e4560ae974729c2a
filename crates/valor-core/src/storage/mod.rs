//! # Storage
//!
//! The persistence collaborator. The engine only needs a key/value store
//! with named logical tables; every table holds JSON values keyed by entity
//! id, and the MetaData rows live in the `index` table.
//!
//! ## Backends
//!
//! - `MemoryStorage`: volatile, used by tests and ephemeral sessions
//! - `RedbStorage`: disk-backed ACID storage on redb

mod memory;
mod redb_store;

pub use memory::MemoryStorage;
pub use redb_store::RedbStorage;

use crate::collection::merge_object;
use crate::{EntityId, ValorError};
use serde_json::{Map, Value};
use std::path::Path;

// =============================================================================
// RECORD STORAGE TRAIT
// =============================================================================

/// Per-table record persistence.
///
/// Methods take `&self`; implementations handle their own locking so that a
/// debounced writer task can share the backend with the session.
pub trait RecordStorage: Send + Sync {
    /// Fetch one record.
    fn get(&self, table: &str, key: &EntityId) -> Result<Option<Value>, ValorError>;

    /// Insert or replace one record.
    fn put(&self, table: &str, key: &EntityId, value: &Value) -> Result<(), ValorError>;

    /// Remove one record. Returns whether it existed.
    fn delete(&self, table: &str, key: &EntityId) -> Result<bool, ValorError>;

    /// Every record of a table, in key order.
    fn entries(&self, table: &str) -> Result<Vec<(EntityId, Value)>, ValorError>;

    /// Names of every table that has ever been written.
    fn tables(&self) -> Result<Vec<String>, ValorError>;

    /// Shallow-merge `patch` into an existing record.
    ///
    /// Returns `false` without writing when the record is absent.
    fn update(
        &self,
        table: &str,
        key: &EntityId,
        patch: &Map<String, Value>,
    ) -> Result<bool, ValorError> {
        let Some(mut current) = self.get(table, key)? else {
            return Ok(false);
        };
        merge_object(&mut current, patch);
        self.put(table, key, &current)?;
        Ok(true)
    }

    /// Insert or replace several records of one table.
    fn bulk_update(&self, table: &str, items: &[(EntityId, Value)]) -> Result<(), ValorError> {
        for (key, value) in items {
            self.put(table, key, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a session.
#[derive(Debug)]
pub enum StorageBackend {
    /// Volatile in-memory tables.
    InMemory(MemoryStorage),
    /// Disk-backed tables using redb.
    Persistent(RedbStorage),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStorage::new())
    }
}

impl StorageBackend {
    /// Open or create a redb database at `path`.
    pub fn redb(path: impl AsRef<Path>) -> Result<Self, ValorError> {
        Ok(Self::Persistent(RedbStorage::open(path)?))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    fn inner(&self) -> &dyn RecordStorage {
        match self {
            Self::InMemory(memory) => memory,
            Self::Persistent(redb) => redb,
        }
    }
}

impl RecordStorage for StorageBackend {
    fn get(&self, table: &str, key: &EntityId) -> Result<Option<Value>, ValorError> {
        self.inner().get(table, key)
    }

    fn put(&self, table: &str, key: &EntityId, value: &Value) -> Result<(), ValorError> {
        self.inner().put(table, key, value)
    }

    fn delete(&self, table: &str, key: &EntityId) -> Result<bool, ValorError> {
        self.inner().delete(table, key)
    }

    fn entries(&self, table: &str) -> Result<Vec<(EntityId, Value)>, ValorError> {
        self.inner().entries(table)
    }

    fn tables(&self) -> Result<Vec<String>, ValorError> {
        self.inner().tables()
    }

    fn update(
        &self,
        table: &str,
        key: &EntityId,
        patch: &Map<String, Value>,
    ) -> Result<bool, ValorError> {
        self.inner().update(table, key, patch)
    }

    fn bulk_update(&self, table: &str, items: &[(EntityId, Value)]) -> Result<(), ValorError> {
        self.inner().bulk_update(table, items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_update_merges_and_reports_absence() {
        let storage = StorageBackend::default();
        let key = EntityId::new("k");
        let patch = json!({"b": 2});
        let patch = patch.as_object().expect("object");

        assert!(!storage.update("skill", &key, patch).expect("update"));
        storage.put("skill", &key, &json!({"a": 1})).expect("put");
        assert!(storage.update("skill", &key, patch).expect("update"));
        assert_eq!(
            storage.get("skill", &key).expect("get"),
            Some(json!({"a": 1, "b": 2}))
        );
    }

    #[test]
    fn in_memory_backend_is_not_persistent() {
        assert!(!StorageBackend::default().is_persistent());
    }
}
