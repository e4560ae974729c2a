//! Volatile table storage.

use super::RecordStorage;
use crate::{EntityId, ValorError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

type Tables = BTreeMap<String, BTreeMap<EntityId, Value>>;

/// In-memory tables behind a lock.
///
/// Counts successful writes so callers can observe write coalescing.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    writes: AtomicU64,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls that reached the tables.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, ValorError> {
        self.tables
            .read()
            .map_err(|_| ValorError::Storage("memory tables lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, ValorError> {
        self.tables
            .write()
            .map_err(|_| ValorError::Storage("memory tables lock poisoned".to_string()))
    }
}

impl RecordStorage for MemoryStorage {
    fn get(&self, table: &str, key: &EntityId) -> Result<Option<Value>, ValorError> {
        Ok(self
            .read_tables()?
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn put(&self, table: &str, key: &EntityId, value: &Value) -> Result<(), ValorError> {
        self.write_tables()?
            .entry(table.to_string())
            .or_default()
            .insert(key.clone(), value.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, table: &str, key: &EntityId) -> Result<bool, ValorError> {
        Ok(self
            .write_tables()?
            .get_mut(table)
            .is_some_and(|rows| rows.remove(key).is_some()))
    }

    fn entries(&self, table: &str) -> Result<Vec<(EntityId, Value)>, ValorError> {
        Ok(self
            .read_tables()?
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn tables(&self) -> Result<Vec<String>, ValorError> {
        Ok(self.read_tables()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_delete() {
        let storage = MemoryStorage::new();
        let key = EntityId::new("a");
        storage.put("trait", &key, &json!({"name": "Luck"})).expect("put");
        assert_eq!(storage.write_count(), 1);
        assert!(storage.get("trait", &key).expect("get").is_some());
        assert!(storage.delete("trait", &key).expect("delete"));
        assert!(!storage.delete("trait", &key).expect("delete"));
        assert_eq!(storage.tables().expect("tables"), vec!["trait".to_string()]);
    }

    #[test]
    fn entries_of_unknown_table_are_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.entries("nope").expect("entries").is_empty());
    }
}
