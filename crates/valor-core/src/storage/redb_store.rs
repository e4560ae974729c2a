//! # redb-backed Record Storage
//!
//! One redb table per logical table, `&str` keys, JSON-encoded values.
//! A `tables` registry table records every logical table ever written so
//! that a session can be reloaded without knowing its types up front.

use super::RecordStorage;
use crate::{EntityId, ValorError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde_json::Value;
use std::path::Path;

/// Registry of logical table names -> record count at last write.
const TABLES: TableDefinition<&str, u64> = TableDefinition::new("__tables__");

fn storage_err(e: impl std::fmt::Display) -> ValorError {
    ValorError::Storage(e.to_string())
}

fn definition(table: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(table)
}

/// Disk-backed record storage.
pub struct RedbStorage {
    db: Database,
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl RedbStorage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ValorError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        let write_txn = db.begin_write().map_err(storage_err)?;
        let _ = write_txn.open_table(TABLES).map_err(storage_err)?;
        write_txn.commit().map_err(storage_err)?;

        Ok(Self { db })
    }

    fn is_registered(&self, table: &str) -> Result<bool, ValorError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let registry = read_txn.open_table(TABLES).map_err(storage_err)?;
        Ok(registry.get(table).map_err(storage_err)?.is_some())
    }

    fn write_many<'a>(
        &self,
        table: &str,
        items: impl Iterator<Item = (&'a EntityId, &'a Value)>,
    ) -> Result<(), ValorError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut records = write_txn.open_table(definition(table)).map_err(storage_err)?;
            for (key, value) in items {
                let bytes = serde_json::to_vec(value)?;
                records
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(storage_err)?;
            }
            let count = records.len().map_err(storage_err)?;
            let mut registry = write_txn.open_table(TABLES).map_err(storage_err)?;
            registry.insert(table, count).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }
}

impl RecordStorage for RedbStorage {
    fn get(&self, table: &str, key: &EntityId) -> Result<Option<Value>, ValorError> {
        if !self.is_registered(table)? {
            return Ok(None);
        }
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let records = read_txn
            .open_table(definition(table))
            .map_err(storage_err)?;
        let Some(guard) = records.get(key.as_str()).map_err(storage_err)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(guard.value())?))
    }

    fn put(&self, table: &str, key: &EntityId, value: &Value) -> Result<(), ValorError> {
        self.write_many(table, std::iter::once((key, value)))
    }

    fn delete(&self, table: &str, key: &EntityId) -> Result<bool, ValorError> {
        if !self.is_registered(table)? {
            return Ok(false);
        }
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let existed = {
            let mut records = write_txn.open_table(definition(table)).map_err(storage_err)?;
            let existed = records.remove(key.as_str()).map_err(storage_err)?.is_some();
            let count = records.len().map_err(storage_err)?;
            let mut registry = write_txn.open_table(TABLES).map_err(storage_err)?;
            registry.insert(table, count).map_err(storage_err)?;
            existed
        };
        write_txn.commit().map_err(storage_err)?;
        Ok(existed)
    }

    fn entries(&self, table: &str) -> Result<Vec<(EntityId, Value)>, ValorError> {
        if !self.is_registered(table)? {
            return Ok(Vec::new());
        }
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let records = read_txn
            .open_table(definition(table))
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for entry in records.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            out.push((
                EntityId::new(key.value()),
                serde_json::from_slice(value.value())?,
            ));
        }
        Ok(out)
    }

    fn tables(&self) -> Result<Vec<String>, ValorError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let registry = read_txn.open_table(TABLES).map_err(storage_err)?;
        let mut names = Vec::new();
        for entry in registry.iter().map_err(storage_err)? {
            let (name, _) = entry.map_err(storage_err)?;
            names.push(name.value().to_string());
        }
        Ok(names)
    }

    fn bulk_update(&self, table: &str, items: &[(EntityId, Value)]) -> Result<(), ValorError> {
        if items.is_empty() {
            return Ok(());
        }
        self.write_many(table, items.iter().map(|(k, v)| (k, v)))
    }
}
