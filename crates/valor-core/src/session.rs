//! # Session
//!
//! The explicit context object for one running sheet: the collection
//! registry, the MetaData index, the storage backend, the validator, the edit
//! clock and the change bus. It is built once and passed to the mutation
//! protocol and the snapshot builder.
//!
//! ## Storage Backends
//!
//! - `InMemory`: volatile tables, for tests and scratch sessions
//! - `Persistent`: redb tables, reloaded with `Session::reload`
//!
//! ## Change Bus
//!
//! Every non-silent mutation and every admitted feed event is published on a
//! `tokio::sync::broadcast` channel. Record cells subscribe to it to stay
//! current. Publishing never blocks and never fails the mutation.

use crate::collection::Collection;
use crate::graph::MetaIndex;
use crate::metadata::MetaData;
use crate::primitives::{DEBOUNCE_WINDOW_MS, INDEX_TABLE};
use crate::storage::{RecordStorage, StorageBackend};
use crate::store::{ChangeEvent, ChangeKind, EditClock, RecordCell, admit, edit_stamp};
use crate::types::record_types::SHEET_TYPES;
use crate::validation::{AcceptAll, RequiredFields, Validator};
use crate::{EntityId, Identity, RecordType, Timestamp, ValorError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Runtime knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Debounce window handed to record cells.
    pub debounce: Duration,
    /// Capacity of the change bus.
    pub bus_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEBOUNCE_WINDOW_MS),
            bus_capacity: 1024,
        }
    }
}

/// Result of applying one change-feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedOutcome {
    /// Strictly newer than what the session held; applied.
    Admitted,
    /// Same age or older; dropped.
    Stale,
    /// Record removed.
    Deleted,
    /// Unknown table, missing record, or undecodable value.
    Ignored,
}

/// Counts reported by `Session::stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub entities: usize,
    pub collections: BTreeMap<String, usize>,
    pub broken_links: usize,
    pub persistent: bool,
}

/// One running sheet session.
pub struct Session {
    collections: BTreeMap<RecordType, Collection>,
    index: MetaIndex,
    backend: Arc<StorageBackend>,
    validator: Box<dyn Validator>,
    clock: Arc<EditClock>,
    bus: broadcast::Sender<ChangeEvent>,
    config: SessionConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("entities", &self.index.len())
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_backend(StorageBackend::default())
    }
}

impl Session {
    /// Empty in-memory session with no collections and no validation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session over `backend` with no collections and no validation.
    #[must_use]
    pub fn with_backend(backend: StorageBackend) -> Self {
        let config = SessionConfig::default();
        let (bus, _) = broadcast::channel(config.bus_capacity);
        Self {
            collections: BTreeMap::new(),
            index: MetaIndex::new(),
            backend: Arc::new(backend),
            validator: Box::new(AcceptAll),
            clock: Arc::new(EditClock::new()),
            bus,
            config,
        }
    }

    /// In-memory session with every sheet record type registered.
    #[must_use]
    pub fn for_sheets() -> Self {
        Self::sheets_over(StorageBackend::default())
    }

    /// Sheet session over `backend`. Call `reload` to pull existing rows.
    #[must_use]
    pub fn sheets_over(backend: StorageBackend) -> Self {
        let mut session =
            Self::with_backend(backend).with_validator(RequiredFields::for_sheets());
        for record_type in SHEET_TYPES {
            session.register(record_type);
        }
        session
    }

    /// Open a redb-backed sheet session and load what it holds.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, ValorError> {
        let mut session = Self::sheets_over(StorageBackend::redb(path)?);
        session.reload()?;
        Ok(session)
    }

    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        if config.bus_capacity != self.config.bus_capacity {
            let (bus, _) = broadcast::channel(config.bus_capacity.max(1));
            self.bus = bus;
        }
        self.config = config;
        self
    }

    /// Declare a collection. Returns `false` if it already existed.
    pub fn register(&mut self, record_type: impl Into<String>) -> bool {
        let record_type = RecordType::new(record_type);
        if self.collections.contains_key(&record_type) {
            return false;
        }
        self.collections
            .insert(record_type.clone(), Collection::new(record_type));
        true
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &RecordType> {
        self.collections.keys()
    }

    // =========================================================================
    // READ QUERIES
    // =========================================================================

    #[must_use]
    pub fn index(&self) -> &MetaIndex {
        &self.index
    }

    #[must_use]
    pub fn read(&self, id: &EntityId) -> Option<&MetaData> {
        self.index.read(id)
    }

    #[must_use]
    pub fn check(&self, id: &EntityId) -> bool {
        self.index.check(id)
    }

    #[must_use]
    pub fn descendants_of(&self, id: &EntityId, max_depth: Option<usize>) -> Vec<Identity> {
        self.index.descendants_of(id, max_depth)
    }

    #[must_use]
    pub fn trail_of(&self, id: &EntityId) -> Vec<Identity> {
        self.index.trail_of(id)
    }

    #[must_use]
    pub fn collection(&self, record_type: &RecordType) -> Option<&Collection> {
        self.collections.get(record_type)
    }

    /// Payload of an entity, looked up through its MetaData type.
    #[must_use]
    pub fn record(&self, id: &EntityId) -> Option<&Value> {
        let meta = self.index.read(id)?;
        self.collections.get(&meta.record_type)?.get(id)
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            entities: self.index.len(),
            collections: self
                .collections
                .iter()
                .map(|(t, c)| (t.to_string(), c.len()))
                .collect(),
            broken_links: self.index.broken_links().len(),
            persistent: self.backend.is_persistent(),
        }
    }

    // =========================================================================
    // SHARED HANDLES
    // =========================================================================

    #[must_use]
    pub fn storage(&self) -> Arc<StorageBackend> {
        Arc::clone(&self.backend)
    }

    #[must_use]
    pub fn clock(&self) -> Arc<EditClock> {
        Arc::clone(&self.clock)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to the change bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    /// Open a record cell for `identity` that follows this session's bus.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open_cell(&self, identity: &Identity) -> Result<Arc<RecordCell>, ValorError> {
        if !self.collections.contains_key(&identity.record_type) {
            return Err(ValorError::NoCollection(identity.record_type.to_string()));
        }
        let cell = RecordCell::open(
            self.storage(),
            self.clock(),
            identity.record_type.as_str(),
            &identity.id,
            self.config.debounce,
        )?;
        let _follower = cell.follow(self.subscribe());
        Ok(cell)
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Replace in-memory state with what the storage backend holds.
    ///
    /// One-sided parent/child links (left by temporary entities that were
    /// never persisted) are repaired. Returns the number of entities loaded.
    pub fn reload(&mut self) -> Result<usize, ValorError> {
        let mut index = MetaIndex::new();
        for (key, value) in self.backend.entries(INDEX_TABLE)? {
            match serde_json::from_value::<MetaData>(value) {
                Ok(row) => {
                    self.clock.observe(row.last_edit);
                    index.insert(row);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping undecodable index row"),
            }
        }
        let repaired = index.repair();
        if repaired > 0 {
            tracing::info!(repaired, "repaired one-sided links on load");
        }

        for (record_type, collection) in &mut self.collections {
            *collection = Collection::new(record_type.clone());
            for (key, value) in self.backend.entries(record_type.as_str())? {
                if index.check(&key) {
                    collection.insert(key, value);
                }
            }
        }

        self.index = index;
        Ok(self.index.len())
    }

    // =========================================================================
    // CHANGE FEED
    // =========================================================================

    /// Apply an ordered, externally sourced change feed.
    ///
    /// Creates and updates replace the held value only when strictly newer
    /// (`admit`). Deletes are terminal and always applied. Index rows keep
    /// parent/child links reciprocal: a row delete takes its descendants and
    /// their payloads with it, and a moved row leaves its old parent. Events
    /// are processed in order and each gets its own outcome.
    pub fn apply_feed(&mut self, events: impl IntoIterator<Item = ChangeEvent>) -> Vec<FeedOutcome> {
        let mut outcomes = Vec::new();
        for event in events {
            let outcome = if event.table == INDEX_TABLE {
                self.apply_index_change(&event)
            } else {
                self.apply_record_change(&event)
            };
            tracing::debug!(table = %event.table, key = %event.key, ?outcome, "feed event");
            if matches!(outcome, FeedOutcome::Admitted | FeedOutcome::Deleted) {
                let _ = self.bus.send(event);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    fn apply_index_change(&mut self, event: &ChangeEvent) -> FeedOutcome {
        match (event.kind, &event.value) {
            (ChangeKind::Delete, _) => {
                if self.drop_subtree(&event.key) {
                    FeedOutcome::Deleted
                } else {
                    FeedOutcome::Ignored
                }
            }
            (_, Some(value)) => {
                let row = match serde_json::from_value::<MetaData>(value.clone()) {
                    Ok(row) if row.id == event.key => row,
                    Ok(_) | Err(_) => return FeedOutcome::Ignored,
                };
                let current = self.index.read(&event.key).map(|m| m.last_edit);
                if !admit(current, Some(row.last_edit)) {
                    return FeedOutcome::Stale;
                }
                self.clock.observe(row.last_edit);
                self.replace_row(row);
                FeedOutcome::Admitted
            }
            (_, None) => FeedOutcome::Ignored,
        }
    }

    /// Swap in an admitted row, moving the parent's child entry if the parent
    /// changed.
    fn replace_row(&mut self, row: MetaData) {
        let identity = row.identity();
        let parent = row.parent.clone();
        let moved = self
            .index
            .read(&row.id)
            .filter(|old| old.parent != parent || old.record_type != row.record_type)
            .map(MetaData::identity);
        if let Some(old) = moved {
            self.index.unlink(&old);
        }
        self.index.insert(row);
        if let Some(parent_row) = parent.and_then(|p| self.index.get_mut(&p.id)) {
            parent_row.insert_child(identity);
        }
    }

    /// Remove a row, its descendants' rows and every matching payload.
    ///
    /// The parent's child entry goes with it. In memory only; the peer that
    /// produced the feed owns persistence.
    fn drop_subtree(&mut self, id: &EntityId) -> bool {
        let Some(identity) = self.index.read(id).map(MetaData::identity) else {
            return false;
        };
        let descendants = self.index.descendants_of(id, None);
        self.index.unlink(&identity);
        for doomed in std::iter::once(identity).chain(descendants) {
            let record_type = self
                .index
                .remove(&doomed.id)
                .map_or(doomed.record_type, |row| row.record_type);
            if let Some(collection) = self.collections.get_mut(&record_type) {
                collection.remove(&doomed.id);
            }
        }
        true
    }

    fn apply_record_change(&mut self, event: &ChangeEvent) -> FeedOutcome {
        let Some(collection) = self.collections.get_mut(&RecordType::new(event.table.clone()))
        else {
            return FeedOutcome::Ignored;
        };
        match (event.kind, &event.value) {
            (ChangeKind::Delete, _) => match collection.remove(&event.key) {
                Some(_) => FeedOutcome::Deleted,
                None => FeedOutcome::Ignored,
            },
            (_, Some(value)) => {
                let current = collection.get(&event.key).and_then(edit_stamp);
                let incoming = edit_stamp(value);
                if !admit(current, incoming) {
                    return FeedOutcome::Stale;
                }
                if let Some(seen) = incoming {
                    self.clock.observe(seen);
                }
                collection.insert(event.key.clone(), value.clone());
                FeedOutcome::Admitted
            }
            (_, None) => FeedOutcome::Ignored,
        }
    }

    // =========================================================================
    // PROTOCOL PLUMBING (crate only)
    // =========================================================================

    pub(crate) fn tick(&self) -> Timestamp {
        self.clock.tick()
    }

    pub(crate) fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    pub(crate) fn index_mut(&mut self) -> &mut MetaIndex {
        &mut self.index
    }

    pub(crate) fn collection_mut(&mut self, record_type: &RecordType) -> Option<&mut Collection> {
        self.collections.get_mut(record_type)
    }

    /// Write the payload and MetaData rows of `id`, unless it is temporary.
    pub(crate) fn persist(&self, id: &EntityId) -> Result<(), ValorError> {
        let Some(meta) = self.index.read(id) else {
            return Ok(());
        };
        if meta.is_temporary() {
            return Ok(());
        }
        if let Some(value) = self
            .collections
            .get(&meta.record_type)
            .and_then(|c| c.get(id))
        {
            self.backend.put(meta.record_type.as_str(), id, value)?;
        }
        self.backend
            .put(INDEX_TABLE, id, &serde_json::to_value(meta)?)
    }

    /// Write only the MetaData row of `id`, unless it is temporary.
    pub(crate) fn persist_meta(&self, id: &EntityId) -> Result<(), ValorError> {
        match self.index.read(id) {
            Some(meta) if !meta.is_temporary() => {
                self.backend
                    .put(INDEX_TABLE, id, &serde_json::to_value(meta)?)
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn unpersist(&self, identity: &Identity) -> Result<(), ValorError> {
        self.backend.delete(identity.record_type.as_str(), &identity.id)?;
        self.backend.delete(INDEX_TABLE, &identity.id)?;
        Ok(())
    }

    /// Publish the current state of `id` (payload and row) on the bus.
    pub(crate) fn publish_upsert(&self, id: &EntityId, kind: ChangeKind) {
        let Some(meta) = self.index.read(id) else {
            return;
        };
        if let Some(value) = self
            .collections
            .get(&meta.record_type)
            .and_then(|c| c.get(id))
        {
            let _ = self.bus.send(ChangeEvent::upsert(
                meta.record_type.as_str(),
                id,
                kind,
                value.clone(),
            ));
        }
        self.publish_meta(id);
    }

    pub(crate) fn publish_meta(&self, id: &EntityId) {
        let Some(meta) = self.index.read(id) else {
            return;
        };
        if let Ok(value) = serde_json::to_value(meta) {
            let _ = self
                .bus
                .send(ChangeEvent::upsert(INDEX_TABLE, id, ChangeKind::Update, value));
        }
    }

    pub(crate) fn publish_delete(&self, identity: &Identity) {
        let _ = self
            .bus
            .send(ChangeEvent::delete(identity.record_type.as_str(), &identity.id));
        let _ = self.bus.send(ChangeEvent::delete(INDEX_TABLE, &identity.id));
    }
}

// =============================================================================
// TESTS
// =============================================================================
