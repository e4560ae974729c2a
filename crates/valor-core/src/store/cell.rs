//! # Record Cells
//!
//! One cell per live record. A cell owns the current value and two channels:
//!
//! - **downstream**: a broadcast of `CellEvent`s to in-process observers,
//!   carrying both local edits and admitted external changes
//! - **upstream**: local edits, stamped and handed to a `DebouncedWriter`
//!
//! External changes pass through `admit`; deletes are terminal. After the
//! `Deleted` event the downstream sender is dropped, so subscribers see the
//! channel close and nothing is emitted again.

use super::admission::{admit, created_stamp, edit_stamp, stamp};
use super::clock::EditClock;
use super::feed::{ChangeEvent, ChangeKind};
use super::writer::DebouncedWriter;
use crate::storage::RecordStorage;
use crate::{EntityId, ValorError};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Capacity of a cell's downstream channel.
const DOWNSTREAM_CAPACITY: usize = 64;

/// What observers of a cell receive.
#[derive(Debug, Clone, PartialEq)]
pub enum CellEvent {
    Changed(Value),
    Deleted,
}

/// Result of offering an external change to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    /// Strictly newer; the cell now holds it.
    Admitted,
    /// Same age or older; ignored.
    Stale,
    /// Terminal delete applied.
    Deleted,
    /// Not addressed to this cell, or the cell is already deleted.
    Ignored,
}

#[derive(Debug)]
struct CellState {
    value: Option<Value>,
    downstream: Option<broadcast::Sender<CellEvent>>,
}

/// Observable state for one record.
#[derive(Debug)]
pub struct RecordCell {
    table: String,
    key: EntityId,
    state: Mutex<CellState>,
    clock: Arc<EditClock>,
    writer: DebouncedWriter,
}

impl RecordCell {
    /// Load the record from storage and start its writer.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        storage: Arc<dyn RecordStorage>,
        clock: Arc<EditClock>,
        table: &str,
        key: &EntityId,
        window: Duration,
    ) -> Result<Arc<Self>, ValorError> {
        let initial = storage.get(table, key)?;
        if let Some(seen) = initial.as_ref().and_then(edit_stamp) {
            clock.observe(seen);
        }
        let (downstream, _) = broadcast::channel(DOWNSTREAM_CAPACITY);
        let writer = DebouncedWriter::spawn(storage, table.to_string(), key.clone(), window);

        Ok(Arc::new(Self {
            table: table.to_string(),
            key: key.clone(),
            state: Mutex::new(CellState {
                value: initial,
                downstream: Some(downstream),
            }),
            clock,
            writer,
        }))
    }

    fn lock(&self) -> Result<MutexGuard<'_, CellState>, ValorError> {
        self.state
            .lock()
            .map_err(|_| ValorError::Channel(format!("cell {} poisoned", self.key)))
    }

    #[must_use]
    pub fn key(&self) -> &EntityId {
        &self.key
    }

    /// Latest value, local or admitted.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.lock().ok().and_then(|state| state.value.clone())
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.lock().map(|s| s.downstream.is_none()).unwrap_or(true)
    }

    /// Subscribe to downstream events. `None` once the record is deleted.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<CellEvent>> {
        self.lock()
            .ok()
            .and_then(|state| state.downstream.as_ref().map(broadcast::Sender::subscribe))
    }

    /// Apply a locally authored edit.
    ///
    /// Stamps the value with a fresh `lastEdit` and the record's original
    /// `createdOn`, publishes it downstream and schedules the durable write.
    pub fn edit(&self, value: Value) -> Result<Value, ValorError> {
        let mut state = self.lock()?;
        let Some(downstream) = state.downstream.as_ref() else {
            return Err(ValorError::NotFound(self.key.to_string()));
        };

        let now = self.clock.tick();
        let created = state
            .value
            .as_ref()
            .and_then(created_stamp)
            .or_else(|| created_stamp(&value))
            .unwrap_or(now);
        let stamped = stamp(value, created, now);

        let _ = downstream.send(CellEvent::Changed(stamped.clone()));
        state.value = Some(stamped.clone());
        drop(state);

        self.writer.send(stamped.clone())?;
        Ok(stamped)
    }

    /// Offer an externally observed change.
    pub fn receive(&self, event: &ChangeEvent) -> CellOutcome {
        if !event.targets(&self.table, &self.key) {
            return CellOutcome::Ignored;
        }
        let Ok(mut state) = self.lock() else {
            return CellOutcome::Ignored;
        };
        if state.downstream.is_none() {
            return CellOutcome::Ignored;
        }

        match (event.kind, &event.value) {
            (ChangeKind::Delete, _) => {
                terminate(&mut state);
                drop(state);
                self.writer.cancel();
                CellOutcome::Deleted
            }
            (_, Some(incoming)) => {
                let current = state.value.as_ref().and_then(edit_stamp);
                let incoming_stamp = edit_stamp(incoming);
                if !admit(current, incoming_stamp) {
                    tracing::debug!(table = %self.table, key = %self.key, "stale change dropped");
                    return CellOutcome::Stale;
                }
                if let Some(seen) = incoming_stamp {
                    self.clock.observe(seen);
                }
                state.value = Some(incoming.clone());
                if let Some(tx) = state.downstream.as_ref() {
                    let _ = tx.send(CellEvent::Changed(incoming.clone()));
                }
                CellOutcome::Admitted
            }
            (_, None) => CellOutcome::Stale,
        }
    }

    /// Close the cell locally: terminal event, pending write dropped.
    pub fn close(&self) {
        if let Ok(mut state) = self.lock() {
            terminate(&mut state);
        }
        self.writer.cancel();
    }

    /// Write any pending edit now.
    pub async fn flush(&self) -> Result<(), ValorError> {
        self.writer.flush().await
    }

    /// Consume a change feed until the record is deleted or the feed closes.
    pub fn follow(self: &Arc<Self>, mut feed: broadcast::Receiver<ChangeEvent>) -> JoinHandle<()> {
        let cell = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if cell.receive(&event) == CellOutcome::Deleted {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(key = %cell.key, skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
                if cell.is_deleted() {
                    break;
                }
            }
        })
    }
}

fn terminate(state: &mut CellState) {
    state.value = None;
    if let Some(tx) = state.downstream.take() {
        let _ = tx.send(CellEvent::Deleted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    const WINDOW: Duration = Duration::from_millis(250);

    fn open_cell(memory: &Arc<MemoryStorage>) -> Arc<RecordCell> {
        RecordCell::open(
            memory.clone(),
            Arc::new(EditClock::new()),
            "skill",
            &EntityId::new("s1"),
            WINDOW,
        )
        .expect("open")
    }

    fn update(value: Value, last_edit: u64) -> ChangeEvent {
        ChangeEvent::upsert(
            "skill",
            &EntityId::new("s1"),
            ChangeKind::Update,
            stamp(value, Timestamp(1), Timestamp(last_edit)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn edit_is_visible_immediately_and_written_once() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);
        let mut rx = cell.subscribe().expect("live");

        cell.edit(json!({"points": 1})).expect("edit");
        let second = cell.edit(json!({"points": 2})).expect("edit");

        assert_eq!(cell.value(), Some(second.clone()));
        assert!(matches!(rx.recv().await, Ok(CellEvent::Changed(_))));
        assert_eq!(memory.write_count(), 0);

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(memory.write_count(), 1);
        assert_eq!(
            memory.get("skill", &EntityId::new("s1")).expect("get"),
            Some(second)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn creation_stamp_survives_edits() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);
        let first = cell.edit(json!({"points": 1})).expect("edit");
        let second = cell.edit(json!({"points": 2})).expect("edit");
        assert_eq!(created_stamp(&first), created_stamp(&second));
        assert!(edit_stamp(&second) > edit_stamp(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn older_external_change_is_stale() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);

        assert_eq!(cell.receive(&update(json!({"v": 2}), 20)), CellOutcome::Admitted);
        assert_eq!(cell.receive(&update(json!({"v": 1}), 10)), CellOutcome::Stale);
        assert_eq!(cell.receive(&update(json!({"v": 3}), 20)), CellOutcome::Stale);
        assert_eq!(cell.value().map(|v| v["v"].clone()), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_terminal() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);
        let mut rx = cell.subscribe().expect("live");

        cell.edit(json!({"points": 1})).expect("edit");
        let outcome = cell.receive(&ChangeEvent::delete("skill", &EntityId::new("s1")));
        assert_eq!(outcome, CellOutcome::Deleted);

        assert!(matches!(rx.recv().await, Ok(CellEvent::Changed(_))));
        assert_eq!(rx.recv().await, Ok(CellEvent::Deleted));
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));

        assert_eq!(cell.receive(&update(json!({"v": 9}), u64::MAX)), CellOutcome::Ignored);
        assert!(cell.edit(json!({"points": 2})).is_err());
        assert!(cell.subscribe().is_none());

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(memory.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_stops_after_delete() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);
        let (feed, _keep) = broadcast::channel(16);
        let task = cell.follow(feed.subscribe());

        feed.send(update(json!({"v": 1}), 5)).expect("send");
        feed.send(ChangeEvent::delete("skill", &EntityId::new("s1")))
            .expect("send");
        task.await.expect("join");

        assert!(cell.is_deleted());
        assert!(cell.value().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_other_records_are_ignored() {
        let memory = Arc::new(MemoryStorage::new());
        let cell = open_cell(&memory);
        let other = ChangeEvent::delete("skill", &EntityId::new("other"));
        assert_eq!(cell.receive(&other), CellOutcome::Ignored);
        assert!(!cell.is_deleted());
    }
}
