//! Debounced write-back.
//!
//! A tokio task per record that holds the latest edited value and writes it
//! to storage once no further edit has arrived for a full window. Storage
//! calls block, so each write runs on the blocking pool.

use crate::storage::RecordStorage;
use crate::{EntityId, ValorError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

enum WriterMsg {
    Write(Value),
    Flush(oneshot::Sender<()>),
    Cancel,
}

/// Handle to a debounced writer task.
///
/// Dropping the handle flushes the pending value and stops the task.
#[derive(Debug)]
pub struct DebouncedWriter {
    tx: mpsc::UnboundedSender<WriterMsg>,
    task: JoinHandle<()>,
}

impl DebouncedWriter {
    /// Spawn the writer on the current tokio runtime.
    pub fn spawn(
        storage: Arc<dyn RecordStorage>,
        table: String,
        key: EntityId,
        window: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(storage, table, key, window, rx));
        Self { tx, task }
    }

    /// Queue `value`; it replaces any value still waiting in the window.
    pub fn send(&self, value: Value) -> Result<(), ValorError> {
        self.tx
            .send(WriterMsg::Write(value))
            .map_err(|_| ValorError::Channel("debounced writer stopped".to_string()))
    }

    /// Write the pending value now, if any.
    pub async fn flush(&self) -> Result<(), ValorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(ack_tx))
            .map_err(|_| ValorError::Channel("debounced writer stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| ValorError::Channel("debounced writer stopped".to_string()))
    }

    /// Drop the pending value and stop the task.
    pub fn cancel(&self) {
        let _ = self.tx.send(WriterMsg::Cancel);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    storage: Arc<dyn RecordStorage>,
    table: String,
    key: EntityId,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
) {
    let mut pending: Option<Value> = None;

    loop {
        let msg = if pending.is_some() {
            match timeout(window, rx.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    write(&storage, &table, &key, pending.take()).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match msg {
            Some(WriterMsg::Write(value)) => pending = Some(value),
            Some(WriterMsg::Flush(ack)) => {
                write(&storage, &table, &key, pending.take()).await;
                let _ = ack.send(());
            }
            Some(WriterMsg::Cancel) => {
                if pending.take().is_some() {
                    tracing::debug!(table = %table, key = %key, "pending write cancelled");
                }
                break;
            }
            None => {
                write(&storage, &table, &key, pending.take()).await;
                break;
            }
        }
    }
}

async fn write(
    storage: &Arc<dyn RecordStorage>,
    table: &str,
    key: &EntityId,
    value: Option<Value>,
) {
    let Some(value) = value else {
        return;
    };
    let put = {
        let storage = Arc::clone(storage);
        let table = table.to_string();
        let key = key.clone();
        tokio::task::spawn_blocking(move || storage.put(&table, &key, &value))
    };
    match put.await {
        Ok(Ok(())) => tracing::debug!(table, key = %key, "coalesced write persisted"),
        Ok(Err(e)) => tracing::warn!(table, key = %key, error = %e, "debounced write failed"),
        Err(e) => tracing::warn!(table, key = %key, error = %e, "debounced write task died"),
    }
}
