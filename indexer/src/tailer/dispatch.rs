use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::concurrency::barrier::BatchAck;
use crate::error::{ErrorKind, IndexerResult};
use crate::indexer_error;
use crate::tailer::TableEventHandler;
use crate::types::{AttributeRow, Batch, SchemalessRow};

/// A batch waiting for a reader worker.
#[derive(Debug)]
pub enum WorkItem {
    SchemaBased(Batch<AttributeRow>, BatchAck),
    Schemaless(Batch<SchemalessRow>, BatchAck),
}

impl WorkItem {
    pub fn len(&self) -> usize {
        match self {
            WorkItem::SchemaBased(batch, _) => batch.len(),
            WorkItem::Schemaless(batch, _) => batch.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates the bounded queue between the tailers and the reader pool.
pub fn create_work_queue(capacity: usize) -> (PoolDispatcher, WorkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    (
        PoolDispatcher { tx },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Handler of the tailers feeding the reader pool.
///
/// The queue closes once every dispatcher was dropped, after which the workers drain the
/// remaining batches and stop.
#[derive(Debug, Clone)]
pub struct PoolDispatcher {
    tx: mpsc::Sender<WorkItem>,
}

impl PoolDispatcher {
    async fn send(&self, item: WorkItem) -> IndexerResult<()> {
        self.tx.send(item).await.map_err(|_| {
            indexer_error!(
                ErrorKind::InvalidState,
                "Reader pool stopped accepting batches"
            )
        })
    }
}

impl TableEventHandler<AttributeRow> for PoolDispatcher {
    async fn handle_batch(&self, batch: Batch<AttributeRow>, ack: BatchAck) -> IndexerResult<()> {
        self.send(WorkItem::SchemaBased(batch, ack)).await
    }
}

impl TableEventHandler<SchemalessRow> for PoolDispatcher {
    async fn handle_batch(
        &self,
        batch: Batch<SchemalessRow>,
        ack: BatchAck,
    ) -> IndexerResult<()> {
        self.send(WorkItem::Schemaless(batch, ack)).await
    }
}

/// Receiving side of the work queue, shared by every reader worker.
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

impl WorkReceiver {
    /// Returns the next batch, or `None` once the queue was closed and drained.
    pub async fn recv(&self) -> Option<WorkItem> {
        self.rx.lock().await.recv().await
    }
}
