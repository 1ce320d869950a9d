use tracing::{debug, info};

use crate::concurrency::barrier::BatchAck;
use crate::error::IndexerResult;
use crate::store::SkewedValuesStore;
use crate::tailer::TableEventHandler;
use crate::types::{Batch, ChangeEvent, SkewedValueRow};

/// Deletes skewed string lists once no skewed value references them anymore.
///
/// Reacts to the pre-image of updated and removed skewed-value rows. Batches carry no work
/// and are acknowledged right away.
#[derive(Debug, Clone)]
pub struct SkewedStringsCollector<S> {
    store: S,
}

impl<S> SkewedStringsCollector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> TableEventHandler<SkewedValueRow> for SkewedStringsCollector<S>
where
    S: SkewedValuesStore + Send + Sync,
{
    async fn handle_event(&self, event: &ChangeEvent<SkewedValueRow>) -> IndexerResult<()> {
        let Some(pre) = &event.pre else {
            return Ok(());
        };

        if self.store.has_string_list_id(pre.string_list_id).await? {
            debug!(
                string_list_id = pre.string_list_id,
                "string list still referenced, keeping it"
            );
            return Ok(());
        }

        self.store.remove_string_list(pre.string_list_id).await?;
        info!(
            string_list_id = pre.string_list_id,
            descriptor_id = pre.descriptor_id,
            "removed unreferenced skewed string list"
        );

        Ok(())
    }

    async fn handle_batch(&self, batch: Batch<SkewedValueRow>, ack: BatchAck) -> IndexerResult<()> {
        debug!(rows = batch.len(), "skewed values batch handled");
        ack.complete();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySkewedValuesStore;

    fn row(string_list_id: i64) -> SkewedValueRow {
        SkewedValueRow {
            descriptor_id: 1,
            string_list_id,
            index: 0,
        }
    }

    #[tokio::test]
    async fn unreferenced_lists_are_removed_on_delete() {
        let store = MemorySkewedValuesStore::new();
        store.insert_string_list(10).await;
        store.insert_string_list(11).await;
        store.set_referenced(11, true).await;

        let collector = SkewedStringsCollector::new(store.clone());
        collector
            .handle_event(&ChangeEvent::delete(row(10), 1))
            .await
            .unwrap();
        collector
            .handle_event(&ChangeEvent::delete(row(11), 2))
            .await
            .unwrap();

        assert_eq!(store.removed().await, vec![10]);
        assert!(store.string_lists().await.contains(&11));
    }

    #[tokio::test]
    async fn inserts_are_ignored() {
        let store = MemorySkewedValuesStore::new();
        store.insert_string_list(10).await;

        let collector = SkewedStringsCollector::new(store.clone());
        collector
            .handle_event(&ChangeEvent::insert(row(10), 1))
            .await
            .unwrap();

        assert!(store.removed().await.is_empty());
    }
}
