use metrics::histogram;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span};

use crate::bulk::{BulkSender, BulkSink};
use crate::compiler::{CompiledBatch, DocumentCompiler};
use crate::concurrency::shutdown::ShutdownTx;
use crate::error::IndexerResult;
use crate::metrics::{
    INDEXER_COMPILE_DURATION_SECONDS, INDEXER_DELIVERY_DURATION_SECONDS,
    INDEXER_RESOLVE_DURATION_SECONDS,
};
use crate::resolver::{DependencyResolver, ResolutionRequest};
use crate::stats::PipelineStats;
use crate::store::{MetadataReader, MetadataTransaction};
use crate::tailer::{WorkItem, WorkReceiver};
use crate::types::{AttributeRow, Batch, SchemalessRow};
use crate::workers::pool::ReaderPool;

/// Identifier of a reader worker within the pool.
pub type ReaderId = u16;

/// Time spent on each stage of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadTimes {
    pub resolve: Duration,
    pub compile: Duration,
    /// From handing the operations to the bulk sender until their request completed.
    pub delivery: Duration,
}

impl ReadTimes {
    fn record(&self, stats: &PipelineStats) {
        histogram!(INDEXER_RESOLVE_DURATION_SECONDS).record(self.resolve.as_secs_f64());
        histogram!(INDEXER_COMPILE_DURATION_SECONDS).record(self.compile.as_secs_f64());
        histogram!(INDEXER_DELIVERY_DURATION_SECONDS).record(self.delivery.as_secs_f64());

        stats.record_times(self.resolve, self.compile, self.delivery);
    }
}

/// Processes batches taken from the work queue with its own metadata connection.
///
/// Per batch the worker resolves the referenced metadata inside one read transaction,
/// compiles the documents, hands them to the bulk sender and acknowledges the batch once
/// they were delivered. Errors reading metadata or delivering documents stop the worker and
/// request pipeline shutdown. The batch being processed is then left unacknowledged.
#[derive(Debug)]
pub struct ReaderWorker<M, B> {
    id: ReaderId,
    reader: M,
    receiver: WorkReceiver,
    resolver: DependencyResolver,
    compiler: DocumentCompiler,
    sender: BulkSender<B>,
    stats: PipelineStats,
    shutdown_tx: ShutdownTx,
}

impl<M, B> ReaderWorker<M, B>
where
    M: MetadataReader + Send + 'static,
    B: BulkSink + Send + Sync + 'static,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        id: ReaderId,
        reader: M,
        receiver: WorkReceiver,
        resolver: DependencyResolver,
        compiler: DocumentCompiler,
        sender: BulkSender<B>,
        stats: PipelineStats,
        shutdown_tx: ShutdownTx,
    ) -> Self {
        Self {
            id,
            reader,
            receiver,
            resolver,
            compiler,
            sender,
            stats,
            shutdown_tx,
        }
    }

    /// Spawns the worker into `pool`.
    pub fn start(self, pool: &mut ReaderPool) {
        let id = self.id;
        let span = info_span!("reader_worker", reader_id = id);

        pool.spawn(id, self.run().instrument(span));
    }

    async fn run(mut self) -> IndexerResult<()> {
        info!("starting reader worker");

        while let Some(item) = self.receiver.recv().await {
            if let Err(err) = self.process(item).await {
                error!(error = %err, "reader worker failed, shutting down the pipeline");
                self.shutdown_tx.shutdown();

                return Err(err);
            }
        }

        info!("work queue closed, reader worker stopped");

        Ok(())
    }

    async fn process(&mut self, item: WorkItem) -> IndexerResult<()> {
        let (times, ack) = match item {
            WorkItem::SchemaBased(batch, ack) => (self.process_attributes(batch).await?, ack),
            WorkItem::Schemaless(batch, ack) => (self.process_schemaless(batch).await?, ack),
        };

        ack.complete();
        times.record(&self.stats);

        debug!(
            resolve_ms = times.resolve.as_millis() as u64,
            compile_ms = times.compile.as_millis() as u64,
            delivery_ms = times.delivery.as_millis() as u64,
            "batch processed"
        );

        Ok(())
    }

    async fn process_attributes(&mut self, batch: Batch<AttributeRow>) -> IndexerResult<ReadTimes> {
        let rows = self.upserted_rows(batch);
        let mut times = ReadTimes::default();

        if rows.is_empty() {
            return Ok(times);
        }

        let started = Instant::now();
        let request = ResolutionRequest::from_rows(&rows);

        let mut transaction = self.reader.begin().await?;
        let metadata = self.resolver.resolve(&mut transaction, &request).await?;
        times.resolve = started.elapsed();

        let started = Instant::now();
        let compiled = self.compiler.compile_attributes(&rows, &metadata);
        times.compile = started.elapsed();

        transaction.commit().await?;

        times.delivery = self.deliver(compiled).await?;

        Ok(times)
    }

    async fn process_schemaless(
        &mut self,
        batch: Batch<SchemalessRow>,
    ) -> IndexerResult<ReadTimes> {
        let rows = self.upserted_rows(batch);
        let mut times = ReadTimes::default();

        if rows.is_empty() {
            return Ok(times);
        }

        let started = Instant::now();
        let compiled = self.compiler.compile_schemaless(&rows);
        times.compile = started.elapsed();

        times.delivery = self.deliver(compiled).await?;

        Ok(times)
    }

    /// Returns the added and updated rows of `batch` in commit order, which are indexed alike.
    ///
    /// Removed rows are only counted.
    fn upserted_rows<R>(&self, batch: Batch<R>) -> Vec<R> {
        let (added, updated) = (batch.added.len(), batch.updated.len());
        let (upserts, removed) = batch.into_upserts();

        self.stats.record_batch(added, updated, removed.len());
        if !removed.is_empty() {
            debug!(rows = removed.len(), "removed rows are not indexed");
        }

        upserts
    }

    async fn deliver(&mut self, compiled: CompiledBatch) -> IndexerResult<Duration> {
        if compiled.skipped > 0 {
            self.stats.record_skipped(compiled.skipped);
        }

        let started = Instant::now();
        let delivery = self.sender.enqueue(&compiled.operations).await?;
        delivery.wait().await?;

        Ok(started.elapsed())
    }
}
