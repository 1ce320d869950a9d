use config::shared::PipelineConfig;
use std::mem;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bail;
use crate::bulk::{BulkSender, BulkSink, FlusherHandle};
use crate::compiler::DocumentCompiler;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, IndexerResult};
use crate::resolver::{DependencyResolver, MetadataCaches};
use crate::source::EventSource;
use crate::stats::{PipelineStats, spawn_stats_reporter};
use crate::store::{MetadataReader, SkewedValuesStore};
use crate::tailer::{
    PoolDispatcher, SkewedStringsCollector, TableEventHandler, Tailer, TailerConfig,
    TailerHandle, create_work_queue,
};
use crate::types::{AttributeRow, SchemalessRow, SkewedValueRow};
use crate::workers::pool::ReaderPool;
use crate::workers::reader::ReaderWorker;

#[derive(Debug)]
enum PipelineState<B> {
    NotStarted,
    Started {
        sender: BulkSender<B>,
        flusher: FlusherHandle,
        dispatcher: PoolDispatcher,
        pool: ReaderPool,
        tailers: Vec<TailerHandle>,
        stats_reporter: Option<JoinHandle<()>>,
    },
}

/// Wires tailers, the reader pool and the bulk sender together.
///
/// The pipeline is started with its reader connections and bulk sink, then tailers are
/// attached for every tailed table. It runs until shutdown is requested, either through
/// [`Pipeline::shutdown`] or by a component that failed.
#[derive(Debug)]
pub struct Pipeline<M, B> {
    config: Arc<PipelineConfig>,
    readers: Vec<M>,
    sink: Option<B>,
    stats: PipelineStats,
    state: PipelineState<B>,
    shutdown_tx: ShutdownTx,
}

impl<M, B> Pipeline<M, B>
where
    M: MetadataReader + Send + 'static,
    B: BulkSink + Send + Sync + 'static,
{
    /// Creates a pipeline running one reader worker per metadata reader.
    pub fn new(config: PipelineConfig, readers: Vec<M>, sink: B) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            readers,
            sink: Some(sink),
            stats: PipelineStats::new(),
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }

    /// Starts the bulk sender and the reader pool.
    pub async fn start(&mut self) -> IndexerResult<()> {
        let Some(sink) = self.sink.take() else {
            bail!(ErrorKind::InvalidState, "Pipeline was already started");
        };

        if self.readers.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Pipeline needs at least one metadata reader"
            );
        }

        let Some(cache_capacity) = NonZeroUsize::new(self.config.cache_capacity) else {
            bail!(ErrorKind::ConfigError, "Cache capacity cannot be zero");
        };

        let readers = mem::take(&mut self.readers);
        info!(
            readers = readers.len(),
            cache_capacity = cache_capacity.get(),
            metadata_mode = ?self.config.metadata_mode,
            sink = B::name(),
            "starting pipeline"
        );

        let sender = BulkSender::new(sink, self.config.bulk.clone(), self.stats.clone());
        let flusher = sender.spawn_flusher(self.shutdown_tx.subscribe());

        let resolver = DependencyResolver::new(MetadataCaches::new(cache_capacity));
        let compiler = DocumentCompiler::new(&self.config.search);

        // One queued batch per worker.
        let (dispatcher, receiver) = create_work_queue(readers.len());

        let mut pool = ReaderPool::new();
        for (id, reader) in (0..).zip(readers) {
            ReaderWorker::new(
                id,
                reader,
                receiver.clone(),
                resolver.clone(),
                compiler.clone(),
                sender.clone(),
                self.stats.clone(),
                self.shutdown_tx.clone(),
            )
            .start(&mut pool);
        }

        let stats_reporter = self.config.stats_interval_ms.map(|interval_ms| {
            spawn_stats_reporter(
                self.stats.clone(),
                Duration::from_millis(interval_ms),
                self.shutdown_tx.subscribe(),
            )
        });

        self.state = PipelineState::Started {
            sender,
            flusher,
            dispatcher,
            pool,
            tailers: Vec::new(),
            stats_reporter,
        };

        Ok(())
    }

    /// Tails a schema-based attribute table into the reader pool.
    pub fn add_attribute_tailer<E>(&mut self, source: E) -> IndexerResult<()>
    where
        E: EventSource<Row = AttributeRow> + Send + 'static,
    {
        if !self.config.metadata_mode.schema_based() {
            bail!(
                ErrorKind::ConfigError,
                "Schema-based metadata is disabled",
                source.table_name()
            );
        }

        let dispatcher = self.dispatcher()?;
        self.add_tailer(source, dispatcher)
    }

    /// Tails a schemaless attribute table into the reader pool.
    pub fn add_schemaless_tailer<E>(&mut self, source: E) -> IndexerResult<()>
    where
        E: EventSource<Row = SchemalessRow> + Send + 'static,
    {
        if !self.config.metadata_mode.schemaless() {
            bail!(
                ErrorKind::ConfigError,
                "Schemaless metadata is disabled",
                source.table_name()
            );
        }

        let dispatcher = self.dispatcher()?;
        self.add_tailer(source, dispatcher)
    }

    /// Tails the skewed values table, removing string lists once unreferenced.
    pub fn add_skewed_strings_collector<E, S>(&mut self, source: E, store: S) -> IndexerResult<()>
    where
        E: EventSource<Row = SkewedValueRow> + Send + 'static,
        S: SkewedValuesStore + Send + Sync + 'static,
    {
        self.add_tailer(source, SkewedStringsCollector::new(store))
    }

    /// Tails `source` into an arbitrary handler.
    pub fn add_tailer<E, H>(&mut self, source: E, handler: H) -> IndexerResult<()>
    where
        E: EventSource + Send + 'static,
        E::Row: Sync,
        H: TableEventHandler<E::Row> + Send + Sync + 'static,
    {
        let PipelineState::Started { tailers, .. } = &mut self.state else {
            bail!(
                ErrorKind::InvalidState,
                "Tailers can only be added to a started pipeline"
            );
        };

        let config = TailerConfig {
            batch: self.config.batch.clone(),
            recovery: self.config.recovery,
        };

        let handle = Tailer::new(
            source,
            handler,
            config,
            self.stats.clone(),
            self.shutdown_tx.clone(),
        )
        .start();
        tailers.push(handle);

        Ok(())
    }

    fn dispatcher(&self) -> IndexerResult<PoolDispatcher> {
        let PipelineState::Started { dispatcher, .. } = &self.state else {
            bail!(
                ErrorKind::InvalidState,
                "Tailers can only be added to a started pipeline"
            );
        };

        Ok(dispatcher.clone())
    }

    /// Waits for the pipeline to stop.
    ///
    /// Tailers stop first, each after its in-flight batch was acknowledged. The reader pool
    /// then drains the queued batches, the bulk sender flushes once and the flusher stops.
    pub async fn wait(self) -> IndexerResult<()> {
        let PipelineState::Started {
            sender,
            flusher,
            dispatcher,
            pool,
            tailers,
            stats_reporter,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        let mut errors = vec![];

        info!(tailers = tailers.len(), "waiting for tailers to complete");
        for tailer in tailers {
            let table_name = tailer.table_name().to_string();
            if let Err(err) = tailer.wait().await {
                error!(table = %table_name, error = %err, "tailer completed with an error");
                errors.push(err);

                // The remaining tailers only stop once shutdown is requested.
                self.shutdown_tx.shutdown();
            }
        }

        // Closes the work queue once the tailers released their dispatchers.
        drop(dispatcher);

        info!("waiting for reader workers to complete");
        if let Err(err) = pool.wait_all().await {
            let errors_number = err.kinds().len();
            errors.push(err);

            info!(errors_number, "reader workers failed with an error");
        }

        if let Err(err) = sender.flush().await {
            errors.push(err);
        }

        if let Err(err) = flusher.stop().await {
            errors.push(err);
        }

        if let Some(stats_reporter) = stats_reporter {
            self.shutdown_tx.shutdown();
            if let Err(err) = stats_reporter.await {
                warn!(error = %err, "stats reporter did not stop cleanly");
            }
        }

        self.stats.log_summary();

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("pipeline stopped");

        Ok(())
    }

    pub fn shutdown(&self) {
        info!("shutting down the pipeline");

        self.shutdown_tx.shutdown();
    }

    pub async fn shutdown_and_wait(self) -> IndexerResult<()> {
        self.shutdown();
        self.wait().await
    }
}
