use config::shared::BatchConfig;
use metrics::counter;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::concurrency::barrier::create_batch_ack;
use crate::concurrency::shutdown::{ShutdownTx, is_shutdown_requested, wait_for_shutdown};
use crate::error::{ErrorKind, IndexerError, IndexerResult};
use crate::indexer_error;
use crate::metrics::{
    INDEXER_BATCHES_DISPATCHED_TOTAL, INDEXER_EVENTS_RECEIVED_TOTAL, INDEXER_POLL_ERRORS_TOTAL,
    TABLE_NAME_LABEL,
};
use crate::source::{EventSource, StartPosition};
use crate::stats::PipelineStats;
use crate::tailer::TableEventHandler;
use crate::types::{Batch, ChangeEvent, Position};

/// Settings of a single tailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerConfig {
    pub batch: BatchConfig,
    /// Replays the events following the last recorded position before live tailing.
    pub recovery: bool,
}

impl TailerConfig {
    fn poll_max_wait(&self) -> Duration {
        Duration::from_millis(self.batch.poll_max_wait_ms)
    }

    fn max_fill(&self) -> Duration {
        Duration::from_millis(self.batch.max_fill_ms)
    }
}

/// Handle of a running tailer.
#[derive(Debug)]
pub struct TailerHandle {
    table_name: String,
    handle: Option<JoinHandle<IndexerResult<()>>>,
}

impl TailerHandle {
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Waits for the tailer to stop.
    ///
    /// A tailer stops after shutdown was requested, once its in-flight batch was
    /// acknowledged, or when it failed.
    pub async fn wait(mut self) -> IndexerResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            indexer_error!(
                ErrorKind::TailerPanic,
                "Tailer panicked",
                format!("{}: {err}", self.table_name)
            )
        })??;

        Ok(())
    }
}

/// Events polled for one batch, with the position to record once it is acknowledged.
struct PolledBatch<R> {
    events: Vec<ChangeEvent<R>>,
    last_position: Position,
}

/// Follows the change stream of one table and dispatches it in batches to a handler.
///
/// Each cycle polls with a bounded wait. Once a first event arrived, the tailer keeps
/// polling until the batch is full or the fill time elapsed, hands every event to
/// [`TableEventHandler::handle_event`], dispatches the batch and waits for its
/// acknowledgement before recording its last position and polling again.
#[derive(Debug)]
pub struct Tailer<E, H> {
    source: E,
    handler: H,
    config: TailerConfig,
    stats: PipelineStats,
    shutdown_tx: ShutdownTx,
}

impl<E, H> Tailer<E, H>
where
    E: EventSource + Send + 'static,
    E::Row: Sync,
    H: TableEventHandler<E::Row> + Send + Sync + 'static,
{
    pub fn new(
        source: E,
        handler: H,
        config: TailerConfig,
        stats: PipelineStats,
        shutdown_tx: ShutdownTx,
    ) -> Self {
        Self {
            source,
            handler,
            config,
            stats,
            shutdown_tx,
        }
    }

    /// Spawns the tailer.
    pub fn start(self) -> TailerHandle {
        let table_name = self.source.table_name().to_string();
        info!(table = %table_name, "starting tailer");

        let span = info_span!("tailer", table = %table_name);
        let handle = tokio::spawn(self.run().instrument(span));

        TailerHandle {
            table_name,
            handle: Some(handle),
        }
    }

    async fn run(mut self) -> IndexerResult<()> {
        let result = self.tail().await;

        if let Err(err) = &result {
            error!(error = %err, "tailer failed, shutting down the pipeline");
            self.shutdown_tx.shutdown();
        }

        result
    }

    async fn tail(&mut self) -> IndexerResult<()> {
        let start = if self.config.recovery {
            StartPosition::LastRecorded
        } else {
            StartPosition::Latest
        };
        self.source.subscribe(start).await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let poll_max_wait = self.config.poll_max_wait();
        let max_fill = self.config.max_fill();

        // While recovering, only already committed events are dispatched, without waiting.
        let mut recovering = self.config.recovery;
        let mut recovered_events = 0;

        while !is_shutdown_requested(&shutdown_rx) {
            let (poll_wait, fill_wait) = if recovering {
                (Duration::ZERO, Duration::ZERO)
            } else {
                (poll_max_wait, max_fill)
            };

            match self.poll_batch(poll_wait, fill_wait).await {
                Ok(Some(polled)) => {
                    if recovering {
                        recovered_events += polled.events.len();
                    }

                    self.dispatch(polled).await?;
                }
                Ok(None) => {
                    if recovering {
                        info!(events = recovered_events, "recovery completed");
                        recovering = false;
                    }
                }
                Err(err) => {
                    self.record_poll_error(&err);

                    tokio::select! {
                        biased;

                        _ = wait_for_shutdown(&mut shutdown_rx) => {}
                        _ = tokio::time::sleep(poll_max_wait) => {}
                    }
                }
            }
        }

        info!("shutdown requested, tailer stopped");

        Ok(())
    }

    /// Polls the events of the next batch.
    ///
    /// Returns `None` when no event arrived within `poll_max_wait`. A failure after the first
    /// poll ends the batch early with the events already received.
    async fn poll_batch(
        &mut self,
        poll_max_wait: Duration,
        max_fill: Duration,
    ) -> IndexerResult<Option<PolledBatch<E::Row>>> {
        let max_size = self.config.batch.max_size;

        let mut events = self.source.poll(poll_max_wait, max_size).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let deadline = Instant::now() + max_fill;
        while events.len() < max_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.source.poll(remaining, max_size - events.len()).await {
                Ok(more) => events.extend(more),
                Err(err) => {
                    self.record_poll_error(&err);
                    break;
                }
            }
        }

        counter!(
            INDEXER_EVENTS_RECEIVED_TOTAL,
            TABLE_NAME_LABEL => self.source.table_name().to_string()
        )
        .increment(events.len() as u64);

        let Some(last_position) = events.last().map(|event| event.position) else {
            return Ok(None);
        };

        Ok(Some(PolledBatch {
            events,
            last_position,
        }))
    }

    async fn dispatch(&mut self, polled: PolledBatch<E::Row>) -> IndexerResult<()> {
        let PolledBatch {
            events,
            last_position,
        } = polled;

        for event in &events {
            self.handler.handle_event(event).await?;
        }

        let batch: Batch<E::Row> = events.into_iter().collect();
        debug!(
            added = batch.added.len(),
            updated = batch.updated.len(),
            removed = batch.removed.len(),
            last_position,
            "dispatching batch"
        );

        let (ack, pending) = create_batch_ack();
        self.handler.handle_batch(batch, ack).await?;
        pending.wait().await?;

        counter!(
            INDEXER_BATCHES_DISPATCHED_TOTAL,
            TABLE_NAME_LABEL => self.source.table_name().to_string()
        )
        .increment(1);

        self.source.record_position(last_position).await
    }

    fn record_poll_error(&self, err: &IndexerError) {
        warn!(error = %err, "failed to poll the change stream, retrying");

        self.stats.record_poll_error();
        counter!(
            INDEXER_POLL_ERRORS_TOTAL,
            TABLE_NAME_LABEL => self.source.table_name().to_string()
        )
        .increment(1);
    }
}
