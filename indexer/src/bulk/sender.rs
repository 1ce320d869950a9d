use config::shared::BulkConfig;
use metrics::{gauge, histogram};
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span};

use crate::bail;
use crate::bulk::BulkSink;
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested, wait_for_shutdown};
use crate::error::{ErrorKind, IndexerError, IndexerResult};
use crate::metrics::{
    INDEXER_BULK_BUFFERED_OPERATIONS, INDEXER_BULK_REQUEST_BYTES,
    INDEXER_BULK_REQUEST_DURATION_SECONDS,
};
use crate::stats::PipelineStats;
use crate::types::BulkOperation;

type DeliveryOutcome = Option<IndexerResult<()>>;

/// Operations waiting for the next flush.
struct Buffer {
    payload: String,
    operations: usize,
    first_enqueued_at: Option<Instant>,
    /// Resolved with the outcome of the request carrying this buffer.
    completion: watch::Sender<DeliveryOutcome>,
}

impl Buffer {
    fn new() -> Self {
        let (completion, _) = watch::channel(None);
        Self {
            payload: String::new(),
            operations: 0,
            first_enqueued_at: None,
            completion,
        }
    }
}

/// Resolves once the operations it was returned for were delivered.
#[derive(Debug)]
pub struct Delivery {
    rx: watch::Receiver<DeliveryOutcome>,
}

impl Delivery {
    fn delivered() -> Self {
        let (_, rx) = watch::channel(Some(Ok(())));
        Self { rx }
    }

    /// Waits for the bulk request carrying the operations.
    ///
    /// Returns the error of that request, or [`ErrorKind::InvalidState`] if the sender was
    /// dropped with the operations still buffered.
    pub async fn wait(mut self) -> IndexerResult<()> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(result) => result,
            None => bail!(
                ErrorKind::InvalidState,
                "Bulk sender was dropped before delivering buffered operations"
            ),
        }
    }
}

struct Inner<S> {
    sink: S,
    config: BulkConfig,
    stats: PipelineStats,
    buffer: Mutex<Buffer>,
    /// Serializes flushes so buffers reach the backend in the order they were filled.
    send_lock: AsyncMutex<()>,
    /// Wakes the flusher when an empty buffer receives its first operation.
    wakeup: Notify,
}

/// Send buffer shared by every reader worker.
pub struct BulkSender<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for BulkSender<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> std::fmt::Debug for BulkSender<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.inner.buffer.lock();
        f.debug_struct("BulkSender")
            .field("buffered_bytes", &buffer.payload.len())
            .field("buffered_operations", &buffer.operations)
            .finish()
    }
}

impl<S> BulkSender<S>
where
    S: BulkSink + Send + Sync + 'static,
{
    pub fn new(sink: S, config: BulkConfig, stats: PipelineStats) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                config,
                stats,
                buffer: Mutex::new(Buffer::new()),
                send_lock: AsyncMutex::new(()),
                wakeup: Notify::new(),
            }),
        }
    }

    fn max_wait(&self) -> Duration {
        Duration::from_millis(self.inner.config.max_wait_ms)
    }

    /// Appends operations to the buffer.
    ///
    /// Flushes before returning when the buffer reached the size threshold, in which case
    /// the caller waits for the response and gets its error. Otherwise the operations are
    /// sent by a later flush, see [`Delivery::wait`].
    pub async fn enqueue(&self, operations: &[BulkOperation]) -> IndexerResult<Delivery> {
        if operations.is_empty() {
            return Ok(Delivery::delivered());
        }

        let mut rendered = String::new();
        for operation in operations {
            operation.write_ndjson(&mut rendered)?;
        }

        let (delivery, was_empty, size_reached) = {
            let mut buffer = self.inner.buffer.lock();
            let was_empty = buffer.operations == 0;

            buffer.payload.push_str(&rendered);
            buffer.operations += operations.len();
            if buffer.first_enqueued_at.is_none() {
                buffer.first_enqueued_at = Some(Instant::now());
            }

            gauge!(INDEXER_BULK_BUFFERED_OPERATIONS).set(buffer.operations as f64);

            (
                Delivery {
                    rx: buffer.completion.subscribe(),
                },
                was_empty,
                buffer.payload.len() >= self.inner.config.max_size_bytes,
            )
        };

        if was_empty {
            self.inner.wakeup.notify_one();
        }

        if size_reached {
            debug!("bulk buffer reached its size threshold, flushing");
            self.flush().await?;
        }

        Ok(delivery)
    }

    /// Sends everything buffered, if anything.
    pub async fn flush(&self) -> IndexerResult<()> {
        self.flush_if(|_| true).await
    }

    /// Sends the buffer if its oldest operation waited for the configured time.
    async fn flush_expired(&self) -> IndexerResult<()> {
        let max_wait = self.max_wait();
        self.flush_if(|buffer| {
            buffer
                .first_enqueued_at
                .is_some_and(|first| first.elapsed() >= max_wait)
        })
        .await
    }

    async fn flush_if<F>(&self, should_flush: F) -> IndexerResult<()>
    where
        F: FnOnce(&Buffer) -> bool,
    {
        let _send_guard = self.inner.send_lock.lock().await;

        let buffer = {
            let mut buffer = self.inner.buffer.lock();
            if buffer.operations == 0 || !should_flush(&buffer) {
                return Ok(());
            }

            gauge!(INDEXER_BULK_BUFFERED_OPERATIONS).set(0.0);
            mem::replace(&mut *buffer, Buffer::new())
        };

        let bytes = buffer.payload.len();
        let operations = buffer.operations;
        let started = Instant::now();

        let result = self.inner.sink.send(buffer.payload).await;

        let elapsed = started.elapsed();
        histogram!(INDEXER_BULK_REQUEST_DURATION_SECONDS, "sink" => S::name())
            .record(elapsed.as_secs_f64());
        histogram!(INDEXER_BULK_REQUEST_BYTES, "sink" => S::name()).record(bytes as f64);

        let outcome: IndexerResult<()> = match result {
            Ok(response) => {
                self.inner.stats.record_bulk_request(operations, bytes);
                info!(
                    sink = S::name(),
                    operations,
                    bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    status = response.status,
                    "bulk request completed"
                );
                debug!(response = %response.body, "bulk response");

                Ok(())
            }
            Err(err) => {
                error!(
                    sink = S::name(),
                    operations,
                    bytes,
                    error = %err,
                    "bulk request failed"
                );

                Err(err)
            }
        };

        buffer.completion.send_replace(Some(outcome.clone()));

        outcome
    }

    /// Starts the task flushing buffers whose wait time elapsed.
    ///
    /// Once shutdown is requested through `shutdown_rx`, buffered operations are sent without
    /// waiting, so that in-flight batches are acknowledged promptly.
    pub fn spawn_flusher(&self, shutdown_rx: ShutdownRx) -> FlusherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let sender = self.clone();

        let span = info_span!("bulk_flusher", sink = S::name());
        let handle = tokio::spawn(sender.run_flusher(stop_rx, shutdown_rx).instrument(span));

        FlusherHandle { stop_tx, handle }
    }

    async fn run_flusher(self, mut stop_rx: watch::Receiver<bool>, mut shutdown_rx: ShutdownRx) {
        let max_wait = self.max_wait();

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let draining = is_shutdown_requested(&shutdown_rx);
            // A closed channel can no longer request shutdown.
            let shutdown_pending = !draining && shutdown_rx.has_changed().is_ok();

            let first_enqueued_at = self.inner.buffer.lock().first_enqueued_at;
            match first_enqueued_at {
                None => {
                    tokio::select! {
                        _ = self.inner.wakeup.notified() => {}
                        _ = stop_rx.changed() => {}
                        _ = wait_for_shutdown(&mut shutdown_rx), if shutdown_pending => {}
                    }
                }
                Some(first) => {
                    let deadline = if draining {
                        Instant::now()
                    } else {
                        first + max_wait
                    };

                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            let result = if draining {
                                self.flush().await
                            } else {
                                self.flush_expired().await
                            };

                            // The workers waiting on the delivery get the error.
                            if let Err(err) = result {
                                error!(error = %err, "timed bulk flush failed");
                            }
                        }
                        _ = stop_rx.changed() => {}
                        _ = wait_for_shutdown(&mut shutdown_rx), if shutdown_pending => {
                            debug!("shutdown requested, flushing buffered operations");
                        }
                    }
                }
            }
        }

        debug!("bulk flusher stopped");
    }
}

/// Handle of the flusher task.
#[derive(Debug)]
pub struct FlusherHandle {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stops the flusher and waits for it to exit.
    ///
    /// Operations still buffered are left for a final [`BulkSender::flush`].
    pub async fn stop(self) -> IndexerResult<()> {
        self.stop_tx.send_replace(true);

        if let Err(err) = self.handle.await {
            let kind = if err.is_panic() {
                ErrorKind::InvalidState
            } else {
                ErrorKind::Unknown
            };

            return Err(IndexerError::from((
                kind,
                "Bulk flusher task failed",
                err.to_string(),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::memory::MemoryBulkSink;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::types::{Attribute, AttributeValue, UpdateTarget};

    fn operation(id: i64) -> BulkOperation {
        BulkOperation::upsert(
            UpdateTarget {
                index: "projects".to_string(),
                doc_type: "inode".to_string(),
                id,
                parent: None,
            },
            vec![Attribute::new("t.tb.f", AttributeValue::Int(id))],
        )
    }

    fn sender(sink: MemoryBulkSink, max_size_bytes: usize, max_wait_ms: u64) -> BulkSender<MemoryBulkSink> {
        BulkSender::new(
            sink,
            BulkConfig {
                max_size_bytes,
                max_wait_ms,
            },
            PipelineStats::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_size_before_wait_elapses() {
        let sink = MemoryBulkSink::new();
        let sender = sender(sink.clone(), 1, 60_000);
        let started = Instant::now();

        let delivery = sender.enqueue(&[operation(1), operation(2)]).await.unwrap();

        assert_eq!(sink.requests().await.len(), 1);
        delivery.wait().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_wait_when_size_is_unmet() {
        let sink = MemoryBulkSink::new();
        let sender = sender(sink.clone(), 1 << 20, 500);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let flusher = sender.spawn_flusher(shutdown_rx);
        let started = Instant::now();

        let first = sender.enqueue(&[operation(1)]).await.unwrap();
        let second = sender.enqueue(&[operation(2)]).await.unwrap();
        assert!(sink.requests().await.is_empty());

        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(500));
        let requests = sink.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].lines().count(), 4);

        flusher.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_without_waiting() {
        let sink = MemoryBulkSink::new();
        let sender = sender(sink.clone(), 1 << 20, 60_000);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let flusher = sender.spawn_flusher(shutdown_rx);
        let started = Instant::now();

        let delivery = sender.enqueue(&[operation(1)]).await.unwrap();
        shutdown_tx.shutdown();
        delivery.wait().await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(60_000));
        assert_eq!(sink.requests().await.len(), 1);

        // Operations enqueued while shutting down are not held back either.
        let late = sender.enqueue(&[operation(2)]).await.unwrap();
        late.wait().await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(60_000));
        assert_eq!(sink.requests().await.len(), 2);

        flusher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_request_fails_every_delivery_of_the_buffer() {
        let sink = MemoryBulkSink::new();
        sink.fail_next_requests(1).await;
        let sender = sender(sink.clone(), 1 << 20, 60_000);

        let first = sender.enqueue(&[operation(1)]).await.unwrap();
        let second = sender.enqueue(&[operation(2)]).await.unwrap();

        let err = sender.flush().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BulkRequestFailed);
        assert_eq!(first.wait().await.unwrap_err().kind(), ErrorKind::BulkRequestFailed);
        assert_eq!(second.wait().await.unwrap_err().kind(), ErrorKind::BulkRequestFailed);

        // The next buffer is sent normally.
        let third = sender.enqueue(&[operation(3)]).await.unwrap();
        sender.flush().await.unwrap();
        third.wait().await.unwrap();
    }

    #[tokio::test]
    async fn empty_enqueue_is_delivered_immediately() {
        let sink = MemoryBulkSink::new();
        let sender = sender(sink.clone(), 1, 60_000);

        sender.enqueue(&[]).await.unwrap().wait().await.unwrap();
        sender.flush().await.unwrap();

        assert!(sink.requests().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_sender_fails_pending_deliveries() {
        let sink = MemoryBulkSink::new();
        let sender = sender(sink, 1 << 20, 60_000);

        let delivery = sender.enqueue(&[operation(1)]).await.unwrap();
        drop(sender);

        let err = delivery.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
