use std::future::Future;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, IndexerResult};
use crate::indexer_error;
use crate::workers::reader::ReaderId;

/// Owns the tasks of the reader workers.
#[derive(Debug, Default)]
pub struct ReaderPool {
    join_set: JoinSet<(ReaderId, IndexerResult<()>)>,
}

impl ReaderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, id: ReaderId, future: F)
    where
        F: Future<Output = IndexerResult<()>> + Send + 'static,
    {
        self.join_set.spawn(async move {
            let result = future.await;
            (id, result)
        });

        debug!(reader_id = id, "spawned reader worker in pool");
    }

    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Waits for every worker to stop.
    ///
    /// Workers stop once the work queue was closed and drained, or on failure. Errors of
    /// every failed worker are collected and returned together.
    pub async fn wait_all(mut self) -> IndexerResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok((id, worker_result)) => {
                    if let Err(err) = worker_result {
                        error!(reader_id = id, error = %err, "reader worker completed with error");
                        errors.push(err);
                    }
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("reader worker task was cancelled");
                    } else {
                        errors.push(indexer_error!(
                            ErrorKind::ReaderWorkerPanic,
                            "Reader worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}
