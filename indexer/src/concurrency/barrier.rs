//! Per-batch acknowledgement between a tailer and the consumer of its batch.

use tokio::sync::oneshot;

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};

/// Handed to the consumer of a batch, completed once the batch was fully processed.
///
/// Dropping it without completing releases the waiting tailer with an error.
#[derive(Debug)]
pub struct BatchAck {
    tx: oneshot::Sender<()>,
}

impl BatchAck {
    pub fn complete(self) {
        // The tailer may already be gone after a failure, nobody is left to notify then.
        let _ = self.tx.send(());
    }
}

/// Held by the tailer that dispatched a batch.
#[derive(Debug)]
pub struct PendingAck {
    rx: oneshot::Receiver<()>,
}

impl PendingAck {
    /// Waits until the batch was acknowledged.
    ///
    /// Fails with [`ErrorKind::BatchNotAcknowledged`] when the consumer dropped the batch.
    pub async fn wait(self) -> IndexerResult<()> {
        if self.rx.await.is_err() {
            bail!(
                ErrorKind::BatchNotAcknowledged,
                "Batch was dropped before being acknowledged"
            );
        }

        Ok(())
    }
}

pub fn create_batch_ack() -> (BatchAck, PendingAck) {
    let (tx, rx) = oneshot::channel();
    (BatchAck { tx }, PendingAck { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_ack_releases_waiter() {
        let (ack, pending) = create_batch_ack();

        tokio::spawn(async move { ack.complete() });

        pending.wait().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_ack_fails_waiter() {
        let (ack, pending) = create_batch_ack();
        drop(ack);

        let err = pending.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BatchNotAcknowledged);
    }
}
