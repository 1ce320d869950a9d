use std::future::Future;

use crate::concurrency::barrier::BatchAck;
use crate::error::IndexerResult;
use crate::types::{Batch, ChangeEvent};

/// Capability set of the consumer attached to a tailer.
///
/// Every consumer handles batches. Consumers interested in the individual pre/post images
/// of each event also implement [`TableEventHandler::handle_event`], which the tailer calls
/// for every event before the batch holding it is dispatched.
pub trait TableEventHandler<R> {
    /// Reacts to a single event. Does nothing unless overridden.
    fn handle_event(
        &self,
        _event: &ChangeEvent<R>,
    ) -> impl Future<Output = IndexerResult<()>> + Send {
        async { Ok(()) }
    }

    /// Takes ownership of a batch.
    ///
    /// `ack` must be completed once the batch was fully processed. The tailer does not poll
    /// again before that, and treats a dropped `ack` as a failure.
    fn handle_batch(
        &self,
        batch: Batch<R>,
        ack: BatchAck,
    ) -> impl Future<Output = IndexerResult<()>> + Send;
}
