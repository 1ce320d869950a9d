use std::future::Future;
use std::time::Duration;

use crate::error::IndexerResult;
use crate::types::{ChangeEvent, Position};

/// Where a subscription starts reading the change stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StartPosition {
    /// Right after the last position recorded for the table, replaying what was missed.
    LastRecorded,
    /// At the current head of the stream, skipping everything committed before.
    Latest,
}

/// Change stream of a single table.
///
/// A source is owned by exactly one tailer. Events are returned in commit order and each
/// event carries a position that increases within the table.
pub trait EventSource {
    type Row: Send + 'static;

    /// Name of the tailed table, used for logging and metrics.
    fn table_name(&self) -> &str;

    /// Opens the subscription. Must be called once before polling.
    ///
    /// A failure here is fatal for the tailer.
    fn subscribe(&mut self, start: StartPosition) -> impl Future<Output = IndexerResult<()>> + Send;

    /// Returns up to `limit` events following the previously returned ones.
    ///
    /// Waits at most `max_wait` for the first event and returns an empty vector when none
    /// arrived. With a zero `max_wait` only already committed events are returned.
    fn poll(
        &mut self,
        max_wait: Duration,
        limit: usize,
    ) -> impl Future<Output = IndexerResult<Vec<ChangeEvent<Self::Row>>>> + Send;

    /// Durably records that every event up to `position` was processed.
    fn record_position(
        &mut self,
        position: Position,
    ) -> impl Future<Output = IndexerResult<()>> + Send;
}
