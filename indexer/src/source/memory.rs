use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::source::{EventSource, StartPosition};
use crate::types::{ChangeEvent, Position};

#[derive(Debug)]
struct Inner<R> {
    events: Vec<ChangeEvent<R>>,
    next_position: Position,
    recorded: Option<Position>,
    cursor: Option<Position>,
    fail_subscribe: bool,
    failing_polls: usize,
    polls: usize,
}

/// In-memory change stream for tests and local runs.
///
/// Clones share the same stream: tests keep one clone to append events and inspect the
/// recorded position while the tailer owns another.
#[derive(Debug)]
pub struct MemoryEventSource<R> {
    table_name: Arc<str>,
    inner: Arc<Mutex<Inner<R>>>,
    notify: Arc<Notify>,
}

impl<R> Clone for MemoryEventSource<R> {
    fn clone(&self) -> Self {
        Self {
            table_name: self.table_name.clone(),
            inner: self.inner.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<R> MemoryEventSource<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: Arc::from(table_name),
            inner: Arc::new(Mutex::new(Inner {
                events: Vec::new(),
                next_position: 1,
                recorded: None,
                cursor: None,
                fail_subscribe: false,
                failing_polls: 0,
                polls: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn push_insert(&self, row: R) -> Position {
        self.push(|position| ChangeEvent::insert(row, position))
            .await
    }

    pub async fn push_update(&self, pre: R, post: R) -> Position {
        self.push(|position| ChangeEvent::update(pre, post, position))
            .await
    }

    pub async fn push_delete(&self, row: R) -> Position {
        self.push(|position| ChangeEvent::delete(row, position))
            .await
    }

    async fn push<F>(&self, build: F) -> Position
    where
        F: FnOnce(Position) -> ChangeEvent<R>,
    {
        let mut inner = self.inner.lock().await;
        let position = inner.next_position;
        inner.next_position += 1;
        inner.events.push(build(position));
        drop(inner);

        self.notify.notify_one();

        position
    }

    /// Sets the position recorded by a previous run.
    pub async fn set_recorded_position(&self, position: Position) {
        self.inner.lock().await.recorded = Some(position);
    }

    pub async fn recorded_position(&self) -> Option<Position> {
        self.inner.lock().await.recorded
    }

    /// Makes the next subscription fail.
    pub async fn fail_subscribe(&self) {
        self.inner.lock().await.fail_subscribe = true;
    }

    /// Makes the next `count` polls fail with a transient error.
    pub async fn fail_next_polls(&self, count: usize) {
        self.inner.lock().await.failing_polls = count;
    }

    /// Number of polls issued so far, failed ones included.
    pub async fn polls(&self) -> usize {
        self.inner.lock().await.polls
    }

    async fn take_available(&self, limit: usize) -> IndexerResult<Vec<ChangeEvent<R>>> {
        let mut inner = self.inner.lock().await;
        let Some(cursor) = inner.cursor else {
            bail!(
                ErrorKind::InvalidState,
                "Change stream polled before subscribing",
                self.table_name
            );
        };

        let events: Vec<_> = inner
            .events
            .iter()
            .filter(|event| event.position > cursor)
            .take(limit)
            .cloned()
            .collect();

        if let Some(last) = events.last() {
            inner.cursor = Some(last.position);
        }

        Ok(events)
    }
}

impl<R> EventSource for MemoryEventSource<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Row = R;

    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn subscribe(&mut self, start: StartPosition) -> IndexerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.fail_subscribe {
            inner.fail_subscribe = false;
            bail!(
                ErrorKind::SubscriptionFailed,
                "Failed to subscribe to the change stream",
                self.table_name
            );
        }

        let cursor = match start {
            StartPosition::LastRecorded => inner.recorded.unwrap_or(0),
            StartPosition::Latest => inner.next_position - 1,
        };
        inner.cursor = Some(cursor);

        debug!(table = %self.table_name, cursor, "subscribed to memory change stream");

        Ok(())
    }

    async fn poll(
        &mut self,
        max_wait: Duration,
        limit: usize,
    ) -> IndexerResult<Vec<ChangeEvent<R>>> {
        {
            let mut inner = self.inner.lock().await;
            inner.polls += 1;
            if inner.failing_polls > 0 {
                inner.failing_polls -= 1;
                bail!(
                    ErrorKind::SourceQueryFailed,
                    "Change stream poll failed",
                    self.table_name
                );
            }
        }

        let events = self.take_available(limit).await?;
        if !events.is_empty() || max_wait.is_zero() {
            return Ok(events);
        }

        if tokio::time::timeout(max_wait, self.notify.notified())
            .await
            .is_err()
        {
            return Ok(Vec::new());
        }

        self.take_available(limit).await
    }

    async fn record_position(&mut self, position: Position) -> IndexerResult<()> {
        self.inner.lock().await.recorded = Some(position);

        Ok(())
    }
}
