//! Fixtures and builders for tests running the pipeline against in-memory collaborators.
//!
//! - [`metadata`] - a small schema-based metadata family and row constructors
//! - [`pipeline`] - configuration and builder for pipelines over memory stores and sinks
//!
//! The `wait_*` helpers poll shared in-memory state until a condition holds, panicking after
//! [`TEST_TIMEOUT`].

use std::future::Future;
use std::time::Duration;

use crate::source::memory::MemoryEventSource;
use crate::types::Position;

pub mod metadata;
pub mod pipeline;

/// Upper bound for conditions awaited by tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `condition` until it holds.
///
/// Panics after `timeout`, failing the test instead of hanging it.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    if waited.is_err() {
        panic!("condition did not hold within {timeout:?}");
    }
}

/// Waits until the tailer of `source` recorded `position` or a later one.
pub async fn wait_for_recorded_position<R>(source: &MemoryEventSource<R>, position: Position)
where
    R: Clone + Send + Sync + 'static,
{
    wait_until(TEST_TIMEOUT, || {
        let source = source.clone();
        async move { source.recorded_position().await >= Some(position) }
    })
    .await;
}

/// Waits until the tailer of `source` polled at least once, which happens after subscribing.
pub async fn wait_for_first_poll<R>(source: &MemoryEventSource<R>)
where
    R: Clone + Send + Sync + 'static,
{
    wait_until(TEST_TIMEOUT, || {
        let source = source.clone();
        async move { source.polls().await > 0 }
    })
    .await;
}
