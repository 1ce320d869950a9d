use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::bulk::{BulkResponse, BulkSink};
use crate::error::{ErrorKind, IndexerResult};

#[derive(Debug, Default)]
struct Inner {
    requests: Vec<String>,
    failing_requests: usize,
}

/// Sink keeping every bulk request in memory.
///
/// Clones share the recorded requests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBulkSink {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBulkSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payloads of the delivered requests, in delivery order.
    pub async fn requests(&self) -> Vec<String> {
        self.inner.lock().await.requests.clone()
    }

    /// Returns every delivered operation as its action header and document.
    pub async fn operations(&self) -> IndexerResult<Vec<(serde_json::Value, serde_json::Value)>> {
        let requests = self.requests().await;

        let mut operations = Vec::new();
        for request in &requests {
            let mut lines = request.lines();
            while let Some(header) = lines.next() {
                let Some(document) = lines.next() else {
                    bail!(
                        ErrorKind::InvalidData,
                        "Bulk request ends with an action header"
                    );
                };

                operations.push((serde_json::from_str(header)?, serde_json::from_str(document)?));
            }
        }

        Ok(operations)
    }

    /// Makes the next `count` requests fail.
    pub async fn fail_next_requests(&self, count: usize) {
        self.inner.lock().await.failing_requests = count;
    }
}

impl BulkSink for MemoryBulkSink {
    fn name() -> &'static str {
        "memory"
    }

    async fn send(&self, payload: String) -> IndexerResult<BulkResponse> {
        let mut inner = self.inner.lock().await;
        if inner.failing_requests > 0 {
            inner.failing_requests -= 1;
            bail!(ErrorKind::BulkRequestFailed, "Bulk request failed");
        }

        inner.requests.push(payload);

        Ok(BulkResponse {
            status: 200,
            body: r#"{"errors":false}"#.to_string(),
        })
    }
}
