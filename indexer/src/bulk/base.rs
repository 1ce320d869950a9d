use std::future::Future;

use crate::error::IndexerResult;

/// Reply of the search backend to a bulk request.
///
/// Per-operation results in the body are not inspected, the body is only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResponse {
    pub status: u16,
    pub body: String,
}

/// Backend accepting NDJSON bulk requests.
pub trait BulkSink {
    /// Returns the name of the sink.
    fn name() -> &'static str;

    /// Sends one bulk request.
    ///
    /// Fails when the request could not be delivered or was rejected as a whole.
    fn send(&self, payload: String) -> impl Future<Output = IndexerResult<BulkResponse>> + Send;
}
