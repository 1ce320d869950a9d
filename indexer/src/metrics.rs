//! Metric names emitted by the indexer.

/// Label for the tailed table name.
pub const TABLE_NAME_LABEL: &str = "table_name";

/// Label for the metadata level read by the resolver.
pub const LEVEL_LABEL: &str = "level";

/// Label for the cache name.
pub const CACHE_LABEL: &str = "cache";

/// Counter of change events received by tailers.
pub const INDEXER_EVENTS_RECEIVED_TOTAL: &str = "indexer_events_received_total";

/// Counter of batches dispatched by tailers.
pub const INDEXER_BATCHES_DISPATCHED_TOTAL: &str = "indexer_batches_dispatched_total";

/// Counter of transient poll failures.
pub const INDEXER_POLL_ERRORS_TOTAL: &str = "indexer_poll_errors_total";

/// Counter of multi-key metadata reads issued by the resolver.
pub const INDEXER_METADATA_READS_TOTAL: &str = "indexer_metadata_reads_total";

/// Counter of cache hits.
pub const INDEXER_CACHE_HITS_TOTAL: &str = "indexer_cache_hits_total";

/// Counter of cache misses.
pub const INDEXER_CACHE_MISSES_TOTAL: &str = "indexer_cache_misses_total";

/// Counter of attribute rows dropped during compilation.
pub const INDEXER_ROWS_SKIPPED_TOTAL: &str = "indexer_rows_skipped_total";

/// Histogram of dependency resolution time per batch, in seconds.
pub const INDEXER_RESOLVE_DURATION_SECONDS: &str = "indexer_resolve_duration_seconds";

/// Histogram of document compilation time per batch, in seconds.
pub const INDEXER_COMPILE_DURATION_SECONDS: &str = "indexer_compile_duration_seconds";

/// Histogram of time between handing operations to the bulk sender and their delivery.
pub const INDEXER_DELIVERY_DURATION_SECONDS: &str = "indexer_delivery_duration_seconds";

/// Histogram of bulk request round trips, in seconds.
pub const INDEXER_BULK_REQUEST_DURATION_SECONDS: &str = "indexer_bulk_request_duration_seconds";

/// Histogram of bulk request payload sizes, in bytes.
pub const INDEXER_BULK_REQUEST_BYTES: &str = "indexer_bulk_request_bytes";

/// Gauge of operations waiting in the bulk buffer.
pub const INDEXER_BULK_BUFFERED_OPERATIONS: &str = "indexer_bulk_buffered_operations";
