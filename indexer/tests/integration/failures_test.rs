use indexer::bulk::memory::MemoryBulkSink;
use indexer::error::ErrorKind;
use indexer::source::memory::MemoryEventSource;
use indexer::store::memory::MemoryMetadataStore;
use indexer::test_utils::TEST_TIMEOUT;
use indexer::test_utils::metadata::{
    COUNT_FIELD_ID, attribute_row, bind_tuple, insert_schema, schemaless_row,
};
use indexer::test_utils::pipeline::TestPipelineBuilder;
use indexer::types::{AttributeRow, SchemalessRow};
use telemetry::tracing::init_test_tracing;

async fn metadata_store() -> MemoryMetadataStore {
    let store = MemoryMetadataStore::new();
    insert_schema(&store).await;
    bind_tuple(&store, 7, 70).await;

    store
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_metadata_connection_shuts_the_pipeline_down() {
    init_test_tracing();
    let store = metadata_store().await;
    store.lose_connection().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "1"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    // No explicit shutdown, the failing worker requests it.
    let err = tokio::time::timeout(TEST_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.kinds().contains(&ErrorKind::SourceConnectionFailed));
    assert_eq!(source.recorded_position().await, None);
    assert!(sink.requests().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_bulk_request_leaves_the_batch_unrecorded() {
    init_test_tracing();
    let sink = MemoryBulkSink::new();
    sink.fail_next_requests(1).await;

    let source = MemoryEventSource::<SchemalessRow>::new("meta_data_schemaless");
    source
        .push_insert(schemaless_row(42, "owner", "alice"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(MemoryMetadataStore::new(), sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_schemaless_tailer(source.clone()).unwrap();

    let err = tokio::time::timeout(TEST_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.kinds().contains(&ErrorKind::BulkRequestFailed));
    assert_eq!(source.recorded_position().await, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_subscription_is_fatal() {
    init_test_tracing();
    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source.fail_subscribe().await;

    let mut pipeline = TestPipelineBuilder::new(metadata_store().await, MemoryBulkSink::new())
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source).unwrap();

    let err = tokio::time::timeout(TEST_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::SubscriptionFailed]);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_poll_errors_do_not_stop_the_pipeline() {
    init_test_tracing();
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<SchemalessRow>::new("meta_data_schemaless");
    source.fail_next_polls(2).await;
    source
        .push_insert(schemaless_row(42, "owner", "alice"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(MemoryMetadataStore::new(), sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_schemaless_tailer(source.clone()).unwrap();

    indexer::test_utils::wait_for_recorded_position(&source, 1).await;
    let stats = pipeline.stats();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(stats.snapshot().poll_errors, 2);
    assert_eq!(sink.operations().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_without_readers_does_not_start() {
    init_test_tracing();
    let mut pipeline = TestPipelineBuilder::new(MemoryMetadataStore::new(), MemoryBulkSink::new())
        .with_readers(0)
        .build();

    let err = pipeline
        .add_schemaless_tailer(MemoryEventSource::<SchemalessRow>::new("meta_data_schemaless"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
