use config::shared::MetadataMode;
use indexer::bulk::memory::MemoryBulkSink;
use indexer::error::ErrorKind;
use indexer::source::memory::MemoryEventSource;
use indexer::store::MetadataLevel;
use indexer::store::memory::MemoryMetadataStore;
use indexer::test_utils::metadata::{
    COUNT_FIELD_ID, FLAG_FIELD_ID, HIDDEN_FIELD_ID, LABEL_FIELD_ID, MISSING_FIELD_ID, PARENT_ID,
    RATIO_FIELD_ID, attribute_row, bind_tuple, insert_schema, qualified_name, schemaless_row,
};
use indexer::test_utils::pipeline::TestPipelineBuilder;
use indexer::test_utils::{
    TEST_TIMEOUT, wait_for_first_poll, wait_for_recorded_position, wait_until,
};
use indexer::types::{AttributeRow, SchemalessRow};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

async fn metadata_store() -> MemoryMetadataStore {
    let store = MemoryMetadataStore::new();
    insert_schema(&store).await;
    bind_tuple(&store, 7, 70).await;
    bind_tuple(&store, 8, 70).await;
    bind_tuple(&store, 9, 90).await;

    store
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_of_one_entity_are_indexed_as_one_document() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "42"))
        .await;
    source
        .push_insert(attribute_row(8, FLAG_FIELD_ID, "true"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 2).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);

    let (header, document) = &operations[0];
    assert_eq!(
        header,
        &json!({"update": {"_index": "projects", "_type": "inode", "_id": 70}})
    );
    assert_eq!(
        document,
        &json!({
            "doc": {
                "xattr": [
                    {"name": qualified_name("count"), "intValue": 42},
                    {"name": qualified_name("flag"), "boolValue": true},
                ]
            },
            "doc_as_upsert": true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolved_attributes_are_left_out() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "1"))
        .await;
    source
        .push_insert(attribute_row(7, MISSING_FIELD_ID, "x"))
        .await;
    source
        .push_insert(attribute_row(9, MISSING_FIELD_ID, "y"))
        .await;
    source
        .push_insert(attribute_row(9, HIDDEN_FIELD_ID, "3"))
        .await;
    source
        .push_insert(attribute_row(404, COUNT_FIELD_ID, "4"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 5).await;
    let stats = pipeline.stats();
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].0["update"]["_id"], 70);
    assert_eq!(
        operations[0].1["doc"]["xattr"],
        json!([{"name": qualified_name("count"), "intValue": 1}])
    );
    assert_eq!(stats.snapshot().rows_skipped, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_metadata_level_is_read_at_most_once_per_batch() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    for (tuple_id, field_id, value) in [
        (7, COUNT_FIELD_ID, "1"),
        (8, FLAG_FIELD_ID, "0"),
        (9, COUNT_FIELD_ID, "2"),
        (9, RATIO_FIELD_ID, "0.5"),
        (8, LABEL_FIELD_ID, "plain"),
        (7, COUNT_FIELD_ID, "3"),
    ] {
        source
            .push_insert(attribute_row(tuple_id, field_id, value))
            .await;
    }

    let mut pipeline = TestPipelineBuilder::new(store.clone(), sink.clone())
        .with_readers(1)
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 6).await;

    let fields = store.reads_of(MetadataLevel::Fields).await;
    assert_eq!(fields.len(), 1);
    assert_eq!(
        fields[0].ids,
        vec![COUNT_FIELD_ID, FLAG_FIELD_ID, RATIO_FIELD_ID, LABEL_FIELD_ID]
    );
    assert_eq!(store.reads_of(MetadataLevel::Tables).await.len(), 1);
    assert_eq!(store.reads_of(MetadataLevel::Templates).await.len(), 1);
    assert_eq!(store.reads_of(MetadataLevel::TupleBindings).await[0].ids, vec![7, 8, 9]);

    // Cached levels are not read again, bindings are.
    source
        .push_insert(attribute_row(9, COUNT_FIELD_ID, "4"))
        .await;
    wait_for_recorded_position(&source, 7).await;
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(store.reads_of(MetadataLevel::Fields).await.len(), 1);
    assert_eq!(store.reads_of(MetadataLevel::Tables).await.len(), 1);
    assert_eq!(store.reads_of(MetadataLevel::Templates).await.len(), 1);
    assert_eq!(store.reads_of(MetadataLevel::TupleBindings).await.len(), 2);
    assert_eq!(store.commits().await, 2);

    let ids: Vec<_> = sink
        .operations()
        .await
        .unwrap()
        .iter()
        .map(|(header, _)| header["update"]["_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![70, 90, 90]);
}

#[tokio::test(flavor = "multi_thread")]
async fn updates_are_indexed_and_deletes_are_only_counted() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_update(
            attribute_row(7, COUNT_FIELD_ID, "1"),
            attribute_row(7, COUNT_FIELD_ID, "2"),
        )
        .await;
    source
        .push_delete(attribute_row(9, FLAG_FIELD_ID, "true"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .with_stats_interval(10)
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 2).await;
    let stats = pipeline.stats();
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].0["update"]["_id"], 70);
    assert_eq!(
        operations[0].1["doc"]["xattr"],
        json!([{"name": qualified_name("count"), "intValue": 2}])
    );

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.rows_updated, 1);
    assert_eq!(snapshot.rows_removed, 1);
    assert_eq!(snapshot.bulk_requests, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_delivers_the_in_flight_batch() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "42"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store.clone(), sink.clone())
        .with_bulk(1 << 20, 60_000)
        .with_readers(1)
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    // The batch was read and is buffered for a flush that is a minute away.
    wait_until(TEST_TIMEOUT, || {
        let store = store.clone();
        async move { store.commits().await == 1 }
    })
    .await;
    assert_eq!(source.recorded_position().await, None);

    tokio::time::timeout(TEST_TIMEOUT, pipeline.shutdown_and_wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(source.recorded_position().await, Some(1));
    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].0["update"]["_id"], 70);
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_recovery_skips_committed_events() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "1"))
        .await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .with_recovery(false)
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_first_poll(&source).await;
    source
        .push_insert(attribute_row(9, COUNT_FIELD_ID, "2"))
        .await;

    wait_for_recorded_position(&source, 2).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].0["update"]["_id"], 90);
}

#[tokio::test(flavor = "multi_thread")]
async fn recovery_resumes_after_recorded_position() {
    init_test_tracing();
    let store = metadata_store().await;
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<AttributeRow>::new("meta_data_value");
    source
        .push_insert(attribute_row(7, COUNT_FIELD_ID, "1"))
        .await;
    source
        .push_insert(attribute_row(9, COUNT_FIELD_ID, "2"))
        .await;
    source.set_recorded_position(1).await;

    let mut pipeline = TestPipelineBuilder::new(store, sink.clone())
        .start()
        .await
        .unwrap();
    pipeline.add_attribute_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 2).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].0["update"]["_id"], 90);
}

#[tokio::test(flavor = "multi_thread")]
async fn schemaless_rows_are_indexed_as_text() {
    init_test_tracing();
    let sink = MemoryBulkSink::new();

    let source = MemoryEventSource::<SchemalessRow>::new("meta_data_schemaless");
    source
        .push_insert(schemaless_row(42, "owner", "alice"))
        .await;
    source.push_insert(schemaless_row(42, "size", "12")).await;

    let mut pipeline = TestPipelineBuilder::new(MemoryMetadataStore::new(), sink.clone())
        .with_metadata_mode(MetadataMode::Schemaless)
        .with_linked_entities()
        .start()
        .await
        .unwrap();

    let err = pipeline
        .add_attribute_tailer(MemoryEventSource::<AttributeRow>::new("meta_data_value"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);

    pipeline.add_schemaless_tailer(source.clone()).unwrap();

    wait_for_recorded_position(&source, 2).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let operations = sink.operations().await.unwrap();
    assert_eq!(operations.len(), 1);

    let (header, document) = &operations[0];
    assert_eq!(header["update"]["_id"], 42);
    assert_eq!(header["update"]["_parent"], PARENT_ID);
    assert_eq!(
        document["doc"]["xattr"],
        json!([
            {"name": "owner", "textValue": "alice"},
            {"name": "size", "textValue": "12"},
        ])
    );
}
