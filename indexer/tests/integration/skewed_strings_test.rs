use indexer::bulk::memory::MemoryBulkSink;
use indexer::source::memory::MemoryEventSource;
use indexer::store::memory::{MemoryMetadataStore, MemorySkewedValuesStore};
use indexer::test_utils::pipeline::TestPipelineBuilder;
use indexer::test_utils::wait_for_recorded_position;
use indexer::types::SkewedValueRow;
use telemetry::tracing::init_test_tracing;

fn skewed_value(string_list_id: i64, index: i32) -> SkewedValueRow {
    SkewedValueRow {
        descriptor_id: 5,
        string_list_id,
        index,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreferenced_string_lists_are_collected() {
    init_test_tracing();
    let skewed_store = MemorySkewedValuesStore::new();
    for string_list_id in [10, 11, 12] {
        skewed_store.insert_string_list(string_list_id).await;
    }
    skewed_store.set_referenced(11, true).await;

    let source = MemoryEventSource::<SkewedValueRow>::new("skewed_values");
    source.push_insert(skewed_value(12, 0)).await;
    source.push_delete(skewed_value(10, 0)).await;
    source
        .push_update(skewed_value(11, 0), skewed_value(11, 1))
        .await;

    let sink = MemoryBulkSink::new();
    let mut pipeline = TestPipelineBuilder::new(MemoryMetadataStore::new(), sink.clone())
        .start()
        .await
        .unwrap();
    pipeline
        .add_skewed_strings_collector(source.clone(), skewed_store.clone())
        .unwrap();

    wait_for_recorded_position(&source, 3).await;
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(skewed_store.removed().await, vec![10]);

    let mut remaining: Vec<_> = skewed_store.string_lists().await.into_iter().collect();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![11, 12]);

    assert!(sink.requests().await.is_empty());
}
