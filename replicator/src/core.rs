use config::shared::PipelineConfig;
use indexer::bulk::elasticsearch::ElasticsearchSink;
use indexer::pipeline::Pipeline;
use indexer::types::{AttributeRow, SchemalessRow, SkewedValueRow};
use postgres::connect::{connect, connect_options, connect_pool};
use postgres::metadata::PgMetadataReader;
use postgres::migrations::{enable_capture, run_migrations};
use postgres::skewed::PgSkewedValuesStore;
use postgres::source::PgEventSource;
use postgres::{ATTRIBUTE_TABLE, SCHEMALESS_TABLE, SKEWED_VALUES_TABLE};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::ReplicatorResult;

/// Starts the indexer with the provided configuration and runs it until a shutdown signal or
/// a fatal error.
///
/// Migrations run and capture triggers are installed before any tailer starts, so a failing
/// startup leaves no pipeline task behind.
pub async fn start_indexer_with_config(
    config: PipelineConfig,
    skewed_values_schema: Option<String>,
) -> ReplicatorResult<()> {
    info!("starting metadata indexer");

    log_config(&config, skewed_values_schema.as_deref());

    let options = connect_options(&config.source)?;
    run_migrations(&options).await?;

    let mode = config.metadata_mode;
    let mut tailed_tables = Vec::new();
    if mode.schema_based() {
        tailed_tables.push((config.source.meta_database.clone(), ATTRIBUTE_TABLE));
    }
    if mode.schemaless() {
        tailed_tables.push((config.source.database.clone(), SCHEMALESS_TABLE));
    }
    if let Some(schema) = &skewed_values_schema {
        tailed_tables.push((schema.clone(), SKEWED_VALUES_TABLE));
    }

    // Each event source keeps one connection for its listener.
    let max_connections = u32::try_from(tailed_tables.len() * 2 + 1).unwrap_or(u32::MAX);
    let source_pool = connect_pool(&options, max_connections).await?;
    for (schema, table) in &tailed_tables {
        enable_capture(&source_pool, schema, table).await?;
    }

    let mut readers = Vec::with_capacity(usize::from(config.num_readers));
    for _ in 0..config.num_readers {
        let connection = connect(&options).await?;
        readers.push(PgMetadataReader::new(
            connection,
            &config.source.meta_database,
        ));
    }

    let sink = ElasticsearchSink::new(&config.search)?;

    let mut pipeline = Pipeline::new(config, readers, sink);
    pipeline.start().await?;

    if mode.schema_based() {
        pipeline.add_attribute_tailer(PgEventSource::<AttributeRow>::new(
            source_pool.clone(),
            ATTRIBUTE_TABLE,
        ))?;
    }
    if mode.schemaless() {
        pipeline.add_schemaless_tailer(PgEventSource::<SchemalessRow>::new(
            source_pool.clone(),
            SCHEMALESS_TABLE,
        ))?;
    }
    if let Some(schema) = &skewed_values_schema {
        pipeline.add_skewed_strings_collector(
            PgEventSource::<SkewedValueRow>::new(source_pool.clone(), SKEWED_VALUES_TABLE),
            PgSkewedValuesStore::new(source_pool.clone(), schema),
        )?;
    }

    let result = run_until_shutdown(pipeline).await;

    source_pool.close().await;
    result?;

    info!("metadata indexer completed");

    Ok(())
}

/// Waits for the pipeline, shutting it down on SIGINT or SIGTERM.
async fn run_until_shutdown(
    pipeline: Pipeline<PgMetadataReader, ElasticsearchSink>,
) -> ReplicatorResult<()> {
    let mut sigterm = signal(SignalKind::terminate())?;

    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "failed to listen for ctrl+c");
                    return;
                }
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        shutdown_tx.shutdown();
    });

    let result = pipeline.wait().await;

    // The pipeline may have stopped on its own, in which case no signal will come.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}

fn log_config(config: &PipelineConfig, skewed_values_schema: Option<&str>) {
    let linked = config.search.linked_entities.as_ref();
    info!(
        database = %config.source.database,
        meta_database = %config.source.meta_database,
        metadata_mode = ?config.metadata_mode,
        skewed_values_schema,
        "source config"
    );
    info!(
        batch_max_size = config.batch.max_size,
        batch_max_fill_ms = config.batch.max_fill_ms,
        poll_max_wait_ms = config.batch.poll_max_wait_ms,
        num_readers = config.num_readers,
        cache_capacity = config.cache_capacity,
        recovery = config.recovery,
        stats_interval_ms = config.stats_interval_ms,
        "pipeline config"
    );
    info!(
        address = %config.search.address,
        index = %config.search.index,
        inode_type = %config.search.inode_type,
        linked_entities = linked.is_some(),
        project_type = linked.map(|linked| linked.project_type.as_str()),
        dataset_type = linked.map(|linked| linked.dataset_type.as_str()),
        bulk_max_size_bytes = config.bulk.max_size_bytes,
        bulk_max_wait_ms = config.bulk.max_wait_ms,
        "search config"
    );
}
