use config::shared::{
    BatchConfig, BulkConfig, LinkedEntityConfig, MetadataMode, PipelineConfig, SearchConfig,
    SourceConfig,
};
use secrecy::SecretString;

use crate::bulk::memory::MemoryBulkSink;
use crate::error::IndexerResult;
use crate::pipeline::Pipeline;
use crate::store::memory::MemoryMetadataStore;

pub type TestPipeline = Pipeline<MemoryMetadataStore, MemoryBulkSink>;

/// Returns a configuration with short waits, suited for tests.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        source: SourceConfig {
            connection: SecretString::from("postgres://localhost/test".to_string()),
            database: SourceConfig::DEFAULT_DATABASE.to_string(),
            meta_database: SourceConfig::DEFAULT_META_DATABASE.to_string(),
        },
        batch: BatchConfig {
            max_size: 10,
            max_fill_ms: 20,
            poll_max_wait_ms: 20,
        },
        bulk: BulkConfig {
            max_size_bytes: 1 << 20,
            max_wait_ms: 20,
        },
        search: SearchConfig::default(),
        num_readers: 2,
        cache_capacity: 100,
        recovery: true,
        stats_interval_ms: None,
        metadata_mode: MetadataMode::Both,
    }
}

/// Builds pipelines backed by in-memory collaborators.
///
/// Every reader worker gets a clone of the same [`MemoryMetadataStore`], so reads of all
/// workers are recorded in one place.
#[derive(Debug)]
pub struct TestPipelineBuilder {
    config: PipelineConfig,
    store: MemoryMetadataStore,
    sink: MemoryBulkSink,
}

impl TestPipelineBuilder {
    pub fn new(store: MemoryMetadataStore, sink: MemoryBulkSink) -> Self {
        Self {
            config: test_pipeline_config(),
            store,
            sink,
        }
    }

    pub fn with_batch(mut self, max_size: usize, max_fill_ms: u64) -> Self {
        self.config.batch.max_size = max_size;
        self.config.batch.max_fill_ms = max_fill_ms;
        self
    }

    pub fn with_bulk(mut self, max_size_bytes: usize, max_wait_ms: u64) -> Self {
        self.config.bulk = BulkConfig {
            max_size_bytes,
            max_wait_ms,
        };
        self
    }

    pub fn with_readers(mut self, num_readers: u16) -> Self {
        self.config.num_readers = num_readers;
        self
    }

    pub fn with_recovery(mut self, recovery: bool) -> Self {
        self.config.recovery = recovery;
        self
    }

    pub fn with_metadata_mode(mut self, metadata_mode: MetadataMode) -> Self {
        self.config.metadata_mode = metadata_mode;
        self
    }

    pub fn with_linked_entities(mut self) -> Self {
        self.config.search.linked_entities = Some(LinkedEntityConfig::default());
        self
    }

    pub fn with_stats_interval(mut self, interval_ms: u64) -> Self {
        self.config.stats_interval_ms = Some(interval_ms);
        self
    }

    pub fn build(self) -> TestPipeline {
        let readers = (0..self.config.num_readers)
            .map(|_| self.store.clone())
            .collect();

        Pipeline::new(self.config, readers, self.sink)
    }

    /// Builds and starts the pipeline.
    pub async fn start(self) -> IndexerResult<TestPipeline> {
        let mut pipeline = self.build();
        pipeline.start().await?;

        Ok(pipeline)
    }
}
