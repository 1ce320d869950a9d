use clap::{ArgAction, Parser, ValueEnum};
use config::shared::{
    BatchConfig, BulkConfig, LinkedEntityConfig, MetadataMode, PipelineConfig, SearchConfig,
    SourceConfig,
};
use secrecy::SecretString;
use tracing::Level;

/// Minimum severity of emitted log events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Kept for compatibility, logs like `error`.
    Fatal,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error | LogLevel::Fatal => Level::ERROR,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum MetadataModeArg {
    SchemaBased,
    Schemaless,
    Both,
}

impl From<MetadataModeArg> for MetadataMode {
    fn from(mode: MetadataModeArg) -> Self {
        match mode {
            MetadataModeArg::SchemaBased => MetadataMode::SchemaBased,
            MetadataModeArg::Schemaless => MetadataMode::Schemaless,
            MetadataModeArg::Both => MetadataMode::Both,
        }
    }
}

/// Tails metadata tables and indexes their changes into the search backend.
#[derive(Parser, Debug)]
#[command(name = "replicator", version)]
pub struct Args {
    /// Connection string of the database cluster.
    #[arg(long)]
    pub connection: Option<String>,

    /// Schema holding the filesystem and schemaless metadata tables.
    #[arg(long, default_value = SourceConfig::DEFAULT_DATABASE)]
    pub database: String,

    /// Schema holding the schema-based metadata tables.
    #[arg(long, default_value = SourceConfig::DEFAULT_META_DATABASE)]
    pub meta_database: String,

    /// Maximum time in milliseconds a poll waits for new events.
    #[arg(long, default_value_t = BatchConfig::DEFAULT_POLL_MAX_WAIT_MS)]
    pub poll_max_wait_ms: u64,

    /// Time in milliseconds to keep filling a batch that is not full yet.
    #[arg(long, default_value_t = BatchConfig::DEFAULT_MAX_FILL_MS)]
    pub wait_time_ms: u64,

    /// Maximum number of events per batch.
    #[arg(long, default_value_t = BatchConfig::DEFAULT_MAX_SIZE)]
    pub batch_size: usize,

    /// Number of reader workers, each with its own connection.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_NUM_READERS)]
    pub num_readers: u16,

    /// Address of the search backend.
    #[arg(long, default_value = SearchConfig::DEFAULT_ADDRESS)]
    pub search_address: String,

    /// Link documents to their parent entity through the `_parent` header field.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub linked_entities: bool,

    /// Index receiving the documents.
    #[arg(long, default_value = SearchConfig::DEFAULT_INDEX)]
    pub index: String,

    /// Type name of projects, used with linked entities.
    #[arg(long, default_value = LinkedEntityConfig::DEFAULT_PROJECT_TYPE)]
    pub project_type: String,

    /// Type name of datasets, used with linked entities.
    #[arg(long, default_value = LinkedEntityConfig::DEFAULT_DATASET_TYPE)]
    pub dataset_type: String,

    /// Type name of inode documents.
    #[arg(long, default_value = SearchConfig::DEFAULT_INODE_TYPE)]
    pub inode_type: String,

    /// Buffered bytes that trigger a bulk request.
    #[arg(long, default_value_t = BulkConfig::DEFAULT_MAX_SIZE_BYTES)]
    pub bulk_size_bytes: usize,

    /// Time in milliseconds after which buffered operations are sent regardless of size.
    #[arg(long, default_value_t = BulkConfig::DEFAULT_MAX_WAIT_MS)]
    pub bulk_wait_ms: u64,

    /// Capacity of each metadata cache.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Replay changes committed since the last recorded position before tailing.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub recovery: bool,

    /// Periodically log pipeline statistics.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub stats: bool,

    /// Interval in milliseconds between statistics summaries.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_STATS_INTERVAL_MS)]
    pub stats_interval_ms: u64,

    #[arg(long, value_enum, default_value_t = MetadataModeArg::Both)]
    pub metadata_mode: MetadataModeArg,

    /// Schema of the metastore whose unreferenced skewed string lists are collected.
    ///
    /// Collection is disabled when absent.
    #[arg(long)]
    pub skewed_values_schema: Option<String>,
}

impl Args {
    /// Maps the arguments onto the pipeline configuration, without validating it.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let linked_entities = self.linked_entities.then(|| LinkedEntityConfig {
            project_type: self.project_type.clone(),
            dataset_type: self.dataset_type.clone(),
        });

        PipelineConfig {
            source: SourceConfig {
                connection: SecretString::from(self.connection.clone().unwrap_or_default()),
                database: self.database.clone(),
                meta_database: self.meta_database.clone(),
            },
            batch: BatchConfig {
                max_size: self.batch_size,
                max_fill_ms: self.wait_time_ms,
                poll_max_wait_ms: self.poll_max_wait_ms,
            },
            bulk: BulkConfig {
                max_size_bytes: self.bulk_size_bytes,
                max_wait_ms: self.bulk_wait_ms,
            },
            search: SearchConfig {
                address: self.search_address.clone(),
                index: self.index.clone(),
                inode_type: self.inode_type.clone(),
                linked_entities,
            },
            num_readers: self.num_readers,
            cache_capacity: self.cache_capacity,
            recovery: self.recovery,
            stats_interval_ms: self.stats.then_some(self.stats_interval_ms),
            metadata_mode: self.metadata_mode.into(),
        }
    }
}
