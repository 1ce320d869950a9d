use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, BulkConfig, SearchConfig, SourceConfig, ValidationError};

/// Which families of extended metadata are tailed and indexed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Attributes described by field/table/template definitions.
    SchemaBased,
    /// Free-form name/value attributes attached directly to an inode.
    Schemaless,
    /// Both families at once.
    #[default]
    Both,
}

impl MetadataMode {
    /// Returns `true` when schema-based metadata must be tailed.
    pub fn schema_based(&self) -> bool {
        matches!(self, MetadataMode::SchemaBased | MetadataMode::Both)
    }

    /// Returns `true` when schemaless metadata must be tailed.
    pub fn schemaless(&self) -> bool {
        matches!(self, MetadataMode::Schemaless | MetadataMode::Both)
    }
}

/// Configuration of an indexing pipeline.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// Cluster connection settings.
    pub source: SourceConfig,
    /// Batching used by the tailers.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Flush policy of the bulk sender.
    #[serde(default)]
    pub bulk: BulkConfig,
    /// Search backend addressing.
    #[serde(default)]
    pub search: SearchConfig,
    /// Number of reader workers, each owning one database connection.
    #[serde(default = "default_num_readers")]
    pub num_readers: u16,
    /// Capacity of each of the metadata caches.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Replays events recorded since the last acknowledged position before live tailing.
    #[serde(default = "default_recovery")]
    pub recovery: bool,
    /// Interval, in milliseconds, of the periodic stats summary. Disabled when absent.
    #[serde(default)]
    pub stats_interval_ms: Option<u64>,
    /// Metadata families to index.
    #[serde(default)]
    pub metadata_mode: MetadataMode,
}

impl PipelineConfig {
    pub const DEFAULT_NUM_READERS: u16 = 5;

    pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

    pub const DEFAULT_STATS_INTERVAL_MS: u64 = 10_000;

    /// Validates pipeline configuration settings.
    ///
    /// Checks connection settings and ensures the pool and caches are non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.batch.validate()?;
        self.bulk.validate()?;
        self.search.validate()?;

        if self.num_readers == 0 {
            return Err(ValidationError::NumReadersZero);
        }

        if self.cache_capacity == 0 {
            return Err(ValidationError::CacheCapacityZero);
        }

        Ok(())
    }
}

fn default_num_readers() -> u16 {
    PipelineConfig::DEFAULT_NUM_READERS
}

fn default_cache_capacity() -> usize {
    PipelineConfig::DEFAULT_CACHE_CAPACITY
}

fn default_recovery() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_config(connection: &str) -> PipelineConfig {
        let value = serde_json::json!({
            "source": { "connection": connection },
        });

        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn defaults_are_applied_when_deserializing() {
        let config = pipeline_config("postgres://localhost/cluster");

        assert_eq!(config.source.database, SourceConfig::DEFAULT_DATABASE);
        assert_eq!(config.source.meta_database, SourceConfig::DEFAULT_META_DATABASE);
        assert_eq!(config.batch, BatchConfig::default());
        assert_eq!(config.bulk, BulkConfig::default());
        assert_eq!(config.num_readers, PipelineConfig::DEFAULT_NUM_READERS);
        assert_eq!(config.metadata_mode, MetadataMode::Both);
        assert!(config.recovery);
        assert!(config.stats_interval_ms.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_connection() {
        let config = pipeline_config("  ");

        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingValue("connection"))
        );
    }

    #[test]
    fn validate_rejects_empty_reader_pool() {
        let mut config = pipeline_config("postgres://localhost/cluster");
        config.num_readers = 0;

        assert_eq!(config.validate(), Err(ValidationError::NumReadersZero));
    }

    #[test]
    fn metadata_mode_selects_families() {
        assert!(MetadataMode::Both.schema_based() && MetadataMode::Both.schemaless());
        assert!(MetadataMode::SchemaBased.schema_based());
        assert!(!MetadataMode::SchemaBased.schemaless());
        assert!(!MetadataMode::Schemaless.schema_based());
    }
}
