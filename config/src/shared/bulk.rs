use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Flush policy of the shared bulk send buffer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BulkConfig {
    /// Buffered payload size, in bytes, at which a flush is issued immediately.
    #[serde(default = "default_bulk_max_size_bytes")]
    pub max_size_bytes: usize,
    /// Maximum time, in milliseconds, the first unflushed byte may wait in the buffer.
    #[serde(default = "default_bulk_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl BulkConfig {
    /// Default flush threshold in bytes.
    pub const DEFAULT_MAX_SIZE_BYTES: usize = 5000;

    /// Default flush wait in milliseconds.
    pub const DEFAULT_MAX_WAIT_MS: u64 = 5000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size_bytes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "bulk.max_size_bytes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_bulk_max_size_bytes(),
            max_wait_ms: default_bulk_max_wait_ms(),
        }
    }
}

fn default_bulk_max_size_bytes() -> usize {
    BulkConfig::DEFAULT_MAX_SIZE_BYTES
}

fn default_bulk_max_wait_ms() -> u64 {
    BulkConfig::DEFAULT_MAX_WAIT_MS
}
