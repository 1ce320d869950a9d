use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Batching configuration used by every tailer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of events collected into a single batch.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Maximum time, in milliseconds, to keep filling a batch after its first event arrived.
    #[serde(default = "default_batch_max_fill_ms")]
    pub max_fill_ms: u64,
    /// Maximum time, in milliseconds, a single poll waits for new events.
    #[serde(default = "default_poll_max_wait_ms")]
    pub poll_max_wait_ms: u64,
}

impl BatchConfig {
    /// Default maximum batch size.
    pub const DEFAULT_MAX_SIZE: usize = 5;

    /// Default pre-batch wait time in milliseconds.
    pub const DEFAULT_MAX_FILL_MS: u64 = 2000;

    /// Default poll wait in milliseconds.
    pub const DEFAULT_POLL_MAX_WAIT_MS: u64 = 1000;

    /// Validates batch configuration settings.
    ///
    /// Ensures max_size is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_fill_ms: default_batch_max_fill_ms(),
            poll_max_wait_ms: default_poll_max_wait_ms(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_batch_max_fill_ms() -> u64 {
    BatchConfig::DEFAULT_MAX_FILL_MS
}

fn default_poll_max_wait_ms() -> u64 {
    BatchConfig::DEFAULT_POLL_MAX_WAIT_MS
}
