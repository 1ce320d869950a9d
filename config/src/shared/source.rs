use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for the database cluster whose tables are tailed.
///
/// This intentionally does not implement [`serde::Serialize`] since the connection string
/// usually embeds credentials.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    /// Connection string of the cluster. Redacted in debug output.
    pub connection: SecretString,
    /// Name of the primary database (schema) holding the filesystem tables.
    #[serde(default = "default_database")]
    pub database: String,
    /// Name of the database (schema) holding the metadata tables.
    #[serde(default = "default_meta_database")]
    pub meta_database: String,
}

impl SourceConfig {
    pub const DEFAULT_DATABASE: &'static str = "hops";

    pub const DEFAULT_META_DATABASE: &'static str = "hopsworks";

    /// Validates that every connection related option is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connection.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingValue("connection"));
        }
        if self.database.trim().is_empty() {
            return Err(ValidationError::MissingValue("database"));
        }
        if self.meta_database.trim().is_empty() {
            return Err(ValidationError::MissingValue("meta_database"));
        }

        Ok(())
    }
}

fn default_database() -> String {
    SourceConfig::DEFAULT_DATABASE.to_string()
}

fn default_meta_database() -> String {
    SourceConfig::DEFAULT_META_DATABASE.to_string()
}
