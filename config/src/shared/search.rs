use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Addressing of documents in the search backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// `host:port` (or full URL) of the search backend.
    pub address: String,
    /// Index every document is written to.
    #[serde(default = "default_index")]
    pub index: String,
    /// Document type used for filesystem entries.
    #[serde(default = "default_inode_type")]
    pub inode_type: String,
    /// Linked-entity indexing, disabled when absent.
    #[serde(default)]
    pub linked_entities: Option<LinkedEntityConfig>,
}

impl SearchConfig {
    pub const DEFAULT_ADDRESS: &'static str = "localhost:9200";

    pub const DEFAULT_INDEX: &'static str = "projects";

    pub const DEFAULT_INODE_TYPE: &'static str = "inode";

    /// Returns the bulk endpoint for the configured address.
    ///
    /// A scheme is prepended when the address is a bare `host:port`.
    pub fn bulk_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{address}/_bulk")
        } else {
            format!("http://{address}/_bulk")
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.address.trim().is_empty() {
            return Err(ValidationError::MissingValue("search.address"));
        }
        if self.index.trim().is_empty() {
            return Err(ValidationError::MissingValue("search.index"));
        }
        if self.inode_type.trim().is_empty() {
            return Err(ValidationError::MissingValue("search.inode_type"));
        }
        if let Some(linked) = &self.linked_entities {
            linked.validate()?;
        }

        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            address: Self::DEFAULT_ADDRESS.to_string(),
            index: default_index(),
            inode_type: default_inode_type(),
            linked_entities: None,
        }
    }
}

/// Type names of the parent entities when linked-entity indexing is enabled.
///
/// In this mode every inode document is addressed as a child of its parent entity through
/// `_parent`. Project and dataset documents are written by other services; their type names
/// are only validated and reported here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LinkedEntityConfig {
    pub project_type: String,
    pub dataset_type: String,
}

impl LinkedEntityConfig {
    pub const DEFAULT_PROJECT_TYPE: &'static str = "proj";

    pub const DEFAULT_DATASET_TYPE: &'static str = "ds";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_type.trim().is_empty() {
            return Err(ValidationError::MissingValue("search.linked_entities.project_type"));
        }
        if self.dataset_type.trim().is_empty() {
            return Err(ValidationError::MissingValue("search.linked_entities.dataset_type"));
        }

        Ok(())
    }
}

impl Default for LinkedEntityConfig {
    fn default() -> Self {
        Self {
            project_type: Self::DEFAULT_PROJECT_TYPE.to_string(),
            dataset_type: Self::DEFAULT_DATASET_TYPE.to_string(),
        }
    }
}

fn default_index() -> String {
    SearchConfig::DEFAULT_INDEX.to_string()
}

fn default_inode_type() -> String {
    SearchConfig::DEFAULT_INODE_TYPE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_url_prepends_scheme_for_bare_addresses() {
        let config = SearchConfig::default();
        assert_eq!(config.bulk_url(), "http://localhost:9200/_bulk");

        let config = SearchConfig {
            address: "https://search.internal:9243/".to_string(),
            ..SearchConfig::default()
        };
        assert_eq!(config.bulk_url(), "https://search.internal:9243/_bulk");
    }

    #[test]
    fn validate_rejects_empty_linked_type_names() {
        let config = SearchConfig {
            linked_entities: Some(LinkedEntityConfig {
                project_type: String::new(),
                dataset_type: "ds".to_string(),
            }),
            ..SearchConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingValue(
                "search.linked_entities.project_type"
            ))
        );
    }
}
