//! Postgres implementations of the indexer's database boundary.
//!
//! Captured tables write every committed mutation into `cdc.changelog` through a trigger that
//! also notifies listeners. [`source::PgEventSource`] tails that changelog per table and records
//! acknowledged positions in `cdc.positions`. [`metadata::PgMetadataReader`] serves the
//! multi-key metadata reads of reader workers and [`skewed::PgSkewedValuesStore`] backs the
//! skewed strings collector.

pub mod connect;
pub mod metadata;
pub mod migrations;
pub mod skewed;
pub mod source;

/// Schema holding the changelog, the recorded positions and the capture functions.
pub const CDC_SCHEMA: &str = "cdc";

/// Channel notified by the capture trigger, with the captured table name as payload.
pub const CHANGELOG_CHANNEL: &str = "cdc_changelog";

/// Tailed table holding schema-based attribute values, in the metadata schema.
pub const ATTRIBUTE_TABLE: &str = "meta_data";

/// Tailed table holding schemaless attributes, in the primary schema.
pub const SCHEMALESS_TABLE: &str = "meta_data_schemaless";

/// Tailed table of skewed values, in the metastore schema.
pub const SKEWED_VALUES_TABLE: &str = "skewed_values";
