use std::str::FromStr;

use config::shared::SourceConfig;
use indexer::error::IndexerResult;
use pg_escape::quote_identifier;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};

/// Application name reported to the server by every connection.
const APPLICATION_NAME: &str = "metadata_indexer";

/// Parses the configured connection string into connect options.
pub fn connect_options(config: &SourceConfig) -> IndexerResult<PgConnectOptions> {
    let options = PgConnectOptions::from_str(config.connection.expose_secret())?
        .application_name(APPLICATION_NAME);

    Ok(options)
}

/// Opens a dedicated connection, as owned by a single reader worker.
pub async fn connect(options: &PgConnectOptions) -> IndexerResult<PgConnection> {
    let connection = PgConnection::connect_with(options).await?;

    Ok(connection)
}

/// Opens a pool shared by event sources and collectors.
///
/// Every event source keeps one connection of the pool for its notification listener, so
/// `max_connections` must exceed the number of tailed tables.
pub async fn connect_pool(
    options: &PgConnectOptions,
    max_connections: u32,
) -> IndexerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options.clone())
        .await?;

    Ok(pool)
}

/// Returns `schema.table` with both parts quoted as identifiers.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}
