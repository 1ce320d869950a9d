use indexer::error::{ErrorKind, IndexerResult};
use indexer::indexer_error;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::CDC_SCHEMA;
use crate::connect::qualified_table;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Runs the changelog migrations.
///
/// The migrations bookkeeping table is created inside the `cdc` schema rather than `public`.
pub async fn run_migrations(options: &PgConnectOptions) -> IndexerResult<()> {
    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists cdc;").await?;
                conn.execute("set search_path = 'cdc';").await?;
                Ok(())
            })
        })
        .connect_with(options.clone())
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| {
            indexer_error!(
                ErrorKind::SourceQueryFailed,
                "Changelog migrations failed",
                detail = err.to_string(),
                source: err
            )
        })?;

    pool.close().await;
    info!(schema = CDC_SCHEMA, "changelog migrations applied");

    Ok(())
}

/// Installs the capture trigger on `schema.table`, replacing a previous installation.
pub async fn enable_capture(pool: &PgPool, schema: &str, table: &str) -> IndexerResult<()> {
    let target = qualified_table(schema, table);
    sqlx::query("select cdc.enable_capture($1::regclass)")
        .bind(&target)
        .execute(pool)
        .await?;

    info!(table = %target, "changelog capture enabled");

    Ok(())
}
