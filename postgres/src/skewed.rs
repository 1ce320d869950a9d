use indexer::error::IndexerResult;
use indexer::store::SkewedValuesStore;
use sqlx::PgPool;

use crate::connect::qualified_table;

/// Skewed values tables of the metastore schema.
///
/// `skewed_values` rows reference string lists stored in `skewed_string_list` with their
/// values in `skewed_string_list_values`.
#[derive(Debug, Clone)]
pub struct PgSkewedValuesStore {
    pool: PgPool,
    has_string_list: String,
    delete_list_values: String,
    delete_list: String,
}

impl PgSkewedValuesStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            has_string_list: format!(
                "select exists (select 1 from {} where string_list_id = $1)",
                qualified_table(schema, "skewed_values")
            ),
            delete_list_values: format!(
                "delete from {} where string_list_id = $1",
                qualified_table(schema, "skewed_string_list_values")
            ),
            delete_list: format!(
                "delete from {} where string_list_id = $1",
                qualified_table(schema, "skewed_string_list")
            ),
        }
    }
}

impl SkewedValuesStore for PgSkewedValuesStore {
    async fn has_string_list_id(&self, string_list_id: i64) -> IndexerResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(&self.has_string_list)
            .bind(string_list_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn remove_string_list(&self, string_list_id: i64) -> IndexerResult<()> {
        let mut transaction = self.pool.begin().await?;

        sqlx::query(&self.delete_list_values)
            .bind(string_list_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query(&self.delete_list)
            .bind(string_list_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(())
    }
}
