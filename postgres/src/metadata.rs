use std::fmt;

use indexer::error::IndexerResult;
use indexer::store::{MetadataReader, MetadataTransaction};
use indexer::types::{
    Field, FieldId, FieldType, Table, TableId, TemplateId, TemplateName, TupleBinding, TupleId,
};
use sqlx::postgres::PgRow;
use sqlx::{Connection, FromRow, PgConnection, Postgres, Transaction};
use tracing::warn;

use crate::connect::qualified_table;

#[derive(Debug, FromRow)]
struct FieldRecord {
    id: i64,
    name: String,
    table_id: i64,
    searchable: bool,
    field_type: i16,
}

#[derive(Debug, FromRow)]
struct TableRecord {
    id: i64,
    name: String,
    template_id: i64,
}

#[derive(Debug, FromRow)]
struct TemplateRecord {
    id: i64,
    name: String,
}

#[derive(Debug, FromRow)]
struct TupleBindingRecord {
    tuple_id: i64,
    entity_id: i64,
    parent_id: i64,
    name: String,
}

/// Multi-key select statements over the metadata schema.
///
/// Every statement takes the requested primary keys as a single `bigint[]` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataQueries {
    fields: String,
    tables: String,
    templates: String,
    tuple_bindings: String,
}

impl MetadataQueries {
    pub fn new(meta_schema: &str) -> Self {
        Self {
            fields: format!(
                "select fieldid::bigint as id, name, tableid::bigint as table_id, searchable, \
                 \"type\"::smallint as field_type from {} where fieldid = any($1)",
                qualified_table(meta_schema, "meta_fields")
            ),
            tables: format!(
                "select tableid::bigint as id, name, templateid::bigint as template_id \
                 from {} where tableid = any($1)",
                qualified_table(meta_schema, "meta_tables")
            ),
            templates: format!(
                "select templateid::bigint as id, name from {} where templateid = any($1)",
                qualified_table(meta_schema, "meta_templates")
            ),
            tuple_bindings: format!(
                "select tupleid::bigint as tuple_id, inodeid::bigint as entity_id, \
                 inode_pid::bigint as parent_id, inode_name as name \
                 from {} where tupleid = any($1)",
                qualified_table(meta_schema, "meta_tuple_to_file")
            ),
        }
    }
}

/// Metadata reader over a dedicated connection, owned by one reader worker.
pub struct PgMetadataReader {
    connection: PgConnection,
    queries: MetadataQueries,
}

impl fmt::Debug for PgMetadataReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgMetadataReader")
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

impl PgMetadataReader {
    pub fn new(connection: PgConnection, meta_schema: &str) -> Self {
        Self {
            connection,
            queries: MetadataQueries::new(meta_schema),
        }
    }
}

impl MetadataReader for PgMetadataReader {
    type Transaction<'a> = PgMetadataTransaction<'a>;

    async fn begin(&mut self) -> IndexerResult<PgMetadataTransaction<'_>> {
        let mut transaction = self.connection.begin().await?;
        // All reads of a batch see the same snapshot.
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *transaction)
            .await?;

        Ok(PgMetadataTransaction {
            transaction,
            queries: &self.queries,
        })
    }
}

/// Read-only transaction spanning the metadata reads of one batch.
///
/// Dropping it without committing rolls it back.
pub struct PgMetadataTransaction<'a> {
    transaction: Transaction<'a, Postgres>,
    queries: &'a MetadataQueries,
}

impl PgMetadataTransaction<'_> {
    async fn read<T>(&mut self, sql: &str, ids: &[i64]) -> IndexerResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let records = sqlx::query_as::<_, T>(sql)
            .bind(ids)
            .fetch_all(&mut *self.transaction)
            .await?;

        Ok(records)
    }
}

impl MetadataTransaction for PgMetadataTransaction<'_> {
    async fn read_fields(&mut self, ids: &[FieldId]) -> IndexerResult<Vec<Field>> {
        let queries = self.queries;
        let records: Vec<FieldRecord> = self.read(&queries.fields, ids).await?;

        let fields = records
            .into_iter()
            .filter_map(|record| {
                let Some(field_type) = FieldType::from_code(record.field_type) else {
                    warn!(
                        field_id = record.id,
                        code = record.field_type,
                        "ignoring field with unknown type code"
                    );
                    return None;
                };

                Some(Field {
                    id: record.id,
                    name: record.name,
                    table_id: record.table_id,
                    searchable: record.searchable,
                    field_type,
                })
            })
            .collect();

        Ok(fields)
    }

    async fn read_tables(&mut self, ids: &[TableId]) -> IndexerResult<Vec<Table>> {
        let queries = self.queries;
        let records: Vec<TableRecord> = self.read(&queries.tables, ids).await?;

        Ok(records
            .into_iter()
            .map(|record| Table {
                id: record.id,
                name: record.name,
                template_id: record.template_id,
            })
            .collect())
    }

    async fn read_templates(&mut self, ids: &[TemplateId]) -> IndexerResult<Vec<TemplateName>> {
        let queries = self.queries;
        let records: Vec<TemplateRecord> = self.read(&queries.templates, ids).await?;

        Ok(records
            .into_iter()
            .map(|record| TemplateName {
                id: record.id,
                name: record.name,
            })
            .collect())
    }

    async fn read_tuple_bindings(&mut self, ids: &[TupleId]) -> IndexerResult<Vec<TupleBinding>> {
        let queries = self.queries;
        let records: Vec<TupleBindingRecord> = self.read(&queries.tuple_bindings, ids).await?;

        Ok(records
            .into_iter()
            .map(|record| TupleBinding {
                tuple_id: record.tuple_id,
                entity_id: record.entity_id,
                parent_id: record.parent_id,
                name: record.name,
            })
            .collect())
    }

    async fn commit(self) -> IndexerResult<()> {
        self.transaction.commit().await?;

        Ok(())
    }
}
