use std::fmt;
use std::future::Future;

use crate::error::IndexerResult;
use crate::types::{
    Field, FieldId, Table, TableId, TemplateId, TemplateName, TupleBinding, TupleId,
};

/// Level of the metadata family read by the resolver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetadataLevel {
    Fields,
    Tables,
    Templates,
    TupleBindings,
}

impl MetadataLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataLevel::Fields => "fields",
            MetadataLevel::Tables => "tables",
            MetadataLevel::Templates => "templates",
            MetadataLevel::TupleBindings => "tuple_bindings",
        }
    }
}

impl fmt::Display for MetadataLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection to the metadata family owned by a single reader worker.
pub trait MetadataReader {
    type Transaction<'a>: MetadataTransaction + Send
    where
        Self: 'a;

    /// Opens a read transaction for one batch.
    ///
    /// A transaction dropped without [`MetadataTransaction::commit`] is rolled back.
    fn begin(&mut self) -> impl Future<Output = IndexerResult<Self::Transaction<'_>>> + Send;
}

/// Multi-key reads by primary key inside one read transaction.
///
/// Every read returns the rows found for the given ids, in no particular order. Ids without
/// a row are simply absent from the result.
pub trait MetadataTransaction {
    fn read_fields(
        &mut self,
        ids: &[FieldId],
    ) -> impl Future<Output = IndexerResult<Vec<Field>>> + Send;

    fn read_tables(
        &mut self,
        ids: &[TableId],
    ) -> impl Future<Output = IndexerResult<Vec<Table>>> + Send;

    fn read_templates(
        &mut self,
        ids: &[TemplateId],
    ) -> impl Future<Output = IndexerResult<Vec<TemplateName>>> + Send;

    fn read_tuple_bindings(
        &mut self,
        ids: &[TupleId],
    ) -> impl Future<Output = IndexerResult<Vec<TupleBinding>>> + Send;

    fn commit(self) -> impl Future<Output = IndexerResult<()>> + Send;
}

/// Access to the skewed values tables, used to collect string lists nobody references.
pub trait SkewedValuesStore {
    /// Returns whether any skewed value still references the string list.
    fn has_string_list_id(
        &self,
        string_list_id: i64,
    ) -> impl Future<Output = IndexerResult<bool>> + Send;

    /// Deletes the string list and its values.
    fn remove_string_list(
        &self,
        string_list_id: i64,
    ) -> impl Future<Output = IndexerResult<()>> + Send;
}
