use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::store::{MetadataLevel, MetadataReader, MetadataTransaction, SkewedValuesStore};
use crate::types::{
    Field, FieldId, Table, TableId, TemplateId, TemplateName, TupleBinding, TupleId,
};

/// A multi-key read served by [`MemoryMetadataStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRead {
    pub level: MetadataLevel,
    pub ids: Vec<i64>,
}

#[derive(Debug, Default)]
struct Inner {
    fields: HashMap<FieldId, Field>,
    tables: HashMap<TableId, Table>,
    templates: HashMap<TemplateId, TemplateName>,
    bindings: HashMap<TupleId, TupleBinding>,
    /// Fields returned by every field read, whether requested or not.
    unrequested_fields: Vec<Field>,
    reads: Vec<MetadataRead>,
    commits: usize,
    connection_lost: bool,
}

/// In-memory metadata family.
///
/// Clones share the same data, so each reader worker gets its own clone the way it would
/// get its own connection. Every read is recorded for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_field(&self, field: Field) {
        self.inner.lock().await.fields.insert(field.id, field);
    }

    pub async fn insert_table(&self, table: Table) {
        self.inner.lock().await.tables.insert(table.id, table);
    }

    pub async fn insert_template(&self, template: TemplateName) {
        self.inner.lock().await.templates.insert(template.id, template);
    }

    pub async fn insert_binding(&self, binding: TupleBinding) {
        self.inner
            .lock()
            .await
            .bindings
            .insert(binding.tuple_id, binding);
    }

    pub async fn remove_field(&self, id: FieldId) {
        self.inner.lock().await.fields.remove(&id);
    }

    /// Makes every field read also return `field`, as a read of a reused id would.
    pub async fn add_unrequested_field(&self, field: Field) {
        self.inner.lock().await.unrequested_fields.push(field);
    }

    /// Makes every following read fail as if the connection dropped.
    pub async fn lose_connection(&self) {
        self.inner.lock().await.connection_lost = true;
    }

    pub async fn reads(&self) -> Vec<MetadataRead> {
        self.inner.lock().await.reads.clone()
    }

    pub async fn reads_of(&self, level: MetadataLevel) -> Vec<MetadataRead> {
        self.inner
            .lock()
            .await
            .reads
            .iter()
            .filter(|read| read.level == level)
            .cloned()
            .collect()
    }

    pub async fn commits(&self) -> usize {
        self.inner.lock().await.commits
    }

    async fn read<T, F>(&self, level: MetadataLevel, ids: &[i64], select: F) -> IndexerResult<Vec<T>>
    where
        F: FnOnce(&Inner, &[i64]) -> Vec<T>,
    {
        let mut inner = self.inner.lock().await;
        if inner.connection_lost {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Metadata connection was lost",
                level
            );
        }

        let mut ids = ids.to_vec();
        ids.sort_unstable();
        let rows = select(&*inner, ids.as_slice());
        inner.reads.push(MetadataRead { level, ids });

        Ok(rows)
    }
}

fn select_by_id<T: Clone>(rows: &HashMap<i64, T>, ids: &[i64]) -> Vec<T> {
    ids.iter().filter_map(|id| rows.get(id).cloned()).collect()
}

impl MetadataReader for MemoryMetadataStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    async fn begin(&mut self) -> IndexerResult<MemoryTransaction<'_>> {
        if self.inner.lock().await.connection_lost {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Metadata connection was lost"
            );
        }

        Ok(MemoryTransaction { store: self })
    }
}

/// Read transaction over a [`MemoryMetadataStore`].
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryMetadataStore,
}

impl MetadataTransaction for MemoryTransaction<'_> {
    async fn read_fields(&mut self, ids: &[FieldId]) -> IndexerResult<Vec<Field>> {
        self.store
            .read(MetadataLevel::Fields, ids, |inner, ids| {
                let mut fields = select_by_id(&inner.fields, ids);
                fields.extend(inner.unrequested_fields.iter().cloned());
                fields
            })
            .await
    }

    async fn read_tables(&mut self, ids: &[TableId]) -> IndexerResult<Vec<Table>> {
        self.store
            .read(MetadataLevel::Tables, ids, |inner, ids| {
                select_by_id(&inner.tables, ids)
            })
            .await
    }

    async fn read_templates(&mut self, ids: &[TemplateId]) -> IndexerResult<Vec<TemplateName>> {
        self.store
            .read(MetadataLevel::Templates, ids, |inner, ids| {
                select_by_id(&inner.templates, ids)
            })
            .await
    }

    async fn read_tuple_bindings(&mut self, ids: &[TupleId]) -> IndexerResult<Vec<TupleBinding>> {
        self.store
            .read(MetadataLevel::TupleBindings, ids, |inner, ids| {
                select_by_id(&inner.bindings, ids)
            })
            .await
    }

    async fn commit(self) -> IndexerResult<()> {
        self.store.inner.lock().await.commits += 1;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct SkewedInner {
    string_lists: HashSet<i64>,
    referenced: HashSet<i64>,
    removed: Vec<i64>,
}

/// In-memory skewed values tables.
#[derive(Debug, Clone, Default)]
pub struct MemorySkewedValuesStore {
    inner: Arc<Mutex<SkewedInner>>,
}

impl MemorySkewedValuesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_string_list(&self, string_list_id: i64) {
        self.inner.lock().await.string_lists.insert(string_list_id);
    }

    pub async fn set_referenced(&self, string_list_id: i64, referenced: bool) {
        let mut inner = self.inner.lock().await;
        if referenced {
            inner.referenced.insert(string_list_id);
        } else {
            inner.referenced.remove(&string_list_id);
        }
    }

    pub async fn string_lists(&self) -> HashSet<i64> {
        self.inner.lock().await.string_lists.clone()
    }

    pub async fn removed(&self) -> Vec<i64> {
        self.inner.lock().await.removed.clone()
    }
}

impl SkewedValuesStore for MemorySkewedValuesStore {
    async fn has_string_list_id(&self, string_list_id: i64) -> IndexerResult<bool> {
        Ok(self.inner.lock().await.referenced.contains(&string_list_id))
    }

    async fn remove_string_list(&self, string_list_id: i64) -> IndexerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.string_lists.remove(&string_list_id);
        inner.removed.push(string_list_id);

        Ok(())
    }
}
