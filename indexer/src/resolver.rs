//! Resolution of the metadata an attribute batch depends on.
//!
//! A batch references fields, each field belongs to a table and each table to a template.
//! The resolver walks these three levels breadth-first, serving what it can from the shared
//! caches and reading the rest with one multi-key read per level. Tuple bindings are read
//! for every batch and never cached.

use metrics::counter;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use crate::cache::{LoadPlan, LruCache};
use crate::error::IndexerResult;
use crate::metrics::{INDEXER_METADATA_READS_TOTAL, LEVEL_LABEL};
use crate::store::{MetadataLevel, MetadataTransaction};
use crate::types::{
    AttributeRow, Field, FieldId, FieldType, Table, TableId, TemplateId, TemplateName,
    TupleBinding, TupleId,
};

/// The three metadata caches shared by every reader worker.
#[derive(Debug, Clone)]
pub struct MetadataCaches {
    pub fields: LruCache<FieldId, Field>,
    pub tables: LruCache<TableId, Table>,
    pub templates: LruCache<TemplateId, TemplateName>,
}

impl MetadataCaches {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            fields: LruCache::new("fields", capacity),
            tables: LruCache::new("tables", capacity),
            templates: LruCache::new("templates", capacity),
        }
    }
}

/// Distinct keys referenced by a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub field_ids: BTreeSet<FieldId>,
    pub tuple_ids: BTreeSet<TupleId>,
}

impl ResolutionRequest {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a AttributeRow>,
    {
        let mut request = ResolutionRequest::default();
        for row in rows {
            request.field_ids.insert(row.field_id);
            request.tuple_ids.insert(row.tuple_id);
        }

        request
    }

    pub fn is_empty(&self) -> bool {
        self.field_ids.is_empty() && self.tuple_ids.is_empty()
    }
}

/// A resolved attribute definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// `<template>.<table>.<field>`.
    pub name: String,
    pub field_type: FieldType,
}

/// Metadata resolved for one batch.
///
/// A snapshot taken from the caches and the database while the batch transaction was open.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMetadata {
    pub fields: HashMap<FieldId, Field>,
    pub tables: HashMap<TableId, Table>,
    pub templates: HashMap<TemplateId, TemplateName>,
    pub bindings: HashMap<TupleId, TupleBinding>,
}

impl ResolvedMetadata {
    /// Follows field, table and template of `field_id`.
    ///
    /// Returns `None` when the field is unknown or not searchable, or when its table or
    /// template did not resolve.
    pub fn resolve_field(&self, field_id: FieldId) -> Option<ResolvedField> {
        let field = self.fields.get(&field_id)?;
        if !field.searchable {
            return None;
        }

        let table = self.tables.get(&field.table_id)?;
        let template = self.templates.get(&table.template_id)?;

        Some(ResolvedField {
            name: compact_field_name(&template.name, &table.name, &field.name),
            field_type: field.field_type,
        })
    }

    pub fn binding(&self, tuple_id: TupleId) -> Option<&TupleBinding> {
        self.bindings.get(&tuple_id)
    }
}

/// Fully qualified attribute name.
pub fn compact_field_name(template: &str, table: &str, field: &str) -> String {
    format!("{template}.{table}.{field}")
}

/// Resolves batch dependencies with cache-or-fetch semantics.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    caches: MetadataCaches,
}

impl DependencyResolver {
    pub fn new(caches: MetadataCaches) -> Self {
        Self { caches }
    }

    pub fn caches(&self) -> &MetadataCaches {
        &self.caches
    }

    /// Resolves fields, tables, templates and tuple bindings of `request` within `transaction`.
    ///
    /// Issues at most one read per level and none for a level with nothing to load. Rows
    /// that cannot be found are left out of the result.
    pub async fn resolve<T>(
        &self,
        transaction: &mut T,
        request: &ResolutionRequest,
    ) -> IndexerResult<ResolvedMetadata>
    where
        T: MetadataTransaction,
    {
        let plan = self.caches.fields.plan(request.field_ids.iter().copied());
        let loaded = match load_keys(&plan, MetadataLevel::Fields) {
            Some(ids) => transaction.read_fields(&ids).await?,
            None => Vec::new(),
        };
        let loaded = retain_requested(&plan, MetadataLevel::Fields, loaded, |field| field.id);
        let fields = plan.complete(loaded).await;

        let table_ids: BTreeSet<TableId> = fields
            .values()
            .filter(|field| field.searchable)
            .map(|field| field.table_id)
            .collect();

        let plan = self.caches.tables.plan(table_ids);
        let loaded = match load_keys(&plan, MetadataLevel::Tables) {
            Some(ids) => transaction.read_tables(&ids).await?,
            None => Vec::new(),
        };
        let loaded = retain_requested(&plan, MetadataLevel::Tables, loaded, |table| table.id);
        let tables = plan.complete(loaded).await;

        let template_ids: BTreeSet<TemplateId> =
            tables.values().map(|table| table.template_id).collect();

        let plan = self.caches.templates.plan(template_ids);
        let loaded = match load_keys(&plan, MetadataLevel::Templates) {
            Some(ids) => transaction.read_templates(&ids).await?,
            None => Vec::new(),
        };
        let loaded =
            retain_requested(&plan, MetadataLevel::Templates, loaded, |template| template.id);
        let templates = plan.complete(loaded).await;

        let bindings = self.read_bindings(transaction, &request.tuple_ids).await?;

        Ok(ResolvedMetadata {
            fields,
            tables,
            templates,
            bindings,
        })
    }

    async fn read_bindings<T>(
        &self,
        transaction: &mut T,
        tuple_ids: &BTreeSet<TupleId>,
    ) -> IndexerResult<HashMap<TupleId, TupleBinding>>
    where
        T: MetadataTransaction,
    {
        if tuple_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<TupleId> = tuple_ids.iter().copied().collect();
        counter!(INDEXER_METADATA_READS_TOTAL, LEVEL_LABEL => MetadataLevel::TupleBindings.as_str())
            .increment(1);
        let rows = transaction.read_tuple_bindings(&ids).await?;

        let mut bindings = HashMap::with_capacity(rows.len());
        for binding in rows {
            if !tuple_ids.contains(&binding.tuple_id) {
                warn!(
                    level = %MetadataLevel::TupleBindings,
                    id = binding.tuple_id,
                    "skipping stale row that was not requested"
                );
                continue;
            }

            bindings.insert(binding.tuple_id, binding);
        }

        Ok(bindings)
    }
}

/// Returns the keys the plan must read, or `None` when no read is needed.
fn load_keys<K, V>(plan: &LoadPlan<K, V>, level: MetadataLevel) -> Option<Vec<K>>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    if plan.keys_to_load().is_empty() {
        return None;
    }

    counter!(INDEXER_METADATA_READS_TOTAL, LEVEL_LABEL => level.as_str()).increment(1);

    Some(plan.keys_to_load().to_vec())
}

/// Drops rows whose id was not requested and logs requested ids that were not found.
fn retain_requested<V, F>(
    plan: &LoadPlan<i64, V>,
    level: MetadataLevel,
    rows: Vec<V>,
    id_of: F,
) -> Vec<(i64, V)>
where
    V: Clone,
    F: Fn(&V) -> i64,
{
    let requested: HashSet<i64> = plan.keys_to_load().iter().copied().collect();

    let mut found = HashSet::with_capacity(rows.len());
    let mut retained = Vec::with_capacity(rows.len());
    for row in rows {
        let id = id_of(&row);
        if !requested.contains(&id) {
            warn!(%level, id, "skipping stale row that was not requested");
            continue;
        }

        found.insert(id);
        retained.push((id, row));
    }

    for id in requested.difference(&found) {
        debug!(%level, id, "metadata row does not exist");
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MetadataReader;
    use crate::store::memory::MemoryMetadataStore;

    async fn store() -> MemoryMetadataStore {
        let store = MemoryMetadataStore::new();
        store
            .insert_field(Field {
                id: 1,
                name: "count".to_string(),
                table_id: 10,
                searchable: true,
                field_type: FieldType::Int,
            })
            .await;
        store
            .insert_field(Field {
                id: 2,
                name: "flag".to_string(),
                table_id: 10,
                searchable: true,
                field_type: FieldType::Bool,
            })
            .await;
        store
            .insert_field(Field {
                id: 3,
                name: "hidden".to_string(),
                table_id: 11,
                searchable: false,
                field_type: FieldType::Text,
            })
            .await;
        store
            .insert_table(Table {
                id: 10,
                name: "experiment".to_string(),
                template_id: 100,
            })
            .await;
        store
            .insert_template(TemplateName {
                id: 100,
                name: "science".to_string(),
            })
            .await;
        store
            .insert_binding(TupleBinding {
                tuple_id: 7,
                entity_id: 70,
                parent_id: 7,
                name: "file.csv".to_string(),
            })
            .await;

        store
    }

    fn request(field_ids: &[FieldId], tuple_ids: &[TupleId]) -> ResolutionRequest {
        ResolutionRequest {
            field_ids: field_ids.iter().copied().collect(),
            tuple_ids: tuple_ids.iter().copied().collect(),
        }
    }

    fn resolver() -> DependencyResolver {
        DependencyResolver::new(MetadataCaches::new(NonZeroUsize::new(16).unwrap()))
    }

    #[tokio::test]
    async fn resolves_three_levels_with_one_read_each() {
        let mut store = store().await;
        let resolver = resolver();

        let mut transaction = store.begin().await.unwrap();
        let resolved = resolver
            .resolve(&mut transaction, &request(&[1, 2, 3, 99], &[7, 8]))
            .await
            .unwrap();
        transaction.commit().await.unwrap();

        assert_eq!(
            resolved.resolve_field(1),
            Some(ResolvedField {
                name: "science.experiment.count".to_string(),
                field_type: FieldType::Int,
            })
        );
        assert!(resolved.resolve_field(2).is_some());
        // Not searchable, so its table is never read.
        assert!(resolved.resolve_field(3).is_none());
        assert!(resolved.resolve_field(99).is_none());
        assert_eq!(resolved.binding(7).map(|b| b.entity_id), Some(70));
        assert!(resolved.binding(8).is_none());

        for level in [
            MetadataLevel::Fields,
            MetadataLevel::Tables,
            MetadataLevel::Templates,
            MetadataLevel::TupleBindings,
        ] {
            assert_eq!(store.reads_of(level).await.len(), 1, "{level}");
        }
        assert_eq!(store.reads_of(MetadataLevel::Tables).await[0].ids, vec![10]);
    }

    #[tokio::test]
    async fn cached_levels_are_not_read_again() {
        let mut store = store().await;
        let resolver = resolver();

        for _ in 0..2 {
            let mut transaction = store.begin().await.unwrap();
            resolver
                .resolve(&mut transaction, &request(&[1, 2], &[7]))
                .await
                .unwrap();
        }

        assert_eq!(store.reads_of(MetadataLevel::Fields).await.len(), 1);
        assert_eq!(store.reads_of(MetadataLevel::Tables).await.len(), 1);
        assert_eq!(store.reads_of(MetadataLevel::Templates).await.len(), 1);
        // Bindings are read for every batch.
        assert_eq!(store.reads_of(MetadataLevel::TupleBindings).await.len(), 2);
        assert!(resolver.caches().fields.contains(&1));
    }

    #[tokio::test]
    async fn empty_request_issues_no_read() {
        let mut store = store().await;
        let resolver = resolver();

        let mut transaction = store.begin().await.unwrap();
        let resolved = resolver
            .resolve(&mut transaction, &ResolutionRequest::default())
            .await
            .unwrap();
        drop(transaction);

        assert!(resolved.fields.is_empty());
        assert!(store.reads().await.is_empty());
    }

    #[tokio::test]
    async fn unrequested_rows_are_skipped() {
        let mut store = store().await;
        store
            .add_unrequested_field(Field {
                id: 50,
                name: "stale".to_string(),
                table_id: 10,
                searchable: true,
                field_type: FieldType::Text,
            })
            .await;
        let resolver = resolver();

        let mut transaction = store.begin().await.unwrap();
        let resolved = resolver
            .resolve(&mut transaction, &request(&[1], &[7]))
            .await
            .unwrap();

        assert!(!resolved.fields.contains_key(&50));
        assert!(!resolver.caches().fields.contains(&50));
    }

    #[test]
    fn compact_name_joins_levels() {
        assert_eq!(compact_field_name("t", "tb", "f"), "t.tb.f");
    }
}
