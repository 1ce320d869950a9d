//! Compilation of resolved rows into partial-document upserts.

use config::shared::SearchConfig;
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::{debug, warn};

use crate::conversions::coerce_value;
use crate::metrics::INDEXER_ROWS_SKIPPED_TOTAL;
use crate::resolver::ResolvedMetadata;
use crate::types::{
    Attribute, AttributeRow, AttributeValue, BulkOperation, EntityId, SchemalessRow, UpdateTarget,
};

/// Operations compiled from one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledBatch {
    pub operations: Vec<BulkOperation>,
    /// Rows or attributes dropped because they could not be bound, resolved or coerced.
    pub skipped: usize,
}

#[derive(Debug)]
struct EntityDocument {
    parent_id: EntityId,
    attributes: Vec<Attribute>,
}

/// Groups rows by owning entity and emits one upsert per entity.
#[derive(Debug, Clone)]
pub struct DocumentCompiler {
    index: String,
    doc_type: String,
    linked_entities: bool,
}

impl DocumentCompiler {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            index: config.index.clone(),
            doc_type: config.inode_type.clone(),
            linked_entities: config.linked_entities.is_some(),
        }
    }

    /// Compiles attribute rows against the metadata resolved for their batch.
    ///
    /// Rows without a tuple binding and attributes whose field chain did not resolve are
    /// skipped, as are values that fail to parse as their declared type. Entities left
    /// without attributes produce no operation. When a batch writes the same field of a tuple
    /// more than once, only the last write is compiled.
    pub fn compile_attributes(
        &self,
        rows: &[AttributeRow],
        metadata: &ResolvedMetadata,
    ) -> CompiledBatch {
        let mut documents: BTreeMap<EntityId, EntityDocument> = BTreeMap::new();
        let mut skipped = 0;

        for row in latest_rows(rows, |row| (row.tuple_id, row.field_id)) {
            let Some(binding) = metadata.binding(row.tuple_id) else {
                debug!(
                    tuple_id = row.tuple_id,
                    field_id = row.field_id,
                    "no entity bound to tuple, skipping row"
                );
                skipped += 1;
                continue;
            };

            let Some(field) = metadata.resolve_field(row.field_id) else {
                debug!(
                    tuple_id = row.tuple_id,
                    field_id = row.field_id,
                    "field did not resolve, skipping attribute"
                );
                skipped += 1;
                continue;
            };

            let value = match coerce_value(field.field_type, &row.value) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        attribute = %field.name,
                        field_type = %field.field_type,
                        value = %row.value,
                        error = %err,
                        "failed to coerce attribute value, dropping attribute"
                    );
                    skipped += 1;
                    continue;
                }
            };

            documents
                .entry(binding.entity_id)
                .or_insert_with(|| EntityDocument {
                    parent_id: binding.parent_id,
                    attributes: Vec::new(),
                })
                .attributes
                .push(Attribute::new(field.name, value));
        }

        if skipped > 0 {
            counter!(INDEXER_ROWS_SKIPPED_TOTAL).increment(skipped as u64);
        }

        CompiledBatch {
            operations: self.into_operations(documents),
            skipped,
        }
    }

    /// Compiles schemaless rows, which carry their attribute name and are always text.
    pub fn compile_schemaless(&self, rows: &[SchemalessRow]) -> CompiledBatch {
        let mut documents: BTreeMap<EntityId, EntityDocument> = BTreeMap::new();
        for row in latest_rows(rows, |row| (row.entity_id, row.name.as_str())) {
            documents
                .entry(row.entity_id)
                .or_insert_with(|| EntityDocument {
                    parent_id: row.parent_id,
                    attributes: Vec::new(),
                })
                .attributes
                .push(Attribute::new(
                    row.name.clone(),
                    AttributeValue::Text(row.value.clone()),
                ));
        }

        CompiledBatch {
            operations: self.into_operations(documents),
            skipped: 0,
        }
    }

    fn into_operations(&self, documents: BTreeMap<EntityId, EntityDocument>) -> Vec<BulkOperation> {
        documents
            .into_iter()
            .filter(|(_, document)| !document.attributes.is_empty())
            .map(|(entity_id, document)| {
                let target = UpdateTarget {
                    index: self.index.clone(),
                    doc_type: self.doc_type.clone(),
                    id: entity_id,
                    parent: self.linked_entities.then_some(document.parent_id),
                };

                BulkOperation::upsert(target, document.attributes)
            })
            .collect()
    }
}

/// Yields the rows that are the last of their key, in their original order.
fn latest_rows<'a, R, K, F>(rows: &'a [R], key: F) -> impl Iterator<Item = &'a R>
where
    K: Hash + Eq,
    F: Fn(&'a R) -> K,
{
    let mut last: HashMap<K, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        last.insert(key(row), idx);
    }

    rows.iter()
        .enumerate()
        .filter(move |(idx, row)| last.get(&key(*row)) == Some(idx))
        .map(|(_, row)| row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FieldType, Table, TemplateName, TupleBinding};
    use config::shared::LinkedEntityConfig;

    fn search_config(linked: bool) -> SearchConfig {
        SearchConfig {
            address: SearchConfig::DEFAULT_ADDRESS.to_string(),
            index: "projects".to_string(),
            inode_type: "inode".to_string(),
            linked_entities: linked.then(LinkedEntityConfig::default),
        }
    }

    fn metadata() -> ResolvedMetadata {
        let mut metadata = ResolvedMetadata::default();
        for (id, name, field_type) in [
            (1, "count", FieldType::Int),
            (2, "flag", FieldType::Bool),
            (3, "ratio", FieldType::Double),
        ] {
            metadata.fields.insert(
                id,
                Field {
                    id,
                    name: name.to_string(),
                    table_id: 10,
                    searchable: true,
                    field_type,
                },
            );
        }
        metadata.tables.insert(
            10,
            Table {
                id: 10,
                name: "run".to_string(),
                template_id: 100,
            },
        );
        metadata.templates.insert(
            100,
            TemplateName {
                id: 100,
                name: "exp".to_string(),
            },
        );
        for (tuple_id, entity_id) in [(7, 70), (8, 70), (9, 90)] {
            metadata.bindings.insert(
                tuple_id,
                TupleBinding {
                    tuple_id,
                    entity_id,
                    parent_id: 5,
                    name: format!("file-{entity_id}"),
                },
            );
        }

        metadata
    }

    fn row(tuple_id: i64, field_id: i64, value: &str) -> AttributeRow {
        AttributeRow {
            tuple_id,
            field_id,
            value: value.to_string(),
        }
    }

    #[test]
    fn rows_of_one_entity_make_one_document() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let compiled = compiler.compile_attributes(
            &[row(7, 1, "42"), row(8, 2, "true")],
            &metadata(),
        );

        assert_eq!(compiled.operations.len(), 1);
        assert_eq!(compiled.skipped, 0);

        insta::assert_snapshot!(compiled.operations[0].to_ndjson().unwrap(), @r#"
        {"update":{"_index":"projects","_type":"inode","_id":70}}
        {"doc":{"xattr":[{"name":"exp.run.count","intValue":42},{"name":"exp.run.flag","boolValue":true}]},"doc_as_upsert":true}
        "#);
    }

    #[test]
    fn malformed_number_drops_only_that_attribute() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let compiled = compiler.compile_attributes(
            &[row(7, 1, "forty"), row(8, 3, "0.25")],
            &metadata(),
        );

        assert_eq!(compiled.skipped, 1);
        assert_eq!(compiled.operations.len(), 1);
        assert_eq!(
            compiled.operations[0].attributes,
            vec![Attribute::new("exp.run.ratio", AttributeValue::Double(0.25))]
        );
    }

    #[test]
    fn entities_without_resolved_attributes_emit_nothing() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let compiled = compiler.compile_attributes(
            &[row(9, 404, "x"), row(99, 1, "1"), row(7, 1, "5")],
            &metadata(),
        );

        assert_eq!(compiled.skipped, 2);
        let ids: Vec<_> = compiled.operations.iter().map(|o| o.entity_id()).collect();
        assert_eq!(ids, vec![70]);
    }

    #[test]
    fn later_write_of_a_field_replaces_earlier_one() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let compiled = compiler.compile_attributes(
            &[row(7, 1, "41"), row(8, 2, "true"), row(7, 1, "42")],
            &metadata(),
        );

        assert_eq!(compiled.skipped, 0);
        insta::assert_snapshot!(compiled.operations[0].to_ndjson().unwrap(), @r#"
        {"update":{"_index":"projects","_type":"inode","_id":70}}
        {"doc":{"xattr":[{"name":"exp.run.flag","boolValue":true},{"name":"exp.run.count","intValue":42}]},"doc_as_upsert":true}
        "#);
    }

    #[test]
    fn later_schemaless_write_replaces_earlier_one() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let row = |value: &str| SchemalessRow {
            entity_id: 3,
            parent_id: 1,
            name: "owner".to_string(),
            value: value.to_string(),
        };

        let compiled = compiler.compile_schemaless(&[row("alice"), row("bob")]);

        assert_eq!(
            compiled.operations[0].attributes,
            vec![Attribute::new("owner", AttributeValue::Text("bob".to_string()))]
        );
    }

    #[test]
    fn linked_mode_sets_parent() {
        let compiler = DocumentCompiler::new(&search_config(true));
        let compiled = compiler.compile_attributes(&[row(9, 2, "0")], &metadata());

        assert_eq!(compiled.operations[0].target.parent, Some(5));
        assert_eq!(
            compiled.operations[0].attributes,
            vec![Attribute::new("exp.run.flag", AttributeValue::Bool(false))]
        );
    }

    #[test]
    fn schemaless_rows_compile_to_text() {
        let compiler = DocumentCompiler::new(&search_config(false));
        let compiled = compiler.compile_schemaless(&[
            SchemalessRow {
                entity_id: 3,
                parent_id: 1,
                name: "owner".to_string(),
                value: "alice".to_string(),
            },
            SchemalessRow {
                entity_id: 2,
                parent_id: 1,
                name: "size".to_string(),
                value: "12".to_string(),
            },
        ]);

        let ids: Vec<_> = compiled.operations.iter().map(|o| o.entity_id()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(
            compiled.operations[1].attributes,
            vec![Attribute::new("owner", AttributeValue::Text("alice".to_string()))]
        );
    }
}
