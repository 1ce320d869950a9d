use crate::store::memory::MemoryMetadataStore;
use crate::types::{
    AttributeRow, EntityId, Field, FieldId, FieldType, SchemalessRow, Table, TableId, TemplateId,
    TemplateName, TupleBinding, TupleId,
};

/// Template every fixture field belongs to.
pub const TEMPLATE_ID: TemplateId = 100;
pub const TEMPLATE_NAME: &str = "experiment";

/// Table every fixture field belongs to.
pub const TABLE_ID: TableId = 10;
pub const TABLE_NAME: &str = "run";

/// Searchable `Int` field.
pub const COUNT_FIELD_ID: FieldId = 1;
/// Searchable `Bool` field.
pub const FLAG_FIELD_ID: FieldId = 2;
/// Searchable `Double` field.
pub const RATIO_FIELD_ID: FieldId = 3;
/// Searchable `Text` field.
pub const LABEL_FIELD_ID: FieldId = 4;
/// Field that is not searchable.
pub const HIDDEN_FIELD_ID: FieldId = 5;
/// Field id with no row in the store.
pub const MISSING_FIELD_ID: FieldId = 404;

/// Parent entity of every fixture binding.
pub const PARENT_ID: EntityId = 1;

/// Returns the fully qualified name of a fixture field.
pub fn qualified_name(field: &str) -> String {
    format!("{TEMPLATE_NAME}.{TABLE_NAME}.{field}")
}

pub fn field(id: FieldId, name: &str, field_type: FieldType, searchable: bool) -> Field {
    Field {
        id,
        name: name.to_string(),
        table_id: TABLE_ID,
        searchable,
        field_type,
    }
}

/// Stores the fixture template, table and fields.
pub async fn insert_schema(store: &MemoryMetadataStore) {
    store
        .insert_template(TemplateName {
            id: TEMPLATE_ID,
            name: TEMPLATE_NAME.to_string(),
        })
        .await;
    store
        .insert_table(Table {
            id: TABLE_ID,
            name: TABLE_NAME.to_string(),
            template_id: TEMPLATE_ID,
        })
        .await;

    for field in [
        field(COUNT_FIELD_ID, "count", FieldType::Int, true),
        field(FLAG_FIELD_ID, "flag", FieldType::Bool, true),
        field(RATIO_FIELD_ID, "ratio", FieldType::Double, true),
        field(LABEL_FIELD_ID, "label", FieldType::Text, true),
        field(HIDDEN_FIELD_ID, "hidden", FieldType::Int, false),
    ] {
        store.insert_field(field).await;
    }
}

/// Binds `tuple_id` to `entity_id`, a child of [`PARENT_ID`].
pub async fn bind_tuple(store: &MemoryMetadataStore, tuple_id: TupleId, entity_id: EntityId) {
    store
        .insert_binding(TupleBinding {
            tuple_id,
            entity_id,
            parent_id: PARENT_ID,
            name: format!("file-{entity_id}"),
        })
        .await;
}

pub fn attribute_row(tuple_id: TupleId, field_id: FieldId, value: &str) -> AttributeRow {
    AttributeRow {
        tuple_id,
        field_id,
        value: value.to_string(),
    }
}

pub fn schemaless_row(entity_id: EntityId, name: &str, value: &str) -> SchemalessRow {
    SchemalessRow {
        entity_id,
        parent_id: PARENT_ID,
        name: name.to_string(),
        value: value.to_string(),
    }
}
