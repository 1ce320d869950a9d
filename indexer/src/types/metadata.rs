use serde::{Deserialize, Serialize};
use std::fmt;

pub type FieldId = i64;
pub type TableId = i64;
pub type TemplateId = i64;
pub type TupleId = i64;
/// Identifier of the filesystem entry a document describes.
pub type EntityId = i64;

/// Declared type of a metadata field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Double,
    Text,
}

impl FieldType {
    /// Maps the numeric type code stored with a field definition.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(FieldType::Bool),
            1 => Some(FieldType::Int),
            2 => Some(FieldType::Double),
            3 => Some(FieldType::Text),
            _ => None,
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            FieldType::Bool => 0,
            FieldType::Int => 1,
            FieldType::Double => 2,
            FieldType::Text => 3,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Double => "double",
            FieldType::Text => "text",
        };

        f.write_str(name)
    }
}

/// Definition of a metadata field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub table_id: TableId,
    pub searchable: bool,
    pub field_type: FieldType,
}

/// A metadata table grouping fields under a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub template_id: TemplateId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateName {
    pub id: TemplateId,
    pub name: String,
}

/// Value of one field for one tuple, as stored in the tailed attribute table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRow {
    #[serde(rename = "tupleid")]
    pub tuple_id: TupleId,
    #[serde(rename = "fieldid")]
    pub field_id: FieldId,
    #[serde(rename = "data")]
    pub value: String,
}

/// Binding of a metadata tuple to the filesystem entry it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleBinding {
    pub tuple_id: TupleId,
    pub entity_id: EntityId,
    pub parent_id: EntityId,
    pub name: String,
}

/// Free-form attribute attached directly to a filesystem entry.
///
/// Needs no dependency resolution; the attribute name is stored with the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemalessRow {
    #[serde(rename = "inode_id")]
    pub entity_id: EntityId,
    #[serde(rename = "inode_pid")]
    pub parent_id: EntityId,
    pub name: String,
    #[serde(rename = "data")]
    pub value: String,
}

/// Row of the skewed values table referencing a shared string list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkewedValueRow {
    #[serde(rename = "sd_id")]
    pub descriptor_id: i64,
    pub string_list_id: i64,
    #[serde(rename = "integer_idx")]
    pub index: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_codes_match() {
        for field_type in [
            FieldType::Bool,
            FieldType::Int,
            FieldType::Double,
            FieldType::Text,
        ] {
            assert_eq!(FieldType::from_code(field_type.code()), Some(field_type));
        }

        assert_eq!(FieldType::from_code(9), None);
    }

    #[test]
    fn attribute_row_reads_changelog_image() {
        let row: AttributeRow =
            serde_json::from_value(serde_json::json!({"tupleid": 4, "fieldid": 2, "data": "42"}))
                .unwrap();

        assert_eq!(
            row,
            AttributeRow {
                tuple_id: 4,
                field_id: 2,
                value: "42".to_string(),
            }
        );
    }
}
