use serde::Serialize;

use crate::error::IndexerResult;
use crate::types::EntityId;

/// Typed value of a compiled attribute.
///
/// Serialized as a single `<type>Value` slot next to the attribute name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue {
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "intValue")]
    Int(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "textValue")]
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    #[serde(flatten)]
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Addressing of the document targeted by an update action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateTarget {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: EntityId,
    #[serde(rename = "_parent", skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ActionHeader<'a> {
    update: &'a UpdateTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct PartialDocument<'a> {
    xattr: &'a [Attribute],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct UpsertBody<'a> {
    doc: PartialDocument<'a>,
    doc_as_upsert: bool,
}

/// A partial-document upsert of one entity: an action header followed by the document.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub target: UpdateTarget,
    pub attributes: Vec<Attribute>,
}

impl BulkOperation {
    pub fn upsert(target: UpdateTarget, attributes: Vec<Attribute>) -> Self {
        Self { target, attributes }
    }

    pub fn entity_id(&self) -> EntityId {
        self.target.id
    }

    /// Appends the two NDJSON lines of this operation to `out`.
    pub fn write_ndjson(&self, out: &mut String) -> IndexerResult<()> {
        let header = serde_json::to_string(&ActionHeader {
            update: &self.target,
        })?;
        let body = serde_json::to_string(&UpsertBody {
            doc: PartialDocument {
                xattr: &self.attributes,
            },
            doc_as_upsert: true,
        })?;

        out.push_str(&header);
        out.push('\n');
        out.push_str(&body);
        out.push('\n');

        Ok(())
    }

    pub fn to_ndjson(&self) -> IndexerResult<String> {
        let mut out = String::new();
        self.write_ndjson(&mut out)?;

        Ok(out)
    }
}
