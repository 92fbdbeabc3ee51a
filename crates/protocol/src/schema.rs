//! Server-returned column type descriptors.
//!
//! Table reads return a `projectionSchema` in the response status: a mapping
//! from column name to a type descriptor. The descriptor drives the
//! type-keyed stage of deserialization (e.g. turning a `$binary` payload
//! into a vector, or map entry pairs into an object).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The projection schema: column name → type descriptor.
pub type ProjectionSchema = HashMap<String, ColumnDesc>;

/// A single column type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDesc {
    /// The column's type name.
    #[serde(rename = "type")]
    pub kind: ColumnKind,

    /// Key type for `map` columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<ColumnTypeRef>,

    /// Element type for `map`/`list`/`set`/`vector` columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ColumnTypeRef>,

    /// Dimension for `vector` columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
}

impl ColumnDesc {
    /// A descriptor with only a type name.
    pub fn of(kind: ColumnKind) -> Self {
        Self {
            kind,
            key_type: None,
            value_type: None,
            dimension: None,
        }
    }

    /// The kind of the map key type, if this is a map column.
    pub fn key_kind(&self) -> Option<ColumnKind> {
        self.key_type.as_ref().map(ColumnTypeRef::kind)
    }

    /// The kind of the element type, if declared.
    pub fn value_kind(&self) -> Option<ColumnKind> {
        self.value_type.as_ref().map(ColumnTypeRef::kind)
    }
}

/// A nested type reference: either a bare type name (`"text"`) or a full
/// descriptor object (`{ "type": "set", "valueType": "int" }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeRef {
    /// Bare type name.
    Name(ColumnKind),
    /// Full nested descriptor.
    Desc(Box<ColumnDesc>),
}

impl ColumnTypeRef {
    /// The referenced type's kind.
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnTypeRef::Name(kind) => *kind,
            ColumnTypeRef::Desc(desc) => desc.kind,
        }
    }
}

/// The closed set of column type names the Data API reports.
///
/// Unrecognized names deserialize to [`Unknown`](Self::Unknown) so newer
/// servers do not break older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Ascii,
    Varchar,
    Int,
    TinyInt,
    SmallInt,
    BigInt,
    Varint,
    Decimal,
    Float,
    Double,
    Boolean,
    Blob,
    Date,
    Time,
    Timestamp,
    Duration,
    Inet,
    Uuid,
    TimeUuid,
    Map,
    List,
    Set,
    Vector,
    Counter,
    #[serde(other)]
    Unknown,
}
