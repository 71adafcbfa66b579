//! Query-shape canonicalization
//!
//! A query shape is the set of field names a filter references plus the sort
//! document, with every filter value stripped. Each shape gets two keys:
//!
//! - the *ordered* key keeps the caller's field order, so distinct usage
//!   patterns stay distinguishable;
//! - the *sorted* key orders field names alphabetically, so requests that
//!   differ only in field order collapse onto the same index need.

use bson::{doc, Bson, Document as BsonDocument};
use griddle_common::{GriddleError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Filter fields that address a single document directly.
pub const IDENTIFIER_FIELDS: &[&str] = &["_id", "id"];

/// Sort direction of one sort field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "StoredDirection")]
pub enum SortDirection {
    Ascending,
    Descending,
    /// `{ $meta: <kind> }` sort, e.g. `textScore`
    Meta(String),
}

impl SortDirection {
    /// Numeric form used in MongoDB sort and index documents, `None` for
    /// `$meta` sorts
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            SortDirection::Ascending => Some(1),
            SortDirection::Descending => Some(-1),
            SortDirection::Meta(_) => None,
        }
    }

    /// Value as it appears in a MongoDB sort document
    pub fn to_bson(&self) -> Bson {
        match self {
            SortDirection::Ascending => Bson::Int32(1),
            SortDirection::Descending => Bson::Int32(-1),
            SortDirection::Meta(kind) => Bson::Document(doc! { "$meta": kind.as_str() }),
        }
    }

    /// Parse a sort value as supplied by callers.
    ///
    /// Numbers use their sign; strings accept `asc`, `ascending`, `desc`
    /// and `descending` in any case. A `{ $meta: "<kind>" }` document is
    /// kept as is.
    pub fn from_bson(field: &str, value: &Bson) -> Result<Self> {
        let direction = match value {
            Bson::Int32(n) => Self::from_sign(i64::from(*n)),
            Bson::Int64(n) => Self::from_sign(*n),
            Bson::Double(f) if f.is_finite() => {
                if *f > 0.0 {
                    Some(SortDirection::Ascending)
                } else if *f < 0.0 {
                    Some(SortDirection::Descending)
                } else {
                    None
                }
            }
            Bson::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" | "1" => Some(SortDirection::Ascending),
                "desc" | "descending" | "-1" => Some(SortDirection::Descending),
                _ => None,
            },
            Bson::Document(meta) if meta.len() == 1 => meta
                .get_str("$meta")
                .ok()
                .filter(|kind| !kind.is_empty())
                .map(|kind| SortDirection::Meta(kind.to_string())),
            _ => None,
        };

        direction.ok_or_else(|| {
            GriddleError::Validation(format!(
                "Invalid sort direction for field '{}': {}",
                field, value
            ))
        })
    }

    fn from_sign(n: i64) -> Option<Self> {
        match n.signum() {
            1 => Some(SortDirection::Ascending),
            -1 => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Meta(kind) => write!(f, "$meta:{}", kind),
            SortDirection::Ascending => f.write_str("1"),
            SortDirection::Descending => f.write_str("-1"),
        }
    }
}

// Stored as 1 / -1, or as the bare `$meta` kind. Dollar-prefixed field
// names are not storable on every server version.
impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SortDirection::Ascending => serializer.serialize_i32(1),
            SortDirection::Descending => serializer.serialize_i32(-1),
            SortDirection::Meta(kind) => serializer.serialize_str(kind),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDirection {
    Number(i32),
    Meta(String),
}

impl TryFrom<StoredDirection> for SortDirection {
    type Error = String;

    fn try_from(value: StoredDirection) -> std::result::Result<Self, Self::Error> {
        match value {
            StoredDirection::Number(n) => SortDirection::from_sign(i64::from(n))
                .ok_or_else(|| format!("invalid sort direction: {}", n)),
            StoredDirection::Meta(kind) if !kind.is_empty() => Ok(SortDirection::Meta(kind)),
            StoredDirection::Meta(_) => Err("empty $meta sort kind".to_string()),
        }
    }
}

/// One field of a sort document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// Field names and sort fields of a query, values stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    /// Resource (collection) the query ran against
    pub name: String,
    /// Filter field names in the order the caller supplied them
    pub fields: Vec<String>,
    /// Sort fields in the order the caller supplied them
    pub sort_fields: Vec<SortField>,
}

impl QueryShape {
    /// Filter field names sorted alphabetically
    pub fn sorted_fields(&self) -> Vec<String> {
        let mut fields = self.fields.clone();
        fields.sort();
        fields
    }

    /// Sort fields ordered alphabetically by field name
    pub fn sorted_sort_fields(&self) -> Vec<SortField> {
        let mut sort_fields = self.sort_fields.clone();
        sort_fields.sort_by(|a, b| a.field.cmp(&b.field));
        sort_fields
    }
}

/// A shape together with both of its keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalShape {
    pub shape: QueryShape,
    pub ordered_key: String,
    pub sorted_key: String,
}

/// Serializes `(field, value)` pairs as a JSON object in slice order.
struct Projection<'a, V>(&'a [(&'a str, V)]);

impl<V: Serialize> Serialize for Projection<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in self.0 {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct ShapeKey<'a> {
    name: &'a str,
    #[serde(rename = "where")]
    filter: Projection<'a, i32>,
    sort: Projection<'a, Bson>,
}

fn key_string(name: &str, filter: &[(&str, i32)], sort: &[(&str, Bson)]) -> Result<String> {
    let key = ShapeKey {
        name,
        filter: Projection(filter),
        sort: Projection(sort),
    };
    Ok(serde_json::to_string(&key)?)
}

/// Whether the filter addresses a document by its identifier.
///
/// Identifier lookups are served by the `_id` index already, so they are
/// never recorded.
pub fn is_identifier_lookup(filter: Option<&BsonDocument>) -> bool {
    filter.is_some_and(|filter| {
        IDENTIFIER_FIELDS
            .iter()
            .any(|field| matches!(filter.get(*field), Some(value) if !matches!(value, Bson::Null)))
    })
}

/// Derive the shape and both keys for a query.
///
/// Absent filter or sort documents count as empty. Fails with
/// `Configuration` when `name` is empty and with `Validation` when a sort
/// value is neither a recognizable direction nor a `$meta` document.
pub fn canonicalize(
    name: &str,
    filter: Option<&BsonDocument>,
    sort: Option<&BsonDocument>,
) -> Result<CanonicalShape> {
    if name.is_empty() {
        return Err(GriddleError::Configuration(
            "A resource name is required to record a query shape".to_string(),
        ));
    }

    let fields: Vec<String> = filter
        .map(|filter| filter.keys().cloned().collect())
        .unwrap_or_default();

    let mut sort_fields = Vec::new();
    if let Some(sort) = sort {
        for (field, value) in sort {
            sort_fields.push(SortField {
                field: field.clone(),
                direction: SortDirection::from_bson(field, value)?,
            });
        }
    }

    let shape = QueryShape {
        name: name.to_string(),
        fields,
        sort_fields,
    };

    let ordered_where: Vec<(&str, i32)> = shape.fields.iter().map(|f| (f.as_str(), 1)).collect();
    let ordered_sort: Vec<(&str, Bson)> = shape
        .sort_fields
        .iter()
        .map(|s| (s.field.as_str(), s.direction.to_bson()))
        .collect();

    let mut sorted_where = ordered_where.clone();
    sorted_where.sort_by(|a, b| a.0.cmp(b.0));
    let mut sorted_sort = ordered_sort.clone();
    sorted_sort.sort_by(|a, b| a.0.cmp(b.0));

    let ordered_key = key_string(name, &ordered_where, &ordered_sort)?;
    let sorted_key = key_string(name, &sorted_where, &sorted_sort)?;

    Ok(CanonicalShape {
        shape,
        ordered_key,
        sorted_key,
    })
}
