//! Persisted query-shape counter

use serde::{Deserialize, Serialize};

use super::canonical::{CanonicalShape, SortField};

/// Collection holding the persisted query-shape counters
pub const SHAPE_COLLECTION: &str = "queryShapeCounters";

/// Counter for one distinct query shape.
///
/// In memory the count is the delta since the last flush; in the store it is
/// the running total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryShapeRecord {
    /// Unique, caller-order key
    pub ordered_key: String,
    /// Alphabetical key shared by all field orderings of the shape
    pub sorted_key: String,
    /// Resource name
    pub name: String,
    /// Filter field names in caller order
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub sort_fields: Vec<SortField>,
    pub occurrence_count: i64,
}

impl QueryShapeRecord {
    /// A fresh accumulator with a zero count
    pub fn from_canonical(canonical: CanonicalShape) -> Self {
        let CanonicalShape {
            shape,
            ordered_key,
            sorted_key,
        } = canonical;

        Self {
            ordered_key,
            sorted_key,
            name: shape.name,
            fields: shape.fields,
            sort_fields: shape.sort_fields,
            occurrence_count: 0,
        }
    }

    /// Same record carrying a different count
    pub fn with_count(mut self, count: i64) -> Self {
        self.occurrence_count = count;
        self
    }
}
