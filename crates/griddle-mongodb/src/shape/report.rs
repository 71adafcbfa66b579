//! Index hints derived from persisted query shapes

use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

use super::canonical::SortField;
use super::record::QueryShapeRecord;

/// Persisted shapes that share one sorted key
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeSummary {
    pub name: String,
    pub sorted_key: String,
    /// Filter fields, alphabetical
    pub fields: Vec<String>,
    pub sort_fields: Vec<SortField>,
    /// Sum of the counts of every ordering
    pub total_count: i64,
    /// Number of distinct field orderings seen
    pub variants: usize,
}

impl ShapeSummary {
    /// Index keys serving this shape: equality fields first, then sort
    /// fields in the order the caller sorted by. `$meta` sorts are not
    /// indexable and are left out.
    pub fn suggested_index(&self) -> BsonDocument {
        let mut keys = BsonDocument::new();
        for field in &self.fields {
            keys.insert(field.clone(), 1);
        }
        for sort in &self.sort_fields {
            let Some(direction) = sort.direction.as_i32() else {
                continue;
            };
            if !keys.contains_key(&sort.field) {
                keys.insert(sort.field.clone(), direction);
            }
        }
        keys
    }
}

/// Group records by sorted key, highest totals first.
///
/// Sort fields keep the caller's order, taken from the most frequent
/// variant of each group.
pub fn summarize(records: &[QueryShapeRecord]) -> Vec<ShapeSummary> {
    // sorted key -> (count of the variant supplying sort order, summary)
    let mut groups: HashMap<&str, (i64, ShapeSummary)> = HashMap::new();

    for record in records {
        let (leading, summary) = groups.entry(record.sorted_key.as_str()).or_insert_with(|| {
            let mut fields = record.fields.clone();
            fields.sort();

            (
                record.occurrence_count,
                ShapeSummary {
                    name: record.name.clone(),
                    sorted_key: record.sorted_key.clone(),
                    fields,
                    sort_fields: record.sort_fields.clone(),
                    total_count: 0,
                    variants: 0,
                },
            )
        });

        if record.occurrence_count > *leading {
            *leading = record.occurrence_count;
            summary.sort_fields = record.sort_fields.clone();
        }
        summary.total_count += record.occurrence_count;
        summary.variants += 1;
    }

    let mut summaries: Vec<ShapeSummary> =
        groups.into_values().map(|(_, summary)| summary).collect();
    summaries.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.sorted_key.cmp(&b.sorted_key))
    });
    summaries
}

/// Whether an existing index already starts with `wanted`'s keys
pub fn is_covered(wanted: &BsonDocument, existing: &[BsonDocument]) -> bool {
    if wanted.is_empty() {
        return true;
    }

    existing.iter().any(|index| {
        wanted.len() <= index.len()
            && wanted
                .iter()
                .zip(index.iter())
                .all(|((wk, wv), (ik, iv))| wk == ik && same_direction(wv, iv))
    })
}

fn same_direction(a: &Bson, b: &Bson) -> bool {
    match (direction_of(a), direction_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn direction_of(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(n.signum())),
        Bson::Int64(n) => Some(n.signum()),
        Bson::Double(f) if *f > 0.0 => Some(1),
        Bson::Double(f) if *f < 0.0 => Some(-1),
        _ => None,
    }
}
