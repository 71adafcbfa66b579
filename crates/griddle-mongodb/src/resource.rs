//! Resource descriptors
//!
//! A resource is a named collection with a field schema and indexes. Which
//! audit fields apply is decided once, when the descriptor is built.

use bson::Document as BsonDocument;
use griddle_common::{GriddleError, Result};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use std::collections::BTreeMap;

use crate::validation::{ValidatedCollectionName, ValidatedFieldName};

/// Workflow status field
pub const STATUS_FIELD: &str = "status";
pub const CREATE_DATE_FIELD: &str = "createDate";
pub const MODIFY_DATE_FIELD: &str = "modifyDate";

/// Declared type of a resource field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Mixed,
    Array(Box<FieldType>),
    Object,
}

/// Index declared on a resource
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: BsonDocument,
    pub name: Option<String>,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexSpec {
    pub fn new(keys: BsonDocument) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
            sparse: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub(crate) fn to_index_model(&self) -> IndexModel {
        let mut options = IndexOptions::default();
        options.name = self.name.clone();
        if self.unique {
            options.unique = Some(true);
        }
        if self.sparse {
            options.sparse = Some(true);
        }

        IndexModel::builder()
            .keys(self.keys.clone())
            .options(options)
            .build()
    }
}

/// Validated resource definition with precomputed capabilities
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    name: ValidatedCollectionName,
    fields: BTreeMap<String, FieldType>,
    indexes: Vec<IndexSpec>,
    has_status: bool,
    audits_create: bool,
    audits_modify: bool,
}

impl ResourceDescriptor {
    /// Validate the resource and compute its audit capabilities.
    ///
    /// # Errors
    /// `Validation` for a bad collection or field name, or an index
    /// without keys.
    pub fn new(
        name: &str,
        fields: impl IntoIterator<Item = (String, FieldType)>,
        indexes: Vec<IndexSpec>,
    ) -> Result<Self> {
        let name = ValidatedCollectionName::new(name)?;

        let mut validated = BTreeMap::new();
        for (field, kind) in fields {
            ValidatedFieldName::new(&field, false)?;
            validated.insert(field, kind);
        }

        for index in &indexes {
            if index.keys.is_empty() {
                return Err(GriddleError::Validation(format!(
                    "Index on '{}' has no keys",
                    name
                )));
            }
            for key in index.keys.keys() {
                ValidatedFieldName::new(key, false)?;
            }
        }

        let has_status = validated.contains_key(STATUS_FIELD);
        let audits_create = has_status && validated.contains_key(CREATE_DATE_FIELD);
        let audits_modify = has_status && validated.contains_key(MODIFY_DATE_FIELD);

        Ok(Self {
            name,
            fields: validated,
            indexes,
            has_status,
            audits_create,
            audits_modify,
        })
    }

    /// Resource without declared fields or indexes
    pub fn bare(name: &str) -> Result<Self> {
        Self::new(name, Vec::new(), Vec::new())
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    pub fn field_type(&self, field: &str) -> Option<&FieldType> {
        self.fields.get(field)
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Reads default to active statuses
    pub fn has_status(&self) -> bool {
        self.has_status
    }

    /// Creates get `createUserId`/`createUsername` stamped
    pub fn audits_create(&self) -> bool {
        self.audits_create
    }

    /// Writes get `modifyDate`/`modifyUserId`/`modifyUsername` stamped
    pub fn audits_modify(&self) -> bool {
        self.audits_modify
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn fields(names: &[(&str, FieldType)]) -> Vec<(String, FieldType)> {
        names.iter().map(|(n, t)| (n.to_string(), t.clone())).collect()
    }

    #[test]
    fn test_capabilities_computed_at_registration() {
        let full = ResourceDescriptor::new(
            "posts",
            fields(&[
                ("status", FieldType::String),
                ("createDate", FieldType::Date),
                ("modifyDate", FieldType::Date),
            ]),
            vec![],
        )
        .unwrap();
        assert!(full.has_status());
        assert!(full.audits_create());
        assert!(full.audits_modify());

        let create_only = ResourceDescriptor::new(
            "drafts",
            fields(&[("status", FieldType::String), ("createDate", FieldType::Date)]),
            vec![],
        )
        .unwrap();
        assert!(create_only.audits_create());
        assert!(!create_only.audits_modify());

        let no_status = ResourceDescriptor::new(
            "logs",
            fields(&[("createDate", FieldType::Date), ("modifyDate", FieldType::Date)]),
            vec![],
        )
        .unwrap();
        assert!(!no_status.has_status());
        assert!(!no_status.audits_create());
        assert!(!no_status.audits_modify());
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(ResourceDescriptor::bare("system.profile").is_err());
        assert!(ResourceDescriptor::new("posts", fields(&[("$bad", FieldType::Mixed)]), vec![]).is_err());
        assert!(ResourceDescriptor::new("posts", vec![], vec![IndexSpec::new(doc! {})]).is_err());
    }

    #[test]
    fn test_index_model_options() {
        let spec = IndexSpec::new(doc! { "name": 1 }).named("name_1").unique();
        let model = spec.to_index_model();

        assert_eq!(model.keys, doc! { "name": 1 });
        let options = model.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("name_1"));
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.sparse, None);
    }
}
