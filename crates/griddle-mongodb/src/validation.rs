//! Input validation for resource registration and queries
//!
//! Collection and field names are checked once, when a resource is
//! registered; filters are checked on every read for operators that execute
//! server-side JavaScript.

use bson::Bson;
use griddle_common::{GriddleError, Result};

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Operators that run JavaScript on the server
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Validated collection name
///
/// # Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(GriddleError::Validation(
                "Collection name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(GriddleError::Validation(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(GriddleError::Validation(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with("system.") {
            return Err(GriddleError::Validation(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(GriddleError::Validation(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        if name.contains("..") || name.contains("//") {
            tracing::warn!(collection = %name, "Collection name contains suspicious pattern");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validated document field name
///
/// # Guarantees
/// - Not empty
/// - Maximum 1024 characters
/// - No null bytes
/// - No $ prefix unless operators are allowed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFieldName {
    name: String,
}

impl ValidatedFieldName {
    /// # Arguments
    /// * `name` - The field name to validate
    /// * `allow_operators` - If true, allows a `$` prefix (`$set`, `$inc`, ...)
    pub fn new(name: &str, allow_operators: bool) -> Result<Self> {
        if name.is_empty() {
            return Err(GriddleError::Validation(
                "Field name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(GriddleError::Validation(format!(
                "Field name exceeds maximum length of {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }

        if name.contains('\0') {
            return Err(GriddleError::Validation(
                "Field name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with('$') && !allow_operators {
            return Err(GriddleError::Validation(format!(
                "Field name cannot start with '$' (reserved for operators): '{}'",
                name
            )));
        }

        Ok(ValidatedFieldName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Checks for the 24 hex character ObjectId format
pub fn is_object_id_hex(value: &str) -> bool {
    value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Rejects filters containing server-side JavaScript operators
///
/// # Errors
/// Returns ValidationError if a dangerous operator appears at any depth
pub fn validate_query(query: &Bson) -> Result<()> {
    match query {
        Bson::Document(doc) => {
            for (key, value) in doc.iter() {
                if DANGEROUS_OPERATORS.contains(&key.as_str()) {
                    return Err(GriddleError::Validation(format!(
                        "Dangerous operator '{}' is not allowed for security reasons",
                        key
                    )));
                }
                validate_query(value)?;
            }
            Ok(())
        }
        Bson::Array(arr) => {
            for item in arr {
                validate_query(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_valid_collection_names() {
        assert!(ValidatedCollectionName::new("posts").is_ok());
        assert!(ValidatedCollectionName::new("user_profiles").is_ok());
        assert!(ValidatedCollectionName::new("queryShapeCounters").is_ok());
    }

    #[test]
    fn test_empty_collection_name() {
        let result = ValidatedCollectionName::new("");
        assert!(matches!(result, Err(GriddleError::Validation(_))));
    }

    #[test]
    fn test_collection_name_too_long() {
        let long_name = "a".repeat(121);
        assert!(ValidatedCollectionName::new(&long_name).is_err());
    }

    #[test]
    fn test_system_collection_blocked() {
        assert!(ValidatedCollectionName::new("system.users").is_err());
    }

    #[test]
    fn test_collection_name_with_dollar_sign() {
        assert!(ValidatedCollectionName::new("posts$tmp").is_err());
    }

    #[test]
    fn test_field_names() {
        assert!(ValidatedFieldName::new("createDate", false).is_ok());
        assert!(ValidatedFieldName::new("address.city", false).is_ok());
        assert!(ValidatedFieldName::new("", false).is_err());
        assert!(ValidatedFieldName::new("bad\0name", false).is_err());
        assert!(ValidatedFieldName::new("$set", false).is_err());
        assert!(ValidatedFieldName::new("$set", true).is_ok());
    }

    #[test]
    fn test_object_id_hex() {
        assert!(is_object_id_hex("507f1f77bcf86cd799439011"));
        assert!(!is_object_id_hex("507f1f77bcf86cd79943901"));
        assert!(!is_object_id_hex("zzzf1f77bcf86cd799439011"));
    }

    #[test]
    fn test_validate_safe_query() {
        let query = doc! { "status": { "$in": ["created", "approved"] } };
        assert!(validate_query(&Bson::Document(query)).is_ok());
    }

    #[test]
    fn test_validate_query_with_where_operator() {
        let query = doc! { "$where": "this.a > 1" };
        assert!(validate_query(&Bson::Document(query)).is_err());
    }

    #[test]
    fn test_validate_nested_query() {
        let query = doc! {
            "$or": [
                { "status": "created" },
                { "$function": { "body": "x", "args": [], "lang": "js" } }
            ]
        };
        assert!(validate_query(&Bson::Document(query)).is_err());
    }
}
