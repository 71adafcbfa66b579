//! Generic resource requests and the callers issuing them

use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};

/// Name carried by the built-in system administrator
pub const SYSTEM_ADMIN_NAME: &str = "systemAdmin";

/// Identity performing a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Caller {
    pub id: Option<Bson>,
    pub name: Option<String>,
    /// Caller type, e.g. `user`
    pub kind: Option<String>,
    pub role: Option<String>,
    /// Company the caller represents, when acting as a company rep
    pub company_id: Option<Bson>,
    /// Caller this request is made on behalf of
    pub on_behalf_of: Option<Box<Caller>>,
}

impl Caller {
    pub fn new(id: impl Into<Bson>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            kind: Some("user".to_string()),
            ..Default::default()
        }
    }

    /// The system administrator used for internal writes
    pub fn system_admin() -> Self {
        Self {
            id: Some(Bson::ObjectId(ObjectId::from_bytes([0; 12]))),
            name: Some(SYSTEM_ADMIN_NAME.to_string()),
            kind: Some("user".to_string()),
            role: Some("admin".to_string()),
            ..Default::default()
        }
    }

    pub fn is_system_admin(&self) -> bool {
        self.name.as_deref() == Some(SYSTEM_ADMIN_NAME)
    }

    pub fn on_behalf_of(mut self, other: Caller) -> Self {
        self.on_behalf_of = Some(Box::new(other));
        self
    }

    pub fn with_company(mut self, company_id: impl Into<Bson>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }
}

/// One CRUD request against a resource
#[derive(Debug, Clone, Default)]
pub struct CrudRequest {
    /// Document identifier; takes precedence over `filter` on update
    pub id: Option<Bson>,
    pub filter: Option<BsonDocument>,
    /// Fields to return
    pub select: Option<Vec<String>>,
    pub sort: Option<BsonDocument>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    /// Return a single document instead of a list
    pub find_one: bool,
    /// Do not restrict reads to active statuses
    pub all_statuses: bool,
    /// Stamp each result with its position and the total match count
    pub include_count: bool,
    pub data: Option<BsonDocument>,
    /// Apply an update or removal to every match
    pub multi: bool,
    pub upsert: bool,
    /// Skip audit stamping
    pub noaudit: bool,
    pub caller: Option<Caller>,
    /// Leading letter for name searches (`Other` for non-letters)
    pub starts_with: Option<String>,
    /// Exact name; disables `starts_with`
    pub name: Option<String>,
}

impl CrudRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<Bson>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_filter(mut self, filter: BsonDocument) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Space separated field list, e.g. `"name status"`
    pub fn with_select_str(self, fields: &str) -> Self {
        self.with_select(fields.split_whitespace())
    }

    pub fn with_sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_data(mut self, data: BsonDocument) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_starts_with(mut self, value: impl Into<String>) -> Self {
        self.starts_with = Some(value.into());
        self
    }

    pub fn one(mut self) -> Self {
        self.find_one = true;
        self
    }

    pub fn many(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn all_statuses(mut self) -> Self {
        self.all_statuses = true;
        self
    }

    pub fn include_count(mut self) -> Self {
        self.include_count = true;
        self
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn noaudit(mut self) -> Self {
        self.noaudit = true;
        self
    }

    /// Projection document built from `select`
    pub fn projection(&self) -> Option<BsonDocument> {
        let fields = self.select.as_ref()?;
        if fields.is_empty() {
            return None;
        }
        let mut projection = BsonDocument::new();
        for field in fields {
            projection.insert(field.clone(), 1);
        }
        Some(projection)
    }
}

/// Documents to re-read in search-engine order
#[derive(Debug, Clone, Default)]
pub struct HydrateRequest {
    /// Document ids in the order results should come back
    pub ids: Vec<Bson>,
    /// Total hit count reported by the search engine
    pub count: i64,
    pub skip: u64,
    pub select: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_system_admin() {
        let admin = Caller::system_admin();
        assert!(admin.is_system_admin());
        assert_eq!(admin.role.as_deref(), Some("admin"));
        assert_eq!(
            admin.id,
            Some(Bson::ObjectId(ObjectId::parse_str("000000000000000000000000").unwrap()))
        );
        assert!(!Caller::new(1, "jeff").is_system_admin());
    }

    #[test]
    fn test_projection_from_select() {
        let req = CrudRequest::new().with_select_str("name  status");
        assert_eq!(req.projection(), Some(doc! { "name": 1, "status": 1 }));

        assert_eq!(CrudRequest::new().projection(), None);
        assert_eq!(CrudRequest::new().with_select(Vec::<String>::new()).projection(), None);
    }

    #[test]
    fn test_builder_flags() {
        let req = CrudRequest::new()
            .with_filter(doc! { "status": "created" })
            .with_limit(10)
            .with_skip(20)
            .include_count()
            .one();

        assert!(req.find_one);
        assert!(req.include_count);
        assert_eq!(req.limit, Some(10));
        assert_eq!(req.skip, Some(20));
        assert!(!req.multi);
    }
}
