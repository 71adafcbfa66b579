//! Query builder for MongoDB find operations

use bson::Document as BsonDocument;
use futures::TryStreamExt;
use griddle_common::Result;
use mongodb::options::{FindOneOptions, FindOptions};
use mongodb::{Collection, Database};

/// Query builder for MongoDB find operations
#[derive(Debug, Clone)]
pub struct FindQuery {
    collection_name: String,
    filter: BsonDocument,
    projection: Option<BsonDocument>,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
    single: bool,
}

impl FindQuery {
    /// Create a new query builder
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            filter: BsonDocument::new(),
            projection: None,
            sort: None,
            skip: None,
            limit: None,
            single: false,
        }
    }

    /// Set the filter document
    pub fn filter(mut self, filter: BsonDocument) -> Self {
        self.filter = filter;
        self
    }

    /// Set the fields to return
    pub fn projection(mut self, projection: Option<BsonDocument>) -> Self {
        self.projection = projection;
        self
    }

    /// Set the sort order
    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of documents to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return at most one document
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn get_filter(&self) -> &BsonDocument {
        &self.filter
    }

    pub fn get_sort(&self) -> Option<&BsonDocument> {
        self.sort.as_ref()
    }

    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Driver options for a multi-document find
    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::default();
        options.projection = self.projection.clone();
        options.sort = self.sort.clone();
        options.skip = self.skip;
        options.limit = self.limit;
        options
    }

    /// Driver options for a single-document find
    pub fn find_one_options(&self) -> FindOneOptions {
        let mut options = FindOneOptions::default();
        options.projection = self.projection.clone();
        options.sort = self.sort.clone();
        options.skip = self.skip;
        options
    }

    /// Execute the query and return all matching documents
    pub async fn to_list(self, db: &Database) -> Result<Vec<BsonDocument>> {
        if self.single {
            return Ok(self.first(db).await?.into_iter().collect());
        }

        let collection: Collection<BsonDocument> = db.collection(&self.collection_name);
        let options = self.find_options();
        let cursor = collection.find(self.filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Execute the query and return the first matching document
    pub async fn first(self, db: &Database) -> Result<Option<BsonDocument>> {
        let collection: Collection<BsonDocument> = db.collection(&self.collection_name);
        let options = self.find_one_options();
        Ok(collection.find_one(self.filter).with_options(options).await?)
    }
}
