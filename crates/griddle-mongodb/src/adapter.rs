//! Generic CRUD adapter over one registered resource
//!
//! Every operation takes a [`CrudRequest`]. Reads default to active
//! statuses, writes are audited according to the resource's capabilities,
//! and removal is a soft delete unless [`MongoAdapter::remove_permanently`]
//! is used. Non-identifier reads are counted in the query-shape cache when
//! one is attached.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document as BsonDocument};
use griddle_common::{GriddleError, Result};
use mongodb::options::{
    FindOneAndDeleteOptions, FindOneAndUpdateOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Collection, Database};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::{
    set_created_by, set_modified_by, MODIFY_USERNAME_FIELD, MODIFY_USER_ID_FIELD,
    SYSADMIN_DATE_FIELD,
};
use crate::query::FindQuery;
use crate::registry::Model;
use crate::request::{CrudRequest, HydrateRequest};
use crate::resource::{ResourceDescriptor, MODIFY_DATE_FIELD, STATUS_FIELD};
use crate::shape::{FrequencyCache, RecordOutcome};
use crate::validation::{is_object_id_hex, validate_query};

/// Statuses returned by default reads
pub const ACTIVE_STATUSES: [&str; 2] = ["created", "approved"];
pub const DELETED_STATUS: &str = "deleted";
/// Document version field, incremented on every update
pub const VERSION_FIELD: &str = "__v";

/// Ids shorter than this are legacy numeric ids
const LEGACY_ID_MAX_LEN: usize = 20;

/// Result of [`MongoAdapter::find`]
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    One(Option<BsonDocument>),
    Many(Vec<BsonDocument>),
}

impl FindResult {
    pub fn into_one(self) -> Option<BsonDocument> {
        match self {
            FindResult::One(doc) => doc,
            FindResult::Many(docs) => docs.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<BsonDocument> {
        match self {
            FindResult::One(doc) => doc.into_iter().collect(),
            FindResult::Many(docs) => docs,
        }
    }
}

/// Result of an update or soft delete
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The document after the change, if one matched
    One(Option<BsonDocument>),
    Many { matched: u64, modified: u64 },
}

/// Result of a permanent delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The removed document, if one matched
    One(Option<BsonDocument>),
    Many(u64),
}

/// CRUD operations for one resource
pub struct MongoAdapter {
    model: Arc<Model>,
    database: Database,
    shapes: Option<Arc<FrequencyCache>>,
    debug: bool,
}

impl MongoAdapter {
    pub fn new(model: Arc<Model>, database: Database) -> Self {
        Self {
            model,
            database,
            shapes: None,
            debug: false,
        }
    }

    /// Count the shape of every non-identifier read in `cache`
    pub fn with_shapes(mut self, cache: Arc<FrequencyCache>) -> Self {
        self.shapes = Some(cache);
        self
    }

    /// Log every driver call at info level
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        self.model.descriptor()
    }

    fn collection(&self) -> &Collection<BsonDocument> {
        self.model.collection()
    }

    fn log_call(&self, operation: &str, filter: &BsonDocument) {
        if self.debug {
            tracing::info!(collection = %self.name(), operation, filter = %filter, "mongo call");
        }
    }

    fn record_shape(&self, filter: &BsonDocument, sort: Option<&BsonDocument>) {
        let Some(cache) = &self.shapes else {
            return;
        };
        match cache.record(self.name(), Some(filter), sort) {
            Ok(RecordOutcome::Recorded {
                ordered_key,
                count,
                flush_due,
            }) => {
                tracing::trace!(key = %ordered_key, count, flush_due, "Recorded query shape");
            }
            Ok(RecordOutcome::SkippedIdentifierLookup) => {}
            Err(e) => {
                tracing::warn!(resource = %self.name(), error = %e, "Failed to record query shape");
            }
        }
    }

    /// Number of documents matching the request filter
    pub async fn count(&self, req: &CrudRequest) -> Result<u64> {
        let filter = req.filter.clone().unwrap_or_default();
        self.count_filter(filter).await
    }

    async fn count_filter(&self, filter: BsonDocument) -> Result<u64> {
        self.log_call("count", &filter);
        Ok(self.collection().count_documents(filter).await?)
    }

    /// Insert `req.data` as a new document and return it with its `_id`
    pub async fn create(&self, mut req: CrudRequest) -> Result<BsonDocument> {
        set_created_by(self.descriptor(), &mut req)?;
        set_modified_by(self.descriptor(), &mut req)?;

        let mut document = req.data.take().unwrap_or_default();
        document.insert(VERSION_FIELD, 0);

        self.log_call("insert_one", &document);
        let result = self.collection().insert_one(&document).await?;
        if !document.contains_key("_id") {
            document.insert("_id", result.inserted_id);
        }

        tracing::debug!(resource = %self.name(), "Created document");
        Ok(document)
    }

    /// Look up one document by `_id`, or by `legacyId` for short ids.
    ///
    /// A short id with no leading number matches nothing.
    pub async fn find_by_id(&self, id: &Bson) -> Result<Option<BsonDocument>> {
        let Some(filter) = id_lookup_filter(id) else {
            tracing::debug!(
                resource = %self.name(),
                id = %id_key(id),
                "Id is not a legacy number"
            );
            return Ok(None);
        };
        let result = self
            .find(CrudRequest::new().with_filter(filter).one())
            .await?;
        Ok(result.into_one())
    }

    /// Query the resource
    pub async fn find(&self, mut req: CrudRequest) -> Result<FindResult> {
        check_starts_with_param(&mut req);

        let mut filter = req.filter.take().unwrap_or_default();
        apply_default_status(self.descriptor(), &req, &mut filter);
        validate_query(&Bson::Document(filter.clone()))?;

        self.record_shape(&filter, req.sort.as_ref());

        let skip = req.skip.unwrap_or(0);
        let mut query = FindQuery::new(self.name())
            .filter(filter.clone())
            .projection(req.projection())
            .skip(skip);
        if let Some(sort) = req.sort.take() {
            query = query.sort(sort);
        }
        if let Some(limit) = req.limit {
            query = query.limit(limit);
        }

        self.log_call(if req.find_one { "find_one" } else { "find" }, &filter);

        if req.find_one {
            return Ok(FindResult::One(query.single().first(&self.database).await?));
        }

        if !req.include_count {
            return Ok(FindResult::Many(query.to_list(&self.database).await?));
        }

        let (mut docs, count) = tokio::try_join!(
            query.to_list(&self.database),
            self.count_filter(filter)
        )?;
        stamp_positions(&mut docs, skip, count as i64);
        Ok(FindResult::Many(docs))
    }

    /// Apply `req.data` to the matching document, or to all of them with `multi`
    pub async fn update(&self, mut req: CrudRequest) -> Result<UpdateOutcome> {
        if !req.noaudit {
            set_modified_by(self.descriptor(), &mut req)?;
        }

        let filter = match &req.id {
            Some(id) => doc! { "_id": id_value(id) },
            None => req.filter.clone().unwrap_or_default(),
        };
        let update = build_update_document(req.data.take().unwrap_or_default());

        self.log_call(if req.multi { "update_many" } else { "find_one_and_update" }, &filter);

        if req.multi {
            let mut options = UpdateOptions::default();
            if req.upsert {
                options.upsert = Some(true);
            }
            let result = self
                .collection()
                .update_many(filter, update)
                .with_options(options)
                .await?;
            return Ok(UpdateOutcome::Many {
                matched: result.matched_count,
                modified: result.modified_count,
            });
        }

        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(ReturnDocument::After);
        options.upsert = Some(req.upsert);
        options.sort = req.sort.take();
        options.projection = req.projection();

        let document = self
            .collection()
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;
        Ok(UpdateOutcome::One(document))
    }

    /// Mark matching documents as deleted
    pub async fn remove(&self, mut req: CrudRequest) -> Result<UpdateOutcome> {
        set_modified_by(self.descriptor(), &mut req)?;

        let filter = removal_filter(&req)?;
        let update = soft_delete_update(req.data.as_ref());

        self.log_call(if req.multi { "update_many" } else { "find_one_and_update" }, &filter);

        if req.multi {
            let result = self.collection().update_many(filter, update).await?;
            tracing::debug!(
                resource = %self.name(),
                modified = result.modified_count,
                "Soft deleted documents"
            );
            return Ok(UpdateOutcome::Many {
                matched: result.matched_count,
                modified: result.modified_count,
            });
        }

        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(ReturnDocument::After);
        options.projection = req.projection();

        let document = self
            .collection()
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;
        Ok(UpdateOutcome::One(document))
    }

    /// Delete matching documents for good
    pub async fn remove_permanently(&self, req: CrudRequest) -> Result<DeleteOutcome> {
        let filter = removal_filter(&req)?;

        self.log_call(if req.multi { "delete_many" } else { "find_one_and_delete" }, &filter);

        if req.multi {
            let result = self.collection().delete_many(filter).await?;
            tracing::info!(
                resource = %self.name(),
                deleted = result.deleted_count,
                "Permanently deleted documents"
            );
            return Ok(DeleteOutcome::Many(result.deleted_count));
        }

        let mut options = FindOneAndDeleteOptions::default();
        options.projection = req.projection();
        let document = self
            .collection()
            .find_one_and_delete(filter)
            .with_options(options)
            .await?;
        Ok(DeleteOutcome::One(document))
    }

    /// Insert documents as-is, without auditing
    pub async fn bulk_insert(&self, documents: Vec<BsonDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        if self.debug {
            tracing::info!(collection = %self.name(), count = documents.len(), "mongo call insert_many");
        }
        let result = self.collection().insert_many(documents).await?;
        Ok(result.inserted_ids.len())
    }

    /// Re-read search hits, keeping the order of `req.ids`
    pub async fn hydrate(&self, req: HydrateRequest) -> Result<Vec<BsonDocument>> {
        if req.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Bson> = req.ids.iter().map(id_value).collect();
        let mut find = CrudRequest::new().with_filter(doc! { "_id": { "$in": ids.clone() } });
        find.select = req.select;

        let documents = self.find(find).await?.into_many();
        Ok(order_by_ids(&ids, documents, req.count, req.skip))
    }
}

/// Turn `starts_with` into a case-insensitive first-letter `name` filter.
///
/// The parameter is consumed either way; it is ignored when `name` is set.
pub fn check_starts_with_param(req: &mut CrudRequest) {
    let Some(starts_with) = req.starts_with.take() else {
        return;
    };
    if req.name.is_some() {
        return;
    }

    let pattern = match starts_with.chars().next() {
        Some(first) if first.is_ascii_alphabetic() && starts_with != "Other" => format!(
            "^({}|{})",
            first.to_ascii_uppercase(),
            first.to_ascii_lowercase()
        ),
        _ => "^[^A-Za-z]".to_string(),
    };

    req.filter
        .get_or_insert_with(Default::default)
        .insert("name", doc! { "$regex": pattern });
}

/// A fresh `ObjectId`, or the parsed form of `value`
pub fn new_object_id(value: Option<&str>) -> Result<ObjectId> {
    match value {
        Some(hex) => Ok(ObjectId::parse_str(hex)?),
        None => Ok(ObjectId::new()),
    }
}

/// Hex strings become ObjectIds; anything else is used as given
fn id_value(id: &Bson) -> Bson {
    if let Bson::String(s) = id {
        if is_object_id_hex(s) {
            if let Ok(oid) = ObjectId::parse_str(s) {
                return Bson::ObjectId(oid);
            }
        }
    }
    id.clone()
}

fn id_key(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn id_lookup_filter(id: &Bson) -> Option<BsonDocument> {
    let text = id_key(id);
    if text.len() >= LEGACY_ID_MAX_LEN {
        return Some(doc! { "_id": id_value(id) });
    }

    let legacy = leading_integer(&text)?;
    Some(doc! { "legacyId": legacy })
}

/// Integer prefix of `text`: leading whitespace, an optional sign, then
/// digits up to the first non-digit. `None` without digits or on overflow.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }

    let value: i64 = rest[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

fn apply_default_status(
    resource: &ResourceDescriptor,
    req: &CrudRequest,
    filter: &mut BsonDocument,
) {
    if req.find_one || req.all_statuses || !resource.has_status() {
        return;
    }
    if filter.contains_key(STATUS_FIELD) {
        return;
    }
    filter.insert(STATUS_FIELD, doc! { "$in": ACTIVE_STATUSES.to_vec() });
}

fn stamp_positions(documents: &mut [BsonDocument], skip: u64, count: i64) {
    let base = i64::try_from(skip).unwrap_or(i64::MAX);
    for (position, document) in documents.iter_mut().enumerate() {
        let offset = i64::try_from(position).unwrap_or(i64::MAX);
        document.insert("idx", base.saturating_add(offset));
        document.insert("count", count);
    }
}

/// Plain fields go under `$set`, operators pass through, and the version
/// is always incremented.
fn build_update_document(data: BsonDocument) -> BsonDocument {
    let mut update = BsonDocument::new();
    let mut set = BsonDocument::new();

    for (key, value) in data {
        if key == VERSION_FIELD {
            continue;
        }
        if key.starts_with('$') {
            update.insert(key, value);
        } else {
            set.insert(key, value);
        }
    }

    if !set.is_empty() {
        match update.get_document_mut("$set") {
            Ok(existing) => existing.extend(set),
            Err(_) => {
                update.insert("$set", set);
            }
        }
    }

    match update.get_document_mut("$inc") {
        Ok(inc) => {
            inc.insert(VERSION_FIELD, 1);
        }
        Err(_) => {
            update.insert("$inc", doc! { VERSION_FIELD: 1 });
        }
    }

    update
}

fn removal_filter(req: &CrudRequest) -> Result<BsonDocument> {
    if let Some(filter) = &req.filter {
        return Ok(filter.clone());
    }

    let id = req
        .id
        .clone()
        .or_else(|| req.data.as_ref().and_then(|data| data.get("_id").cloned()));
    match id {
        Some(id) => Ok(doc! { "_id": id_value(&id) }),
        None => Err(GriddleError::Query(
            "No conditions passed into remove".to_string(),
        )),
    }
}

/// `status: deleted` plus whatever modification audit fields were stamped
fn soft_delete_update(data: Option<&BsonDocument>) -> BsonDocument {
    let mut set = doc! { STATUS_FIELD: DELETED_STATUS };
    if let Some(data) = data {
        for key in [
            MODIFY_DATE_FIELD,
            MODIFY_USER_ID_FIELD,
            MODIFY_USERNAME_FIELD,
            SYSADMIN_DATE_FIELD,
        ] {
            if let Some(value) = data.get(key) {
                set.insert(key, value.clone());
            }
        }
    }
    doc! { "$set": set }
}

fn order_by_ids(
    ids: &[Bson],
    documents: Vec<BsonDocument>,
    count: i64,
    skip: u64,
) -> Vec<BsonDocument> {
    let lookup: HashMap<String, BsonDocument> = documents
        .into_iter()
        .filter_map(|document| {
            let key = document.get("_id").map(id_key)?;
            Some((key, document))
        })
        .collect();

    let mut ordered: Vec<BsonDocument> = ids
        .iter()
        .filter_map(|id| lookup.get(&id_key(id)).cloned())
        .collect();
    stamp_positions(&mut ordered, skip, count);
    ordered
}
