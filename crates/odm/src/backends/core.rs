//! Core Document Store Traits
//!
//! These traits describe the operations the ODM needs from a document
//! database driver. Models only ever talk to a store through them, so the
//! in-memory store and the MongoDB adapter are interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use super::DocumentBackendType;
use crate::error::ModelResult;
use crate::types::ObjectId;

/// Stream of raw documents produced by a query
pub type DocumentStream = BoxStream<'static, ModelResult<Document>>;

/// Entry point of a document store
pub trait DocumentClient: Send + Sync {
    /// Get a handle on a database by name
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase>;

    /// Which driver backs this client
    fn backend_type(&self) -> DocumentBackendType;
}

/// Handle on a single database
pub trait DocumentDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// Get a handle on a collection by name
    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;

    /// File storage bucket of this database
    fn file_bucket(&self) -> Arc<dyn FileBucket>;
}

/// Handle on a single collection
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Find the first document matching the filter
    async fn find_one(&self, filter: Document, options: FindOptions) -> ModelResult<Option<Document>>;

    /// Find every document matching the filter
    async fn find(&self, filter: Document, options: FindOptions) -> ModelResult<DocumentStream>;

    async fn insert_one(&self, document: Document) -> ModelResult<InsertOneResult>;

    async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<InsertManyResult>;

    async fn update_one(&self, filter: Document, update: Document) -> ModelResult<UpdateResult>;

    async fn update_many(&self, filter: Document, update: Document) -> ModelResult<UpdateResult>;

    async fn replace_one(&self, filter: Document, replacement: Document) -> ModelResult<UpdateResult>;

    async fn delete_one(&self, filter: Document) -> ModelResult<DeleteResult>;

    async fn delete_many(&self, filter: Document) -> ModelResult<DeleteResult>;

    async fn count_documents(&self, filter: Document) -> ModelResult<u64>;

    async fn aggregate(&self, pipeline: Vec<Document>) -> ModelResult<DocumentStream>;

    /// Apply a batch of writes in order, stopping at the first failure
    async fn bulk_write(&self, requests: Vec<WriteModel>) -> ModelResult<BulkWriteResult>;

    /// Create an index, returning its name
    async fn create_index(&self, keys: Document, options: Document) -> ModelResult<String>;

    /// Describe the indexes of the collection
    async fn list_indexes(&self) -> ModelResult<Vec<Document>>;
}

/// Binary file storage split into chunks
#[async_trait]
pub trait FileBucket: Send + Sync {
    /// Store a file under a caller-chosen identifier
    async fn upload_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        data: Vec<u8>,
        metadata: Option<Document>,
    ) -> ModelResult<()>;

    /// Store a file under a fresh identifier
    async fn upload(&self, filename: &str, data: Vec<u8>, metadata: Option<Document>) -> ModelResult<ObjectId> {
        let id = ObjectId::new();
        self.upload_with_id(id, filename, data, metadata).await?;
        Ok(id)
    }

    async fn download(&self, id: ObjectId) -> ModelResult<Vec<u8>>;

    async fn delete(&self, id: ObjectId) -> ModelResult<()>;

    async fn info(&self, id: ObjectId) -> ModelResult<FileInfo>;
}

/// Options accepted by queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub inserted_ids: Vec<Bson>,
}

/// One write of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne { document: Document },
    UpdateOne { filter: Document, update: Document },
    UpdateMany { filter: Document, update: Document },
    ReplaceOne { filter: Document, replacement: Document },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
}

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub id: ObjectId,
    pub filename: String,
    pub length: u64,
    pub chunk_size: u32,
    pub upload_date: DateTime<Utc>,
    pub content_type: Option<String>,
    pub metadata: Option<Document>,
}

/// Run a bulk request one write at a time
pub(crate) async fn apply_sequentially(
    collection: &dyn DocumentCollection,
    requests: Vec<WriteModel>,
) -> ModelResult<BulkWriteResult> {
    let mut result = BulkWriteResult::default();

    for request in requests {
        match request {
            WriteModel::InsertOne { document } => {
                let inserted = collection.insert_one(document).await?;
                result.inserted_count += 1;
                result.inserted_ids.push(inserted.inserted_id);
            }
            WriteModel::UpdateOne { filter, update } => {
                let updated = collection.update_one(filter, update).await?;
                result.matched_count += updated.matched_count;
                result.modified_count += updated.modified_count;
            }
            WriteModel::UpdateMany { filter, update } => {
                let updated = collection.update_many(filter, update).await?;
                result.matched_count += updated.matched_count;
                result.modified_count += updated.modified_count;
            }
            WriteModel::ReplaceOne { filter, replacement } => {
                let updated = collection.replace_one(filter, replacement).await?;
                result.matched_count += updated.matched_count;
                result.modified_count += updated.modified_count;
            }
            WriteModel::DeleteOne { filter } => {
                result.deleted_count += collection.delete_one(filter).await?.deleted_count;
            }
            WriteModel::DeleteMany { filter } => {
                result.deleted_count += collection.delete_many(filter).await?.deleted_count;
            }
        }
    }

    Ok(result)
}
