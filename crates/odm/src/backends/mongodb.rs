//! MongoDB Backend Implementation
//!
//! Adapts the official async driver to the document store traits. Driver
//! errors are passed through unchanged inside [`StorageError::Driver`],
//! except a missing GridFS file, which is reported as
//! [`StorageError::FileNotFound`] like the in-memory bucket does.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::stream::{StreamExt, TryStreamExt};
use mongodb::error::{ErrorKind, GridFsErrorKind};
use mongodb::gridfs::GridFsBucket;
use mongodb::options::{ClientOptions, GridFsUploadOptions, IndexOptions as DriverIndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use super::core::{
    apply_sequentially, BulkWriteResult, DeleteResult, DocumentClient, DocumentCollection, DocumentDatabase,
    DocumentStream, FileBucket, FileInfo, FindOptions, InsertManyResult, InsertOneResult, UpdateResult, WriteModel,
};
use super::DocumentBackendType;
use crate::config::OdmConfig;
use crate::error::{ModelError, ModelResult, StorageError};
use crate::types::ObjectId;

/// Connect a client as described by the configuration
pub async fn connect(config: &OdmConfig) -> ModelResult<Arc<MongoClient>> {
    config.validate()?;

    let mut options = ClientOptions::parse(&config.uri).await?;
    if let Some(app_name) = &config.app_name {
        options.app_name = Some(app_name.clone());
    }
    let client = Client::with_options(options)?;

    info!(
        "Created MongoDB client (default database: {})",
        config.database_name.as_deref().unwrap_or("<none>")
    );
    Ok(Arc::new(MongoClient::new(client)))
}

fn io_error(err: std::io::Error) -> ModelError {
    StorageError::Operation(err.to_string()).into()
}

fn file_error(id: ObjectId, err: mongodb::error::Error) -> ModelError {
    if matches!(*err.kind, ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })) {
        StorageError::FileNotFound(id.to_hex()).into()
    } else {
        err.into()
    }
}

/// Read a `fs.files` entry; fields GridFS always writes must be present
fn file_info(id: ObjectId, file: &Document) -> ModelResult<FileInfo> {
    let missing = |field: &str| StorageError::Operation(format!("file {} has no `{}`", id, field));

    let length = match file.get("length") {
        Some(Bson::Int64(n)) => *n as u64,
        Some(Bson::Int32(n)) => *n as u64,
        _ => return Err(missing("length").into()),
    };
    let chunk_size = match file.get("chunkSize") {
        Some(Bson::Int32(n)) => *n as u32,
        Some(Bson::Int64(n)) => *n as u32,
        _ => return Err(missing("chunkSize").into()),
    };
    let upload_date = file
        .get_datetime("uploadDate")
        .map_err(|_| missing("uploadDate"))?
        .to_chrono();
    let metadata = file.get_document("metadata").ok().cloned();

    Ok(FileInfo {
        id,
        filename: file.get_str("filename").unwrap_or_default().to_string(),
        length,
        chunk_size,
        upload_date,
        content_type: metadata
            .as_ref()
            .and_then(|meta| meta.get_str("contentType").ok())
            .map(str::to_string),
        metadata,
    })
}

/// Document client backed by the MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

impl DocumentClient for MongoClient {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(MongoDatabase {
            database: self.client.database(name),
        })
    }

    fn backend_type(&self) -> DocumentBackendType {
        DocumentBackendType::MongoDb
    }
}

/// Database handle of the MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoDatabase {
    database: Database,
}

impl DocumentDatabase for MongoDatabase {
    fn name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(MongoCollection {
            collection: self.database.collection::<Document>(name),
        })
    }

    fn file_bucket(&self) -> Arc<dyn FileBucket> {
        Arc::new(MongoFileBucket {
            bucket: self.database.gridfs_bucket(None),
            files: self.database.collection::<Document>("fs.files"),
        })
    }
}

/// Collection handle of the MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
}

fn driver_find_options(options: FindOptions) -> mongodb::options::FindOptions {
    let mut driver = mongodb::options::FindOptions::default();
    driver.sort = options.sort;
    driver.skip = options.skip;
    driver.limit = options.limit;
    driver.projection = options.projection;
    driver
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn find_one(&self, filter: Document, options: FindOptions) -> ModelResult<Option<Document>> {
        let mut driver = mongodb::options::FindOneOptions::default();
        driver.sort = options.sort;
        driver.skip = options.skip;
        driver.projection = options.projection;
        Ok(self.collection.find_one(filter, driver).await?)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> ModelResult<DocumentStream> {
        let cursor = self.collection.find(filter, driver_find_options(options)).await?;
        Ok(cursor.map(|item| item.map_err(ModelError::from)).boxed())
    }

    async fn insert_one(&self, document: Document) -> ModelResult<InsertOneResult> {
        let result = self.collection.insert_one(document, None).await?;
        debug!("Inserted {} into {}", result.inserted_id, self.collection.namespace());
        Ok(InsertOneResult {
            inserted_id: result.inserted_id,
        })
    }

    async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<InsertManyResult> {
        let result = self.collection.insert_many(documents, None).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(position, _)| *position);
        Ok(InsertManyResult {
            inserted_ids: ids.into_iter().map(|(_, id)| id).collect(),
        })
    }

    async fn update_one(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        let result = self.collection.update_one(filter, update, None).await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        let result = self.collection.update_many(filter, update, None).await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> ModelResult<UpdateResult> {
        let result = self.collection.replace_one(filter, replacement, None).await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, filter: Document) -> ModelResult<DeleteResult> {
        let result = self.collection.delete_one(filter, None).await?;
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn delete_many(&self, filter: Document) -> ModelResult<DeleteResult> {
        let result = self.collection.delete_many(filter, None).await?;
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn count_documents(&self, filter: Document) -> ModelResult<u64> {
        Ok(self.collection.count_documents(filter, None).await?)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> ModelResult<DocumentStream> {
        let cursor = self.collection.aggregate(pipeline, None).await?;
        Ok(cursor.map(|item| item.map_err(ModelError::from)).boxed())
    }

    async fn bulk_write(&self, requests: Vec<WriteModel>) -> ModelResult<BulkWriteResult> {
        apply_sequentially(self, requests).await
    }

    async fn create_index(&self, keys: Document, options: Document) -> ModelResult<String> {
        let options: DriverIndexOptions = bson::from_document(options)
            .map_err(|e| StorageError::Operation(format!("invalid index options: {}", e)))?;
        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self.collection.create_index(model, None).await?;
        Ok(result.index_name)
    }

    async fn list_indexes(&self) -> ModelResult<Vec<Document>> {
        let models: Vec<IndexModel> = self.collection.list_indexes(None).await?.try_collect().await?;
        models
            .iter()
            .map(|model| bson::to_document(model).map_err(ModelError::from))
            .collect()
    }
}

/// GridFS bucket of the MongoDB driver
#[derive(Clone)]
pub struct MongoFileBucket {
    bucket: GridFsBucket,
    files: Collection<Document>,
}

#[async_trait]
impl FileBucket for MongoFileBucket {
    async fn upload_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        data: Vec<u8>,
        metadata: Option<Document>,
    ) -> ModelResult<()> {
        if self.files.count_documents(doc! { "_id": id }, None).await? > 0 {
            return Err(StorageError::FileExists(id.to_hex()).into());
        }

        let mut options = GridFsUploadOptions::default();
        options.metadata = metadata;
        let mut stream = self.bucket.open_upload_stream_with_id(Bson::from(id), filename, options);
        stream.write_all(&data).await.map_err(io_error)?;
        stream.close().await.map_err(io_error)?;

        debug!("Uploaded {} bytes as file {}", data.len(), id);
        Ok(())
    }

    async fn download(&self, id: ObjectId) -> ModelResult<Vec<u8>> {
        let mut stream = self
            .bucket
            .open_download_stream(Bson::from(id))
            .await
            .map_err(|err| file_error(id, err))?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.map_err(io_error)?;
        Ok(data)
    }

    async fn delete(&self, id: ObjectId) -> ModelResult<()> {
        self.bucket.delete(Bson::from(id)).await.map_err(|err| file_error(id, err))
    }

    async fn info(&self, id: ObjectId) -> ModelResult<FileInfo> {
        let file = self
            .files
            .find_one(doc! { "_id": id }, None)
            .await?
            .ok_or_else(|| StorageError::FileNotFound(id.to_hex()))?;

        file_info(id, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_info_requires_upload_date() {
        let id = ObjectId::new();
        let mut file = doc! {
            "_id": id.as_bson_oid(),
            "filename": "a.txt",
            "length": 3_i64,
            "chunkSize": 261_120,
            "metadata": { "contentType": "text/plain" },
        };

        let err = file_info(id, &file).unwrap_err();
        assert!(matches!(err, ModelError::Storage(StorageError::Operation(ref message)) if message.contains("uploadDate")));

        file.insert("uploadDate", bson::DateTime::now());
        let info = file_info(id, &file).unwrap();
        assert_eq!((info.length, info.chunk_size), (3, 261_120));
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_connect_validates_config_first() {
        let err = connect(&OdmConfig::new().with_uri("http://localhost")).await.unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }
}
