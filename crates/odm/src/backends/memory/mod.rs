//! In-memory document store
//!
//! Keeps collections as ordered vectors of BSON documents behind a lock. It
//! understands the query and update subset the ODM itself issues, plus the
//! common comparison operators, and enforces unique indexes.

mod files;
mod filter;
mod update;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};

pub use files::{MemoryFileBucket, DEFAULT_CHUNK_SIZE};

use super::core::{
    apply_sequentially, BulkWriteResult, DeleteResult, DocumentClient, DocumentCollection, DocumentDatabase,
    DocumentStream, FileBucket, FindOptions, InsertManyResult, InsertOneResult, UpdateResult, WriteModel,
};
use super::DocumentBackendType;
use crate::error::{ModelResult, StorageError};
use crate::types::ObjectId;

/// Client of the in-memory store
#[derive(Default)]
pub struct MemoryClient {
    databases: DashMap<String, Arc<MemoryDatabase>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client already wrapped for sharing between models
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get the concrete database handle
    pub fn memory_database(&self, name: &str) -> Arc<MemoryDatabase> {
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(name)))
            .clone()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl DocumentClient for MemoryClient {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        self.memory_database(name)
    }

    fn backend_type(&self) -> DocumentBackendType {
        DocumentBackendType::Memory
    }
}

/// Database of the in-memory store
pub struct MemoryDatabase {
    name: String,
    collections: DashMap<String, Arc<MemoryCollection>>,
    files: Arc<MemoryFileBucket>,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collections: DashMap::new(),
            files: Arc::new(MemoryFileBucket::new()),
        }
    }

    /// Get the concrete collection handle
    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(&self.name, name)))
            .clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn memory_files(&self) -> Arc<MemoryFileBucket> {
        self.files.clone()
    }
}

impl DocumentDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        self.memory_collection(name)
    }

    fn file_bucket(&self) -> Arc<dyn FileBucket> {
        self.files.clone()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    name: String,
    keys: Document,
    unique: bool,
    sparse: bool,
}

/// Write calls a collection has received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<Document>,
    writes: WriteCounts,
    indexes: Vec<IndexEntry>,
}

/// Collection of the in-memory store
pub struct MemoryCollection {
    name: String,
    namespace: String,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    pub fn new(database: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: format!("{}.{}", database, name),
            state: RwLock::new(CollectionState::default()),
        }
    }

    /// Copy of every stored document, in insertion order
    pub fn snapshot(&self) -> ModelResult<Vec<Document>> {
        Ok(self.read_state()?.documents.clone())
    }

    /// Write calls received so far, including ones that matched nothing
    pub fn write_counts(&self) -> ModelResult<WriteCounts> {
        Ok(self.read_state()?.writes)
    }

    fn read_state(&self) -> ModelResult<RwLockReadGuard<'_, CollectionState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Operation("lock poisoned".into()).into())
    }

    fn write_state(&self) -> ModelResult<RwLockWriteGuard<'_, CollectionState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Operation("lock poisoned".into()).into())
    }

    fn select(&self, filter: &Document, options: &FindOptions) -> ModelResult<Vec<Document>> {
        let state = self.read_state()?;
        let mut selected = Vec::new();
        for doc in &state.documents {
            if filter::matches(doc, filter)? {
                selected.push(doc.clone());
            }
        }
        drop(state);

        if let Some(sort) = &options.sort {
            filter::sort_documents(&mut selected, sort);
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let mut selected: Vec<Document> = selected.into_iter().skip(skip).collect();

        if let Some(limit) = options.limit.filter(|limit| *limit != 0) {
            selected.truncate(limit.unsigned_abs() as usize);
        }

        if let Some(projection) = &options.projection {
            selected = selected
                .into_iter()
                .map(|doc| filter::project(doc, projection))
                .collect();
        }

        Ok(selected)
    }

    fn insert_sync(&self, mut document: Document) -> ModelResult<Bson> {
        if !document.contains_key("_id") {
            let mut with_id = doc! { "_id": ObjectId::new() };
            with_id.extend(document);
            document = with_id;
        }
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let mut state = self.write_state()?;
        state.writes.inserts += 1;
        if state.documents.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(self.duplicate("_id_"));
        }
        self.check_unique(&state, &document, None)?;
        state.documents.push(document);
        Ok(id)
    }

    fn update_sync(&self, filter: &Document, update: &Document, many: bool, replace: bool) -> ModelResult<UpdateResult> {
        let mut state = self.write_state()?;
        state.writes.updates += 1;
        let mut result = UpdateResult::default();

        for position in 0..state.documents.len() {
            if !filter::matches(&state.documents[position], filter)? {
                continue;
            }
            result.matched_count += 1;

            let mut next = state.documents[position].clone();
            if replace {
                update::replace(&mut next, update)?;
            } else {
                update::apply_update(&mut next, update)?;
            }

            if next != state.documents[position] {
                self.check_unique(&state, &next, Some(position))?;
                state.documents[position] = next;
                result.modified_count += 1;
            }

            if !many {
                break;
            }
        }

        Ok(result)
    }

    fn delete_sync(&self, filter: &Document, many: bool) -> ModelResult<DeleteResult> {
        let mut state = self.write_state()?;
        state.writes.deletes += 1;
        let mut deleted = 0u64;
        let mut position = 0;

        while position < state.documents.len() {
            if filter::matches(&state.documents[position], filter)? && (many || deleted == 0) {
                state.documents.remove(position);
                deleted += 1;
            } else {
                position += 1;
            }
        }

        Ok(DeleteResult { deleted_count: deleted })
    }

    fn check_unique(&self, state: &CollectionState, candidate: &Document, skip: Option<usize>) -> ModelResult<()> {
        for index in state.indexes.iter().filter(|index| index.unique) {
            let key = index_key(&index.keys, candidate);
            if index.sparse && key.iter().all(Option::is_none) {
                continue;
            }

            let clash = state
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, existing)| index_key(&index.keys, existing) == key);

            if clash {
                return Err(self.duplicate(&index.name));
            }
        }
        Ok(())
    }

    fn duplicate(&self, index: &str) -> crate::error::ModelError {
        StorageError::DuplicateKey {
            collection: self.namespace.clone(),
            index: index.to_string(),
        }
        .into()
    }

    fn create_index_sync(&self, keys: Document, options: Document) -> ModelResult<String> {
        if keys.is_empty() {
            return Err(StorageError::Operation("index keys must not be empty".to_string()).into());
        }

        let name = match options.get_str("name") {
            Ok(name) => name.to_string(),
            Err(_) => crate::index::default_index_name(&keys),
        };
        let unique = options.get_bool("unique").unwrap_or(false);
        let sparse = options.get_bool("sparse").unwrap_or(false);

        let mut state = self.write_state()?;
        if let Some(existing) = state.indexes.iter().find(|index| index.name == name) {
            if existing.keys != keys {
                return Err(StorageError::Operation(format!("index `{}` already exists with different keys", name)).into());
            }
            return Ok(name);
        }

        let entry = IndexEntry { name: name.clone(), keys, unique, sparse };
        if unique {
            let mut seen: Vec<Vec<Option<Bson>>> = Vec::new();
            for doc in &state.documents {
                let key = index_key(&entry.keys, doc);
                if sparse && key.iter().all(Option::is_none) {
                    continue;
                }
                if seen.contains(&key) {
                    return Err(self.duplicate(&name));
                }
                seen.push(key);
            }
        }

        state.indexes.push(entry);
        Ok(name)
    }

    fn list_indexes_sync(&self) -> ModelResult<Vec<Document>> {
        let state = self.read_state()?;
        let mut indexes = vec![doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" }];
        for index in &state.indexes {
            let mut spec = doc! { "v": 2, "key": index.keys.clone(), "name": index.name.clone() };
            if index.unique {
                spec.insert("unique", true);
            }
            if index.sparse {
                spec.insert("sparse", true);
            }
            indexes.push(spec);
        }
        Ok(indexes)
    }

    fn aggregate_sync(&self, pipeline: Vec<Document>) -> ModelResult<Vec<Document>> {
        let mut documents = self.read_state()?.documents.clone();

        for stage in pipeline {
            let (name, argument) = match stage.iter().next() {
                Some((name, argument)) if stage.len() == 1 => (name.clone(), argument.clone()),
                _ => {
                    return Err(StorageError::Operation("pipeline stage must have exactly one key".to_string()).into())
                }
            };

            documents = match (name.as_str(), argument) {
                ("$match", Bson::Document(condition)) => {
                    let mut kept = Vec::new();
                    for doc in documents {
                        if filter::matches(&doc, &condition)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(sort)) => {
                    filter::sort_documents(&mut documents, &sort);
                    documents
                }
                ("$skip", value) => {
                    let skip = as_count(&value).unwrap_or(0);
                    documents.into_iter().skip(skip).collect()
                }
                ("$limit", value) => {
                    let limit = as_count(&value).unwrap_or(usize::MAX);
                    documents.into_iter().take(limit).collect()
                }
                ("$project", Bson::Document(projection)) => documents
                    .into_iter()
                    .map(|doc| filter::project(doc, &projection))
                    .collect(),
                ("$count", Bson::String(field)) => {
                    let mut counted = Document::new();
                    counted.insert(field, documents.len() as i64);
                    vec![counted]
                }
                (other, _) => {
                    return Err(StorageError::Unsupported(format!("aggregation stage {}", other)).into());
                }
            };
        }

        Ok(documents)
    }
}

fn as_count(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(n) if *n >= 0 => Some(*n as usize),
        Bson::Int64(n) if *n >= 0 => Some(*n as usize),
        _ => None,
    }
}

fn index_key(keys: &Document, doc: &Document) -> Vec<Option<Bson>> {
    keys.keys()
        .map(|path| filter::lookup(doc, path).cloned())
        .collect()
}

fn into_stream(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, filter: Document, options: FindOptions) -> ModelResult<Option<Document>> {
        let options = FindOptions { limit: Some(1), ..options };
        Ok(self.select(&filter, &options)?.into_iter().next())
    }

    async fn find(&self, filter: Document, options: FindOptions) -> ModelResult<DocumentStream> {
        Ok(into_stream(self.select(&filter, &options)?))
    }

    async fn insert_one(&self, document: Document) -> ModelResult<InsertOneResult> {
        let inserted_id = self.insert_sync(document)?;
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<InsertManyResult> {
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            inserted_ids.push(self.insert_sync(document)?);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    async fn update_one(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        self.update_sync(&filter, &update, false, false)
    }

    async fn update_many(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        self.update_sync(&filter, &update, true, false)
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> ModelResult<UpdateResult> {
        self.update_sync(&filter, &replacement, false, true)
    }

    async fn delete_one(&self, filter: Document) -> ModelResult<DeleteResult> {
        self.delete_sync(&filter, false)
    }

    async fn delete_many(&self, filter: Document) -> ModelResult<DeleteResult> {
        self.delete_sync(&filter, true)
    }

    async fn count_documents(&self, filter: Document) -> ModelResult<u64> {
        Ok(self.select(&filter, &FindOptions::default())?.len() as u64)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> ModelResult<DocumentStream> {
        Ok(into_stream(self.aggregate_sync(pipeline)?))
    }

    async fn bulk_write(&self, requests: Vec<WriteModel>) -> ModelResult<BulkWriteResult> {
        apply_sequentially(self, requests).await
    }

    async fn create_index(&self, keys: Document, options: Document) -> ModelResult<String> {
        self.create_index_sync(keys, options)
    }

    async fn list_indexes(&self) -> ModelResult<Vec<Document>> {
        self.list_indexes_sync()
    }
}
