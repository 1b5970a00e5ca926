//! CRUD Operations - Queries and raw writes through a model's configuration
//!
//! Query results are hydrated into [`Tracked`] documents. Filters and written
//! values pass through the model's type codecs before reaching the store.

use std::sync::Arc;

use bson::{doc, Bson, Document};

use super::core_trait::Model;
use super::cursor::ModelCursor;
use super::tracked::Tracked;
use crate::backends::{
    BulkWriteResult, DeleteResult, DocumentStream, FindOptions, InsertManyResult, InsertOneResult, UpdateResult,
    WriteModel,
};
use crate::codecs::CodecChain;
use crate::error::ModelResult;
use crate::meta::ModelMeta;

/// Update operators whose operand values are stored as-is
const VALUE_OPERATORS: [&str; 3] = ["$set", "$setOnInsert", "$push"];

/// Run stored values of an update document through the codecs
pub(crate) fn encode_update(codecs: CodecChain<'_>, update: Document) -> Document {
    if codecs.is_empty() {
        return update;
    }
    update
        .into_iter()
        .map(|(operator, operand)| match operand {
            Bson::Document(fields) if VALUE_OPERATORS.contains(&operator.as_str()) => {
                (operator, Bson::Document(codecs.encode_document(fields)))
            }
            Bson::Document(fields) if !operator.starts_with('$') => {
                (operator, codecs.encode_value(Bson::Document(fields)))
            }
            other if !operator.starts_with('$') => (operator, codecs.encode_value(other)),
            other => (operator, other),
        })
        .collect()
}

impl<M: Model> ModelMeta<M> {
    /// Wrap a new document for saving
    pub fn document(self: &Arc<Self>, doc: M) -> Tracked<M> {
        Tracked::new(self.clone(), doc)
    }

    /// Hydrate a raw stored document
    pub fn load(self: &Arc<Self>, raw: Document) -> ModelResult<Tracked<M>> {
        Tracked::load(self.clone(), raw)
    }

    /// First document matching `filter`
    pub async fn find_one(self: &Arc<Self>, filter: Document) -> ModelResult<Option<Tracked<M>>> {
        self.find_one_with(filter, FindOptions::new()).await
    }

    /// First document matching `filter`; the limit is always one
    pub async fn find_one_with(self: &Arc<Self>, filter: Document, options: FindOptions) -> ModelResult<Option<Tracked<M>>> {
        let options = FindOptions {
            limit: Some(1),
            ..options
        };
        let raw = self
            .collection()?
            .find_one(self.codecs().encode_document(filter), options)
            .await?;
        raw.map(|doc| Tracked::load(self.clone(), doc)).transpose()
    }

    pub async fn find_by_id(self: &Arc<Self>, id: impl Into<Bson>) -> ModelResult<Option<Tracked<M>>> {
        self.find_one(doc! { "_id": id.into() }).await
    }

    /// Lazy cursor over every document matching `filter`
    pub async fn find(self: &Arc<Self>, filter: Document) -> ModelResult<ModelCursor<M>> {
        self.find_with(filter, FindOptions::new()).await
    }

    pub async fn find_with(self: &Arc<Self>, filter: Document, options: FindOptions) -> ModelResult<ModelCursor<M>> {
        let stream = self
            .collection()?
            .find(self.codecs().encode_document(filter), options)
            .await?;
        Ok(ModelCursor::new(self.clone(), stream))
    }

    pub async fn insert_one(&self, document: Document) -> ModelResult<InsertOneResult> {
        self.collection()?
            .insert_one(self.codecs().encode_document(document))
            .await
    }

    pub async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<InsertManyResult> {
        let codecs = self.codecs();
        let documents = documents
            .into_iter()
            .map(|doc| codecs.encode_document(doc))
            .collect();
        self.collection()?.insert_many(documents).await
    }

    pub async fn update_one(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        let codecs = self.codecs();
        self.collection()?
            .update_one(codecs.encode_document(filter), encode_update(codecs, update))
            .await
    }

    pub async fn update_many(&self, filter: Document, update: Document) -> ModelResult<UpdateResult> {
        let codecs = self.codecs();
        self.collection()?
            .update_many(codecs.encode_document(filter), encode_update(codecs, update))
            .await
    }

    pub async fn delete_one(&self, filter: Document) -> ModelResult<DeleteResult> {
        self.collection()?
            .delete_one(self.codecs().encode_document(filter))
            .await
    }

    pub async fn delete_many(&self, filter: Document) -> ModelResult<DeleteResult> {
        self.collection()?
            .delete_many(self.codecs().encode_document(filter))
            .await
    }

    pub async fn count_documents(&self, filter: Document) -> ModelResult<u64> {
        self.collection()?
            .count_documents(self.codecs().encode_document(filter))
            .await
    }

    pub async fn bulk_write(&self, requests: Vec<WriteModel>) -> ModelResult<BulkWriteResult> {
        let codecs = self.codecs();
        let requests = requests
            .into_iter()
            .map(|request| match request {
                WriteModel::InsertOne { document } => WriteModel::InsertOne {
                    document: codecs.encode_document(document),
                },
                WriteModel::UpdateOne { filter, update } => WriteModel::UpdateOne {
                    filter: codecs.encode_document(filter),
                    update: encode_update(codecs, update),
                },
                WriteModel::UpdateMany { filter, update } => WriteModel::UpdateMany {
                    filter: codecs.encode_document(filter),
                    update: encode_update(codecs, update),
                },
                WriteModel::ReplaceOne { filter, replacement } => WriteModel::ReplaceOne {
                    filter: codecs.encode_document(filter),
                    replacement: codecs.encode_document(replacement),
                },
                WriteModel::DeleteOne { filter } => WriteModel::DeleteOne {
                    filter: codecs.encode_document(filter),
                },
                WriteModel::DeleteMany { filter } => WriteModel::DeleteMany {
                    filter: codecs.encode_document(filter),
                },
            })
            .collect();
        self.collection()?.bulk_write(requests).await
    }

    /// Raw aggregation; results are not hydrated
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> ModelResult<DocumentStream> {
        self.collection()?.aggregate(pipeline).await
    }

    pub async fn list_indexes(&self) -> ModelResult<Vec<Document>> {
        self.collection()?.list_indexes().await
    }
}
