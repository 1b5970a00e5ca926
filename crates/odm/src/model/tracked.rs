//! Tracked documents - change tracking and persistence
//!
//! A [`Tracked`] value owns a model, the snapshot of what is known to be
//! stored for it, and the effective configuration of its model. Saving a
//! created document sends only the keys that differ from the snapshot.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bson::{doc, Bson, Document};
use serde_json::Value;
use tracing::debug;

use super::core_trait::{DocumentId, IdValue, Model, NewId, ID_KEY};
use super::crud_operations::encode_update;
use super::diff;
use crate::backends::DocumentCollection;
use crate::error::{ModelError, ModelResult, ValidationError, ValidationErrorKind};
use crate::meta::ModelMeta;
use crate::triggers::{TriggerContext, TriggerPhase};
use crate::types::Reference;
use crate::utils::{exclude_undefined_values, to_plain_json};

/// A model value bound to its configuration and stored state
#[derive(Debug, Clone)]
pub struct Tracked<M> {
    doc: M,
    snapshot: Document,
    meta: Arc<ModelMeta<M>>,
}

impl<M: Model> Tracked<M> {
    /// Wrap a new, not yet stored document
    pub fn new(meta: Arc<ModelMeta<M>>, doc: M) -> Self {
        Self {
            doc,
            snapshot: Document::new(),
            meta,
        }
    }

    /// Hydrate a document read from the store
    pub fn load(meta: Arc<ModelMeta<M>>, raw: Document) -> ModelResult<Self> {
        let decoded = meta.codecs().decode_document(raw);
        let doc: M = bson::from_document(decoded)?;
        let mut tracked = Self::new(meta, doc);
        tracked.snapshot = tracked.dump()?;
        Ok(tracked)
    }

    pub fn meta(&self) -> &Arc<ModelMeta<M>> {
        &self.meta
    }

    /// Last known stored state
    pub fn snapshot(&self) -> &Document {
        &self.snapshot
    }

    pub fn into_inner(self) -> M {
        self.doc
    }

    pub fn is_created(&self) -> bool {
        self.doc.is_created()
    }

    /// Serialized form with undefined fields removed
    pub fn dump(&self) -> ModelResult<Document> {
        Ok(exclude_undefined_values(bson::to_document(&self.doc)?))
    }

    /// Plain JSON with identifiers rendered as hex strings
    pub fn to_json(&self) -> ModelResult<Value> {
        Ok(to_plain_json(Bson::Document(self.dump()?)))
    }

    /// Reference to this document
    pub fn reference(&self) -> ModelResult<Reference<M>> {
        Ok(Reference::from_document(&self.doc)?)
    }

    /// Update the next save would send, if any
    pub fn changes(&self) -> ModelResult<Option<Document>> {
        Ok(diff::changes(&self.snapshot, &self.dump()?))
    }

    fn id_bson(&self) -> ModelResult<Bson> {
        self.doc
            .id()
            .to_bson()
            .ok_or_else(|| ModelError::NotCreated(self.meta.name().to_string()))
    }

    fn id_filter(&self) -> ModelResult<Document> {
        Ok(self.meta.codecs().encode_document(doc! { "_id": self.id_bson()? }))
    }

    /// Create or update the document
    ///
    /// Runs validators and `BeforeSave`, then either inserts the document
    /// and assigns its identifier, or sends the difference to the snapshot.
    /// A save with nothing changed makes no store call. String identifiers
    /// are generated before the insert; integer identifiers cannot be
    /// created here and fail before anything is written.
    pub async fn save(&mut self) -> ModelResult<()> {
        let meta = self.meta.clone();
        let collection = meta.collection()?;
        let ctx = TriggerContext::new(TriggerPhase::Validator, meta.name(), collection.clone());

        meta.triggers().run(TriggerPhase::Validator, &mut self.doc, &ctx).await?;
        meta.triggers()
            .run(TriggerPhase::BeforeSave, &mut self.doc, &ctx.for_phase(TriggerPhase::BeforeSave))
            .await?;

        if self.doc.is_created() {
            self.update(collection.as_ref(), &ctx).await
        } else {
            self.create(collection.as_ref(), &ctx).await
        }
    }

    async fn create(&mut self, collection: &dyn DocumentCollection, ctx: &TriggerContext) -> ModelResult<()> {
        let meta = self.meta.clone();
        let triggers = meta.triggers();

        let new_id = <<M::Id as DocumentId>::Value as IdValue>::generate();
        if new_id == NewId::Unsupported {
            return Err(ModelError::Validation(ValidationError::at(
                ID_KEY,
                ValidationErrorKind::IdentifierType,
                format!(
                    "{} identifiers are neither generated nor assigned by the store; insert through the model instead",
                    std::any::type_name::<<M::Id as DocumentId>::Value>()
                ),
            )));
        }

        triggers
            .run(TriggerPhase::BeforeCreate, &mut self.doc, &ctx.for_phase(TriggerPhase::BeforeCreate))
            .await?;

        let mut data = self.dump()?;
        if matches!(data.get(ID_KEY), Some(Bson::Null)) {
            data.remove(ID_KEY);
        }
        if let NewId::Generated(id) = &new_id {
            data.insert(ID_KEY, id.to_bson());
        }

        let inserted = collection.insert_one(meta.codecs().encode_document(data.clone())).await?;
        let id = match new_id {
            NewId::Generated(id) => id,
            _ => <<M::Id as DocumentId>::Value as IdValue>::from_bson(inserted.inserted_id.clone())?,
        };
        self.doc.id_mut().assign(id);

        data.insert(ID_KEY, inserted.inserted_id.clone());
        self.snapshot = data;
        debug!("Inserted {} {} into {}", meta.name(), inserted.inserted_id, collection.name());

        triggers
            .run(TriggerPhase::AfterCreate, &mut self.doc, &ctx.for_phase(TriggerPhase::AfterCreate))
            .await?;
        triggers
            .run(
                TriggerPhase::AfterSave,
                &mut self.doc,
                &ctx.for_phase(TriggerPhase::AfterSave).with_created(true),
            )
            .await
    }

    async fn update(&mut self, collection: &dyn DocumentCollection, ctx: &TriggerContext) -> ModelResult<()> {
        let meta = self.meta.clone();
        let triggers = meta.triggers();

        triggers
            .run(TriggerPhase::BeforeUpdate, &mut self.doc, &ctx.for_phase(TriggerPhase::BeforeUpdate))
            .await?;

        let data = self.dump()?;
        match diff::changes(&self.snapshot, &data) {
            Some(update) => {
                let filter = self.id_filter()?;
                let result = collection.update_one(filter, encode_update(meta.codecs(), update)).await?;
                debug!(
                    "Updated {} in {} (matched {}, modified {})",
                    meta.name(),
                    collection.name(),
                    result.matched_count,
                    result.modified_count
                );
            }
            None => debug!("No changes to save for {} in {}", meta.name(), collection.name()),
        }
        self.snapshot = data;

        triggers
            .run(TriggerPhase::AfterUpdate, &mut self.doc, &ctx.for_phase(TriggerPhase::AfterUpdate))
            .await?;
        triggers
            .run(
                TriggerPhase::AfterSave,
                &mut self.doc,
                &ctx.for_phase(TriggerPhase::AfterSave).with_created(false),
            )
            .await
    }

    /// Delete the stored document
    ///
    /// Fails with [`ModelError::NotCreated`] before any trigger or store call
    /// when the document was never stored. The identifier stays assigned.
    pub async fn delete(&mut self) -> ModelResult<()> {
        let filter = self.id_filter()?;
        let meta = self.meta.clone();
        let collection = meta.collection()?;
        let ctx = TriggerContext::new(TriggerPhase::BeforeDelete, meta.name(), collection.clone());

        meta.triggers().run(TriggerPhase::BeforeDelete, &mut self.doc, &ctx).await?;

        let result = collection.delete_one(filter).await?;
        debug!(
            "Deleted {} from {} ({} removed)",
            meta.name(),
            collection.name(),
            result.deleted_count
        );

        meta.triggers()
            .run(TriggerPhase::AfterDelete, &mut self.doc, &ctx.for_phase(TriggerPhase::AfterDelete))
            .await
    }

    /// Re-read the stored document, replacing local state
    ///
    /// Returns `false` when the document no longer exists.
    pub async fn reload(&mut self) -> ModelResult<bool> {
        let filter = doc! { "_id": self.id_bson()? };
        match self.meta.find_one(filter).await? {
            Some(fresh) => {
                self.doc = fresh.doc;
                self.snapshot = fresh.snapshot;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<M> Deref for Tracked<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.doc
    }
}

impl<M> DerefMut for Tracked<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.doc
    }
}

impl<M> AsRef<M> for Tracked<M> {
    fn as_ref(&self) -> &M {
        &self.doc
    }
}
