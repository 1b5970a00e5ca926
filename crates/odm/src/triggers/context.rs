use std::sync::Arc;

use bson::Document;

use super::TriggerPhase;
use crate::backends::DocumentCollection;
use crate::error::ModelResult;

/// What a trigger callback can see besides the document itself
#[derive(Clone)]
pub struct TriggerContext {
    phase: TriggerPhase,
    created: Option<bool>,
    model: &'static str,
    collection: Arc<dyn DocumentCollection>,
}

impl TriggerContext {
    pub fn new(phase: TriggerPhase, model: &'static str, collection: Arc<dyn DocumentCollection>) -> Self {
        Self {
            phase,
            created: None,
            model,
            collection,
        }
    }

    pub(crate) fn for_phase(&self, phase: TriggerPhase) -> Self {
        Self {
            phase,
            created: None,
            ..self.clone()
        }
    }

    pub(crate) fn with_created(mut self, created: bool) -> Self {
        self.created = Some(created);
        self
    }

    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    /// Whether the save that fired an `AfterSave` trigger created the document
    pub fn created(&self) -> Option<bool> {
        self.created
    }

    pub fn model_name(&self) -> &'static str {
        self.model
    }

    /// Collection the document is being persisted to
    pub fn collection(&self) -> &Arc<dyn DocumentCollection> {
        &self.collection
    }

    pub async fn count_documents(&self, filter: Document) -> ModelResult<u64> {
        self.collection.count_documents(filter).await
    }
}

impl std::fmt::Debug for TriggerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerContext")
            .field("phase", &self.phase)
            .field("created", &self.created)
            .field("model", &self.model)
            .field("collection", &self.collection.name())
            .finish()
    }
}
