//! Model Registry - Registration-time composition and bulk operations
//!
//! Models are registered explicitly, parents before children. Registration
//! composes the effective [`ModelMeta`] once and keeps it for the lifetime of
//! the registry; the ordered list of registered models drives bulk index
//! creation.

use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::ModelMeta;
use crate::backends::DocumentClient;
use crate::config::OdmConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::Model;

/// Type-erased view of a registered model
#[async_trait]
pub trait RegisteredModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn model_type_id(&self) -> TypeId;

    /// Type ids of the model and its transitive bases
    fn lineage(&self) -> &[TypeId];

    fn is_bound(&self) -> bool;

    /// Create every declared index, returning the index names
    async fn ensure_declared_indexes(&self) -> ModelResult<Vec<String>>;
}

#[async_trait]
impl<M: Model> RegisteredModel for ModelMeta<M> {
    fn name(&self) -> &'static str {
        ModelMeta::name(self)
    }

    fn model_type_id(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn lineage(&self) -> &[TypeId] {
        ModelMeta::lineage(self)
    }

    fn is_bound(&self) -> bool {
        ModelMeta::is_bound(self)
    }

    async fn ensure_declared_indexes(&self) -> ModelResult<Vec<String>> {
        self.ensure_indexes().await
    }
}

/// Registry of document models and their effective configuration
pub struct ModelRegistry {
    client: Option<Arc<dyn DocumentClient>>,
    database_name: Option<String>,
    ensure_indexes_on_startup: bool,
    metas: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    models: RwLock<Vec<Arc<dyn RegisteredModel>>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            client: None,
            database_name: None,
            ensure_indexes_on_startup: false,
            metas: DashMap::new(),
            models: RwLock::new(Vec::new()),
        }
    }

    /// Client used by models that do not declare one
    pub fn with_client(mut self, client: Arc<dyn DocumentClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Database used by models that do not declare one
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Build a registry from validated configuration
    pub fn from_config(config: &OdmConfig, client: Arc<dyn DocumentClient>) -> ModelResult<Self> {
        config.validate()?;
        let mut registry = Self::new().with_client(client);
        registry.database_name = config.database_name.clone();
        registry.ensure_indexes_on_startup = config.ensure_indexes_on_startup;
        Ok(registry)
    }

    pub(crate) fn default_client(&self) -> Option<Arc<dyn DocumentClient>> {
        self.client.clone()
    }

    pub(crate) fn default_database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    /// Compose and register `M`
    ///
    /// Registering the same model again returns the existing configuration.
    pub fn register<M: Model>(&self) -> ModelResult<Arc<ModelMeta<M>>> {
        if let Some(existing) = self.lookup::<M>() {
            return Ok(existing);
        }

        let meta = Arc::new(ModelMeta::compose(self, M::declare())?);

        let inserted = match self.metas.entry(TypeId::of::<M>()) {
            Entry::Occupied(entry) => entry.get().clone().downcast::<ModelMeta<M>>().ok(),
            Entry::Vacant(entry) => {
                entry.insert(meta.clone());
                None
            }
        };
        if let Some(existing) = inserted {
            return Ok(existing);
        }

        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(meta.clone());

        debug!(
            "Registered model {} with {} indexes and {} triggers",
            meta.name(),
            meta.indexes().len(),
            meta.triggers().len()
        );
        Ok(meta)
    }

    pub(crate) fn lookup<M: Model>(&self) -> Option<Arc<ModelMeta<M>>> {
        self.metas
            .get(&TypeId::of::<M>())
            .and_then(|entry| entry.value().clone().downcast::<ModelMeta<M>>().ok())
    }

    /// Effective configuration of a registered model
    pub fn get<M: Model>(&self) -> ModelResult<Arc<ModelMeta<M>>> {
        self.lookup::<M>()
            .ok_or_else(|| ModelError::NotRegistered(M::model_name().to_string()))
    }

    pub fn is_registered<M: Model>(&self) -> bool {
        self.metas.contains_key(&TypeId::of::<M>())
    }

    /// Registered models in registration order
    pub fn models(&self) -> Vec<Arc<dyn RegisteredModel>> {
        self.models.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Create the indexes of `M` and of every registered model deriving from it
    ///
    /// Models without a client, database name or collection name are skipped.
    pub async fn ensure_all_indexes<M: Model>(&self) -> ModelResult<Vec<String>> {
        let target = TypeId::of::<M>();
        self.ensure_matching(|model| model.lineage().contains(&target)).await
    }

    /// Create the indexes of every registered model
    pub async fn ensure_every_index(&self) -> ModelResult<Vec<String>> {
        self.ensure_matching(|_| true).await
    }

    /// Run startup work requested by the configuration
    pub async fn initialize(&self) -> ModelResult<()> {
        if self.ensure_indexes_on_startup {
            let created = self.ensure_every_index().await?;
            info!("Ensured {} indexes on startup", created.len());
        }
        Ok(())
    }

    async fn ensure_matching<F>(&self, include: F) -> ModelResult<Vec<String>>
    where
        F: Fn(&dyn RegisteredModel) -> bool,
    {
        let mut created = Vec::new();
        for model in self.models() {
            if !include(model.as_ref()) {
                continue;
            }
            if !model.is_bound() {
                warn!(
                    "Skipping indexes of {}: client, database name or collection name not set",
                    model.name()
                );
                continue;
            }
            created.extend(model.ensure_declared_indexes().await?);
        }
        Ok(created)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("database_name", &self.database_name)
            .field("ensure_indexes_on_startup", &self.ensure_indexes_on_startup)
            .field("models", &self.models().iter().map(|model| model.name()).collect::<Vec<_>>())
            .finish()
    }
}
