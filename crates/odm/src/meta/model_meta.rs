//! Effective model configuration
//!
//! [`ModelMeta`] is the immutable result of folding a model's bases and its
//! own [`MetaDeclaration`] together. Later layers win for scalar settings;
//! sequences are concatenated with inherited entries first.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{MetaDeclaration, ModelRegistry};
use crate::backends::{DocumentClient, DocumentCollection, DocumentDatabase, FileBucket};
use crate::codecs::{CodecChain, TypeCodec};
use crate::error::{ModelError, ModelResult};
use crate::index::Index;
use crate::model::Model;
use crate::triggers::TriggerSet;
use crate::types::ObjectId;

/// One fold step of configuration composition
pub(crate) struct Layer<M> {
    client: Option<Arc<dyn DocumentClient>>,
    database_name: Option<String>,
    collection_name: Option<String>,
    indexes: Vec<Index>,
    triggers: TriggerSet<M>,
    type_codecs: Vec<Arc<dyn TypeCodec>>,
    lineage: Vec<TypeId>,
}

impl<M: Model> Layer<M> {
    /// Registry-wide defaults every model starts from
    fn root(registry: &ModelRegistry) -> Self {
        Self {
            client: registry.default_client(),
            database_name: registry.default_database_name().map(str::to_string),
            collection_name: None,
            indexes: Vec::new(),
            triggers: TriggerSet::new(),
            type_codecs: Vec::new(),
            lineage: Vec::new(),
        }
    }

    fn inherit(&mut self, other: Layer<M>) {
        if other.client.is_some() {
            self.client = other.client;
        }
        if other.database_name.is_some() {
            self.database_name = other.database_name;
        }
        if other.collection_name.is_some() {
            self.collection_name = other.collection_name;
        }
        self.indexes.extend(other.indexes);
        self.triggers.extend(other.triggers.iter().cloned());
        self.type_codecs.extend(other.type_codecs);
        for type_id in other.lineage {
            if !self.lineage.contains(&type_id) {
                self.lineage.push(type_id);
            }
        }
    }
}

/// Effective, immutable configuration of a registered model
pub struct ModelMeta<M> {
    name: &'static str,
    lineage: Vec<TypeId>,
    bases: Vec<&'static str>,
    client: Option<Arc<dyn DocumentClient>>,
    database_name: Option<String>,
    collection_name: Option<String>,
    indexes: Vec<Index>,
    triggers: TriggerSet<M>,
    type_codecs: Vec<Arc<dyn TypeCodec>>,
}

impl<M: Model> ModelMeta<M> {
    /// Fold registry defaults, declared bases and the declaration itself
    pub(crate) fn compose(registry: &ModelRegistry, declaration: MetaDeclaration<M>) -> ModelResult<Self> {
        let name = M::model_name();
        let MetaDeclaration {
            bases,
            client,
            database_name,
            collection_name,
            indexes,
            triggers,
            type_codecs,
        } = declaration;

        for (position, base) in bases.iter().enumerate() {
            if bases[..position].iter().any(|earlier| earlier.type_id == base.type_id) {
                return Err(ModelError::Configuration {
                    model: name.to_string(),
                    message: format!("`{}` is extended more than once", base.name),
                });
            }
        }

        let mut acc = Layer::root(registry);
        for base in bases.iter().rev() {
            debug!("Folding configuration of {} into {}", base.name, name);
            acc.inherit(base.resolve(registry)?);
        }

        let indexes = indexes
            .into_iter()
            .map(|spec| Index::parse(spec).map_err(ModelError::from))
            .collect::<ModelResult<Vec<_>>>()?;
        for trigger in &triggers {
            trigger.check(name)?;
        }

        acc.inherit(Layer {
            client,
            database_name,
            collection_name,
            indexes,
            triggers: triggers.into_iter().collect(),
            type_codecs,
            lineage: Vec::new(),
        });

        let mut lineage = vec![TypeId::of::<M>()];
        lineage.extend(acc.lineage.into_iter().filter(|type_id| *type_id != TypeId::of::<M>()));

        Ok(Self {
            name,
            lineage,
            bases: bases.iter().map(|base| base.name).collect(),
            client: acc.client,
            database_name: acc.database_name,
            collection_name: acc.collection_name,
            indexes: acc.indexes,
            triggers: acc.triggers,
            type_codecs: acc.type_codecs,
        })
    }

    /// This configuration as a base layer of the embedding model `C`
    pub(crate) fn inherited_layer<C: Model>(&self, project: fn(&mut C) -> &mut M) -> Layer<C> {
        Layer {
            client: self.client.clone(),
            database_name: self.database_name.clone(),
            collection_name: self.collection_name.clone(),
            indexes: self.indexes.clone(),
            triggers: self.triggers.lift(project),
            type_codecs: self.type_codecs.clone(),
            lineage: self.lineage.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type ids of the model and all of its transitive bases
    pub fn lineage(&self) -> &[TypeId] {
        &self.lineage
    }

    /// Names of the directly declared bases
    pub fn bases(&self) -> &[&'static str] {
        &self.bases
    }

    /// True if the model is `P` or derives from `P`
    pub fn is_subclass_of<P: 'static>(&self) -> bool {
        self.lineage.contains(&TypeId::of::<P>())
    }

    pub fn client(&self) -> ModelResult<&Arc<dyn DocumentClient>> {
        self.client.as_ref().ok_or_else(|| ModelError::Client(self.name.to_string()))
    }

    pub fn database_name(&self) -> ModelResult<&str> {
        self.database_name
            .as_deref()
            .ok_or_else(|| ModelError::DatabaseName(self.name.to_string()))
    }

    pub fn collection_name(&self) -> ModelResult<&str> {
        self.collection_name
            .as_deref()
            .ok_or_else(|| ModelError::CollectionName(self.name.to_string()))
    }

    pub fn database(&self) -> ModelResult<Arc<dyn DocumentDatabase>> {
        Ok(self.client()?.database(self.database_name()?))
    }

    pub fn collection(&self) -> ModelResult<Arc<dyn DocumentCollection>> {
        Ok(self.database()?.collection(self.collection_name()?))
    }

    /// File bucket of the model's database
    pub fn files(&self) -> ModelResult<Arc<dyn FileBucket>> {
        Ok(self.database()?.file_bucket())
    }

    /// Store a file in the model's database bucket
    pub async fn upload_file(&self, filename: &str, data: Vec<u8>) -> ModelResult<ObjectId> {
        self.files()?.upload(filename, data, None).await
    }

    /// True when client, database name and collection name are all set
    pub fn is_bound(&self) -> bool {
        self.client.is_some() && self.database_name.is_some() && self.collection_name.is_some()
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn triggers(&self) -> &TriggerSet<M> {
        &self.triggers
    }

    pub fn type_codecs(&self) -> &[Arc<dyn TypeCodec>] {
        &self.type_codecs
    }

    pub(crate) fn codecs(&self) -> CodecChain<'_> {
        CodecChain::new(&self.type_codecs)
    }
}

impl<M> fmt::Debug for ModelMeta<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("name", &self.name)
            .field("bases", &self.bases)
            .field("client", &self.client.as_ref().map(|client| client.backend_type()))
            .field("database_name", &self.database_name)
            .field("collection_name", &self.collection_name)
            .field("indexes", &self.indexes)
            .field("triggers", &self.triggers)
            .field("type_codecs", &self.type_codecs.iter().map(|codec| codec.name()).collect::<Vec<_>>())
            .finish()
    }
}
