//! Model Declaration - What a model states about itself
//!
//! A [`MetaDeclaration`] is returned by [`Model::declare`] and lists the
//! bases a model extends plus its own client, names, indexes, triggers and
//! type codecs. Nothing is resolved here; the registry composes the
//! declaration into an effective [`ModelMeta`](super::ModelMeta).

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

use super::model_meta::Layer;
use super::ModelRegistry;
use crate::backends::DocumentClient;
use crate::codecs::TypeCodec;
use crate::config::ConfigError;
use crate::error::{ModelError, ModelResult};
use crate::index::IndexSpec;
use crate::model::Model;
use crate::triggers::Trigger;

type ResolveBase<M> = Box<dyn Fn(&ModelRegistry) -> ModelResult<Layer<M>> + Send + Sync>;

/// A declared base model
pub(crate) struct BaseDeclaration<M> {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    resolve: ResolveBase<M>,
}

impl<M> BaseDeclaration<M> {
    pub(crate) fn resolve(&self, registry: &ModelRegistry) -> ModelResult<Layer<M>> {
        (self.resolve)(registry)
    }
}

/// Configuration declared by a single model
pub struct MetaDeclaration<M> {
    pub(crate) bases: Vec<BaseDeclaration<M>>,
    pub(crate) client: Option<Arc<dyn DocumentClient>>,
    pub(crate) database_name: Option<String>,
    pub(crate) collection_name: Option<String>,
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) triggers: Vec<Trigger<M>>,
    pub(crate) type_codecs: Vec<Arc<dyn TypeCodec>>,
}

impl<M: Model> Default for MetaDeclaration<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> MetaDeclaration<M> {
    pub fn new() -> Self {
        Self {
            bases: Vec::new(),
            client: None,
            database_name: None,
            collection_name: None,
            indexes: Vec::new(),
            triggers: Vec::new(),
            type_codecs: Vec::new(),
        }
    }

    /// Inherit the effective configuration of `P`
    ///
    /// `P` must be registered before `M`. `project` reaches the embedded
    /// `P` value (normally a `#[serde(flatten)]` field) so that triggers
    /// declared on `P` can run against `M`.
    ///
    /// The closure is checked before `M` is inferred from the return type,
    /// so name the model when starting the chain:
    ///
    /// ```ignore
    /// fn declare() -> MetaDeclaration<Self> {
    ///     MetaDeclaration::<Self>::new()
    ///         .extends::<Animal>(|dog| &mut dog.animal)
    ///         .collection_name("dogs")
    /// }
    /// ```
    pub fn extends<P: Model>(mut self, project: fn(&mut M) -> &mut P) -> Self {
        let resolve = move |registry: &ModelRegistry| -> ModelResult<Layer<M>> {
            let parent = registry.lookup::<P>().ok_or_else(|| ModelError::ModelType {
                model: M::model_name().to_string(),
                base: P::model_name().to_string(),
            })?;
            Ok(parent.inherited_layer(project))
        };
        self.bases.push(BaseDeclaration {
            type_id: TypeId::of::<P>(),
            name: P::model_name(),
            resolve: Box::new(resolve),
        });
        self
    }

    pub fn client(mut self, client: Arc<dyn DocumentClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Declare an index in any accepted form; parsed at registration
    pub fn index(mut self, spec: impl Into<IndexSpec>) -> Self {
        self.indexes.push(spec.into());
        self
    }

    pub fn indexes<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<IndexSpec>,
    {
        self.indexes.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn trigger(mut self, trigger: Trigger<M>) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn triggers(mut self, triggers: impl IntoIterator<Item = Trigger<M>>) -> Self {
        self.triggers.extend(triggers);
        self
    }

    pub fn type_codec<C: TypeCodec + 'static>(mut self, codec: C) -> Self {
        self.type_codecs.push(Arc::new(codec));
        self
    }

    pub fn shared_type_codec(mut self, codec: Arc<dyn TypeCodec>) -> Self {
        self.type_codecs.push(codec);
        self
    }

    /// Names of the declared bases, in declaration order
    pub fn base_names(&self) -> Vec<&'static str> {
        self.bases.iter().map(|base| base.name).collect()
    }

    /// Load names and index declarations from a configuration document
    ///
    /// Triggers, type codecs and clients are code and cannot come from a
    /// document.
    pub fn from_document(doc: &Document) -> ModelResult<Self> {
        let model = M::model_name();
        let mut declaration = Self::new();

        for (key, value) in doc {
            match key.as_str() {
                "database_name" => declaration.database_name = Some(expect_name(model, key, value)?),
                "collection_name" => declaration.collection_name = Some(expect_name(model, key, value)?),
                "indexes" => match value {
                    Bson::Array(items) => declaration.indexes.extend(items.iter().cloned().map(IndexSpec::from)),
                    other => {
                        return Err(ModelError::InvalidIndexes {
                            model: model.to_string(),
                            value: other.to_string(),
                        })
                    }
                },
                "triggers" => {
                    return Err(ModelError::InvalidTrigger {
                        model: model.to_string(),
                        reason: format!("triggers must be registered in code, got {}", value),
                    })
                }
                "type_codecs" => {
                    return Err(ModelError::InvalidTypeCodecs {
                        model: model.to_string(),
                        value: value.to_string(),
                    })
                }
                other => {
                    return Err(ModelError::Configuration {
                        model: model.to_string(),
                        message: format!("unknown configuration key '{}'", other),
                    })
                }
            }
        }

        Ok(declaration)
    }

    /// Same as [`from_document`](Self::from_document) for YAML text
    pub fn from_yaml(text: &str) -> ModelResult<Self> {
        let value: serde_json::Value = serde_yaml::from_str(text).map_err(ConfigError::from)?;
        match bson::to_bson(&value)? {
            Bson::Document(doc) => Self::from_document(&doc),
            Bson::Null => Ok(Self::new()),
            other => Err(ModelError::Configuration {
                model: M::model_name().to_string(),
                message: format!("model configuration must be a mapping, got {}", other),
            }),
        }
    }
}

fn expect_name(model: &str, key: &str, value: &Bson) -> ModelResult<String> {
    match value {
        Bson::String(name) if !name.is_empty() => Ok(name.clone()),
        other => Err(ModelError::Configuration {
            model: model.to_string(),
            message: format!("'{}' must be a non-empty string, got {}", key, other),
        }),
    }
}

impl<M> fmt::Debug for MetaDeclaration<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDeclaration")
            .field("bases", &self.bases.iter().map(|base| base.name).collect::<Vec<_>>())
            .field("client", &self.client.as_ref().map(|client| client.backend_type()))
            .field("database_name", &self.database_name)
            .field("collection_name", &self.collection_name)
            .field("indexes", &self.indexes)
            .field("triggers", &self.triggers)
            .field("type_codecs", &self.type_codecs.iter().map(|codec| codec.name()).collect::<Vec<_>>())
            .finish()
    }
}
