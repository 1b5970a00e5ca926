//! # elif-odm: Document Mapping Layer for elif.rs
//!
//! Typed document models over an async document store. A model is a plain
//! serde struct implementing [`Model`]; its configuration (client, database,
//! collection, indexes, triggers, type codecs) is declared once, inherited
//! from base models, and composed by a [`ModelRegistry`] at registration.
//! Loaded and new documents are wrapped in [`Tracked`], which keeps a
//! snapshot of the stored state so saves only send what changed.
//!
//! The in-memory backend is always available; the MongoDB adapter is built
//! with the `mongodb` feature.

pub mod backends;
pub mod codecs;
pub mod config;
pub mod error;
pub mod field;
pub mod index;
pub mod meta;
pub mod model;
pub mod triggers;
pub mod types;
pub mod utils;

// Re-export core traits and types
pub use backends::{
    DocumentBackendType, DocumentClient, DocumentCollection, DocumentDatabase, FileBucket, FindOptions, MemoryClient,
};
pub use codecs::TypeCodec;
pub use config::{ConfigError, OdmConfig};
pub use error::{IndexError, ModelError, ModelResult, OdmError, OdmResult, StorageError, ValidationError, ValidationErrorKind};
pub use field::Field;
pub use index::{Index, IndexOptions, IndexSpec, IndexValue};
pub use meta::{MetaDeclaration, ModelMeta, ModelRegistry};
pub use model::{DocumentId, IdValue, Model, ModelCursor, NewId, Tracked, ID_KEY};
pub use triggers::{Trigger, TriggerContext, TriggerPhase, ValidatorFailure};
pub use types::{AnyReference, DataFile, FileField, ObjectId, Reference};

/// Everything needed to declare and persist models
pub mod prelude {
    pub use crate::backends::{DocumentClient, FindOptions, MemoryClient};
    pub use crate::error::{ModelError, ModelResult, ValidationErrorKind};
    pub use crate::field::Field;
    pub use crate::index::{Index, IndexOptions, IndexValue};
    pub use crate::meta::{MetaDeclaration, ModelMeta, ModelRegistry};
    pub use crate::model::{DocumentId, Model, Tracked};
    pub use crate::triggers::{self, Trigger, TriggerContext, TriggerPhase, ValidatorFailure};
    pub use crate::types::{ObjectId, Reference};
}
