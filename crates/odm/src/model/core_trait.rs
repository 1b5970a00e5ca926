//! Core Model Trait - Base definition for stored documents
//!
//! Defines the Model trait with its identifier contract and declaration hook.
//! A model is a plain serde struct; the ODM wraps loaded or new values in
//! [`Tracked`](crate::model::Tracked) to add change tracking and persistence.

use std::fmt::Debug;

use bson::Bson;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ModelError, ModelResult};
use crate::field::Field;
use crate::meta::MetaDeclaration;
use crate::types::ObjectId;

/// Reserved key of the document identifier
pub const ID_KEY: &str = "_id";

/// Core trait for document models
pub trait Model: Serialize + DeserializeOwned + Debug + Send + Sync + Sized + 'static {
    /// Identifier slot, usually `Field<ObjectId>`
    type Id: DocumentId;

    /// Get the identifier of this document
    fn id(&self) -> &Self::Id;

    /// Get the identifier of this document for assignment
    fn id_mut(&mut self) -> &mut Self::Id;

    /// Configuration declared by this model
    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::new()
    }

    /// Name used in logs and error messages
    fn model_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// True iff the identifier is neither undefined nor null
    fn is_created(&self) -> bool {
        self.id().is_set()
    }
}

/// How a new document obtains its identifier on insert
#[derive(Debug, Clone, PartialEq)]
pub enum NewId<T> {
    /// The store assigns one and reports it back
    Store,
    /// Inserted with this client-generated value
    Generated(T),
    /// Identifiers of this type cannot be produced on insert
    Unsupported,
}

/// Scalar values usable as document identifiers
pub trait IdValue: Clone + Debug + PartialEq + Send + Sync + 'static {
    fn to_bson(&self) -> Bson;

    /// Convert an identifier reported by the store
    fn from_bson(value: Bson) -> ModelResult<Self>;

    /// Identifier for a document about to be inserted
    fn generate() -> NewId<Self>;
}

impl IdValue for ObjectId {
    fn to_bson(&self) -> Bson {
        Bson::ObjectId(self.as_bson_oid())
    }

    fn from_bson(value: Bson) -> ModelResult<Self> {
        Ok(ObjectId::try_from(&value)?)
    }

    fn generate() -> NewId<Self> {
        NewId::Store
    }
}

impl IdValue for String {
    fn to_bson(&self) -> Bson {
        Bson::String(self.clone())
    }

    fn from_bson(value: Bson) -> ModelResult<Self> {
        match value {
            Bson::String(s) => Ok(s),
            other => Err(id_mismatch("string", &other)),
        }
    }

    // The store would assign an ObjectId, which a string slot cannot hold
    fn generate() -> NewId<Self> {
        NewId::Generated(ObjectId::new().to_hex())
    }
}

impl IdValue for i64 {
    fn to_bson(&self) -> Bson {
        Bson::Int64(*self)
    }

    fn from_bson(value: Bson) -> ModelResult<Self> {
        match value {
            Bson::Int64(n) => Ok(n),
            Bson::Int32(n) => Ok(i64::from(n)),
            other => Err(id_mismatch("integer", &other)),
        }
    }

    fn generate() -> NewId<Self> {
        NewId::Unsupported
    }
}

impl IdValue for i32 {
    fn to_bson(&self) -> Bson {
        Bson::Int32(*self)
    }

    fn from_bson(value: Bson) -> ModelResult<Self> {
        match value {
            Bson::Int32(n) => Ok(n),
            Bson::Int64(n) => i32::try_from(n).map_err(|_| id_mismatch("32-bit integer", &Bson::Int64(n))),
            other => Err(id_mismatch("32-bit integer", &other)),
        }
    }

    fn generate() -> NewId<Self> {
        NewId::Unsupported
    }
}

fn id_mismatch(expected: &str, value: &Bson) -> ModelError {
    ModelError::Serialization(format!("store returned identifier {} where {} was expected", value, expected))
}

/// Identifier slot of a model, which may be unassigned
pub trait DocumentId: Debug + Send + Sync + 'static {
    type Value: IdValue;

    /// The assigned identifier, if any
    fn get(&self) -> Option<&Self::Value>;

    /// Assign an identifier
    fn assign(&mut self, value: Self::Value);

    fn is_set(&self) -> bool {
        self.get().is_some()
    }

    fn to_bson(&self) -> Option<Bson> {
        self.get().map(IdValue::to_bson)
    }
}

impl<T: IdValue> DocumentId for Field<T> {
    type Value = T;

    fn get(&self) -> Option<&T> {
        self.as_option()
    }

    fn assign(&mut self, value: T) {
        self.set(value);
    }
}

impl<T: IdValue> DocumentId for Field<Option<T>> {
    type Value = T;

    fn get(&self) -> Option<&T> {
        self.as_option().and_then(Option::as_ref)
    }

    fn assign(&mut self, value: T) {
        self.set(Some(value));
    }
}

impl<T: IdValue> DocumentId for Option<T> {
    type Value = T;

    fn get(&self) -> Option<&T> {
        self.as_ref()
    }

    fn assign(&mut self, value: T) {
        *self = Some(value);
    }
}
