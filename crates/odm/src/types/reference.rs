//! Typed references between documents

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use bson::Bson;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ObjectId;
use crate::error::{ModelResult, ValidationError, ValidationErrorKind};
use crate::meta::ModelRegistry;
use crate::model::{DocumentId, Model, Tracked};

/// Identifier of a document of model `M`
///
/// Stored exactly like an [`ObjectId`]; the target model only exists at the
/// type level.
pub struct Reference<M> {
    id: ObjectId,
    target: PhantomData<fn() -> M>,
}

impl<M: Model> Reference<M> {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            target: PhantomData,
        }
    }

    pub fn parse(text: impl AsRef<str>) -> Result<Self, ValidationError> {
        ObjectId::parse_str(text).map(Self::new)
    }

    /// Reference an existing document
    ///
    /// Fails with `reference.type_invalid` when `D` is not `M` and with
    /// `reference.document_not_created` when the document has no identifier.
    pub fn from_document<D: Model>(doc: &D) -> Result<Self, ValidationError> {
        if TypeId::of::<D>() != TypeId::of::<M>() {
            return Err(type_invalid::<M>(D::model_name()));
        }
        let id = doc.id().to_bson().ok_or_else(|| {
            ValidationError::new(
                Vec::<String>::new(),
                ValidationErrorKind::DocumentNotCreated,
                format!("{} document is not created", D::model_name()),
            )
        })?;
        ObjectId::try_from(&id).map(Self::new)
    }

    /// Validate a raw value bound for the field `field`
    pub fn validate(field: &str, value: &Bson) -> Result<Self, ValidationError> {
        ObjectId::validate(field, value).map(Self::new)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn target_name() -> &'static str {
        M::model_name()
    }

    pub fn erase(&self) -> AnyReference {
        AnyReference {
            id: self.id,
            type_id: TypeId::of::<M>(),
            model: M::model_name(),
        }
    }

    /// Fetch the referenced document
    pub async fn load(&self, registry: &ModelRegistry) -> ModelResult<Option<Tracked<M>>> {
        registry.get::<M>()?.find_by_id(self.id).await
    }
}

fn type_invalid<M: Model>(got: &str) -> ValidationError {
    ValidationError::new(
        Vec::<String>::new(),
        ValidationErrorKind::ReferenceTypeInvalid,
        format!("expected a reference to {}, got {}", M::model_name(), got),
    )
}

/// Reference with its target model erased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyReference {
    pub id: ObjectId,
    pub type_id: TypeId,
    pub model: &'static str,
}

impl AnyReference {
    pub fn of<M: Model>(id: ObjectId) -> Self {
        Reference::<M>::new(id).erase()
    }

    pub fn is<M: Model>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }
}

impl<M: Model> TryFrom<AnyReference> for Reference<M> {
    type Error = ValidationError;

    fn try_from(reference: AnyReference) -> Result<Self, Self::Error> {
        if reference.is::<M>() {
            Ok(Self::new(reference.id))
        } else {
            Err(type_invalid::<M>(reference.model))
        }
    }
}

impl<M: Model> From<Reference<M>> for AnyReference {
    fn from(reference: Reference<M>) -> Self {
        reference.erase()
    }
}

impl<M> From<Reference<M>> for ObjectId {
    fn from(reference: Reference<M>) -> Self {
        reference.id
    }
}

impl<M> From<Reference<M>> for Bson {
    fn from(reference: Reference<M>) -> Self {
        reference.id.into()
    }
}

impl<M> Clone for Reference<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Reference<M> {}

impl<M> PartialEq for Reference<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for Reference<M> {}

impl<M> Hash for Reference<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M: Model> fmt::Debug for Reference<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference<{}>({})", M::model_name(), self.id)
    }
}

impl<M> fmt::Display for Reference<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl<M> Serialize for Reference<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, M> Deserialize<'de> for Reference<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ObjectId::deserialize(deserializer).map(|id| Self {
            id,
            target: PhantomData,
        })
    }
}
