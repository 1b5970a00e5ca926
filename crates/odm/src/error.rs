//! Error types for the ODM
//!
//! Configuration errors are raised while a model is registered, validation
//! errors while values are checked or documents are loaded, state errors by
//! operations on documents that were never persisted. Storage errors come from
//! the driver and are carried through without reinterpretation.

use std::fmt;

use crate::config::ConfigError;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ODM error type alias
pub type OdmError = ModelError;

/// ODM result type alias
pub type OdmResult<T> = ModelResult<T>;

/// Error types for ODM operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A declared base is not a registered document model
    #[error("model `{model}` extends `{base}`, which is not a registered document model")]
    ModelType { model: String, base: String },

    /// The `indexes` override is not a sequence
    #[error("invalid indexes declaration for `{model}`: {value}")]
    InvalidIndexes { model: String, value: String },

    /// A trigger declaration is malformed
    #[error("invalid trigger declaration for `{model}`: {reason}")]
    InvalidTrigger { model: String, reason: String },

    /// The `type_codecs` override is malformed
    #[error("invalid type codecs declaration for `{model}`: {value}")]
    InvalidTypeCodecs { model: String, value: String },

    /// Any other malformed model declaration
    #[error("configuration error for `{model}`: {message}")]
    Configuration { model: String, message: String },

    /// Index declaration could not be parsed
    #[error(transparent)]
    Index(#[from] IndexError),

    /// No client is bound to the model
    #[error("client required for model `{0}`")]
    Client(String),

    /// No database name is bound to the model
    #[error("database name required for model `{0}`")]
    DatabaseName(String),

    /// No collection name is bound to the model
    #[error("collection name required for model `{0}`")]
    CollectionName(String),

    /// The model was never registered
    #[error("model `{0}` is not registered")]
    NotRegistered(String),

    /// The document has not been persisted yet
    #[error("document of model `{0}` is not created")]
    NotCreated(String),

    /// Field-scoped validation failure
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// BSON or JSON serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error raised by a trigger callback
    #[error("trigger error: {0}")]
    Trigger(String),

    /// Driver error, passed through unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration loading error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ModelError {
    /// Build a trigger error from a message
    pub fn trigger(message: impl Into<String>) -> Self {
        ModelError::Trigger(message.into())
    }

    /// The validation error, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ModelError::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Machine-checkable kind of a validation failure
    pub fn validation_kind(&self) -> Option<ValidationErrorKind> {
        self.as_validation().map(|err| err.kind)
    }

    /// Check whether this error is a not-created state error
    pub fn is_not_created(&self) -> bool {
        matches!(self, ModelError::NotCreated(_))
    }
}

impl From<bson::ser::Error> for ModelError {
    fn from(err: bson::ser::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for ModelError {
    fn from(err: bson::de::Error) -> Self {
        ModelError::Validation(ValidationError::new(
            Vec::<String>::new(),
            ValidationErrorKind::Deserialization,
            err.to_string(),
        ))
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Kinds of validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// Identifier text is not 24 hex characters
    InvalidIdentifier,
    /// Value cannot represent an identifier at all
    IdentifierType,
    /// Reference target does not match the declared model
    ReferenceTypeInvalid,
    /// Referenced document has not been persisted
    DocumentNotCreated,
    /// Value rejected by a validator
    Value,
    /// Value has the wrong type for a validator
    Type,
    /// Validator assertion failed
    Assertion,
    /// Stored data does not fit the model
    Deserialization,
}

impl ValidationErrorKind {
    /// Stable code for the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::InvalidIdentifier => "identifier.invalid",
            ValidationErrorKind::IdentifierType => "identifier.type",
            ValidationErrorKind::ReferenceTypeInvalid => "reference.type_invalid",
            ValidationErrorKind::DocumentNotCreated => "reference.document_not_created",
            ValidationErrorKind::Value => "value_error",
            ValidationErrorKind::Type => "type_error",
            ValidationErrorKind::Assertion => "assertion_error",
            ValidationErrorKind::Deserialization => "deserialization_error",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failure bound to a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub loc: Vec<String>,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new<L, S>(loc: L, kind: ValidationErrorKind, message: impl Into<String>) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            loc: loc.into_iter().map(Into::into).collect(),
            kind,
            message: message.into(),
        }
    }

    /// Error located at a single field
    pub fn at(field: &str, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self::new([field], kind, message)
    }

    /// Prefix the location with an enclosing field
    pub fn within(mut self, field: &str) -> Self {
        self.loc.insert(0, field.to_string());
        self
    }

    /// Dotted field path, or `__root__` for document-level errors
    pub fn path(&self) -> String {
        if self.loc.is_empty() {
            "__root__".to_string()
        } else {
            self.loc.join(".")
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.path(), self.message, self.kind)
    }
}

impl std::error::Error for ValidationError {}

/// Index declaration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// Input is not a string, sequence, mapping or pair
    #[error("invalid index type: {0}")]
    Type(String),
    /// Input has the right shape but a bad value
    #[error("invalid index value: {0}")]
    Value(String),
}

/// Errors reported by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("E11000 duplicate key error collection: {collection} index: {index}")]
    DuplicateKey { collection: String, index: String },

    #[error("file with id {0} already exists")]
    FileExists(String),

    #[error("no file found with id {0}")]
    FileNotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("storage operation failed: {0}")]
    Operation(String),

    #[cfg(feature = "mongodb")]
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for ModelError {
    fn from(err: mongodb::error::Error) -> Self {
        ModelError::Storage(StorageError::Driver(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_path() {
        let err = ValidationError::at("author", ValidationErrorKind::InvalidIdentifier, "invalid objectid");
        assert_eq!(err.path(), "author");
        assert_eq!(err.within("post").path(), "post.author");

        let root = ValidationError::new(Vec::<String>::new(), ValidationErrorKind::Deserialization, "bad");
        assert_eq!(root.path(), "__root__");
    }

    #[test]
    fn test_validation_kind_from_model_error() {
        let err: ModelError =
            ValidationError::at("ref", ValidationErrorKind::DocumentNotCreated, "document is not created").into();
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DocumentNotCreated));
        assert!(!err.is_not_created());
        assert!(ModelError::NotCreated("Post".into()).is_not_created());
    }

    #[test]
    fn test_display_contains_kind_code() {
        let err = ValidationError::at("id", ValidationErrorKind::IdentifierType, "invalid objectid");
        let message = err.to_string();
        assert!(message.contains("identifier.type"));
        assert!(message.starts_with("id:"));
    }

    #[test]
    fn test_storage_error_passthrough() {
        let err: ModelError = StorageError::FileNotFound("abc".into()).into();
        assert!(matches!(err, ModelError::Storage(StorageError::FileNotFound(_))));
        assert_eq!(err.to_string(), "no file found with id abc");
    }
}
