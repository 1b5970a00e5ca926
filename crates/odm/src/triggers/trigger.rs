use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bson::Bson;
use futures::future::{self, BoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{TriggerContext, TriggerPhase};
use crate::error::{ModelError, ModelResult, ValidationError, ValidationErrorKind};
use crate::model::Model;
use crate::utils::{exclude_undefined_values, is_undefined_value};

pub type TriggerFuture<'a> = BoxFuture<'a, ModelResult<()>>;

type Callback<M> = Arc<dyn for<'a> Fn(&'a mut M, &'a TriggerContext) -> TriggerFuture<'a> + Send + Sync>;

/// Field transform used by validators
pub type Transform = Arc<dyn Fn(Bson) -> Result<Bson, ValidatorFailure> + Send + Sync>;

static NEXT_TRIGGER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a trigger, shared by all of its lifted copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(u64);

impl TriggerId {
    fn next() -> Self {
        TriggerId(NEXT_TRIGGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reason a validator rejected a field value
#[derive(Debug)]
pub enum ValidatorFailure {
    Value(String),
    Type(String),
    Assertion(String),
    Other(ModelError),
}

impl ValidatorFailure {
    fn into_error(self, field: &str) -> ModelError {
        let (kind, message) = match self {
            ValidatorFailure::Value(message) => (ValidationErrorKind::Value, message),
            ValidatorFailure::Type(message) => (ValidationErrorKind::Type, message),
            ValidatorFailure::Assertion(message) => (ValidationErrorKind::Assertion, message),
            ValidatorFailure::Other(ModelError::Validation(err)) => return err.within(field).into(),
            ValidatorFailure::Other(err) => return err,
        };
        ValidationError::at(field, kind, message).into()
    }
}

impl From<ModelError> for ValidatorFailure {
    fn from(err: ModelError) -> Self {
        ValidatorFailure::Other(err)
    }
}

impl fmt::Display for ValidatorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorFailure::Value(m) | ValidatorFailure::Type(m) | ValidatorFailure::Assertion(m) => f.write_str(m),
            ValidatorFailure::Other(err) => write!(f, "{}", err),
        }
    }
}

pub(crate) enum TriggerAction<M> {
    Callback(Callback<M>),
    Validator { fields: Vec<String>, transform: Transform },
}

impl<M> Clone for TriggerAction<M> {
    fn clone(&self) -> Self {
        match self {
            TriggerAction::Callback(callback) => TriggerAction::Callback(callback.clone()),
            TriggerAction::Validator { fields, transform } => TriggerAction::Validator {
                fields: fields.clone(),
                transform: transform.clone(),
            },
        }
    }
}

fn callback<M, F>(f: F) -> Callback<M>
where
    F: for<'a> Fn(&'a mut M, &'a TriggerContext) -> TriggerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A lifecycle hook declared on a model
pub struct Trigger<M> {
    id: TriggerId,
    phase: TriggerPhase,
    name: Option<String>,
    reference: Option<String>,
    action: TriggerAction<M>,
}

impl<M> Clone for Trigger<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            phase: self.phase,
            name: self.name.clone(),
            reference: self.reference.clone(),
            action: self.action.clone(),
        }
    }
}

impl<M: Model> Trigger<M> {
    /// Async callback trigger
    pub fn new<F>(phase: TriggerPhase, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut M, &'a TriggerContext) -> TriggerFuture<'a> + Send + Sync + 'static,
    {
        Self {
            id: TriggerId::next(),
            phase,
            name: None,
            reference: None,
            action: TriggerAction::Callback(callback(f)),
        }
    }

    /// Synchronous callback trigger
    pub fn sync<F>(phase: TriggerPhase, f: F) -> Self
    where
        F: Fn(&mut M, &TriggerContext) -> ModelResult<()> + Send + Sync + 'static,
    {
        Self::new(phase, move |doc, ctx| Box::pin(future::ready(f(doc, ctx))))
    }

    /// Validator over raw stored values of `fields`
    pub fn validator<I, S, F>(fields: I, transform: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Bson) -> Result<Bson, ValidatorFailure> + Send + Sync + 'static,
    {
        Self {
            id: TriggerId::next(),
            phase: TriggerPhase::Validator,
            name: None,
            reference: None,
            action: TriggerAction::Validator {
                fields: fields.into_iter().map(Into::into).collect(),
                transform: Arc::new(transform),
            },
        }
    }

    /// Validator over field values decoded as `T`
    pub fn validator_typed<T, I, S, F>(fields: I, transform: F) -> Self
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(T) -> Result<T, ValidatorFailure> + Send + Sync + 'static,
    {
        Self::validator(fields, move |value| {
            let typed: T = bson::from_bson(value).map_err(|e| ValidatorFailure::Type(e.to_string()))?;
            let out = transform(typed)?;
            bson::to_bson(&out).map_err(|e| ValidatorFailure::Other(e.into()))
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tag the trigger with the field it was declared against
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn id(&self) -> TriggerId {
        self.id
    }

    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Fields a validator applies to; empty for callbacks
    pub fn fields(&self) -> &[String] {
        match &self.action {
            TriggerAction::Validator { fields, .. } => fields,
            TriggerAction::Callback(_) => &[],
        }
    }

    pub fn is_validator(&self) -> bool {
        matches!(self.action, TriggerAction::Validator { .. })
    }

    pub(crate) fn check(&self, model: &str) -> ModelResult<()> {
        if let TriggerAction::Validator { fields, .. } = &self.action {
            if fields.is_empty() || fields.iter().any(String::is_empty) {
                return Err(ModelError::InvalidTrigger {
                    model: model.to_string(),
                    reason: "validator must name at least one field".to_string(),
                });
            }
        }
        if self.reference.as_deref() == Some("") {
            return Err(ModelError::InvalidTrigger {
                model: model.to_string(),
                reason: "reference field must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Re-target the trigger at a model embedding `M`
    ///
    /// `project` must point at a `#[serde(flatten)]` field so that validator
    /// field names keep their meaning in the embedding model.
    pub fn lift<C: Model>(&self, project: fn(&mut C) -> &mut M) -> Trigger<C> {
        let action = match &self.action {
            TriggerAction::Callback(inner) => {
                let inner = inner.clone();
                TriggerAction::Callback(callback::<C, _>(move |doc, ctx| inner(project(doc), ctx)))
            }
            TriggerAction::Validator { fields, transform } => TriggerAction::Validator {
                fields: fields.clone(),
                transform: transform.clone(),
            },
        };
        Trigger {
            id: self.id,
            phase: self.phase,
            name: self.name.clone(),
            reference: self.reference.clone(),
            action,
        }
    }

    pub(crate) async fn fire(&self, doc: &mut M, ctx: &TriggerContext) -> ModelResult<()> {
        match &self.action {
            TriggerAction::Callback(f) => f(doc, ctx).await,
            TriggerAction::Validator { fields, transform } => apply_validator(doc, fields, transform.as_ref()),
        }
    }
}

fn apply_validator<M: Model>(
    doc: &mut M,
    fields: &[String],
    transform: &(dyn Fn(Bson) -> Result<Bson, ValidatorFailure> + Send + Sync),
) -> ModelResult<()> {
    let mut data = exclude_undefined_values(bson::to_document(&*doc)?);
    let mut touched = false;

    for field in fields {
        let value = match data.get(field) {
            Some(value) if !is_undefined_value(value) => value.clone(),
            _ => continue,
        };
        let value = transform(value).map_err(|failure| failure.into_error(field))?;
        data.insert(field.clone(), value);
        touched = true;
    }

    if touched {
        *doc = bson::from_document(data)?;
    }
    Ok(())
}

impl<M> fmt::Debug for Trigger<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.action {
            TriggerAction::Callback(_) => "callback",
            TriggerAction::Validator { .. } => "validator",
        };
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("name", &self.name)
            .field("reference", &self.reference)
            .field("kind", &kind)
            .finish()
    }
}
