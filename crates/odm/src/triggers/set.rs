use tracing::debug;

use super::{Trigger, TriggerContext, TriggerId, TriggerPhase};
use crate::error::ModelResult;
use crate::model::Model;

/// Ordered collection of the triggers effective for one model
pub struct TriggerSet<M> {
    triggers: Vec<Trigger<M>>,
}

impl<M> Default for TriggerSet<M> {
    fn default() -> Self {
        Self { triggers: Vec::new() }
    }
}

impl<M> Clone for TriggerSet<M> {
    fn clone(&self) -> Self {
        Self {
            triggers: self.triggers.clone(),
        }
    }
}

impl<M> std::fmt::Debug for TriggerSet<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.triggers.iter()).finish()
    }
}

impl<M: Model> TriggerSet<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trigger: Trigger<M>) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger<M>> {
        self.triggers.iter()
    }

    pub fn contains(&self, id: TriggerId) -> bool {
        self.triggers.iter().any(|t| t.id() == id)
    }

    /// Triggers whose phase is-a `phase`, in declaration order
    pub fn matching(&self, phase: TriggerPhase) -> impl Iterator<Item = &Trigger<M>> {
        self.triggers.iter().filter(move |t| t.phase().is_a(phase))
    }

    /// Triggers bound to exactly `phase`, in declaration order
    pub fn for_phase(&self, phase: TriggerPhase) -> impl Iterator<Item = &Trigger<M>> {
        self.triggers.iter().filter(move |t| t.phase() == phase)
    }

    /// Copy every trigger onto an embedding model
    pub fn lift<C: Model>(&self, project: fn(&mut C) -> &mut M) -> TriggerSet<C> {
        TriggerSet {
            triggers: self.triggers.iter().map(|t| t.lift(project)).collect(),
        }
    }

    /// Fire the triggers bound to `phase` one after another
    ///
    /// The first failing trigger aborts the run and its error is returned.
    pub async fn run(&self, phase: TriggerPhase, doc: &mut M, ctx: &TriggerContext) -> ModelResult<()> {
        for trigger in self.for_phase(phase) {
            debug!(
                "Running {} trigger {} on {}",
                phase,
                trigger.name().unwrap_or("<anonymous>"),
                ctx.model_name()
            );
            trigger.fire(doc, ctx).await?;
        }
        Ok(())
    }
}

impl<M> Extend<Trigger<M>> for TriggerSet<M> {
    fn extend<I: IntoIterator<Item = Trigger<M>>>(&mut self, iter: I) {
        self.triggers.extend(iter);
    }
}

impl<M> FromIterator<Trigger<M>> for TriggerSet<M> {
    fn from_iter<I: IntoIterator<Item = Trigger<M>>>(iter: I) -> Self {
        Self {
            triggers: iter.into_iter().collect(),
        }
    }
}
