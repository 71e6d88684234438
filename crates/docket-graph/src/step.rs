use crate::{ConversationState, Interrupt, StateUpdate, StepError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait Step: Send + Sync {
    /// Runs against the current state and returns the fields to merge.
    ///
    /// A step that calls [`StepContext::interrupt`] is re-run from the top on
    /// resume, so externally visible effects belong after the last interrupt.
    async fn run(
        &self,
        state: &ConversationState,
        ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError>;
}

pub type SharedStep = Arc<dyn Step>;

/// Per-run handle given to a step.
#[derive(Clone, Debug)]
pub struct StepContext {
    graph: String,
    step: String,
    resume_values: Vec<Value>,
    consumed: usize,
}

impl StepContext {
    pub fn new(graph: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            step: step.into(),
            resume_values: Vec::new(),
            consumed: 0,
        }
    }

    pub fn with_resume_values(mut self, resume_values: Vec<Value>) -> Self {
        self.resume_values = resume_values;
        self
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    /// Suspends the whole run until external input arrives.
    ///
    /// The n-th call during a run returns the n-th resume value. Without one
    /// it fails with [`StepError::Interrupted`], which the step must propagate.
    pub fn interrupt(&mut self, prompt: Option<Value>) -> Result<Value, StepError> {
        let index = self.consumed;
        match self.resume_values.get(index) {
            Some(value) => {
                self.consumed += 1;
                Ok(value.clone())
            }
            None => Err(StepError::Interrupted(Interrupt { prompt, index })),
        }
    }

    /// Resume values the run consumed before `index`.
    pub(crate) fn replayed_values(&self, index: usize) -> Vec<Value> {
        self.resume_values.iter().take(index).cloned().collect()
    }
}

/// Adapts a synchronous closure into a [`Step`].
pub struct FnStep<F>(F);

pub fn step_fn<F>(f: F) -> FnStep<F>
where
    F: Fn(&ConversationState, &mut StepContext) -> Result<StateUpdate, StepError> + Send + Sync,
{
    FnStep(f)
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&ConversationState, &mut StepContext) -> Result<StateUpdate, StepError> + Send + Sync,
{
    async fn run(
        &self,
        state: &ConversationState,
        ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        (self.0)(state, ctx)
    }
}
