use crate::fields;
use crate::prompts::{AGREEMENT_PROMPT, is_agreement};
use crate::types::{CompletionOptions, Template};
use crate::Dependencies;
use async_trait::async_trait;
use docket_graph::{ConversationState, Message, StateError, StateUpdate, Step, StepContext, StepError};
use std::sync::Arc;

pub(crate) fn required_str<'a>(state: &'a ConversationState, field: &str) -> Result<&'a str, StepError> {
    state.get_str(field).ok_or_else(|| {
        StepError::State(StateError::Decode {
            field: field.to_string(),
            message: "field is missing".to_string(),
        })
    })
}

pub(crate) fn required_template(state: &ConversationState) -> Result<Template, StepError> {
    state
        .get_as::<Template>(fields::RELEVANT_TEMPLATE)?
        .ok_or_else(|| {
            StepError::State(StateError::Decode {
                field: fields::RELEVANT_TEMPLATE.to_string(),
                message: "no template selected".to_string(),
            })
        })
}

/// Text of the resume value; non-string input is kept as its JSON form.
pub(crate) fn interrupt_for_text(ctx: &mut StepContext) -> Result<String, StepError> {
    let value = ctx.interrupt(None)?;
    Ok(match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Waits for the user's next message and appends it.
pub(crate) struct AwaitAnswer;

#[async_trait]
impl Step for AwaitAnswer {
    async fn run(
        &self,
        _state: &ConversationState,
        ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let answer = interrupt_for_text(ctx)?;
        tracing::debug!(graph = ctx.graph_name(), step = ctx.step_name(), "user answered");
        Ok(StateUpdate::new().push_message(Message::user(answer)))
    }
}

/// Waits for the user's reply and records whether it agrees to continue.
pub(crate) struct Confirm {
    pub(crate) deps: Arc<Dependencies>,
    pub(crate) write_to: &'static str,
}

#[async_trait]
impl Step for Confirm {
    async fn run(
        &self,
        _state: &ConversationState,
        ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let answer = interrupt_for_text(ctx)?;
        let reply = self
            .deps
            .complete(
                &[Message::system(AGREEMENT_PROMPT), Message::user(answer.as_str())],
                CompletionOptions::weak(),
            )
            .await?;
        let confirmed = is_agreement(&reply);
        tracing::info!(field = self.write_to, confirmed, "user confirmation classified");

        Ok(StateUpdate::new()
            .set(self.write_to, confirmed)
            .push_message(Message::user(answer)))
    }
}
