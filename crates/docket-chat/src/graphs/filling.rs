use super::common::{AwaitAnswer, required_str, required_template};
use crate::prompts::{
    DOCUMENT_READY_MESSAGE, FillingMode, LOOP_REMINDER_PROMPT, LoopIteration, field_values_prompt,
    filling_setup_messages, parse_field_values, parse_reply,
};
use crate::types::CompletionOptions;
use crate::{Dependencies, fields};
use async_trait::async_trait;
use docket_graph::{
    CompiledGraph, ConversationState, GraphBuildError, GraphBuilder, Message, Routes, StateUpdate,
    Step, StepContext, StepError, Target, route_on_flag,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Question loop that collects facts for a template, renders it and stores the
/// result. `Free` fetches the free-form template, `Strict` uses the template
/// already selected in the conversation.
pub fn build_filling_graph(
    mode: FillingMode,
    deps: Arc<Dependencies>,
) -> Result<Arc<CompiledGraph>, GraphBuildError> {
    let mut builder = GraphBuilder::new(mode.graph_name());
    builder.add_step(
        "setup_loop",
        SetupLoop {
            mode,
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step(
        "invoke_llm",
        InvokeLlm {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step("get_user_answer", AwaitAnswer)?;
    builder.add_step(
        "prepare_field_values",
        PrepareFieldValues {
            mode,
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step("generate_document", GenerateDocument { deps })?;

    builder.set_entry("setup_loop");
    builder.add_edge("setup_loop", Target::step("invoke_llm"))?;
    builder.add_conditional_edge(
        "invoke_llm",
        route_on_flag(fields::LOOP_COMPLETED),
        Routes::new()
            .route("true", Target::step("prepare_field_values"))
            .route("false", Target::step("get_user_answer")),
    )?;
    builder.add_edge("get_user_answer", Target::step("invoke_llm"))?;
    builder.add_edge("prepare_field_values", Target::step("generate_document"))?;
    builder.add_edge("generate_document", Target::End)?;
    builder.compile()
}

struct SetupLoop {
    mode: FillingMode,
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for SetupLoop {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let template = match self.mode {
            FillingMode::Free => {
                self.deps
                    .call("template_catalogue", self.deps.templates.free_template())
                    .await?
            }
            FillingMode::Strict => required_template(state)?,
        };
        let text = self
            .deps
            .call("document_renderer", self.deps.renderer.extract_text(&template))
            .await?;
        tracing::debug!(mode = ?self.mode, template = %template.id, "setting up question loop");

        let mut update = StateUpdate::new();
        for message in filling_setup_messages(self.mode, &template, &text) {
            update = update.push_message(message);
        }
        if self.mode == FillingMode::Free {
            update = update.set_serialized(fields::RELEVANT_TEMPLATE, &template)?;
        }
        Ok(update)
    }
}

struct InvokeLlm {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for InvokeLlm {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let mut prompt = state.messages()?;
        prompt.push(Message::system(LOOP_REMINDER_PROMPT));
        let reply = self
            .deps
            .complete(&prompt, CompletionOptions::json())
            .await?;
        let iteration: LoopIteration = parse_reply("question loop", &reply)?;

        if iteration.is_ready {
            return Ok(StateUpdate::new().set(fields::LOOP_COMPLETED, true));
        }
        Ok(StateUpdate::new()
            .set(fields::LOOP_COMPLETED, false)
            .push_message(Message::agent(iteration.user_message)))
    }
}

struct PrepareFieldValues {
    mode: FillingMode,
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for PrepareFieldValues {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let template = required_template(state)?;
        let mut prompt = state.messages()?;
        prompt.push(field_values_prompt(self.mode, &template));
        let reply = self
            .deps
            .complete(&prompt, CompletionOptions::json())
            .await?;
        let values = parse_field_values(&reply)?;
        tracing::debug!(fields = values.len(), "field values prepared");
        Ok(StateUpdate::new().set_serialized(fields::FIELD_VALUES, &values)?)
    }
}

struct GenerateDocument {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for GenerateDocument {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let conversation_id = required_str(state, fields::CONVERSATION_ID)?;
        let template = required_template(state)?;
        let values: BTreeMap<String, String> =
            state.get_as(fields::FIELD_VALUES)?.unwrap_or_default();

        let document = self
            .deps
            .call("document_renderer", self.deps.renderer.render(&template, &values))
            .await?;
        let size = document.len();
        self.deps
            .call(
                "result_storage",
                self.deps.results.store_result(conversation_id, document),
            )
            .await?;
        tracing::info!(conversation_id, bytes = size, "document generated");

        Ok(StateUpdate::new()
            .set(fields::SUCCESS, true)
            .push_message(Message::agent(DOCUMENT_READY_MESSAGE)))
    }
}
