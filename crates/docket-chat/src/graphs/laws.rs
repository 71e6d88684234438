use super::common::{AwaitAnswer, Confirm, required_str};
use crate::prompts::{
    ACTS_ANALYSIS_PROMPT, ActsAnalysis, INTAKE_SYSTEM_PROMPT, InfoAnalysis, LAWS_QUERY_PROMPT,
    acts_found_message, parse_reply,
};
use crate::types::{CompletionOptions, LawFragment};
use crate::{Dependencies, fields};
use async_trait::async_trait;
use docket_graph::{
    CompiledGraph, ConversationState, GraphBuildError, GraphBuilder, Message, Routes, StateUpdate,
    Step, StepContext, StepError, Target, route_on_flag,
};
use std::sync::Arc;

pub const LAWS_ANALYSIS_GRAPH: &str = "laws_analysis";

/// Gathers the facts of the issue, finds the applicable legal acts and asks
/// the user to confirm continuing.
pub fn build_laws_analysis_graph(
    deps: Arc<Dependencies>,
) -> Result<Arc<CompiledGraph>, GraphBuildError> {
    let mut builder = GraphBuilder::new(LAWS_ANALYSIS_GRAPH);
    builder.add_step("save_first_info", SaveFirstInfo)?;
    builder.add_step(
        "analyze_info",
        AnalyzeInfo {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step("handle_answer", AwaitAnswer)?;
    builder.add_step(
        "find_law_documents",
        FindLawDocuments {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step(
        "analyze_law_documents",
        AnalyzeLawDocuments {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step(
        "confirm_laws",
        Confirm {
            deps,
            write_to: fields::LAWS_CONFIRMED,
        },
    )?;

    builder.set_entry("save_first_info");
    builder.add_edge("save_first_info", Target::step("analyze_info"))?;
    builder.add_conditional_edge(
        "analyze_info",
        route_on_flag(fields::FIRST_INFO_COMPLETED),
        Routes::new()
            .route("true", Target::step("find_law_documents"))
            .route("false", Target::step("handle_answer")),
    )?;
    builder.add_edge("handle_answer", Target::step("analyze_info"))?;
    builder.add_edge("find_law_documents", Target::step("analyze_law_documents"))?;
    builder.add_conditional_edge(
        "analyze_law_documents",
        route_on_flag(fields::CAN_HELP),
        Routes::new()
            .route("true", Target::step("confirm_laws"))
            .route("false", Target::End),
    )?;
    builder.add_edge("confirm_laws", Target::End)?;
    builder.compile()
}

struct SaveFirstInfo;

#[async_trait]
impl Step for SaveFirstInfo {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let first_input = required_str(state, fields::FIRST_INPUT)?;
        tracing::info!("saving first description");
        Ok(StateUpdate::new()
            .push_message(Message::system(INTAKE_SYSTEM_PROMPT))
            .push_message(Message::user(first_input)))
    }
}

struct AnalyzeInfo {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for AnalyzeInfo {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let reply = self
            .deps
            .complete(&state.messages()?, CompletionOptions::json())
            .await?;
        let analysis: InfoAnalysis = parse_reply("info analysis", &reply)?;

        if analysis.is_ready {
            return Ok(StateUpdate::new().set(fields::FIRST_INFO_COMPLETED, true));
        }
        Ok(StateUpdate::new()
            .set(fields::FIRST_INFO_COMPLETED, false)
            .push_message(Message::agent(analysis.user_message)))
    }
}

struct FindLawDocuments {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for FindLawDocuments {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let mut prompt = state.messages()?;
        prompt.push(Message::system(LAWS_QUERY_PROMPT));
        let query = self
            .deps
            .complete(&prompt, CompletionOptions::text())
            .await?;
        let query = query.trim();
        tracing::debug!(query, "prepared law search query");

        let fragments = self
            .deps
            .call("law_search", self.deps.law_search.find_fragments(query))
            .await?;
        tracing::info!(found = fragments.len(), "law fragments found");
        Ok(StateUpdate::new().set_serialized(fields::LAW_FRAGMENTS, &fragments)?)
    }
}

struct AnalyzeLawDocuments {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for AnalyzeLawDocuments {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let fragments: Vec<LawFragment> = state.get_as(fields::LAW_FRAGMENTS)?.unwrap_or_default();
        let acts_message = acts_found_message(&fragments);

        let mut prompt = state.messages()?;
        prompt.push(acts_message.clone());
        prompt.push(Message::system(ACTS_ANALYSIS_PROMPT));
        let reply = self
            .deps
            .complete(&prompt, CompletionOptions::json())
            .await?;
        let analysis: ActsAnalysis = parse_reply("acts analysis", &reply)?;
        tracing::info!(can_help = analysis.can_help, "legal acts analysed");

        Ok(StateUpdate::new()
            .set(fields::CAN_HELP, analysis.can_help)
            .push_message(acts_message)
            .push_message(Message::agent(analysis.resume_for_user)))
    }
}
