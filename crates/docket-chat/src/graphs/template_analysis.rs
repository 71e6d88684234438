use super::common::{Confirm, required_str};
use crate::prompts::{TEMPLATES_ANALYSIS_PROMPT, TemplatesAnalysis, parse_reply};
use crate::types::{CompletionOptions, Template};
use crate::{Dependencies, fields};
use async_trait::async_trait;
use docket_graph::{
    CompiledGraph, ConversationState, GraphBuildError, GraphBuilder, Message, StateUpdate, Step,
    StepContext, StepError, Target,
};
use serde_json::Value;
use std::sync::Arc;

pub const TEMPLATE_ANALYSIS_GRAPH: &str = "template_analysis";

pub fn build_template_analysis_graph(
    deps: Arc<Dependencies>,
) -> Result<Arc<CompiledGraph>, GraphBuildError> {
    let mut builder = GraphBuilder::new(TEMPLATE_ANALYSIS_GRAPH);
    builder.add_step(
        "find_templates",
        FindTemplates {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step(
        "analyze_templates",
        AnalyzeTemplates {
            deps: Arc::clone(&deps),
        },
    )?;
    builder.add_step(
        "confirm_template",
        Confirm {
            deps,
            write_to: fields::TEMPLATE_CONFIRMED,
        },
    )?;

    builder.set_entry("find_templates");
    builder.add_edge("find_templates", Target::step("analyze_templates"))?;
    builder.add_edge("analyze_templates", Target::step("confirm_template"))?;
    builder.add_edge("confirm_template", Target::End)?;
    builder.compile()
}

struct FindTemplates {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for FindTemplates {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let query = required_str(state, fields::FIRST_INPUT)?;
        let templates = self
            .deps
            .call("template_catalogue", self.deps.templates.find_templates(query))
            .await?;
        tracing::info!(found = templates.len(), "candidate templates found");
        Ok(StateUpdate::new().set_serialized(fields::TEMPLATES, &templates)?)
    }
}

struct AnalyzeTemplates {
    deps: Arc<Dependencies>,
}

#[async_trait]
impl Step for AnalyzeTemplates {
    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &mut StepContext,
    ) -> Result<StateUpdate, StepError> {
        let templates: Vec<Template> = state.get_as(fields::TEMPLATES)?.unwrap_or_default();

        let mut prompt = state.messages()?;
        for template in &templates {
            let text = self
                .deps
                .call("document_renderer", self.deps.renderer.extract_text(template))
                .await?;
            prompt.push(Message::system(text));
        }
        prompt.push(Message::system(TEMPLATES_ANALYSIS_PROMPT));

        let reply = self
            .deps
            .complete(&prompt, CompletionOptions::json())
            .await?;
        let analysis: TemplatesAnalysis = parse_reply("templates analysis", &reply)?;
        let relevant = select_template(&templates, analysis.relevant_template_index)?;
        tracing::info!(
            template = relevant.map(|t| t.id.as_str()).unwrap_or("none"),
            "relevant template selected"
        );

        let update = match relevant {
            Some(template) => StateUpdate::new().set_serialized(fields::RELEVANT_TEMPLATE, template)?,
            None => StateUpdate::new().set(fields::RELEVANT_TEMPLATE, Value::Null),
        };
        Ok(update.push_message(Message::agent(analysis.user_message)))
    }
}

/// Negative indices mean no template fits.
fn select_template(templates: &[Template], index: i64) -> Result<Option<&Template>, StepError> {
    if index < 0 {
        return Ok(None);
    }
    usize::try_from(index)
        .ok()
        .and_then(|index| templates.get(index))
        .map(Some)
        .ok_or_else(|| {
            StepError::InvalidOutput(format!(
                "template index {index} is out of range for {} candidates",
                templates.len()
            ))
        })
}
