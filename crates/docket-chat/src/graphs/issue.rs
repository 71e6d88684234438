use super::{build_filling_graph, build_laws_analysis_graph, build_template_analysis_graph};
use crate::prompts::FillingMode;
use crate::{Dependencies, fields};
use docket_graph::{
    CompiledGraph, ConversationState, GraphBuildError, GraphBuilder, Routes, Target, route_on_flag,
};
use std::sync::Arc;

pub const ISSUE_GRAPH: &str = "issue_chat";

/// Full issue conversation: legal basis, template choice, then filling.
pub fn build_issue_graph(deps: Arc<Dependencies>) -> Result<Arc<CompiledGraph>, GraphBuildError> {
    let laws = build_laws_analysis_graph(Arc::clone(&deps))?;
    let templates = build_template_analysis_graph(Arc::clone(&deps))?;
    let free = build_filling_graph(FillingMode::Free, Arc::clone(&deps))?;
    let strict = build_filling_graph(FillingMode::Strict, deps)?;

    let mut builder = GraphBuilder::new(ISSUE_GRAPH);
    builder.add_subgraph("laws_analysis", laws)?;
    builder.add_subgraph("template_analysis", templates)?;
    builder.add_subgraph("free_template", free)?;
    builder.add_subgraph("strict_template", strict)?;

    builder.set_entry("laws_analysis");
    builder.add_conditional_edge(
        "laws_analysis",
        route_on_flag(fields::LAWS_CONFIRMED),
        Routes::new()
            .route("true", Target::step("template_analysis"))
            .route("false", Target::End),
    )?;
    builder.add_conditional_edge(
        "template_analysis",
        Arc::new(select_filling_path),
        Routes::new()
            .route("free", Target::step("free_template"))
            .route("strict", Target::step("strict_template"))
            .route("end", Target::End),
    )?;
    builder.add_edge("free_template", Target::End)?;
    builder.add_edge("strict_template", Target::End)?;
    builder.compile()
}

fn select_filling_path(state: &ConversationState) -> String {
    if !state.flag(fields::TEMPLATE_CONFIRMED) {
        return "end".to_string();
    }
    let selected = state
        .get(fields::RELEVANT_TEMPLATE)
        .is_some_and(|value| !value.is_null());
    let path = if selected { "strict" } else { "free" };
    path.to_string()
}
