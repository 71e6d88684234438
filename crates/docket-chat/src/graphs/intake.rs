use super::common::{AwaitAnswer, required_str};
use crate::fields;
use crate::prompts::{INTAKE_CLOSING, INTAKE_GREETING, INTAKE_SYSTEM_PROMPT};
use docket_graph::{
    CompiledGraph, ConversationState, GraphBuildError, GraphBuilder, Message, StateUpdate,
    StepContext, StepError, Target, step_fn,
};
use std::sync::Arc;

pub const INTAKE_GRAPH: &str = "intake";

/// Dependency-free graph: records the issue, asks once, then concludes.
pub fn build_intake_graph() -> Result<Arc<CompiledGraph>, GraphBuildError> {
    let mut builder = GraphBuilder::new(INTAKE_GRAPH);
    builder.add_step("greet", step_fn(greet))?;
    builder.add_step("ask", AwaitAnswer)?;
    builder.add_step("conclude", step_fn(conclude))?;

    builder.set_entry("greet");
    builder.add_edge("greet", Target::step("ask"))?;
    builder.add_edge("ask", Target::step("conclude"))?;
    builder.add_edge("conclude", Target::End)?;
    builder.compile()
}

fn greet(state: &ConversationState, _ctx: &mut StepContext) -> Result<StateUpdate, StepError> {
    let first_input = required_str(state, fields::FIRST_INPUT)?;
    Ok(StateUpdate::new()
        .push_message(Message::system(INTAKE_SYSTEM_PROMPT))
        .push_message(Message::user(first_input))
        .push_message(Message::agent(INTAKE_GREETING)))
}

fn conclude(_state: &ConversationState, _ctx: &mut StepContext) -> Result<StateUpdate, StepError> {
    Ok(StateUpdate::new()
        .set(fields::SUCCESS, true)
        .push_message(Message::agent(INTAKE_CLOSING)))
}
