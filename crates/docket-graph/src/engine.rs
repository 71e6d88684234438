use crate::{
    CompiledGraph, ConversationState, EngineError, ExecutionPosition, Frame, Interrupt, StepContext,
    StepError, StepKind, Target, Transition,
};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on steps executed by one start or resume call.
    pub max_steps_per_invocation: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_invocation: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Suspended {
        state: ConversationState,
        position: ExecutionPosition,
    },
    Finished {
        state: ConversationState,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &ConversationState {
        match self {
            Self::Suspended { state, .. } | Self::Finished { state } => state,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

enum LevelOutcome {
    Finished(ConversationState),
    Suspended {
        state: ConversationState,
        frames: Vec<Frame>,
        interrupt: Interrupt,
        resume_values: Vec<Value>,
    },
}

#[derive(Clone, Copy)]
struct ResumeCursor<'a> {
    /// Frames from the current level inward.
    frames: &'a [Frame],
    resume_values: &'a [Value],
}

type LevelFuture<'a> = Pin<Box<dyn Future<Output = Result<LevelOutcome, EngineError>> + Send + 'a>>;

pub struct Engine {
    graph: Arc<CompiledGraph>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(graph: Arc<CompiledGraph>, config: EngineConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    pub async fn start(&self, initial: ConversationState) -> Result<RunOutcome, EngineError> {
        tracing::info!(graph = %self.graph.name(), "starting run");
        let mut steps_taken = 0;
        let outcome = self
            .run_level(&self.graph, initial, None, &mut steps_taken)
            .await?;
        Ok(self.finish(outcome, steps_taken))
    }

    /// Re-enters the innermost suspended step with `input` as the value of its
    /// pending interrupt.
    pub async fn resume(
        &self,
        state: ConversationState,
        position: ExecutionPosition,
        input: Value,
    ) -> Result<RunOutcome, EngineError> {
        if position.frames.is_empty() {
            return Err(EngineError::Invariant(
                "resume requested with an empty frame stack".to_string(),
            ));
        }
        if position.resume_values.len() != position.interrupt.index {
            return Err(EngineError::Invariant(format!(
                "{} replayed value(s) recorded for interrupt {}",
                position.resume_values.len(),
                position.interrupt.index
            )));
        }
        tracing::info!(
            graph = %self.graph.name(),
            depth = position.depth(),
            interrupt = position.interrupt.index,
            "resuming run"
        );

        let mut resume_values = position.resume_values;
        resume_values.push(input);
        let cursor = ResumeCursor {
            frames: &position.frames,
            resume_values: &resume_values,
        };
        let mut steps_taken = 0;
        let outcome = self
            .run_level(&self.graph, state, Some(cursor), &mut steps_taken)
            .await?;
        Ok(self.finish(outcome, steps_taken))
    }

    fn finish(&self, outcome: LevelOutcome, steps_taken: usize) -> RunOutcome {
        match outcome {
            LevelOutcome::Finished(state) => {
                tracing::info!(graph = %self.graph.name(), steps_taken, "run finished");
                RunOutcome::Finished { state }
            }
            LevelOutcome::Suspended {
                state,
                frames,
                interrupt,
                resume_values,
            } => {
                let position = ExecutionPosition {
                    frames,
                    interrupt,
                    resume_values,
                };
                if let Some(frame) = position.innermost() {
                    tracing::info!(
                        graph = %frame.graph,
                        step = %frame.step,
                        depth = position.depth(),
                        steps_taken,
                        "run suspended"
                    );
                }
                RunOutcome::Suspended { state, position }
            }
        }
    }

    fn run_level<'a>(
        &'a self,
        graph: &'a CompiledGraph,
        mut state: ConversationState,
        mut resume: Option<ResumeCursor<'a>>,
        steps_taken: &'a mut usize,
    ) -> LevelFuture<'a> {
        Box::pin(async move {
            let mut current = match resume {
                Some(cursor) => {
                    let frame = cursor.frames.first().ok_or_else(|| {
                        EngineError::Invariant("resume cursor ran out of frames".to_string())
                    })?;
                    if frame.graph != graph.name() {
                        return Err(EngineError::Invariant(format!(
                            "frame names graph '{}' but '{}' is running",
                            frame.graph,
                            graph.name()
                        )));
                    }
                    frame.step.clone()
                }
                None => graph.entry().to_string(),
            };

            loop {
                *steps_taken += 1;
                if *steps_taken > self.config.max_steps_per_invocation {
                    return Err(EngineError::StepLimitExceeded {
                        limit: self.config.max_steps_per_invocation,
                    });
                }

                let kind = graph.step(&current).ok_or_else(|| {
                    EngineError::Invariant(format!(
                        "graph '{}' has no step '{current}'",
                        graph.name()
                    ))
                })?;

                let update = match kind {
                    StepKind::Step(step) => {
                        let resume_values = match resume.take() {
                            Some(cursor) if cursor.frames.len() == 1 => {
                                cursor.resume_values.to_vec()
                            }
                            Some(_) => {
                                return Err(EngineError::Invariant(format!(
                                    "position continues below plain step '{current}'"
                                )));
                            }
                            None => Vec::new(),
                        };
                        let mut ctx = StepContext::new(graph.name(), current.as_str())
                            .with_resume_values(resume_values);
                        tracing::debug!(graph = %graph.name(), step = %current, "running step");

                        match step.run(&state, &mut ctx).await {
                            Ok(update) => update,
                            Err(StepError::Interrupted(interrupt)) => {
                                let resume_values = ctx.replayed_values(interrupt.index);
                                return Ok(LevelOutcome::Suspended {
                                    state,
                                    frames: vec![Frame {
                                        graph: graph.name().to_string(),
                                        step: current,
                                        state: None,
                                    }],
                                    interrupt,
                                    resume_values,
                                });
                            }
                            Err(source) => {
                                tracing::warn!(
                                    graph = %graph.name(),
                                    step = %current,
                                    error = %source,
                                    "step failed"
                                );
                                return Err(EngineError::Step {
                                    graph: graph.name().to_string(),
                                    step: current,
                                    source,
                                });
                            }
                        }
                    }
                    StepKind::Subgraph(sub) => {
                        let (sub_state, sub_resume) = match resume.take() {
                            Some(cursor) => {
                                let nested = cursor.frames.get(1).ok_or_else(|| {
                                    EngineError::Invariant(format!(
                                        "position stops at sub-graph step '{current}'"
                                    ))
                                })?;
                                let sub_state = nested.state.clone().ok_or_else(|| {
                                    EngineError::Invariant(format!(
                                        "nested frame '{}/{}' carries no state",
                                        nested.graph, nested.step
                                    ))
                                })?;
                                let sub_cursor = ResumeCursor {
                                    frames: &cursor.frames[1..],
                                    resume_values: cursor.resume_values,
                                };
                                (sub_state, Some(sub_cursor))
                            }
                            None => (state.clone(), None),
                        };
                        tracing::debug!(
                            graph = %graph.name(),
                            step = %current,
                            subgraph = %sub.name(),
                            "entering sub-graph"
                        );

                        match self
                            .run_level(sub, sub_state, sub_resume, &mut *steps_taken)
                            .await?
                        {
                            LevelOutcome::Finished(sub_final) => {
                                sub.schema().delta_since(&state, &sub_final)?
                            }
                            LevelOutcome::Suspended {
                                state: sub_state,
                                mut frames,
                                interrupt,
                                resume_values,
                            } => {
                                if let Some(nested) = frames.first_mut() {
                                    nested.state = Some(sub_state);
                                }
                                frames.insert(
                                    0,
                                    Frame {
                                        graph: graph.name().to_string(),
                                        step: current,
                                        state: None,
                                    },
                                );
                                return Ok(LevelOutcome::Suspended {
                                    state,
                                    frames,
                                    interrupt,
                                    resume_values,
                                });
                            }
                        }
                    }
                };

                state = graph.schema().merge(&state, &update)?;

                let next = match graph.transition(&current) {
                    None => None,
                    Some(Transition::Edge(target)) => Some(target.clone()),
                    Some(Transition::Conditional { router, routes }) => {
                        let label = router.route(&state);
                        match routes.resolve(&label) {
                            Some(target) => {
                                tracing::debug!(
                                    graph = %graph.name(),
                                    step = %current,
                                    label = %label,
                                    "routed"
                                );
                                Some(target.clone())
                            }
                            None => {
                                tracing::error!(
                                    graph = %graph.name(),
                                    step = %current,
                                    label = %label,
                                    "routing label has no destination"
                                );
                                return Err(EngineError::Routing {
                                    graph: graph.name().to_string(),
                                    step: current,
                                    label,
                                });
                            }
                        }
                    }
                };

                match next {
                    Some(Target::Step(step)) => current = step,
                    Some(Target::End) | None => return Ok(LevelOutcome::Finished(state)),
                }
            }
        })
    }
}
