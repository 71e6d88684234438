use crate::{
    ConversationState, Diagnostic, GraphBuildError, SharedStep, StateSchema, Step, ValidationError,
    lint,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    Step(String),
    End,
}

impl Target {
    pub fn step(name: impl Into<String>) -> Self {
        Self::Step(name.into())
    }

    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Step(name) => Some(name),
            Self::End => None,
        }
    }
}

/// Label table of a conditional edge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Routes {
    labels: BTreeMap<String, Target>,
    default: Option<Target>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, label: impl Into<String>, target: Target) -> Self {
        self.labels.insert(label.into(), target);
        self
    }

    pub fn otherwise(mut self, target: Target) -> Self {
        self.default = Some(target);
        self
    }

    pub fn resolve(&self, label: &str) -> Option<&Target> {
        self.labels.get(label).or(self.default.as_ref())
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.labels.values().chain(self.default.iter())
    }
}

/// Picks a label from the merged state. Must be deterministic.
pub trait Router: Send + Sync {
    fn route(&self, state: &ConversationState) -> String;
}

impl<F> Router for F
where
    F: Fn(&ConversationState) -> String + Send + Sync,
{
    fn route(&self, state: &ConversationState) -> String {
        self(state)
    }
}

struct FlagRouter {
    field: String,
}

impl Router for FlagRouter {
    fn route(&self, state: &ConversationState) -> String {
        state.flag(&self.field).to_string()
    }
}

/// Routes on a boolean field with labels `"true"` and `"false"`.
pub fn route_on_flag(field: impl Into<String>) -> Arc<dyn Router> {
    Arc::new(FlagRouter {
        field: field.into(),
    })
}

#[derive(Clone)]
pub enum Transition {
    Edge(Target),
    Conditional {
        router: Arc<dyn Router>,
        routes: Routes,
    },
}

impl Transition {
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Self::Edge(target) => vec![target],
            Self::Conditional { routes, .. } => routes.targets().collect(),
        }
    }
}

#[derive(Clone)]
pub enum StepKind {
    Step(SharedStep),
    Subgraph(Arc<CompiledGraph>),
}

pub struct GraphBuilder {
    name: String,
    schema: StateSchema,
    entry: Option<String>,
    steps: BTreeMap<String, StepKind>,
    transitions: BTreeMap<String, Transition>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::default(),
            entry: None,
            steps: BTreeMap::new(),
            transitions: BTreeMap::new(),
        }
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn add_step<S>(&mut self, name: impl Into<String>, step: S) -> Result<&mut Self, GraphBuildError>
    where
        S: Step + 'static,
    {
        self.insert_step(name.into(), StepKind::Step(Arc::new(step)))
    }

    pub fn add_subgraph(
        &mut self,
        name: impl Into<String>,
        graph: Arc<CompiledGraph>,
    ) -> Result<&mut Self, GraphBuildError> {
        self.insert_step(name.into(), StepKind::Subgraph(graph))
    }

    pub fn set_entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: Target,
    ) -> Result<&mut Self, GraphBuildError> {
        self.insert_transition(from.into(), Transition::Edge(to))
    }

    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<String>,
        router: Arc<dyn Router>,
        routes: Routes,
    ) -> Result<&mut Self, GraphBuildError> {
        self.insert_transition(from.into(), Transition::Conditional { router, routes })
    }

    pub fn compile(self) -> Result<Arc<CompiledGraph>, GraphBuildError> {
        let graph = CompiledGraph {
            name: self.name,
            schema: self.schema,
            entry: self.entry.unwrap_or_default(),
            steps: self.steps,
            transitions: self.transitions,
            diagnostics: Vec::new(),
        };

        let diagnostics = lint::validate(&graph);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ValidationError::new(diagnostics).into());
        }
        for diagnostic in &diagnostics {
            tracing::warn!(
                graph = %graph.name,
                rule = %diagnostic.rule,
                step = diagnostic.step.as_deref().unwrap_or_default(),
                "{}",
                diagnostic.message
            );
        }

        Ok(Arc::new(CompiledGraph {
            diagnostics,
            ..graph
        }))
    }

    fn insert_step(&mut self, name: String, kind: StepKind) -> Result<&mut Self, GraphBuildError> {
        if self.steps.contains_key(&name) {
            return Err(GraphBuildError::DuplicateStep {
                graph: self.name.clone(),
                step: name,
            });
        }
        self.steps.insert(name, kind);
        Ok(self)
    }

    fn insert_transition(
        &mut self,
        from: String,
        transition: Transition,
    ) -> Result<&mut Self, GraphBuildError> {
        if !self.steps.contains_key(&from) {
            return Err(GraphBuildError::UndefinedStep {
                graph: self.name.clone(),
                step: from,
            });
        }
        if self.transitions.contains_key(&from) {
            return Err(GraphBuildError::DuplicateTransition {
                graph: self.name.clone(),
                step: from,
            });
        }
        self.transitions.insert(from, transition);
        Ok(self)
    }
}

/// Validated, immutable graph shared across all conversations.
pub struct CompiledGraph {
    name: String,
    schema: StateSchema,
    entry: String,
    steps: BTreeMap<String, StepKind>,
    transitions: BTreeMap<String, Transition>,
    diagnostics: Vec<Diagnostic>,
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn step(&self, name: &str) -> Option<&StepKind> {
        self.steps.get(name)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn transition(&self, from: &str) -> Option<&Transition> {
        self.transitions.get(from)
    }

    pub fn transitions(&self) -> impl Iterator<Item = (&str, &Transition)> {
        self.transitions
            .iter()
            .map(|(from, transition)| (from.as_str(), transition))
    }

    /// Warnings collected while compiling.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}
