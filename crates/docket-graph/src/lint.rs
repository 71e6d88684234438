use crate::{CompiledGraph, Diagnostic, Severity, StepKind, Target};
use std::collections::{BTreeSet, VecDeque};

pub fn validate(graph: &CompiledGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    diagnostics.extend(rule_entry_defined(graph));
    diagnostics.extend(rule_transition_target_exists(graph));
    diagnostics.extend(rule_subgraph_not_self(graph));
    diagnostics.extend(rule_reachability(graph));
    diagnostics
}

fn rule_entry_defined(graph: &CompiledGraph) -> Vec<Diagnostic> {
    if graph.entry().is_empty() {
        return vec![Diagnostic::new(
            "entry_defined",
            Severity::Error,
            format!("graph '{}' has no entry step", graph.name()),
        )];
    }
    if graph.step(graph.entry()).is_none() {
        return vec![
            Diagnostic::new(
                "entry_defined",
                Severity::Error,
                format!("entry step '{}' does not exist", graph.entry()),
            )
            .with_step(graph.entry()),
        ];
    }
    Vec::new()
}

fn rule_transition_target_exists(graph: &CompiledGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (from, transition) in graph.transitions() {
        for target in transition.targets() {
            let Target::Step(to) = target else {
                continue;
            };
            if graph.step(to).is_none() {
                diagnostics.push(
                    Diagnostic::new(
                        "transition_target_exists",
                        Severity::Error,
                        format!("transition target '{to}' does not exist"),
                    )
                    .with_edge(from, to.clone()),
                );
            }
        }
    }
    diagnostics
}

fn rule_subgraph_not_self(graph: &CompiledGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for name in graph.step_names() {
        if let Some(StepKind::Subgraph(sub)) = graph.step(name) {
            if sub.name() == graph.name() {
                diagnostics.push(
                    Diagnostic::new(
                        "subgraph_name_distinct",
                        Severity::Error,
                        format!("sub-graph step shares the enclosing graph name '{}'", graph.name()),
                    )
                    .with_step(name),
                );
            }
        }
    }
    diagnostics
}

fn rule_reachability(graph: &CompiledGraph) -> Vec<Diagnostic> {
    if graph.step(graph.entry()).is_none() {
        return Vec::new();
    }

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(graph.entry().to_string());
    queue.push_back(graph.entry().to_string());

    while let Some(step) = queue.pop_front() {
        let Some(transition) = graph.transition(&step) else {
            continue;
        };
        for target in transition.targets() {
            if let Some(next) = target.step_name() {
                if visited.insert(next.to_string()) {
                    queue.push_back(next.to_string());
                }
            }
        }
    }

    graph
        .step_names()
        .filter(|name| !visited.contains(*name))
        .map(|name| {
            Diagnostic::new(
                "reachability",
                Severity::Warning,
                "step is unreachable from the entry step",
            )
            .with_step(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{
        GraphBuildError, GraphBuilder, Routes, Severity, StateUpdate, Target, route_on_flag,
        step_fn,
    };

    fn noop() -> impl crate::Step + 'static {
        step_fn(|_, _| Ok(StateUpdate::new()))
    }

    #[test]
    fn compile_missing_entry_expected_validation_error() {
        let mut builder = GraphBuilder::new("g");
        builder.add_step("a", noop()).expect("add should succeed");

        let error = builder.compile().expect_err("compile should fail");
        let GraphBuildError::Validation(validation) = error else {
            panic!("expected validation error");
        };
        assert!(
            validation
                .diagnostics
                .iter()
                .any(|d| d.rule == "entry_defined")
        );
    }

    #[test]
    fn compile_route_to_undefined_step_expected_validation_error() {
        let mut builder = GraphBuilder::new("g");
        builder.add_step("a", noop()).expect("add should succeed");
        builder.set_entry("a");
        builder
            .add_conditional_edge(
                "a",
                route_on_flag("ok"),
                Routes::new()
                    .route("true", Target::step("missing"))
                    .route("false", Target::End),
            )
            .expect("edge should be accepted");

        let error = builder.compile().expect_err("compile should fail");
        let GraphBuildError::Validation(validation) = error else {
            panic!("expected validation error");
        };
        assert_eq!(validation.errors_count, 1);
        assert_eq!(
            validation.diagnostics[0].edge,
            Some(("a".to_string(), "missing".to_string()))
        );
    }

    #[test]
    fn compile_unreachable_step_expected_warning_only() {
        let mut builder = GraphBuilder::new("g");
        builder.add_step("a", noop()).expect("add should succeed");
        builder.add_step("orphan", noop()).expect("add should succeed");
        builder.set_entry("a");

        let graph = builder.compile().expect("warnings should not fail compile");
        assert_eq!(graph.diagnostics().len(), 1);
        assert_eq!(graph.diagnostics()[0].severity, Severity::Warning);
        assert_eq!(graph.diagnostics()[0].step.as_deref(), Some("orphan"));
    }
}
