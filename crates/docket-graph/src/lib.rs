//! Interruptible, checkpointed step graphs.
//!
//! Graphs are assembled once with [`GraphBuilder`], validated and frozen into a
//! shared [`CompiledGraph`]. The [`Engine`] walks a compiled graph until it
//! reaches a terminal step or a step suspends through
//! [`StepContext::interrupt`]. A suspension is captured as an
//! [`ExecutionPosition`] that survives process restarts inside a
//! [`Checkpoint`]; resuming re-runs the suspended step from its start with the
//! external input as the interrupt's return value.

pub mod checkpoint;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod lint;
pub mod repository;
pub mod state;
pub mod step;

pub use checkpoint::*;
pub use diagnostics::*;
pub use engine::*;
pub use errors::*;
pub use graph::*;
pub use lint::*;
pub use repository::*;
pub use state::*;
pub use step::*;
