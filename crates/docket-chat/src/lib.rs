//! Legal-advice conversations on top of `docket-graph`.
//!
//! [`ConversationService`] is the facade the HTTP layer talks to. The issue
//! conversation graph lives in [`graphs`] and reaches its collaborators only
//! through the [`Dependencies`] bundle handed to it at construction.

pub mod config;
pub mod deps;
pub mod errors;
pub mod fields;
pub mod graphs;
pub mod prompts;
pub mod service;
pub mod types;

pub use config::ChatConfig;
pub use deps::{
    Dependencies, DependencyError, DocumentRenderer, LawSearch, ResultStorage, TemplateCatalogue,
    TextCompletion,
};
pub use errors::SessionError;
pub use graphs::{build_intake_graph, build_issue_graph};
pub use service::{ChatState, ConversationService};
pub use types::{CompletionOptions, LawFragment, Template, TemplateField};
