use crate::ChatConfig;
use crate::types::{CompletionOptions, LawFragment, Template};
use async_trait::async_trait;
use docket_graph::{Message, StepError};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LawSearch: Send + Sync {
    /// Fragments ranked by closeness to `query`.
    async fn find_fragments(&self, query: &str) -> Result<Vec<LawFragment>, DependencyError>;
}

#[async_trait]
pub trait TemplateCatalogue: Send + Sync {
    async fn find_templates(&self, query: &str) -> Result<Vec<Template>, DependencyError>;
    async fn get_template(&self, id: &str) -> Result<Template, DependencyError>;
    /// Template used when no catalogue entry fits the issue.
    async fn free_template(&self) -> Result<Template, DependencyError>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn extract_text(&self, template: &Template) -> Result<String, DependencyError>;
    async fn render(
        &self,
        template: &Template,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, DependencyError>;
}

#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String, DependencyError>;
}

#[async_trait]
pub trait ResultStorage: Send + Sync {
    async fn store_result(&self, conversation_id: &str, document: Vec<u8>)
    -> Result<(), DependencyError>;
}

/// Collaborators handed to the conversation graph when it is built.
#[derive(Clone)]
pub struct Dependencies {
    pub law_search: Arc<dyn LawSearch>,
    pub templates: Arc<dyn TemplateCatalogue>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub completion: Arc<dyn TextCompletion>,
    pub results: Arc<dyn ResultStorage>,
    pub timeout: Duration,
}

impl Dependencies {
    pub fn new(
        law_search: Arc<dyn LawSearch>,
        templates: Arc<dyn TemplateCatalogue>,
        renderer: Arc<dyn DocumentRenderer>,
        completion: Arc<dyn TextCompletion>,
        results: Arc<dyn ResultStorage>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            law_search,
            templates,
            renderer,
            completion,
            results,
            timeout: config.dependency_timeout,
        }
    }

    /// Awaits a dependency call under the configured timeout.
    pub(crate) async fn call<T, F>(&self, dependency: &str, call: F) -> Result<T, StepError>
    where
        F: Future<Output = Result<T, DependencyError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StepError::Dependency {
                dependency: dependency.to_string(),
                message: err.to_string(),
            }),
            Err(_) => {
                tracing::warn!(dependency, timeout_ms = self.timeout.as_millis() as u64, "dependency call timed out");
                Err(StepError::Timeout {
                    dependency: dependency.to_string(),
                })
            }
        }
    }

    pub(crate) async fn complete(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String, StepError> {
        self.call("text_completion", self.completion.complete(messages, options))
            .await
    }
}
