#![allow(dead_code)]

use async_trait::async_trait;
use docket_chat::{
    ChatConfig, CompletionOptions, Dependencies, DependencyError, DocumentRenderer, LawFragment,
    LawSearch, ResultStorage, Template, TemplateCatalogue, TemplateField, TextCompletion,
};
use docket_graph::Message;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CompletionCall {
    pub messages: Vec<Message>,
    pub options: CompletionOptions,
}

/// Replies with queued texts in order and records every request.
#[derive(Clone, Default)]
pub struct SequenceCompletion {
    pub replies: Arc<Mutex<VecDeque<String>>>,
    pub calls: Arc<Mutex<Vec<CompletionCall>>>,
}

impl SequenceCompletion {
    pub fn enqueue(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .expect("replies mutex")
            .push_back(reply.into());
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().expect("calls mutex").clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("replies mutex").len()
    }
}

#[async_trait]
impl TextCompletion for SequenceCompletion {
    async fn complete(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String, DependencyError> {
        self.calls.lock().expect("calls mutex").push(CompletionCall {
            messages: messages.to_vec(),
            options,
        });
        self.replies
            .lock()
            .expect("replies mutex")
            .pop_front()
            .ok_or_else(|| DependencyError::Unavailable("no scripted reply left".to_string()))
    }
}

#[derive(Clone, Default)]
pub struct FixedLawSearch {
    pub fragments: Vec<LawFragment>,
    pub queries: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

#[async_trait]
impl LawSearch for FixedLawSearch {
    async fn find_fragments(&self, query: &str) -> Result<Vec<LawFragment>, DependencyError> {
        self.queries
            .lock()
            .expect("queries mutex")
            .push(query.to_string());
        if self.fail {
            return Err(DependencyError::Unavailable("vector index offline".to_string()));
        }
        Ok(self.fragments.clone())
    }
}

/// Never answers; used to exercise dependency timeouts.
pub struct StalledLawSearch;

#[async_trait]
impl LawSearch for StalledLawSearch {
    async fn find_fragments(&self, _query: &str) -> Result<Vec<LawFragment>, DependencyError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct FixedCatalogue {
    pub candidates: Vec<Template>,
    pub free: Template,
}

#[async_trait]
impl TemplateCatalogue for FixedCatalogue {
    async fn find_templates(&self, _query: &str) -> Result<Vec<Template>, DependencyError> {
        Ok(self.candidates.clone())
    }

    async fn get_template(&self, id: &str) -> Result<Template, DependencyError> {
        self.candidates
            .iter()
            .chain(std::iter::once(&self.free))
            .find(|template| template.id == id)
            .cloned()
            .ok_or_else(|| DependencyError::NotFound {
                resource: "template",
                id: id.to_string(),
            })
    }

    async fn free_template(&self) -> Result<Template, DependencyError> {
        Ok(self.free.clone())
    }
}

/// Renders field values as `key=value` lines.
pub struct LineRenderer;

#[async_trait]
impl DocumentRenderer for LineRenderer {
    async fn extract_text(&self, template: &Template) -> Result<String, DependencyError> {
        Ok(format!("TEMPLATE {}", template.title))
    }

    async fn render(
        &self,
        template: &Template,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, DependencyError> {
        let mut out = format!("{}\n", template.title);
        for (key, value) in values {
            out.push_str(&format!("{key}={value}\n"));
        }
        Ok(out.into_bytes())
    }
}

#[derive(Clone, Default)]
pub struct MemoryResults {
    pub documents: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryResults {
    pub fn document(&self, conversation_id: &str) -> Option<String> {
        self.documents
            .lock()
            .expect("documents mutex")
            .get(conversation_id)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl ResultStorage for MemoryResults {
    async fn store_result(
        &self,
        conversation_id: &str,
        document: Vec<u8>,
    ) -> Result<(), DependencyError> {
        self.documents
            .lock()
            .expect("documents mutex")
            .insert(conversation_id.to_string(), document);
        Ok(())
    }
}

pub fn template(id: &str, title: &str, field_keys: &[&str]) -> Template {
    Template {
        id: id.to_string(),
        title: title.to_string(),
        storage_filename: format!("{id}.docx"),
        fields: field_keys
            .iter()
            .map(|key| {
                (
                    key.to_string(),
                    TemplateField {
                        key: key.to_string(),
                        agent_instructions: format!("value for {key}"),
                    },
                )
            })
            .collect(),
    }
}

pub fn fragment(id: &str, content: &str) -> LawFragment {
    LawFragment {
        fragment_id: id.to_string(),
        document_id: "labour-code".to_string(),
        content: content.to_string(),
        distance: 0.1,
    }
}

pub struct Fixture {
    pub completion: SequenceCompletion,
    pub law_search: FixedLawSearch,
    pub results: MemoryResults,
    pub deps: Arc<Dependencies>,
}

pub fn fixture(candidates: Vec<Template>) -> Fixture {
    let completion = SequenceCompletion::default();
    let law_search = FixedLawSearch {
        fragments: vec![fragment("81", "Art. 81: dismissal requires notice.")],
        ..FixedLawSearch::default()
    };
    let results = MemoryResults::default();
    let catalogue = FixedCatalogue {
        candidates,
        free: template("free", "Free-form petition", &["body", "authority"]),
    };
    let deps = Arc::new(Dependencies::new(
        Arc::new(law_search.clone()),
        Arc::new(catalogue),
        Arc::new(LineRenderer),
        Arc::new(completion.clone()),
        Arc::new(results.clone()),
        &ChatConfig::default().with_dependency_timeout(Duration::from_secs(5)),
    ));
    Fixture {
        completion,
        law_search,
        results,
        deps,
    }
}
