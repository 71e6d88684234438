use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LawFragment {
    pub fragment_id: String,
    pub document_id: String,
    pub content: String,
    /// Vector distance to the query; lower is closer.
    pub distance: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub key: String,
    pub agent_instructions: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub storage_filename: String,
    #[serde(default)]
    pub fields: BTreeMap<String, TemplateField>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// Use the cheaper model for classification-style calls.
    pub weak_model: bool,
    pub json_output: bool,
}

impl CompletionOptions {
    pub fn json() -> Self {
        Self {
            weak_model: false,
            json_output: true,
        }
    }

    pub fn text() -> Self {
        Self::default()
    }

    pub fn weak() -> Self {
        Self {
            weak_model: true,
            json_output: false,
        }
    }
}
