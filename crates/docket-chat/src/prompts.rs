//! Prompt texts and the JSON contracts the completion model answers with.

use crate::types::{LawFragment, Template};
use docket_graph::{Message, StepError};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const INTAKE_SYSTEM_PROMPT: &str = "\
You help the user put together a legally sound complaint or petition.
Do not introduce yourself or describe your task. Go straight to the point.
The user describes a problem next. Decide whether there is enough information to \
start searching for legal acts. If there is not, ask one short clarifying question, \
one point per question.
Do not decide yet whether the user can be helped; that happens after the legal acts \
have been found. If you think there is most likely no violation, move on to the search.
Answer strictly with plain JSON and nothing else:
\"is_ready\" - 0 while information is missing, 1 when the search can start.
\"user_message\" - the clarifying question, empty when moving on.
{\"is_ready\": 0, \"user_message\": \"Clarifying question?\"}";

pub const LAWS_QUERY_PROMPT: &str = "\
Based on the conversation above, write a search query for a vector database of legal \
acts. Use words that are likely to appear in the articles themselves. Return only the \
query text.";

pub const ACTS_ANALYSIS_PROMPT: &str = "\
Forget the previous output format and follow this one.
Write as if you found the acts yourself. Analyse them and give a very short summary of \
the situation, then a short conclusion on whether the user can be helped. Judge strictly.
If help is not possible, say so or suggest rephrasing the problem. If it is possible, \
ask the user to confirm that they want to continue and mention that you can look for \
petition templates and help fill one in.
Answer strictly with plain JSON and nothing else:
\"can_help\" - 0 when there is no violation or helping is hard, 1 when rights were violated.
\"resume_for_user\" - the reply for the user.
{\"can_help\": 0, \"resume_for_user\": \"Reply for the user\"}";

pub const AGREEMENT_PROMPT: &str = "\
Decide whether the following message agrees to continue. Reply with a single digit and \
nothing else: 1 if the user wants to continue, 0 otherwise.";

pub const TEMPLATES_ANALYSIS_PROMPT: &str = "\
The texts above are petition templates, numbered from zero top to bottom.
Pick the template that best fits the described situation. The petition must be \
addressed to a state authority, never to the employer. Never pick a template that \
belongs to a different problem and do not mention templates that do not fit.
If none fits, tell the user that no suitable template was found and that you can \
write a free-form petition instead. Otherwise describe the chosen template briefly \
and ask whether the user wants to continue with it.
Answer strictly with plain JSON and nothing else, using -1 when no template fits:
{\"relevant_template_index\": 0, \"user_message\": \"Reply for the user\"}";

pub const LOOP_REMINDER_PROMPT: &str = "\
Answer strictly with JSON as instructed: {\"user_message\": \"Question?\", \"is_ready\": false}. \
Do not repeat a question you already asked.";

pub const DOCUMENT_READY_MESSAGE: &str =
    "Your document is ready.\nThank you for using our service!";

pub const INTAKE_GREETING: &str =
    "Thank you, your issue has been recorded. Shall we continue with the review?";

pub const INTAKE_CLOSING: &str = "Your issue has been submitted for review.";

/// Whether the filling loop works on the catalogue template or the free-form one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillingMode {
    Free,
    Strict,
}

impl FillingMode {
    pub fn graph_name(self) -> &'static str {
        match self {
            Self::Free => "free_template",
            Self::Strict => "strict_template",
        }
    }
}

pub fn acts_found_message(fragments: &[LawFragment]) -> Message {
    let joined = fragments
        .iter()
        .map(|fragment| fragment.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    Message::agent(format!(
        "Here are the legal acts I found in my database: {joined}"
    ))
}

pub fn filling_setup_messages(mode: FillingMode, template: &Template, text: &str) -> Vec<Message> {
    let fields = template
        .fields
        .values()
        .map(|field| format!("{} - {}", field.key, field.agent_instructions))
        .collect::<Vec<_>>()
        .join("\n");
    let opening = match mode {
        FillingMode::Free => {
            "Now write a free-form petition. The template text is above. Decide yourself \
             what goes into each required field where possible, and put the petition body \
             into the main content field:"
        }
        FillingMode::Strict => {
            "Now write the petition using the template above. Decide yourself what goes \
             into each field where possible:"
        }
    };
    let instructions = format!(
        "{opening}\n{fields}\n\
         Keep asking the user questions until there is enough information. Assume the \
         user knows nothing about law: decide yourself where and how to file, and ask \
         only for facts. Never ask for personal data such as full name, email or phone.\n\
         Every further answer must be JSON exactly like this until you return \
         \"is_ready\": true, with an empty \"user_message\" at that point:\n\
         {{\"user_message\": \"Question?\", \"is_ready\": false}}"
    );
    vec![Message::system(text), Message::system(instructions)]
}

pub fn field_values_prompt(mode: FillingMode, template: &Template) -> Message {
    let fields = template
        .fields
        .values()
        .map(|field| format!("\"{}\": \"{}\"", field.key, field.agent_instructions))
        .collect::<Vec<_>>()
        .join(",\n");
    let extra = match mode {
        FillingMode::Free => {
            "Write the main petition text. Where the user must enter personal data \
             (name, address, phone, email) leave blanks (____) for them to fill in."
        }
        FillingMode::Strict => "Take into account the context each field appears in.",
    };
    Message::system(format!(
        "Stop returning \"user_message\" and \"is_ready\". You decided there is enough \
         information; now determine the values of all fields. {extra}\n\
         Put only the text that replaces each field, not the template itself.\n\
         Answer strictly with JSON mapping field names to values:\n{{\n{fields}\n}}"
    ))
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InfoAnalysis {
    #[serde(deserialize_with = "lenient_bool")]
    pub is_ready: bool,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ActsAnalysis {
    #[serde(deserialize_with = "lenient_bool")]
    pub can_help: bool,
    pub resume_for_user: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TemplatesAnalysis {
    pub relevant_template_index: i64,
    pub user_message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoopIteration {
    #[serde(default)]
    pub user_message: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_ready: bool,
}

pub fn parse_reply<T: DeserializeOwned>(what: &str, reply: &str) -> Result<T, StepError> {
    serde_json::from_str(strip_code_fence(reply)).map_err(|err| {
        StepError::InvalidOutput(format!("{what} reply is not valid JSON for its schema: {err}"))
    })
}

/// Field values may come back as numbers or booleans; they are rendered as text.
pub fn parse_field_values(reply: &str) -> Result<BTreeMap<String, String>, StepError> {
    let raw: BTreeMap<String, Value> = parse_reply("field values", reply)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

pub fn is_agreement(reply: &str) -> bool {
    reply.contains('1')
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(text) => match text.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!("expected a flag, got '{other}'"))),
        },
        other => Err(de::Error::custom(format!("expected a flag, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_numeric_flag_expected_bool() {
        let analysis: InfoAnalysis =
            parse_reply("info", r#"{"is_ready": 1, "user_message": ""}"#).expect("should parse");
        assert!(analysis.is_ready);
    }

    #[test]
    fn parse_reply_fenced_json_expected_parsed() {
        let reply = "```json\n{\"can_help\": true, \"resume_for_user\": \"ok\"}\n```";
        let analysis: ActsAnalysis = parse_reply("acts", reply).expect("should parse");
        assert!(analysis.can_help);
        assert_eq!(analysis.resume_for_user, "ok");
    }

    #[test]
    fn parse_reply_prose_expected_invalid_output() {
        let error = parse_reply::<LoopIteration>("loop", "Sure! What happened next?")
            .expect_err("prose should be rejected");
        assert!(matches!(error, StepError::InvalidOutput(_)));
    }

    #[test]
    fn parse_field_values_mixed_types_expected_text() {
        let values = parse_field_values(r#"{"body": "text", "count": 3, "empty": null}"#)
            .expect("should parse");
        assert_eq!(values["body"], "text");
        assert_eq!(values["count"], "3");
        assert_eq!(values["empty"], "");
    }

    #[test]
    fn filling_setup_messages_lists_every_field() {
        let mut template = Template {
            id: "t1".to_string(),
            title: "Labour inspectorate".to_string(),
            storage_filename: "labour.docx".to_string(),
            fields: BTreeMap::new(),
        };
        template.fields.insert(
            "employer".to_string(),
            crate::TemplateField {
                key: "employer".to_string(),
                agent_instructions: "employer name".to_string(),
            },
        );

        let messages = filling_setup_messages(FillingMode::Strict, &template, "TEMPLATE TEXT");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system("TEMPLATE TEXT"));
        assert!(messages[1].text.contains("employer - employer name"));
    }
}
