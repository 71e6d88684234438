use crate::StateError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const MESSAGES_FIELD: &str = "messages";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub role: Role,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text)
    }

    pub fn to_value(&self) -> Value {
        json!({ "text": self.text, "role": self.role.as_str() })
    }
}

/// Field map for one conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationState {
    values: BTreeMap<String, Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Phase flags default to `false` until a step writes them.
    pub fn flag(&self, field: &str) -> bool {
        self.values
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, StateError> {
        match self.values.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| StateError::Decode {
                    field: field.to_string(),
                    message: err.to_string(),
                }),
        }
    }

    pub fn messages(&self) -> Result<Vec<Message>, StateError> {
        Ok(self.get_as(MESSAGES_FIELD)?.unwrap_or_default())
    }

    pub fn message_count(&self) -> usize {
        self.values
            .get(MESSAGES_FIELD)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Partial update returned by a step. Only the fields it names are touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    values: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn set_serialized<T: Serialize>(
        self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Self, StateError> {
        let field = field.into();
        let value = serde_json::to_value(value).map_err(|err| StateError::Encode {
            field: field.clone(),
            message: err.to_string(),
        })?;
        Ok(self.set(field, value))
    }

    /// Adds one element to the sequence this update carries for `field`.
    pub fn append(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        let sequence = match self.values.remove(&field) {
            None => vec![value],
            Some(Value::Array(mut items)) => {
                items.push(value);
                items
            }
            Some(single) => vec![single, value],
        };
        self.values.insert(field, Value::Array(sequence));
        self
    }

    pub fn push_message(self, message: Message) -> Self {
        self.append(MESSAGES_FIELD, message.to_value())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reducer {
    #[default]
    Replace,
    Append,
}

/// Per-field merge rules. Undeclared fields replace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSchema {
    reducers: BTreeMap<String, Reducer>,
}

impl Default for StateSchema {
    fn default() -> Self {
        Self::empty().with_reducer(MESSAGES_FIELD, Reducer::Append)
    }
}

impl StateSchema {
    pub fn empty() -> Self {
        Self {
            reducers: BTreeMap::new(),
        }
    }

    pub fn with_reducer(mut self, field: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.insert(field.into(), reducer);
        self
    }

    pub fn reducer(&self, field: &str) -> Reducer {
        self.reducers.get(field).copied().unwrap_or_default()
    }

    pub fn merge(
        &self,
        current: &ConversationState,
        update: &StateUpdate,
    ) -> Result<ConversationState, StateError> {
        let mut merged = current.clone();
        for (field, value) in update.fields() {
            match self.reducer(field) {
                Reducer::Replace => {
                    merged.values.insert(field.clone(), value.clone());
                }
                Reducer::Append => {
                    let mut sequence = match merged.values.remove(field) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(items)) => items,
                        Some(_) => {
                            return Err(StateError::NotASequence {
                                field: field.clone(),
                            });
                        }
                    };
                    match value {
                        Value::Array(items) => sequence.extend(items.iter().cloned()),
                        single => sequence.push(single.clone()),
                    }
                    merged.values.insert(field.clone(), Value::Array(sequence));
                }
            }
        }
        Ok(merged)
    }

    /// Partial update that turns `base` into `latest` when merged.
    ///
    /// Append fields yield the suffix past `base`, which must be a prefix of
    /// `latest`. Replace fields yield every value that differs.
    pub fn delta_since(
        &self,
        base: &ConversationState,
        latest: &ConversationState,
    ) -> Result<StateUpdate, StateError> {
        let mut delta = StateUpdate::new();
        for (field, value) in latest.fields() {
            let previous = base.values.get(field);
            match self.reducer(field) {
                Reducer::Replace => {
                    if previous != Some(value) {
                        delta.values.insert(field.clone(), value.clone());
                    }
                }
                Reducer::Append => {
                    let before = sequence_of(field, previous)?;
                    let after = sequence_of(field, Some(value))?;
                    if after.len() < before.len() || after[..before.len()] != *before {
                        return Err(StateError::Diverged {
                            field: field.clone(),
                        });
                    }
                    if after.len() > before.len() {
                        delta.values.insert(
                            field.clone(),
                            Value::Array(after[before.len()..].to_vec()),
                        );
                    }
                }
            }
        }
        Ok(delta)
    }
}

fn sequence_of<'a>(field: &str, value: Option<&'a Value>) -> Result<&'a [Value], StateError> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StateError::NotASequence {
            field: field.to_string(),
        }),
    }
}
