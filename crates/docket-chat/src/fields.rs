//! State field names shared by the conversation graphs.

pub use docket_graph::MESSAGES_FIELD as MESSAGES;

pub const CONVERSATION_ID: &str = "conversation_id";
pub const FIRST_INPUT: &str = "first_input";
pub const FIRST_INFO_COMPLETED: &str = "first_info_completed";
pub const LAW_FRAGMENTS: &str = "law_fragments";
pub const CAN_HELP: &str = "can_help";
pub const LAWS_CONFIRMED: &str = "laws_confirmed";
pub const TEMPLATES: &str = "templates";
pub const RELEVANT_TEMPLATE: &str = "relevant_template";
pub const TEMPLATE_CONFIRMED: &str = "template_confirmed";
pub const LOOP_COMPLETED: &str = "loop_completed";
pub const FIELD_VALUES: &str = "field_values";
pub const SUCCESS: &str = "success";
