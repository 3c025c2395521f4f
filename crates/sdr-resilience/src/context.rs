use serde::Serialize;
use serde_json::{Map, Value};

pub const MESSAGE_TYPE_GREETING: &str = "greeting";
pub const ACTION_COLLECTING_DATA: &str = "collecting_data";
pub const ACTION_SHOWING_PROPERTIES: &str = "showing_properties";

/// Caller-supplied description of the operation being guarded. Attached to
/// log records and retry reports, and used to pick a fallback reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn last_action(mut self, action: impl Into<String>) -> Self {
        self.last_action = Some(action.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
