use serde::Serialize;

use crate::context::{
    OperationContext, ACTION_COLLECTING_DATA, ACTION_SHOWING_PROPERTIES, MESSAGE_TYPE_GREETING,
};
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    Continue,
    RetryCollection,
    ShowOptions,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackResponse {
    pub message: String,
    pub action: FallbackAction,
}

/// User-facing texts shown in place of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackCatalog {
    pub default: String,
    pub timeout: String,
    pub connection: String,
    pub api: String,
    pub validation: String,
    pub auth: String,
    pub rate_limit: String,
    pub welcome: String,
    pub retry_collection: String,
    pub show_options: String,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self {
            default: "Sorry, I ran into a technical problem. Could you repeat your message?".into(),
            timeout: "The operation took too long. Please try again.".into(),
            connection: "Connection problem detected. Trying to reconnect...".into(),
            api: "Service temporarily unavailable. Please try again in a moment.".into(),
            validation: "Invalid data detected. Please check the information.".into(),
            auth: "Authentication problem. Our team has been notified.".into(),
            rate_limit: "Too many requests. Please wait a moment before trying again.".into(),
            welcome: "Hello! Welcome! How can I help you today?".into(),
            retry_collection: "I had a problem processing your details. Shall we try again?".into(),
            show_options: "Sorry about that. We have great options available. Would you like to see them?"
                .into(),
        }
    }
}

impl FallbackCatalog {
    /// Message shown for a failure of the given kind.
    pub fn message_for(&self, kind: ErrorKind) -> &str {
        match kind {
            ErrorKind::Timeout => &self.timeout,
            ErrorKind::Connection => &self.connection,
            ErrorKind::Api => &self.api,
            ErrorKind::Validation => &self.validation,
            ErrorKind::Auth => &self.auth,
            ErrorKind::RateLimit => &self.rate_limit,
            ErrorKind::Unknown => &self.default,
        }
    }

    /// Reply chosen from where the conversation was when it failed.
    /// A greeting wins over the last action.
    pub fn response_for(&self, context: &OperationContext) -> FallbackResponse {
        let (message, action) = if context.message_type.as_deref() == Some(MESSAGE_TYPE_GREETING) {
            (&self.welcome, FallbackAction::Continue)
        } else {
            match context.last_action.as_deref() {
                Some(ACTION_COLLECTING_DATA) => (&self.retry_collection, FallbackAction::RetryCollection),
                Some(ACTION_SHOWING_PROPERTIES) => (&self.show_options, FallbackAction::ShowOptions),
                _ => (&self.default, FallbackAction::Reset),
            }
        };

        FallbackResponse {
            message: message.clone(),
            action,
        }
    }
}
