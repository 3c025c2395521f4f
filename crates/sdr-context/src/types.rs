use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Sliding window for message history (oldest dropped first)
pub const MAX_MESSAGES: usize = 20;

pub const DEFAULT_NEXT_ACTION: &str = "qualify";

/// Serialized names of the typed record fields. An `extra` entry under one
/// of these would be written twice and make the record unreadable.
pub const RESERVED_FIELDS: [&str; 12] = [
    "conversationId",
    "createdAt",
    "lastUpdate",
    "lastAccess",
    "messageCount",
    "messages",
    "collectedData",
    "progress",
    "leadScore",
    "tags",
    "notes",
    "nextAction",
];

pub fn is_reserved_field(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Persisted state of one conversation, stored as JSON under the namespaced key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub collected_data: Map<String, Value>,
    /// Percentage of required fields collected (0-100)
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub lead_score: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default = "default_next_action")]
    pub next_action: String,
    /// Top-level fields owned by other handlers, preserved across writes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_next_action() -> String {
    DEFAULT_NEXT_ACTION.to_string()
}

impl ConversationContext {
    /// Fresh record for a conversation seen for the first time.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            created_at: now,
            last_update: now,
            last_access: now,
            message_count: 0,
            messages: Vec::new(),
            collected_data: Map::new(),
            progress: 0,
            lead_score: 0,
            tags: Vec::new(),
            notes: Vec::new(),
            next_action: default_next_action(),
            extra: Map::new(),
        }
    }

    /// Append messages, keeping only the most recent [`MAX_MESSAGES`].
    pub fn push_messages(&mut self, messages: impl IntoIterator<Item = ConversationMessage>) {
        self.messages.extend(messages);
        if self.messages.len() > MAX_MESSAGES {
            let overflow = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..overflow);
        }
    }

    /// Recompute `progress` against the required field list.
    pub fn recompute_progress(&mut self, required_fields: &[String]) {
        self.progress = compute_progress(&self.collected_data, required_fields);
    }

    /// Current time, never earlier than the timestamps already recorded.
    pub(crate) fn clock(&self) -> DateTime<Utc> {
        Utc::now().max(self.last_update).max(self.last_access)
    }
}

/// `round(100 * present / total)`; an empty required list yields 0.
pub fn compute_progress(data: &Map<String, Value>, required_fields: &[String]) -> u8 {
    if required_fields.is_empty() {
        return 0;
    }
    let present = required_fields
        .iter()
        .filter(|field| data.get(field.as_str()).is_some_and(is_present))
        .count();
    (100.0 * present as f64 / required_fields.len() as f64).round() as u8
}

/// A collected value counts once it is non-null, non-empty, non-zero and not
/// `false`. Whitespace-only strings count.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Partial update merged over the freshest stored record.
///
/// Merge rules: scalars override; `collected_data` merges by key; `extra`
/// overrides by key and merges one level into nested objects; `tags` and
/// `notes` replace; `messages` append and are capped to [`MAX_MESSAGES`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub messages: Vec<ConversationMessage>,
    pub collected_data: Option<Map<String, Value>>,
    pub lead_score: Option<i64>,
    pub next_action: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<Vec<String>>,
    pub extra: Map<String, Value>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ConversationMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn collected_data(mut self, fields: Map<String, Value>) -> Self {
        self.collected_data = Some(fields);
        self
    }

    pub fn lead_score(mut self, score: i64) -> Self {
        self.lead_score = Some(score);
        self
    }

    pub fn next_action(mut self, action: impl Into<String>) -> Self {
        self.next_action = Some(action.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn notes(mut self, notes: Vec<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Set a free-form top-level field. Names of typed fields are ignored.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if is_reserved_field(&key) {
            warn!(field = %key, "Ignoring extra field that shadows a typed context field");
            return self;
        }
        self.extra.insert(key, value.into());
        self
    }

    /// Apply onto `context`. Returns whether collected data changed.
    pub fn apply_to(self, context: &mut ConversationContext) -> bool {
        context.push_messages(self.messages);

        let data_changed = match self.collected_data {
            Some(fields) => {
                context.collected_data.extend(fields);
                true
            }
            None => false,
        };

        if let Some(score) = self.lead_score {
            context.lead_score = score;
        }
        if let Some(action) = self.next_action {
            context.next_action = action;
        }
        if let Some(tags) = self.tags {
            context.tags = tags;
        }
        if let Some(notes) = self.notes {
            context.notes = notes;
        }

        for (key, value) in self.extra {
            if is_reserved_field(&key) {
                warn!(field = %key, "Ignoring extra field that shadows a typed context field");
                continue;
            }
            let nested = matches!(
                (context.extra.get(&key), &value),
                (Some(Value::Object(_)), Value::Object(_))
            );
            match value {
                Value::Object(incoming) if nested => {
                    if let Some(Value::Object(existing)) = context.extra.get_mut(&key) {
                        existing.extend(incoming);
                    }
                }
                value => {
                    context.extra.insert(key, value);
                }
            }
        }

        data_changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub active_conversations: usize,
    pub memory_usage: String,
    /// Store uptime in seconds
    pub uptime: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Keys that had no expiration and received the default TTL
    pub cleaned: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn required() -> Vec<String> {
        ["nome", "cpf", "telefone", "email", "renda", "entrada"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_context_defaults() {
        let ctx = ConversationContext::new("abc");
        assert_eq!(ctx.conversation_id, "abc");
        assert_eq!(ctx.message_count, 0);
        assert!(ctx.messages.is_empty());
        assert_eq!(ctx.progress, 0);
        assert_eq!(ctx.next_action, "qualify");
        assert_eq!(ctx.created_at, ctx.last_update);
    }

    #[test]
    fn test_progress_rounding() {
        let data = map(json!({ "nome": "Ana", "cpf": "12345678900" }));
        assert_eq!(compute_progress(&data, &required()), 33);

        let data = map(json!({ "nome": "Ana", "cpf": "1", "email": "a@b.c", "renda": 5000 }));
        assert_eq!(compute_progress(&data, &required()), 67);
    }

    #[test]
    fn test_progress_ignores_empty_values() {
        let data = map(json!({ "nome": "", "cpf": null, "renda": 0, "entrada": false, "email": "x@y.z" }));
        assert_eq!(compute_progress(&data, &required()), 17);
        assert_eq!(compute_progress(&data, &[]), 0);
    }

    #[test]
    fn test_progress_counts_whitespace_strings() {
        let data = map(json!({ "nome": " ", "cpf": "1" }));
        assert_eq!(compute_progress(&data, &required()), 33);
    }

    #[test]
    fn test_push_messages_keeps_most_recent() {
        let mut ctx = ConversationContext::new("abc");
        ctx.push_messages((0..25).map(|i| ConversationMessage::new(Role::User, format!("m{}", i))));

        assert_eq!(ctx.messages.len(), MAX_MESSAGES);
        assert_eq!(ctx.messages.first().unwrap().content, "m5");
        assert_eq!(ctx.messages.last().unwrap().content, "m24");
    }

    #[test]
    fn test_patch_merges_collected_data_and_replaces_lists() {
        let mut ctx = ConversationContext::new("abc");
        ctx.collected_data = map(json!({ "nome": "Ana", "cpf": "1" }));
        ctx.tags = vec!["old".into()];

        let changed = ContextPatch::new()
            .collected_data(map(json!({ "cpf": "2", "email": "a@b.c" })))
            .tags(vec!["hot".into()])
            .apply_to(&mut ctx);

        assert!(changed);
        assert_eq!(ctx.collected_data, map(json!({ "nome": "Ana", "cpf": "2", "email": "a@b.c" })));
        assert_eq!(ctx.tags, vec!["hot".to_string()]);
    }

    #[test]
    fn test_patch_merges_nested_extra_one_level() {
        let mut ctx = ConversationContext::new("abc");
        ctx.extra.insert("interest".into(), json!({ "project": "A", "budget": { "min": 1 } }));

        ContextPatch::new()
            .extra("interest", json!({ "budget": { "max": 9 } }))
            .extra("channel", "whatsapp")
            .apply_to(&mut ctx);

        // one level only: `budget` is replaced, not merged
        assert_eq!(ctx.extra["interest"], json!({ "project": "A", "budget": { "max": 9 } }));
        assert_eq!(ctx.extra["channel"], json!("whatsapp"));
    }

    #[test]
    fn test_extra_cannot_shadow_typed_fields() {
        let mut ctx = ConversationContext::new("abc");
        ctx.message_count = 3;

        let mut patch = ContextPatch::new()
            .extra("messageCount", 99)
            .extra("createdAt", "1970-01-01T00:00:00Z")
            .extra("channel", "whatsapp");
        assert!(!patch.extra.contains_key("messageCount"));

        // direct field access bypasses the builder
        patch.extra.insert("conversationId".into(), json!("other"));
        patch.apply_to(&mut ctx);

        assert_eq!(ctx.message_count, 3);
        assert_eq!(ctx.conversation_id, "abc");
        assert_eq!(ctx.extra.len(), 1);

        let raw = serde_json::to_string(&ctx).unwrap();
        let back: ConversationContext = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let ctx = ConversationContext::new("abc");
        let value = serde_json::to_value(&ctx).unwrap();
        for field in [
            "conversationId",
            "createdAt",
            "lastUpdate",
            "lastAccess",
            "messageCount",
            "collectedData",
            "leadScore",
            "nextAction",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_unknown_fields_round_trip_through_extra() {
        let raw = json!({
            "conversationId": "abc",
            "createdAt": "2026-01-01T00:00:00Z",
            "lastUpdate": "2026-01-01T00:00:00Z",
            "lastAccess": "2026-01-01T00:00:00Z",
            "empreendimentoInteresse": "Farol"
        });
        let ctx: ConversationContext = serde_json::from_value(raw).unwrap();
        assert_eq!(ctx.extra["empreendimentoInteresse"], json!("Farol"));
        assert_eq!(ctx.next_action, "qualify");

        let back = serde_json::to_value(&ctx).unwrap();
        assert_eq!(back["empreendimentoInteresse"], json!("Farol"));
    }
}
