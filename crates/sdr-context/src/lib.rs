//! # SDR Context
//!
//! Conversation context persistence over an expiring key-value store.
//!
//! Records live under `<prefix><conversation_id>` as JSON and carry a sliding
//! TTL: every write resets the expiration clock.

pub mod backend;
pub mod error;
pub mod store;
pub mod types;

pub use backend::{KeyTtl, KvBackend, MemoryBackend, RedisBackend, ServerInfo};
pub use error::StoreError;
pub use store::ContextStore;
pub use types::{
    CleanupReport, ContextPatch, ContextStats, ConversationContext, ConversationMessage, Role, MAX_MESSAGES,
    RESERVED_FIELDS,
};
