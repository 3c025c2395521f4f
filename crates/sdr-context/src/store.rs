//! Conversation context store
//!
//! Read-merge-write over a shared key-value backend. Updates always merge
//! against the freshest stored record. There is no transactional guard:
//! concurrent updates to the same conversation race and the last write wins.
//! A conversation is expected to be driven by one handler at a time.

use sdr_shared::StoreSettings;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{KeyTtl, KvBackend, RedisBackend};
use crate::error::StoreError;
use crate::types::{CleanupReport, ContextPatch, ContextStats, ConversationContext, ConversationMessage, Role};

pub struct ContextStore<B: KvBackend> {
    backend: Arc<B>,
    settings: StoreSettings,
}

impl ContextStore<RedisBackend> {
    /// Connect to Redis using resolved settings.
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let backend = RedisBackend::connect(settings).await?;
        Ok(Self::new(Arc::new(backend), settings))
    }
}

impl<B: KvBackend> ContextStore<B> {
    pub fn new(backend: Arc<B>, settings: &StoreSettings) -> Self {
        Self {
            backend,
            settings: settings.clone(),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.settings.ttl_secs
    }

    fn key(&self, conversation_id: &str) -> String {
        self.settings.key_for(conversation_id)
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationContext>, StoreError> {
        match self.backend.get(&self.key(conversation_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, context: &ConversationContext) -> Result<(), StoreError> {
        let key = self.key(&context.conversation_id);
        let payload = serde_json::to_string(context)?;
        self.backend.set_ex(&key, &payload, self.settings.ttl_secs).await.map_err(|e| {
            error!(key = %key, error = %e, "Error saving context");
            e
        })
    }

    /// Stored context, or a fresh default when absent. Never fails: read and
    /// parse errors degrade to a default record. Does not write.
    pub async fn get(&self, conversation_id: &str) -> ConversationContext {
        match self.load(conversation_id).await {
            Ok(Some(context)) => context,
            Ok(None) => {
                debug!(conversation_id, "No stored context, using initial context");
                ConversationContext::new(conversation_id)
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Error getting context, using initial context");
                ConversationContext::new(conversation_id)
            }
        }
    }

    /// Merge `patch` over the stored record, bump `messageCount` and write
    /// back with a fresh TTL.
    pub async fn update(&self, conversation_id: &str, patch: ContextPatch) -> Result<ConversationContext, StoreError> {
        let mut context = match self.load(conversation_id).await {
            Ok(Some(context)) => context,
            Ok(None) => ConversationContext::new(conversation_id),
            Err(StoreError::Serialization(e)) => {
                warn!(conversation_id, error = %e, "Stored context unreadable, replacing with initial context");
                ConversationContext::new(conversation_id)
            }
            Err(e) => {
                error!(conversation_id, error = %e, "Error updating context");
                return Err(e);
            }
        };

        if patch.apply_to(&mut context) {
            context.recompute_progress(&self.settings.required_fields);
        }

        let now = context.clock();
        context.message_count += 1;
        context.last_update = now;
        context.last_access = now;

        self.save(&context).await?;
        debug!(conversation_id, message_count = context.message_count, "Context updated");
        Ok(context)
    }

    /// Append a message (history capped to the most recent 20) and update.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        content: impl Into<String>,
        role: Role,
    ) -> Result<ConversationContext, StoreError> {
        let patch = ContextPatch::new().message(ConversationMessage::new(role, content));
        self.update(conversation_id, patch).await
    }

    /// Merge collected fields, recompute `progress` and update.
    pub async fn update_collected_data(
        &self,
        conversation_id: &str,
        fields: Map<String, Value>,
    ) -> Result<ConversationContext, StoreError> {
        self.update(conversation_id, ContextPatch::new().collected_data(fields)).await
    }

    /// Record an access without counting an update. Absent conversations are
    /// not created.
    pub async fn touch(&self, conversation_id: &str) -> Result<ConversationContext, StoreError> {
        let Some(mut context) = self.load(conversation_id).await? else {
            return Ok(ConversationContext::new(conversation_id));
        };
        context.last_access = context.clock();
        self.save(&context).await?;
        Ok(context)
    }

    /// Delete the record. Missing keys count as cleared; never fails.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        match self.backend.del(&self.key(conversation_id)).await {
            Ok(_) => true,
            Err(e) => {
                error!(conversation_id, error = %e, "Error clearing context");
                false
            }
        }
    }

    /// Best-effort usage statistics; `None` when the store is unavailable.
    pub async fn stats(&self) -> Option<ContextStats> {
        let result = async {
            let keys = self.backend.keys_with_prefix(&self.settings.prefix).await?;
            let info = self.backend.server_info().await?;
            Ok::<_, StoreError>(ContextStats {
                active_conversations: keys.len(),
                memory_usage: info.memory_usage,
                uptime: info.uptime_secs,
            })
        }
        .await;

        result
            .map_err(|e| error!(error = %e, "Error getting stats"))
            .ok()
    }

    /// Give every namespaced key without an expiration the default TTL.
    pub async fn cleanup_expired(&self) -> Option<CleanupReport> {
        let result = async {
            let keys = self.backend.keys_with_prefix(&self.settings.prefix).await?;
            let mut cleaned = 0;
            for key in &keys {
                if self.backend.ttl(key).await? == KeyTtl::Persistent {
                    self.backend.expire(key, self.settings.ttl_secs).await?;
                    cleaned += 1;
                }
            }
            Ok::<_, StoreError>(CleanupReport {
                cleaned,
                total: keys.len(),
            })
        }
        .await;

        match result {
            Ok(report) => {
                info!(cleaned = report.cleaned, total = report.total, "Context cleanup finished");
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Error cleaning up");
                None
            }
        }
    }

    pub async fn disconnect(&self) {
        self.backend.close().await;
    }
}
