use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    ConversationFlow, ConversationState, EntityKind, HistoryEntry, InputCategory, LastAction,
};
use crate::analysis::Entities;
use crate::config::ContextConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::KvStore;

/// Result of reading a user's state.
enum Loaded {
    /// Stored state, or a fresh one when nothing usable was stored. Saved back.
    Owned(ConversationState),
    /// The read failed; the stored value may be intact and is never overwritten.
    Detached(ConversationState),
}

/// Key under which a user's state is persisted.
pub fn context_key(user_id: &str) -> String {
    format!("conversation:{}", user_id)
}

/// Evolves per-user [`ConversationState`] through a [`KvStore`].
///
/// Every operation is a read-modify-write that refreshes the TTL. Storage
/// failures never fail the caller: a failed read yields a fresh in-memory
/// state that is not written back, and failed writes are logged and dropped.
///
/// Concurrent turns from the same user are last-write-wins.
#[derive(Clone)]
pub struct ContextStore {
    kv: Arc<dyn KvStore>,
    config: ContextConfig,
}

impl ContextStore {
    pub fn new(kv: Arc<dyn KvStore>, config: ContextConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Current state, created on first access.
    pub async fn get_context(&self, user_id: &str) -> ConversationState {
        match self.load(user_id).await {
            Loaded::Owned(state) => {
                self.save(&state).await;
                state
            }
            Loaded::Detached(state) => state,
        }
    }

    /// Append a user turn and remember the entities it mentioned.
    ///
    /// While a flow is in progress, the slots also fill `pending_data`.
    pub async fn record_user_message(
        &self,
        user_id: &str,
        text: &str,
        intent: Option<&str>,
        slots: &Entities,
    ) -> ConversationState {
        self.update(user_id, |state, config| {
            let mut entry = HistoryEntry::user(text);
            if let Some(intent) = intent {
                entry = entry.with_intent(intent);
            }
            state.push_history(entry, config.history_limit);
            state
                .mentioned_entities
                .remember(slots, config.entity_limit);
            if state.current_flow.is_some() {
                for (key, value) in slots {
                    state.pending_data.insert(key.clone(), value.clone());
                }
            }
        })
        .await
    }

    /// Append a bot turn.
    pub async fn record_bot_response(
        &self,
        user_id: &str,
        text: &str,
        meta: Option<Value>,
    ) -> ConversationState {
        self.update(user_id, |state, config| {
            let mut entry = HistoryEntry::bot(text);
            if let Some(meta) = meta {
                entry = entry.with_meta(meta);
            }
            state.push_history(entry, config.history_limit);
        })
        .await
    }

    /// Record a task handler outcome and keep it as the action's undo point.
    pub async fn record_task_result(
        &self,
        user_id: &str,
        action: &str,
        input: Value,
        result: Value,
    ) -> ConversationState {
        self.update(user_id, |state, config| {
            let entry = HistoryEntry::task(action, input.clone(), result.clone());
            state.last_actions.insert(
                action.to_string(),
                LastAction {
                    input,
                    result,
                    timestamp: entry.timestamp,
                },
            );
            state.push_history(entry, config.history_limit);
        })
        .await
    }

    /// Enter `flow`, awaiting exactly `categories`, with `pending` slots.
    pub async fn set_expected_input(
        &self,
        user_id: &str,
        flow: ConversationFlow,
        categories: &[InputCategory],
        pending: Entities,
    ) -> ConversationState {
        self.update(user_id, |state, _| {
            state.current_flow = Some(flow);
            state.expecting_input = categories.iter().copied().collect();
            state.pending_data = pending;
            state.updated_at = Utc::now();
        })
        .await
    }

    pub async fn is_expecting_input(&self, user_id: &str, category: InputCategory) -> bool {
        self.get_context(user_id).await.is_expecting(category)
    }

    /// Leave the current flow and drop pending slots.
    pub async fn clear_expected_input(&self, user_id: &str) -> ConversationState {
        self.update(user_id, |state, _| state.clear_expected()).await
    }

    /// Delete the user's state. Returns whether anything was stored.
    pub async fn clear_context(&self, user_id: &str) -> bool {
        match self.kv.del(&context_key(user_id)).await {
            Ok(removed) => {
                debug!(user_id = %user_id, removed, "Context cleared");
                removed
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to clear context");
                false
            }
        }
    }

    /// The last `n` history entries, oldest first.
    pub async fn recent_history(&self, user_id: &str, n: usize) -> Vec<HistoryEntry> {
        self.get_context(user_id).await.recent_history(n).to_vec()
    }

    /// Most recent result of `action`, for undo.
    pub async fn last_action(&self, user_id: &str, action: &str) -> Option<LastAction> {
        self.get_context(user_id)
            .await
            .last_actions
            .get(action)
            .cloned()
    }

    /// Most recently mentioned entity of `kind`.
    pub async fn resolve_entity(&self, user_id: &str, kind: EntityKind) -> Option<String> {
        self.get_context(user_id)
            .await
            .mentioned_entities
            .get(kind)
            .most_recent()
            .map(str::to_string)
    }

    async fn update<F>(&self, user_id: &str, apply: F) -> ConversationState
    where
        F: FnOnce(&mut ConversationState, &ContextConfig),
    {
        match self.load(user_id).await {
            Loaded::Owned(mut state) => {
                apply(&mut state, &self.config);
                self.save(&state).await;
                state
            }
            Loaded::Detached(mut state) => {
                apply(&mut state, &self.config);
                state
            }
        }
    }

    async fn load(&self, user_id: &str) -> Loaded {
        let raw = match self.kv.get(&context_key(user_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Context store unavailable, using empty state"
                );
                return Loaded::Detached(ConversationState::new(user_id));
            }
        };

        let Some(raw) = raw else {
            debug!(user_id = %user_id, "Creating conversation state");
            return Loaded::Owned(ConversationState::new(user_id));
        };

        match self.decode(user_id, &raw) {
            Ok(state) => Loaded::Owned(state),
            // Unreadable JSON can never be recovered, so it is replaced
            Err(e @ StorageError::Serialization(_)) => {
                warn!(user_id = %user_id, error = %e, "Replacing unreadable conversation state");
                Loaded::Owned(ConversationState::new(user_id))
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Stored state rejected, leaving it untouched");
                Loaded::Detached(ConversationState::new(user_id))
            }
        }
    }

    fn decode(&self, user_id: &str, raw: &str) -> StorageResult<ConversationState> {
        let mut state: ConversationState = serde_json::from_str(raw)?;
        if state.user_id != user_id {
            return Err(StorageError::Query {
                message: format!("stored state belongs to {}", state.user_id),
            });
        }
        // Limits may have shrunk since the state was written
        if state.history.len() > self.config.history_limit {
            let overflow = state.history.len() - self.config.history_limit;
            state.history.drain(..overflow);
        }
        Ok(state)
    }

    async fn save(&self, state: &ConversationState) {
        let result = match serde_json::to_string(state) {
            Ok(json) => {
                self.kv
                    .set(&context_key(&state.user_id), &json, self.config.ttl_seconds)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(
                user_id = %state.user_id,
                error = %e,
                "Failed to persist conversation state"
            );
        }
    }
}
