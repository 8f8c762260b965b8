//! Session store — assistant UI state with write-through persistence.
//!
//! Every mutation of a persisted field (`messages`, `current_module_context`)
//! writes the whole persisted subset to local storage while the write lock is
//! held, so the stored blob always matches the last mutation. UI flags
//! (`is_open`, `is_loading`, `is_speech_input_active`) live in memory only.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use super::model::{Message, MessageKind, NewMessage, PersistedSession, Session};
use crate::config::SESSION_STORAGE_KEY;
use crate::error::StoreError;
use crate::store::LocalStorage;

pub struct SessionStore {
    state: RwLock<Session>,
    storage: Arc<dyn LocalStorage>,
    key: String,
    /// Bumped after every change; renderers watch it.
    revision: watch::Sender<u64>,
}

impl SessionStore {
    /// Open the store under the default storage key, hydrating from storage.
    pub async fn open(storage: Arc<dyn LocalStorage>) -> Result<Arc<Self>, StoreError> {
        Self::open_with_key(storage, SESSION_STORAGE_KEY).await
    }

    /// Open the store under `key`, hydrating from storage if a blob exists.
    pub async fn open_with_key(
        storage: Arc<dyn LocalStorage>,
        key: impl Into<String>,
    ) -> Result<Arc<Self>, StoreError> {
        let key = key.into();
        let persisted = match storage.get_item(&key).await? {
            Some(blob) => match serde_json::from_str::<PersistedSession>(&blob) {
                Ok(p) => p,
                Err(e) => {
                    warn!(key = %key, error = %e, "Stored session unreadable, starting fresh");
                    PersistedSession::default()
                }
            },
            None => PersistedSession::default(),
        };

        debug!(key = %key, messages = persisted.messages.len(), "Session store opened");

        let session = Session {
            messages: persisted.messages,
            current_module_context: persisted.current_module_context,
            ..Session::default()
        };
        let (revision, _) = watch::channel(0);

        Ok(Arc::new(Self {
            state: RwLock::new(session),
            storage,
            key,
            revision,
        }))
    }

    /// Watch for changes. The value is a monotonically increasing revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn current_module_context(&self) -> Option<String> {
        self.state.read().await.current_module_context.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    /// Flip the panel open/closed. Returns the new value.
    pub async fn toggle_open(&self) -> bool {
        let open = {
            let mut state = self.state.write().await;
            state.is_open = !state.is_open;
            state.is_open
        };
        self.bump();
        open
    }

    /// Append a message with a fresh id and timestamp.
    pub async fn add_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        let stored = message.into_message();
        state.messages.push(stored.clone());
        self.persist(&state).await?;
        drop(state);
        self.bump();
        Ok(stored)
    }

    /// Replace the content of the final message. No-op on an empty list.
    pub async fn update_last_message(&self, content: impl Into<String>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let Some(last) = state.messages.last_mut() else {
            return Ok(());
        };
        last.content = content.into();
        self.persist(&state).await?;
        drop(state);
        self.bump();
        Ok(())
    }

    /// Replace content and kind of the final message. No-op on an empty list.
    pub async fn finish_last_message(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let Some(last) = state.messages.last_mut() else {
            return Ok(());
        };
        last.content = content.into();
        last.kind = Some(kind);
        self.persist(&state).await?;
        drop(state);
        self.bump();
        Ok(())
    }

    pub async fn clear_messages(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.messages.clear();
        self.persist(&state).await?;
        drop(state);
        self.bump();
        Ok(())
    }

    pub async fn set_current_module_context(
        &self,
        context: Option<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.current_module_context = context;
        self.persist(&state).await?;
        drop(state);
        self.bump();
        Ok(())
    }

    pub async fn set_is_loading(&self, loading: bool) {
        self.state.write().await.is_loading = loading;
        self.bump();
    }

    pub async fn set_speech_input_active(&self, active: bool) {
        self.state.write().await.is_speech_input_active = active;
        self.bump();
    }

    async fn persist(&self, state: &Session) -> Result<(), StoreError> {
        let blob = serde_json::to_string(&PersistedSession::from(state)).map_err(|e| {
            StoreError::Serialize {
                key: self.key.clone(),
                reason: e.to_string(),
            }
        })?;
        self.storage.set_item(&self.key, &blob).await?;
        Ok(())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}
