//! Message dispatcher — turns user input into a backend round trip.
//!
//! A send appends the user message and an empty `loading` assistant
//! placeholder, streams partial replies into the placeholder and finishes it
//! with the final reply (`markdown`) or the apology (`error`). The loading flag
//! is reset whatever happens.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::{ChatBackend, ChatRequest};
use super::model::{Message, MessageKind, NewMessage, Role};
use super::store::SessionStore;
use crate::bridge::ChatTurn;
use crate::error::DispatchError;

/// Shown in place of a reply when the backend fails.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Default deadline for one backend call.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// System prompt for the current module context.
pub fn system_prompt(context: Option<&str>) -> String {
    match context {
        Some(ctx) => format!(
            "You are a helpful assistant. The user is currently in the following module context: {ctx}. Use this context to provide more relevant answers."
        ),
        None => "You are a helpful assistant for the application.".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Blank input; nothing changed.
    Ignored,
    /// The placeholder now holds the backend reply.
    Replied(String),
    /// The placeholder now holds the apology; carries the cause.
    Failed(String),
}

pub struct Dispatcher {
    store: Arc<SessionStore>,
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn ChatBackend>, timeout: Duration) -> Self {
        Self {
            store,
            backend,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn send(&self, text: &str) -> Result<DispatchOutcome, DispatchError> {
        self.send_with_cancel(text, CancellationToken::new()).await
    }

    /// Send `text`; `cancel` aborts the backend call. Only storage failures
    /// surface as `Err`; backend failures end up in the conversation.
    pub async fn send_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank input");
            return Ok(DispatchOutcome::Ignored);
        }

        let prior = self.store.messages().await;
        let context = self.store.current_module_context().await;

        self.store.add_message(NewMessage::user(text)).await?;
        self.store.set_is_loading(true).await;

        let outcome = self.exchange(text, &prior, context.as_deref(), cancel).await;

        self.store.set_is_loading(false).await;
        outcome
    }

    async fn exchange(
        &self,
        text: &str,
        prior: &[Message],
        context: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.store
            .add_message(NewMessage::assistant("").with_kind(MessageKind::Loading))
            .await?;

        let request = ChatRequest {
            system_prompt: system_prompt(context),
            history: history(prior, text),
        };

        info!(
            backend = self.backend.name(),
            turns = request.history.len(),
            has_context = context.is_some(),
            "Dispatching message"
        );

        let (updates, mut partials) = mpsc::unbounded_channel();
        let call = self.backend.complete(request, updates, cancel.clone());

        let result = tokio::time::timeout(self.timeout, async {
            tokio::pin!(call);
            loop {
                tokio::select! {
                    biased;
                    Some(partial) = partials.recv() => {
                        if let Err(e) = self.store.update_last_message(partial).await {
                            warn!(error = %e, "Failed to persist partial reply");
                        }
                    }
                    result = &mut call => break result,
                }
            }
        })
        .await;

        let outcome = match result {
            Ok(Ok(reply)) => {
                self.store
                    .finish_last_message(reply.clone(), MessageKind::Markdown)
                    .await?;
                DispatchOutcome::Replied(reply)
            }
            Ok(Err(e)) => {
                error!(backend = self.backend.name(), error = %e, "Error sending message");
                self.store
                    .finish_last_message(ERROR_REPLY, MessageKind::Error)
                    .await?;
                DispatchOutcome::Failed(e.to_string())
            }
            Err(_) => {
                cancel.cancel();
                let e = DispatchError::Timeout(self.timeout);
                error!(backend = self.backend.name(), error = %e, "Error sending message");
                self.store
                    .finish_last_message(ERROR_REPLY, MessageKind::Error)
                    .await?;
                DispatchOutcome::Failed(e.to_string())
            }
        };
        Ok(outcome)
    }
}

/// Prior conversation plus the new user turn. Loading placeholders and
/// apologies are not sent back to the model.
fn history(prior: &[Message], text: &str) -> Vec<ChatTurn> {
    prior
        .iter()
        .filter(|m| !matches!(m.kind, Some(MessageKind::Loading | MessageKind::Error)))
        .filter(|m| !m.content.is_empty() && m.role != Role::System)
        .map(|m| ChatTurn::new(m.role.as_str(), m.content.clone()))
        .chain(std::iter::once(ChatTurn::new("user", text)))
        .collect()
}
