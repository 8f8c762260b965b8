//! Assistant conversation types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Presentation hint for a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Markdown,
    Code,
    Error,
    Loading,
    Success,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

impl Message {
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// A message before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub kind: Option<MessageKind>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            kind: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Stamp with a fresh id and the current time.
    pub(crate) fn into_message(self) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            role: self.role,
            content: self.content,
            timestamp: Utc::now().timestamp_millis(),
            kind: self.kind,
        }
    }
}

/// Full assistant UI state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub is_open: bool,
    pub messages: Vec<Message>,
    pub current_module_context: Option<String>,
    pub is_loading: bool,
    pub is_speech_input_active: bool,
}

/// The subset of [`Session`] that survives a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSession {
    pub messages: Vec<Message>,
    pub current_module_context: Option<String>,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            messages: session.messages.clone(),
            current_module_context: session.current_module_context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_serializes_as_type() {
        let msg = NewMessage::assistant("hi")
            .with_kind(MessageKind::Markdown)
            .into_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "markdown");
        assert_eq!(json["role"], "assistant");
        assert!(json["timestamp"].is_i64());

        let plain = NewMessage::user("hey").into_message();
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("type").is_none());
    }

    #[test]
    fn persisted_session_tolerates_missing_fields() {
        let p: PersistedSession = serde_json::from_str("{}").unwrap();
        assert!(p.messages.is_empty());
        assert!(p.current_module_context.is_none());

        let p: PersistedSession =
            serde_json::from_str(r#"{"currentModuleContext":"Dashboard","extra":1}"#).unwrap();
        assert_eq!(p.current_module_context.as_deref(), Some("Dashboard"));
    }

    #[test]
    fn fresh_messages_get_distinct_ids() {
        let a = NewMessage::user("a").into_message();
        let b = NewMessage::user("a").into_message();
        assert_ne!(a.id, b.id);
    }
}
