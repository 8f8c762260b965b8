//! Conversation renderer — turns session messages into a view model.

use std::sync::Mutex;

use serde::Serialize;

use super::model::{Message, MessageKind, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl From<Role> for Side {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Side::Right,
            Role::Assistant | Role::System => Side::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bubble {
    pub id: String,
    pub role: Role,
    pub side: Side,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    /// Typing indicator on the in-flight assistant reply.
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub bubbles: Vec<Bubble>,
    /// Id of the newest message; the view scrolls it into sight.
    pub scroll_anchor: Option<String>,
    /// The list changed since the previous render.
    pub needs_scroll: bool,
}

/// What the last render saw: message count and newest content.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    len: usize,
    last_content: Option<String>,
}

impl Signature {
    fn of(messages: &[Message]) -> Self {
        Self {
            len: messages.len(),
            last_content: messages.last().map(|m| m.content.clone()),
        }
    }
}

#[derive(Default)]
pub struct ConversationRenderer {
    last: Mutex<Option<Signature>>,
}

impl ConversationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `messages` differ from what the previous render saw.
    pub fn observe(&self, messages: &[Message]) -> bool {
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref() != Some(&Signature::of(messages))
    }

    pub fn render(&self, messages: &[Message], is_loading: bool) -> ConversationView {
        let needs_scroll = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            let sig = Signature::of(messages);
            let changed = last.as_ref() != Some(&sig);
            *last = Some(sig);
            changed
        };

        let typing_index = if is_loading {
            messages.iter().rposition(Message::is_assistant)
        } else {
            None
        };

        let bubbles = messages
            .iter()
            .enumerate()
            .map(|(i, m)| Bubble {
                id: m.id.clone(),
                role: m.role,
                side: m.role.into(),
                content: m.content.clone(),
                kind: m.kind.unwrap_or(MessageKind::Text),
                timestamp: m.timestamp,
                typing: typing_index == Some(i),
            })
            .collect();

        ConversationView {
            bubbles,
            scroll_anchor: messages.last().map(|m| m.id.clone()),
            needs_scroll,
        }
    }
}

/// Plain-text rendering for the terminal chat.
pub fn render_terminal(view: &ConversationView) -> String {
    let mut out = String::new();
    for bubble in &view.bubbles {
        let label = match bubble.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        let body = if bubble.typing && bubble.content.is_empty() {
            "…".to_string()
        } else {
            bubble.content.clone()
        };
        let marker = match bubble.kind {
            MessageKind::Error => "❌ ",
            MessageKind::Success => "✅ ",
            _ => "",
        };
        match bubble.side {
            Side::Right => out.push_str(&format!("{:>60}\n", format!("{body} <{label}"))),
            Side::Left => out.push_str(&format!("{label}> {marker}{body}\n")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::model::NewMessage;

    fn conversation() -> Vec<Message> {
        vec![
            NewMessage::user("hello").into_message(),
            NewMessage::assistant("hi!").with_kind(MessageKind::Markdown).into_message(),
            NewMessage::user("how are you").into_message(),
            NewMessage::assistant("").with_kind(MessageKind::Loading).into_message(),
        ]
    }

    #[test]
    fn bubbles_follow_message_order_and_sides() {
        let msgs = conversation();
        let view = ConversationRenderer::new().render(&msgs, false);
        assert_eq!(view.bubbles.len(), 4);
        for (b, m) in view.bubbles.iter().zip(&msgs) {
            assert_eq!(b.id, m.id);
        }
        assert_eq!(view.bubbles[0].side, Side::Right);
        assert_eq!(view.bubbles[1].side, Side::Left);
        assert_eq!(view.bubbles[0].kind, MessageKind::Text);
        assert_eq!(view.scroll_anchor.as_deref(), Some(msgs[3].id.as_str()));
        assert!(view.bubbles.iter().all(|b| !b.typing));
    }

    #[test]
    fn typing_marks_only_last_assistant_while_loading() {
        let msgs = conversation();
        let view = ConversationRenderer::new().render(&msgs, true);
        let typing: Vec<_> = view.bubbles.iter().map(|b| b.typing).collect();
        assert_eq!(typing, vec![false, false, false, true]);
    }

    #[test]
    fn system_messages_sit_left() {
        let msgs = vec![NewMessage::system("Context switched").into_message()];
        let view = ConversationRenderer::new().render(&msgs, false);
        assert_eq!(view.bubbles[0].side, Side::Left);
    }

    #[test]
    fn needs_scroll_tracks_length_and_last_content() {
        let renderer = ConversationRenderer::new();
        let mut msgs = conversation();

        assert!(renderer.render(&msgs, true).needs_scroll);
        assert!(!renderer.observe(&msgs));
        assert!(!renderer.render(&msgs, true).needs_scroll);

        msgs.last_mut().unwrap().content = "partial".into();
        assert!(renderer.observe(&msgs));
        assert!(renderer.render(&msgs, true).needs_scroll);

        msgs.push(NewMessage::user("more").into_message());
        assert!(renderer.render(&msgs, false).needs_scroll);
    }

    #[test]
    fn empty_conversation_has_no_anchor() {
        let view = ConversationRenderer::new().render(&[], false);
        assert!(view.bubbles.is_empty());
        assert!(view.scroll_anchor.is_none());
    }

    #[test]
    fn terminal_output_labels_roles() {
        let mut msgs = conversation();
        msgs.push(
            NewMessage::assistant("Sorry")
                .with_kind(MessageKind::Error)
                .into_message(),
        );
        let text = render_terminal(&ConversationRenderer::new().render(&msgs, false));
        assert!(text.contains("hello <you"));
        assert!(text.contains("assistant> hi!"));
        assert!(text.contains("assistant> ❌ Sorry"));
    }
}
