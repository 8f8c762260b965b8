//! AI assistant — session state, context, voice input, dispatch and rendering.

pub mod backend;
pub mod cli;
pub mod context;
pub mod dispatcher;
pub mod model;
pub mod render;
pub mod routes;
pub mod shortcut;
pub mod speech;
pub mod store;

pub use backend::{ChatBackend, ChatRequest, build_backend};
pub use context::{ContextResolver, ModuleContext};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use model::{Message, MessageKind, NewMessage, Role, Session};
pub use render::{ConversationRenderer, ConversationView, render_terminal};
pub use routes::{AssistantState, assistant_routes};
pub use shortcut::{KeyPress, Shortcut, handle_key};
pub use speech::{CommandRecognizer, SpeechInput, SpeechOptions, SpeechRecognizer};
pub use store::SessionStore;
