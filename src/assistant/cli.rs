//! Terminal chat — stdin/stdout front end for local use.
//!
//! Plain lines are sent through the dispatcher. Slash commands:
//! `/clear`, `/toggle`, `/context <path>`, `/listen`, `/stop`, `/theme`,
//! `/sidebar`, `/key <chord>` (e.g. `/key Alt+A`), `/quit`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;

use super::context::ContextResolver;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::render::{ConversationRenderer, render_terminal};
use super::shortcut::{KeyPress, Shortcut, handle_key};
use super::speech::{SpeechInput, SpeechOptions, SpeechRecognizer};
use super::store::SessionStore;
use crate::preferences::PreferencesStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Clear,
    Toggle,
    Context(String),
    Listen,
    Stop,
    Theme,
    Sidebar,
    /// A key chord typed as text, e.g. `Alt+A`.
    Key(String),
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        Some(match name {
            "clear" => Command::Clear,
            "toggle" => Command::Toggle,
            "context" => Command::Context(arg.to_string()),
            "listen" => Command::Listen,
            "stop" => Command::Stop,
            "theme" => Command::Theme,
            "sidebar" => Command::Sidebar,
            "key" => Command::Key(arg.to_string()),
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

pub struct TerminalChat {
    store: Arc<SessionStore>,
    dispatcher: Arc<Dispatcher>,
    resolver: Arc<ContextResolver>,
    prefs: Arc<PreferencesStore>,
    renderer: ConversationRenderer,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
}

impl TerminalChat {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        resolver: Arc<ContextResolver>,
        prefs: Arc<PreferencesStore>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        Self {
            store: dispatcher.store().clone(),
            dispatcher,
            resolver,
            prefs,
            renderer: ConversationRenderer::new(),
            recognizer,
        }
    }

    /// Read stdin until EOF or `/quit`.
    pub async fn run(self) {
        let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        // Final transcripts from voice input arrive here.
        let (voice_tx, mut voice) = mpsc::unbounded_channel::<()>();
        let speech = {
            let options = SpeechOptions::default()
                .on_result(|text| eprint!("\r🎙  {text}"))
                .on_end(move || {
                    let _ = voice_tx.send(());
                });
            SpeechInput::new(self.recognizer.clone(), options)
        };

        self.print().await;
        eprint!("> ");

        loop {
            let command = tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => Command::parse(&line),
                    None => break,
                },
                Some(()) = voice.recv() => {
                    eprintln!();
                    self.store.set_speech_input_active(false).await;
                    Some(Command::Send(speech.transcript()))
                }
            };

            let Some(command) = command else {
                eprint!("> ");
                continue;
            };

            if !self.execute(command, &speech).await {
                break;
            }
            eprint!("> ");
        }

        speech.stop_listening();
    }

    /// Run one command; `false` ends the session.
    async fn execute(&self, command: Command, speech: &SpeechInput) -> bool {
        match command {
            Command::Send(text) => match self.dispatcher.send(&text).await {
                Ok(DispatchOutcome::Ignored) => {}
                Ok(_) => self.print().await,
                Err(e) => eprintln!("❌ {e}"),
            },
            Command::Clear => match self.store.clear_messages().await {
                Ok(()) => eprintln!("ℹ️  Conversation cleared"),
                Err(e) => eprintln!("❌ {e}"),
            },
            Command::Toggle => {
                let open = self.store.toggle_open().await;
                eprintln!("ℹ️  Assistant {}", if open { "open" } else { "closed" });
            }
            Command::Context(path) => {
                let context = self.resolver.resolve(&path).await;
                match self.store.set_current_module_context(context.clone()).await {
                    Ok(()) => match context {
                        Some(c) => eprintln!("ℹ️  Context: {c}"),
                        None => eprintln!("ℹ️  No module context for {path}"),
                    },
                    Err(e) => eprintln!("❌ {e}"),
                }
            }
            Command::Listen => {
                if !speech.has_support() {
                    eprintln!("ℹ️  Voice input is not configured");
                } else if speech.start_listening().await.is_ok() {
                    self.store.set_speech_input_active(true).await;
                    eprintln!("🎙  Listening… (/stop to finish)");
                }
            }
            Command::Stop => {
                speech.stop_listening();
                self.store.set_speech_input_active(false).await;
            }
            Command::Theme => match self.prefs.toggle_theme().await {
                Ok(theme) => eprintln!("ℹ️  Theme: {theme:?}"),
                Err(e) => eprintln!("❌ {e}"),
            },
            Command::Sidebar => match self.prefs.toggle_sidebar().await {
                Ok(collapsed) => {
                    eprintln!("ℹ️  Sidebar {}", if collapsed { "collapsed" } else { "expanded" })
                }
                Err(e) => eprintln!("❌ {e}"),
            },
            Command::Key(chord) => match chord.parse::<Shortcut>() {
                Ok(shortcut) => {
                    if handle_key(&self.store, &KeyPress::from(shortcut)).await {
                        let open = self.store.snapshot().await.is_open;
                        eprintln!("ℹ️  Assistant {}", if open { "open" } else { "closed" });
                    } else {
                        eprintln!("ℹ️  Nothing bound to {chord}");
                    }
                }
                Err(e) => eprintln!("❌ {e}"),
            },
            Command::Quit => return false,
            Command::Unknown(name) => eprintln!("ℹ️  Unknown command /{name}"),
        }
        true
    }

    async fn print(&self) {
        let session = self.store.snapshot().await;
        if self.renderer.observe(&session.messages) {
            let view = self.renderer.render(&session.messages, session.is_loading);
            println!("\n{}", render_terminal(&view));
        }
    }
}
