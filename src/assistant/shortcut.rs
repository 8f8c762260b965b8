//! Keyboard chord that toggles the assistant panel.

use std::str::FromStr;

use super::store::SessionStore;

/// A key event as delivered by the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key: String,
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }
}

/// Modifier set plus a key, e.g. `Alt+A`. Keys compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    key: String,
    alt: bool,
    ctrl: bool,
    shift: bool,
    meta: bool,
}

/// Alt+A opens and closes the assistant.
pub const TOGGLE_ASSISTANT: &str = "Alt+A";

impl Shortcut {
    pub fn parse(chord: &str) -> Result<Self, String> {
        let mut shortcut = Shortcut {
            key: String::new(),
            alt: false,
            ctrl: false,
            shift: false,
            meta: false,
        };

        for part in chord.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "" => return Err(format!("empty segment in shortcut: {chord}")),
                "alt" | "option" => shortcut.alt = true,
                "ctrl" | "control" => shortcut.ctrl = true,
                "shift" => shortcut.shift = true,
                "meta" | "cmd" | "super" => shortcut.meta = true,
                key => {
                    if !shortcut.key.is_empty() {
                        return Err(format!("more than one key in shortcut: {chord}"));
                    }
                    shortcut.key = key.to_string();
                }
            }
        }

        if shortcut.key.is_empty() {
            return Err(format!("shortcut has no key: {chord}"));
        }
        Ok(shortcut)
    }

    pub fn toggle_assistant() -> Self {
        Shortcut {
            key: "a".into(),
            alt: true,
            ctrl: false,
            shift: false,
            meta: false,
        }
    }

    pub fn matches(&self, press: &KeyPress) -> bool {
        press.key.eq_ignore_ascii_case(&self.key)
            && press.alt == self.alt
            && press.ctrl == self.ctrl
            && press.shift == self.shift
            && press.meta == self.meta
    }
}

impl FromStr for Shortcut {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The key press that produces `shortcut`, e.g. for a chord typed as text.
impl From<Shortcut> for KeyPress {
    fn from(shortcut: Shortcut) -> Self {
        KeyPress {
            key: shortcut.key,
            alt: shortcut.alt,
            ctrl: shortcut.ctrl,
            shift: shortcut.shift,
            meta: shortcut.meta,
        }
    }
}

/// Toggle the panel if `press` is the assistant chord. Returns whether it was.
pub async fn handle_key(store: &SessionStore, press: &KeyPress) -> bool {
    if Shortcut::toggle_assistant().matches(press) {
        let open = store.toggle_open().await;
        tracing::debug!(open, "Assistant toggled from keyboard");
        true
    } else {
        false
    }
}
