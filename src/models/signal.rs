// src/models/signal.rs

use serde::{Deserialize, Serialize};

/// Raw browser signals forwarded by the client shell.
///
/// Tags follow DOM event names so the shell can forward events with little
/// translation. Vendor-prefixed fullscreen events are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    #[serde(rename = "visibilitychange")]
    Visibility { hidden: bool },

    #[serde(rename = "focuschange")]
    WindowFocus { focused: bool },

    #[serde(rename = "keydown")]
    KeyDown(KeyCombo),

    #[serde(rename = "clipboard")]
    Clipboard { action: ClipboardAction },

    #[serde(rename = "contextmenu")]
    ContextMenu,

    #[serde(
        rename = "fullscreenchange",
        alias = "webkitfullscreenchange",
        alias = "mozfullscreenchange",
        alias = "MSFullscreenChange"
    )]
    FullscreenChange { active: bool },

    #[serde(rename = "resize")]
    WindowGeometry(WindowGeometry),
}

/// A keydown with its modifier state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCombo {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

impl KeyCombo {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Ctrl on Windows/Linux, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardAction {
    Copy,
    Paste,
    Cut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}
