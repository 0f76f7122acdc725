// src/models/violation.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of integrity violations a proctored attempt can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    TabSwitch,
    AltTab,
    DevtoolsOrSystemShortcut,
    Clipboard,
    ContextMenu,
    FullscreenExit,
    WindowMinimize,
    DevtoolsOpenHeuristic,
    SuspiciousTiming,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::TabSwitch => "tab-switch",
            ViolationKind::AltTab => "alt-tab",
            ViolationKind::DevtoolsOrSystemShortcut => "devtools-or-system-shortcut",
            ViolationKind::Clipboard => "clipboard",
            ViolationKind::ContextMenu => "context-menu",
            ViolationKind::FullscreenExit => "fullscreen-exit",
            ViolationKind::WindowMinimize => "window-minimize",
            ViolationKind::DevtoolsOpenHeuristic => "devtools-open-heuristic",
            ViolationKind::SuspiciousTiming => "suspicious-timing",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected integrity breach. Never modified after recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub detail: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Violation {
    /// Human-readable form sent to the grading service.
    pub fn to_log_line(&self) -> String {
        if self.detail.is_null() {
            format!("[{}] {}", self.occurred_at.to_rfc3339(), self.kind)
        } else {
            format!(
                "[{}] {}: {}",
                self.occurred_at.to_rfc3339(),
                self.kind,
                self.detail
            )
        }
    }
}

/// Counters that feed the hard limits of the escalation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    TabSwitch,
    FullscreenExit,
    BlockedKey,
    WindowMinimize,
}

/// Persisted integrity state of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityState {
    pub violations: Vec<Violation>,
    pub tab_switch_count: u32,
    /// Only increases; capped by the warning limit.
    pub warning_count: u32,
    pub fullscreen_exit_count: u32,
    pub blocked_key_count: u32,
    pub window_minimize_count: u32,
}

impl SecurityState {
    pub fn bump(&mut self, counter: Counter) -> u32 {
        let slot = match counter {
            Counter::TabSwitch => &mut self.tab_switch_count,
            Counter::FullscreenExit => &mut self.fullscreen_exit_count,
            Counter::BlockedKey => &mut self.blocked_key_count,
            Counter::WindowMinimize => &mut self.window_minimize_count,
        };
        *slot += 1;
        *slot
    }
}
