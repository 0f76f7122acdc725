// src/session/monitor.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    config::SecurityPolicy,
    models::{
        signal::{ClipboardAction, KeyCombo, Signal, WindowGeometry},
        violation::{Counter, ViolationKind},
    },
};

/// Independent browser event sources the monitor subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    Visibility,
    Focus,
    Keyboard,
    Clipboard,
    ContextMenu,
    Fullscreen,
    Geometry,
}

impl SignalSource {
    pub const ALL: [SignalSource; 7] = [
        SignalSource::Visibility,
        SignalSource::Focus,
        SignalSource::Keyboard,
        SignalSource::Clipboard,
        SignalSource::ContextMenu,
        SignalSource::Fullscreen,
        SignalSource::Geometry,
    ];

    pub fn of(signal: &Signal) -> Self {
        match signal {
            Signal::Visibility { .. } => SignalSource::Visibility,
            Signal::WindowFocus { .. } => SignalSource::Focus,
            Signal::KeyDown(_) => SignalSource::Keyboard,
            Signal::Clipboard { .. } => SignalSource::Clipboard,
            Signal::ContextMenu => SignalSource::ContextMenu,
            Signal::FullscreenChange { .. } => SignalSource::Fullscreen,
            Signal::WindowGeometry(_) => SignalSource::Geometry,
        }
    }
}

/// What the session must do with a detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Route to the warning escalator with this message.
    Warn(String),
    /// Record silently and suppress the browser's default action.
    Block,
}

/// A classified signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: ViolationKind,
    pub detail: Value,
    pub counter: Option<Counter>,
    pub response: Response,
}

impl Detection {
    fn warn(kind: ViolationKind, detail: Value, counter: Option<Counter>, message: &str) -> Self {
        Self {
            kind,
            detail,
            counter,
            response: Response::Warn(message.to_string()),
        }
    }

    fn block(kind: ViolationKind, detail: Value, counter: Option<Counter>) -> Self {
        Self {
            kind,
            detail,
            counter,
            response: Response::Block,
        }
    }

    pub fn blocks_default(&self) -> bool {
        self.response == Response::Block
    }
}

/// Classifies browser signals into violations.
///
/// Tracks just enough context to turn edge-triggered browser events into
/// violations: when the page went away, whether fullscreen was engaged, and
/// which geometry anomaly is currently latched.
#[derive(Debug, Clone)]
pub struct SecurityMonitor {
    policy: SecurityPolicy,
    subscriptions: BTreeSet<SignalSource>,
    hidden_since: Option<DateTime<Utc>>,
    blurred_since: Option<DateTime<Utc>>,
    inattention_flagged: bool,
    fullscreen: bool,
    geometry_latch: Option<ViolationKind>,
}

impl SecurityMonitor {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            policy,
            subscriptions: BTreeSet::new(),
            hidden_since: None,
            blurred_since: None,
            inattention_flagged: false,
            fullscreen: false,
            geometry_latch: None,
        }
    }

    /// Subscribes to every source and resets tracking context.
    pub fn arm(&mut self, fullscreen_active: bool) {
        self.subscriptions = SignalSource::ALL.into_iter().collect();
        self.hidden_since = None;
        self.blurred_since = None;
        self.inattention_flagged = false;
        self.fullscreen = fullscreen_active;
        self.geometry_latch = None;
        tracing::info!("Security monitor armed");
    }

    /// Drops every subscription. Signals observed afterwards are ignored.
    pub fn disarm(&mut self) {
        if !self.subscriptions.is_empty() {
            self.subscriptions.clear();
            tracing::info!("Security monitor disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn subscriptions(&self) -> Vec<SignalSource> {
        self.subscriptions.iter().copied().collect()
    }

    pub fn set_fullscreen(&mut self, active: bool) {
        self.fullscreen = active;
    }

    pub fn observe(&mut self, signal: &Signal, now: DateTime<Utc>) -> Vec<Detection> {
        if !self.subscriptions.contains(&SignalSource::of(signal)) {
            return Vec::new();
        }

        match signal {
            Signal::Visibility { hidden: true } => {
                self.begin_away();
                self.hidden_since.get_or_insert(now);
                Vec::new()
            }
            Signal::Visibility { hidden: false } => {
                let Some(since) = self.hidden_since else {
                    return Vec::new();
                };
                let mut detections: Vec<Detection> = self.check_inattention(now).into_iter().collect();
                self.hidden_since = None;

                let away_seconds = (now - since).num_seconds().max(0);
                detections.push(Detection::warn(
                    ViolationKind::TabSwitch,
                    json!({ "awaySeconds": away_seconds }),
                    Some(Counter::TabSwitch),
                    "You switched away from the quiz tab.",
                ));
                detections
            }
            Signal::WindowFocus { focused: false } => {
                self.begin_away();
                self.blurred_since.get_or_insert(now);
                Vec::new()
            }
            Signal::WindowFocus { focused: true } => {
                if self.blurred_since.is_none() {
                    return Vec::new();
                }
                let detection = self.check_inattention(now);
                self.blurred_since = None;
                detection.into_iter().collect()
            }
            Signal::KeyDown(combo) => classify_key(combo).into_iter().collect(),
            Signal::Clipboard { action } => vec![Detection::block(
                ViolationKind::Clipboard,
                json!({ "action": clipboard_label(*action), "source": "event" }),
                None,
            )],
            Signal::ContextMenu => vec![Detection::block(ViolationKind::ContextMenu, Value::Null, None)],
            Signal::FullscreenChange { active } => {
                let exited = self.fullscreen && !*active;
                self.fullscreen = *active;
                if exited {
                    vec![Detection::warn(
                        ViolationKind::FullscreenExit,
                        Value::Null,
                        Some(Counter::FullscreenExit),
                        "You exited fullscreen mode.",
                    )]
                } else {
                    Vec::new()
                }
            }
            Signal::WindowGeometry(geometry) => self.observe_geometry(geometry).into_iter().collect(),
        }
    }

    /// Flags prolonged inattention once per away episode.
    pub fn check_inattention(&mut self, now: DateTime<Utc>) -> Option<Detection> {
        if !self.is_armed() || self.inattention_flagged {
            return None;
        }
        let since = self.away_since()?;
        let away_seconds = (now - since).num_seconds();
        if away_seconds < self.policy.inattention_grace_secs {
            return None;
        }

        self.inattention_flagged = true;
        Some(Detection::warn(
            ViolationKind::SuspiciousTiming,
            json!({ "awaySeconds": away_seconds }),
            None,
            "You were away from the quiz for too long.",
        ))
    }

    fn away_since(&self) -> Option<DateTime<Utc>> {
        match (self.hidden_since, self.blurred_since) {
            (Some(h), Some(b)) => Some(h.min(b)),
            (h, b) => h.or(b),
        }
    }

    fn begin_away(&mut self) {
        if self.away_since().is_none() {
            self.inattention_flagged = false;
        }
    }

    fn observe_geometry(&mut self, g: &WindowGeometry) -> Option<Detection> {
        let condition = if g.outer_width < self.policy.minimized_dimension_px
            || g.outer_height < self.policy.minimized_dimension_px
        {
            Some(ViolationKind::WindowMinimize)
        } else if g.outer_width.saturating_sub(g.inner_width) > self.policy.devtools_delta_px
            || g.outer_height.saturating_sub(g.inner_height) > self.policy.devtools_delta_px
        {
            Some(ViolationKind::DevtoolsOpenHeuristic)
        } else {
            None
        };

        if condition == self.geometry_latch {
            return None;
        }
        self.geometry_latch = condition;

        let detail = json!({
            "outerWidth": g.outer_width,
            "outerHeight": g.outer_height,
            "innerWidth": g.inner_width,
            "innerHeight": g.inner_height,
        });

        match condition? {
            ViolationKind::WindowMinimize => Some(Detection::warn(
                ViolationKind::WindowMinimize,
                detail,
                Some(Counter::WindowMinimize),
                "The quiz window was minimized.",
            )),
            kind => Some(Detection::warn(
                kind,
                detail,
                None,
                "Developer tools appear to be open.",
            )),
        }
    }
}

/// Keyboard shortcut rules. Ctrl and Cmd are interchangeable.
pub fn classify_key(combo: &KeyCombo) -> Option<Detection> {
    let key = combo.key.to_ascii_lowercase();
    let detail = json!({ "combo": combo_label(combo) });

    if combo.alt && key == "tab" {
        return Some(Detection::warn(
            ViolationKind::AltTab,
            detail,
            Some(Counter::TabSwitch),
            "Alt+Tab is not allowed during the quiz.",
        ));
    }

    let devtools = key == "f12"
        || (combo.command() && combo.shift && matches!(key.as_str(), "i" | "j" | "c"))
        || (combo.command() && matches!(key.as_str(), "s" | "p"));
    if devtools {
        return Some(Detection::block(
            ViolationKind::DevtoolsOrSystemShortcut,
            detail,
            Some(Counter::BlockedKey),
        ));
    }

    if combo.command() && matches!(key.as_str(), "c" | "v" | "x") {
        return Some(Detection::block(
            ViolationKind::Clipboard,
            detail,
            Some(Counter::BlockedKey),
        ));
    }

    None
}

fn combo_label(combo: &KeyCombo) -> String {
    let mut parts = Vec::new();
    if combo.ctrl {
        parts.push("Ctrl");
    }
    if combo.meta {
        parts.push("Cmd");
    }
    if combo.alt {
        parts.push("Alt");
    }
    if combo.shift {
        parts.push("Shift");
    }
    let key = if combo.key.chars().count() == 1 {
        combo.key.to_uppercase()
    } else {
        combo.key.clone()
    };
    let mut label = parts.join("+");
    if !label.is_empty() {
        label.push('+');
    }
    label.push_str(&key);
    label
}

fn clipboard_label(action: ClipboardAction) -> &'static str {
    match action {
        ClipboardAction::Copy => "copy",
        ClipboardAction::Paste => "paste",
        ClipboardAction::Cut => "cut",
    }
}
