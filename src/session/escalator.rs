// src/session/escalator.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    config::SecurityPolicy,
    error::AppError,
    models::violation::{SecurityState, ViolationKind},
};

/// Why the system submitted on the student's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSubmitReason {
    DeadlineExpired,
    FinalWarningExpired,
    WarningBudgetExhausted,
    TabSwitchLimit,
    BlockedShortcutLimit,
}

impl fmt::Display for AutoSubmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AutoSubmitReason::DeadlineExpired => "deadline expired",
            AutoSubmitReason::FinalWarningExpired => "final warning expired",
            AutoSubmitReason::WarningBudgetExhausted => "warning budget exhausted",
            AutoSubmitReason::TabSwitchLimit => "tab-switch limit reached",
            AutoSubmitReason::BlockedShortcutLimit => "blocked-shortcut limit reached",
        };
        f.write_str(text)
    }
}

/// The blocking notice shown for one warning cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningDialog {
    pub kind: ViolationKind,
    pub message: String,
    /// Warning number of this cycle, 1-based.
    pub count: u32,
    pub limit: u32,
    pub countdown_remaining: u32,
}

impl WarningDialog {
    pub fn headline(&self) -> String {
        format!("Warning {}/{}: {}", self.count, self.limit, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    Dialog(WarningDialog),
    ForceSubmit(AutoSubmitReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownStep {
    Running(u32),
    Dismissed,
    ForceSubmit(AutoSubmitReason),
}

/// Converts violations into the three-strike warning protocol.
///
/// The escalator mutates `warning_count` in place; the caller persists the
/// snapshot before doing anything else with the state.
#[derive(Debug, Clone)]
pub struct WarningEscalator {
    policy: SecurityPolicy,
}

impl WarningEscalator {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// Hard limits that bypass the warning dialog entirely.
    pub fn hard_limit(&self, state: &SecurityState) -> Option<AutoSubmitReason> {
        if state.tab_switch_count >= self.policy.tab_switch_limit {
            Some(AutoSubmitReason::TabSwitchLimit)
        } else if state.blocked_key_count >= self.policy.blocked_shortcut_limit {
            Some(AutoSubmitReason::BlockedShortcutLimit)
        } else {
            None
        }
    }

    /// Limits checked when a restored snapshot resumes. The warning dialog is
    /// not persisted, so a snapshot with the final warning already issued
    /// closes the attempt as if that dialog had run out.
    pub fn resume_limit(&self, state: &SecurityState) -> Option<AutoSubmitReason> {
        self.hard_limit(state).or_else(|| {
            (state.warning_count >= self.policy.warning_limit)
                .then_some(AutoSubmitReason::FinalWarningExpired)
        })
    }

    pub fn raise(&self, state: &mut SecurityState, kind: ViolationKind, message: &str) -> Escalation {
        if state.warning_count >= self.policy.warning_limit {
            return Escalation::ForceSubmit(AutoSubmitReason::WarningBudgetExhausted);
        }

        state.warning_count += 1;
        tracing::warn!(
            "Warning {}/{} raised for {}",
            state.warning_count,
            self.policy.warning_limit,
            kind
        );

        Escalation::Dialog(WarningDialog {
            kind,
            message: message.to_string(),
            count: state.warning_count,
            limit: self.policy.warning_limit,
            countdown_remaining: self.policy.warning_countdown_secs,
        })
    }

    pub fn tick(&self, dialog: &mut WarningDialog, warning_count: u32) -> CountdownStep {
        dialog.countdown_remaining = dialog.countdown_remaining.saturating_sub(1);
        if dialog.countdown_remaining > 0 {
            return CountdownStep::Running(dialog.countdown_remaining);
        }

        if warning_count >= self.policy.warning_limit {
            CountdownStep::ForceSubmit(AutoSubmitReason::FinalWarningExpired)
        } else {
            CountdownStep::Dismissed
        }
    }

    /// The student must sit out the countdown before dismissing.
    pub fn dismiss(&self, dialog: &WarningDialog, warning_count: u32) -> Result<(), AppError> {
        if dialog.countdown_remaining > 0 {
            return Err(AppError::ValidationFailure(format!(
                "warning can be dismissed in {}s",
                dialog.countdown_remaining
            )));
        }
        if warning_count >= self.policy.warning_limit {
            return Err(AppError::InvalidTransition {
                from: "final warning".to_string(),
                action: "dismiss".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escalator() -> WarningEscalator {
        WarningEscalator::new(SecurityPolicy::default())
    }

    fn expect_dialog(e: Escalation) -> WarningDialog {
        match e {
            Escalation::Dialog(d) => d,
            other => panic!("expected dialog, got {:?}", other),
        }
    }

    #[test]
    fn test_raise_increments_until_limit() {
        let esc = escalator();
        let mut state = SecurityState::default();

        for n in 1..=3 {
            let d = expect_dialog(esc.raise(&mut state, ViolationKind::FullscreenExit, "left fullscreen"));
            assert_eq!(d.count, n);
            assert_eq!(d.countdown_remaining, 15);
        }
        assert_eq!(state.warning_count, 3);

        assert_eq!(
            esc.raise(&mut state, ViolationKind::FullscreenExit, "again"),
            Escalation::ForceSubmit(AutoSubmitReason::WarningBudgetExhausted)
        );
        assert_eq!(state.warning_count, 3);
    }

    #[test]
    fn test_countdown_dismisses_or_forces_on_final_warning() {
        let esc = escalator();
        let mut state = SecurityState::default();
        let mut d = expect_dialog(esc.raise(&mut state, ViolationKind::WindowMinimize, "minimized"));

        for expected in (1..15).rev() {
            assert_eq!(esc.tick(&mut d, state.warning_count), CountdownStep::Running(expected));
        }
        assert_eq!(esc.tick(&mut d, state.warning_count), CountdownStep::Dismissed);

        state.warning_count = 3;
        let mut last = WarningDialog {
            countdown_remaining: 1,
            ..d
        };
        assert_eq!(
            esc.tick(&mut last, state.warning_count),
            CountdownStep::ForceSubmit(AutoSubmitReason::FinalWarningExpired)
        );
    }

    #[test]
    fn test_dismiss_requires_countdown_to_elapse() {
        let esc = escalator();
        let mut state = SecurityState::default();
        let mut d = expect_dialog(esc.raise(&mut state, ViolationKind::TabSwitch, "switched tabs"));

        assert!(matches!(esc.dismiss(&d, 1), Err(AppError::ValidationFailure(_))));
        d.countdown_remaining = 0;
        assert!(esc.dismiss(&d, 1).is_ok());
    }

    #[test]
    fn test_hard_limits() {
        let esc = escalator();
        let mut state = SecurityState::default();
        assert_eq!(esc.hard_limit(&state), None);

        state.blocked_key_count = 5;
        assert_eq!(esc.hard_limit(&state), Some(AutoSubmitReason::BlockedShortcutLimit));

        state.tab_switch_count = 3;
        assert_eq!(esc.hard_limit(&state), Some(AutoSubmitReason::TabSwitchLimit));
    }

    #[test]
    fn test_resume_limit_closes_after_final_warning() {
        let esc = escalator();
        let mut state = SecurityState::default();
        state.warning_count = 2;
        assert_eq!(esc.resume_limit(&state), None);

        state.warning_count = 3;
        assert_eq!(esc.hard_limit(&state), None);
        assert_eq!(esc.resume_limit(&state), Some(AutoSubmitReason::FinalWarningExpired));

        state.tab_switch_count = 3;
        assert_eq!(esc.resume_limit(&state), Some(AutoSubmitReason::TabSwitchLimit));
    }

    #[test]
    fn test_headline_names_count() {
        let d = WarningDialog {
            kind: ViolationKind::TabSwitch,
            message: "You left the quiz tab.".to_string(),
            count: 2,
            limit: 3,
            countdown_remaining: 15,
        };
        assert_eq!(d.headline(), "Warning 2/3: You left the quiz tab.");
    }
}
