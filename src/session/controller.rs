// src/session/controller.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::Validate;

use crate::{
    config::SecurityPolicy,
    error::AppError,
    models::{
        attempt::{Attempt, validate_attempt_id},
        signal::Signal,
        submission::{GradedResult, SubmissionRequest},
        violation::{SecurityState, ViolationKind},
    },
    session::{
        deadline::{self, DeadlineClock, DeadlineSource},
        escalator::{AutoSubmitReason, CountdownStep, Escalation, WarningDialog, WarningEscalator},
        monitor::{Detection, Response, SecurityMonitor, SignalSource},
        recorder,
        store::{KeyValueStore, SessionStore},
    },
    utils::{fullscreen::FullscreenControl, grading::GradingService},
};

/// Why a session ended up in `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFailure {
    /// Fetching or validating the attempt failed. Not retried.
    Load(AppError),
    /// The grading service rejected or never received the submission.
    /// The frozen payload is kept for `retry`.
    Submission {
        error: AppError,
        auto_reason: Option<AutoSubmitReason>,
    },
}

/// Lifecycle of one proctored attempt.
///
/// ```text
/// Loading --fetched--> Briefing --accept--> Active <--> Warning
/// Loading --failed---> Error(Load)          Briefing --decline--> Cancelled
/// Active|Warning --limit/deadline--> AutoSubmitting --ack--> Submitted
/// Active --submit--> ManualSubmitting --ack--> Submitted
/// *Submitting --failure--> Error(Submission) --retry--> *Submitting
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Loading,
    Briefing,
    Active,
    Warning(WarningDialog),
    AutoSubmitting(AutoSubmitReason),
    ManualSubmitting,
    Submitted {
        result: GradedResult,
        auto_reason: Option<AutoSubmitReason>,
    },
    Error(SessionFailure),
    Cancelled,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Loading => "loading",
            SessionPhase::Briefing => "briefing",
            SessionPhase::Active => "active",
            SessionPhase::Warning(_) => "warning",
            SessionPhase::AutoSubmitting(_) => "auto_submitting",
            SessionPhase::ManualSubmitting => "manual_submitting",
            SessionPhase::Submitted { .. } => "submitted",
            SessionPhase::Error(_) => "error",
            SessionPhase::Cancelled => "cancelled",
        }
    }

    /// Active or Warning: timers run and the monitor is armed.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionPhase::Active | SessionPhase::Warning(_))
    }

    pub fn is_submitting(&self) -> bool {
        matches!(
            self,
            SessionPhase::AutoSubmitting(_) | SessionPhase::ManualSubmitting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Submitted { .. } | SessionPhase::Error(_) | SessionPhase::Cancelled
        )
    }
}

/// Result of classifying one browser signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalOutcome {
    /// The host must suppress the browser's default action.
    pub blocked: bool,
    pub recorded: usize,
}

/// Snapshot of the session for the client shell.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub attempt_id: Option<String>,
    pub phase: &'static str,
    pub auto_submit_reason: Option<String>,
    pub error: Option<String>,
    pub retryable: bool,
    pub remaining_seconds: Option<i64>,
    pub ends_at: Option<DateTime<Utc>>,
    pub warning: Option<WarningDialog>,
    pub warning_headline: Option<String>,
    pub warning_count: u32,
    pub warning_limit: u32,
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub blocked_key_count: u32,
    pub window_minimize_count: u32,
    pub violation_count: usize,
    pub question_count: usize,
    pub current_index: Option<usize>,
    pub answered: Vec<i64>,
    pub flagged: Vec<i64>,
    pub listening: Vec<SignalSource>,
    pub result: Option<GradedResult>,
}

/// The quiz session controller.
///
/// Every mutation happens inside one `&mut self` call, so counters are read
/// and written without an intervening await. The only awaits are the
/// fullscreen request and the grading service calls.
pub struct QuizSession {
    policy: SecurityPolicy,
    phase: SessionPhase,
    attempt_id: Option<String>,
    attempt: Option<Attempt>,
    security: SecurityState,
    clock: Option<DeadlineClock>,
    /// Persisted deadline shown while the attempt is still loading.
    provisional_ends_at: Option<DateTime<Utc>>,
    activated_at: Option<DateTime<Utc>>,
    monitor: SecurityMonitor,
    escalator: WarningEscalator,
    store: SessionStore,
    grading: Arc<dyn GradingService>,
    fullscreen: Arc<dyn FullscreenControl>,
    pending: Option<SubmissionRequest>,
    submit_attempts: u32,
}

impl QuizSession {
    pub fn new(
        kv: Box<dyn KeyValueStore>,
        grading: Arc<dyn GradingService>,
        fullscreen: Arc<dyn FullscreenControl>,
        policy: SecurityPolicy,
    ) -> Self {
        Self {
            policy,
            phase: SessionPhase::Loading,
            attempt_id: None,
            attempt: None,
            security: SecurityState::default(),
            clock: None,
            provisional_ends_at: None,
            activated_at: None,
            monitor: SecurityMonitor::new(policy),
            escalator: WarningEscalator::new(policy),
            store: SessionStore::new(kv),
            grading,
            fullscreen,
            pending: None,
            submit_attempts: 0,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn security(&self) -> &SecurityState {
        &self.security
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    pub fn attempt_id(&self) -> Option<&str> {
        self.attempt_id.as_deref()
    }

    pub fn monitor(&self) -> &SecurityMonitor {
        &self.monitor
    }

    /// The frozen payload of the current or last failed submission.
    pub fn pending_submission(&self) -> Option<&SubmissionRequest> {
        self.pending.as_ref()
    }

    pub fn submit_attempts(&self) -> u32 {
        self.submit_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Deadline if established, else the one persisted by an earlier load.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.clock
            .as_ref()
            .map(DeadlineClock::ends_at)
            .or(self.provisional_ends_at)
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.ends_at().map(|ends_at| deadline::remaining_seconds(ends_at, now))
    }

    /// Loads the attempt: `Loading -> Briefing`, or `Loading -> Error`.
    ///
    /// The persisted deadline is read before the fetch so the countdown is
    /// visible while the request is in flight. The persisted security
    /// snapshot is restored before the monitor can be armed.
    pub async fn load(&mut self, attempt_id: Option<&str>, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.phase != SessionPhase::Loading {
            return Err(self.invalid("load an attempt"));
        }

        match self.try_load(attempt_id, now).await {
            Ok(()) => Ok(()),
            Err(e) if self.phase == SessionPhase::Loading => {
                tracing::error!("Failed to load attempt: {}", e);
                self.transition(SessionPhase::Error(SessionFailure::Load(e.clone())));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_load(&mut self, attempt_id: Option<&str>, now: DateTime<Utc>) -> Result<(), AppError> {
        let attempt_id = attempt_id
            .ok_or_else(|| AppError::AttemptNotFound("no attempt id supplied".to_string()))?;
        validate_attempt_id(attempt_id)?;
        self.attempt_id = Some(attempt_id.to_string());

        self.provisional_ends_at = self.store.restore_deadline(attempt_id)?;

        let payload = self.grading.fetch_attempt(attempt_id).await?;
        payload.validate()?;
        if payload.attempt_id != attempt_id {
            return Err(AppError::ValidationFailure(format!(
                "grading service returned attempt {} for {}",
                payload.attempt_id, attempt_id
            )));
        }

        if let Some(result) = payload.result.clone() {
            tracing::info!("Attempt {} was already submitted", attempt_id);
            self.transition(SessionPhase::Submitted {
                result,
                auto_reason: None,
            });
            return Ok(());
        }

        let source = DeadlineSource::from_payload(&payload)?;
        let mut clock = DeadlineClock::initialize(&self.store, attempt_id, source)?;

        if let Some(restored) = self.store.restore(attempt_id)? {
            tracing::info!(
                "Restored security state for {}: {} warnings, {} tab switches, {} violations",
                attempt_id,
                restored.warning_count,
                restored.tab_switch_count,
                restored.violations.len()
            );
            self.security = restored;
        }

        let expired = clock.tick(now).expired;
        self.attempt = Some(Attempt::new(payload));
        self.clock = Some(clock);
        self.provisional_ends_at = None;
        self.transition(SessionPhase::Briefing);

        if expired {
            self.force_auto_submit(AutoSubmitReason::DeadlineExpired, now);
            self.deliver_if_pending().await;
        }
        Ok(())
    }

    /// `Briefing -> Active`. Arms the monitor and asks for fullscreen; a
    /// denied request degrades gracefully and is not a violation.
    pub async fn accept_briefing(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.phase != SessionPhase::Briefing {
            return Err(self.invalid("accept the briefing"));
        }

        self.activated_at = Some(now);
        self.monitor.arm(self.fullscreen.is_active());
        self.transition(SessionPhase::Active);

        match self.fullscreen.request().await {
            Ok(()) => self.monitor.set_fullscreen(true),
            Err(e) => tracing::warn!("Fullscreen not engaged at start: {}", e),
        }

        // A snapshot restored after a reload may already be over a limit.
        if let Some(reason) = self.escalator.resume_limit(&self.security) {
            self.force_auto_submit(reason, now);
            self.deliver_if_pending().await;
        }
        Ok(())
    }

    pub fn decline_briefing(&mut self) -> Result<(), AppError> {
        if self.phase != SessionPhase::Briefing {
            return Err(self.invalid("decline the briefing"));
        }
        self.transition(SessionPhase::Cancelled);
        Ok(())
    }

    /// Classifies a browser signal and applies the resulting violations.
    ///
    /// A forced submission triggered here is delivered before returning; its
    /// failure is reflected in the phase rather than returned.
    pub async fn handle_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> SignalOutcome {
        let outcome = self.apply_signal(signal, now);
        self.deliver_if_pending().await;
        outcome
    }

    fn apply_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> SignalOutcome {
        if !self.phase.is_live() {
            return SignalOutcome::default();
        }

        let mut detections = self.monitor.observe(signal, now);
        if self.phase != SessionPhase::Active {
            detections.retain(|d| d.kind != ViolationKind::SuspiciousTiming);
        }
        let mut outcome = SignalOutcome {
            blocked: detections.iter().any(Detection::blocks_default),
            recorded: 0,
        };

        for detection in detections {
            if !self.phase.is_live() {
                break;
            }
            self.apply_detection(detection, now);
            outcome.recorded += 1;
        }
        outcome
    }

    fn apply_detection(&mut self, detection: Detection, now: DateTime<Utc>) {
        let Detection {
            kind,
            detail,
            counter,
            response,
        } = detection;

        recorder::record(&mut self.security, kind, detail, now);
        if let Some(counter) = counter {
            self.security.bump(counter);
        }
        self.persist();

        if let Some(reason) = self.escalator.hard_limit(&self.security) {
            self.force_auto_submit(reason, now);
            return;
        }

        if let Response::Warn(message) = response {
            match self.escalator.raise(&mut self.security, kind, &message) {
                Escalation::Dialog(dialog) => {
                    self.persist();
                    self.transition(SessionPhase::Warning(dialog));
                }
                Escalation::ForceSubmit(reason) => self.force_auto_submit(reason, now),
            }
        }
    }

    /// Deadline timer: once per second while Active or Warning. Prolonged
    /// inattention is only checked while Active.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if !self.phase.is_live() {
            return;
        }
        let Some(clock) = self.clock.as_mut() else {
            return;
        };

        if clock.tick(now).expired {
            self.force_auto_submit(AutoSubmitReason::DeadlineExpired, now);
        } else if self.phase == SessionPhase::Active {
            if let Some(detection) = self.monitor.check_inattention(now) {
                self.apply_detection(detection, now);
            }
        }
        self.deliver_if_pending().await;
    }

    /// Warning countdown timer: once per second while a dialog is open.
    pub async fn tick_warning(&mut self, now: DateTime<Utc>) {
        let warning_count = self.security.warning_count;
        let SessionPhase::Warning(dialog) = &mut self.phase else {
            return;
        };

        match self.escalator.tick(dialog, warning_count) {
            CountdownStep::Running(_) => {}
            CountdownStep::Dismissed => self.transition(SessionPhase::Active),
            CountdownStep::ForceSubmit(reason) => self.force_auto_submit(reason, now),
        }
        self.deliver_if_pending().await;
    }

    /// Dismissing an already auto-dismissed warning is a no-op.
    pub fn dismiss_warning(&mut self) -> Result<(), AppError> {
        match &self.phase {
            SessionPhase::Warning(dialog) => {
                self.escalator.dismiss(dialog, self.security.warning_count)?;
                self.transition(SessionPhase::Active);
                Ok(())
            }
            SessionPhase::Active => Ok(()),
            _ => Err(self.invalid("dismiss a warning")),
        }
    }

    pub fn answer(&mut self, question_id: i64, option: &str) -> Result<(), AppError> {
        self.active_attempt("answer")?.select_answer(question_id, option)
    }

    pub fn toggle_flag(&mut self, question_id: i64) -> Result<bool, AppError> {
        self.active_attempt("flag a question")?.toggle_flag(question_id)
    }

    /// Moves to another question, but only with fullscreen engaged.
    ///
    /// When fullscreen is not active it is requested first, and the index is
    /// committed only once that request has succeeded.
    pub async fn navigate(&mut self, index: usize) -> Result<(), AppError> {
        let count = self.active_attempt("navigate")?.questions.len();
        if index >= count {
            return Err(AppError::ValidationFailure(format!(
                "question index {} out of range (0..{})",
                index, count
            )));
        }

        if !self.fullscreen.is_active() {
            self.fullscreen.request().await?;
            self.monitor.set_fullscreen(true);
        }

        self.active_attempt("navigate")?.current_index = index;
        Ok(())
    }

    /// `Active -> ManualSubmitting`. Rejected locally while any question is
    /// unanswered.
    pub async fn submit(&mut self, now: DateTime<Utc>) -> Result<GradedResult, AppError> {
        let unanswered = self.active_attempt("submit")?.unanswered();
        if !unanswered.is_empty() {
            return Err(AppError::ValidationFailure(format!(
                "{} question(s) still unanswered: {:?}",
                unanswered.len(),
                unanswered
            )));
        }

        self.monitor.disarm();
        self.pending = Some(self.build_payload(now, None));
        self.transition(SessionPhase::ManualSubmitting);
        self.deliver().await
    }

    /// Resends the frozen payload after a failed submission. Does not return
    /// to the briefing or to answering.
    pub async fn retry(&mut self) -> Result<GradedResult, AppError> {
        let auto_reason = match &self.phase {
            SessionPhase::Error(SessionFailure::Submission { auto_reason, .. }) => *auto_reason,
            _ => return Err(self.invalid("retry a submission")),
        };
        if self.pending.is_none() {
            return Err(AppError::Internal("no submission to retry".to_string()));
        }

        self.transition(match auto_reason {
            Some(reason) => SessionPhase::AutoSubmitting(reason),
            None => SessionPhase::ManualSubmitting,
        });
        self.deliver().await
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        let (auto_submit_reason, error, retryable, result) = match &self.phase {
            SessionPhase::AutoSubmitting(reason) => (Some(reason.to_string()), None, false, None),
            SessionPhase::Submitted {
                result,
                auto_reason,
            } => (
                auto_reason.map(|r| r.to_string()),
                None,
                false,
                Some(result.clone()),
            ),
            SessionPhase::Error(SessionFailure::Load(e)) => (None, Some(e.to_string()), false, None),
            SessionPhase::Error(SessionFailure::Submission { error, auto_reason }) => (
                auto_reason.map(|r| r.to_string()),
                Some(error.to_string()),
                true,
                None,
            ),
            _ => (None, None, false, None),
        };

        let warning = match &self.phase {
            SessionPhase::Warning(dialog) => Some(dialog.clone()),
            _ => None,
        };

        SessionView {
            attempt_id: self.attempt_id.clone(),
            phase: self.phase.name(),
            auto_submit_reason,
            error,
            retryable,
            remaining_seconds: self.remaining_seconds(now),
            ends_at: self.ends_at(),
            warning_headline: warning.as_ref().map(WarningDialog::headline),
            warning,
            warning_count: self.security.warning_count,
            warning_limit: self.policy.warning_limit,
            tab_switch_count: self.security.tab_switch_count,
            fullscreen_exit_count: self.security.fullscreen_exit_count,
            blocked_key_count: self.security.blocked_key_count,
            window_minimize_count: self.security.window_minimize_count,
            violation_count: self.security.violations.len(),
            question_count: self.attempt.as_ref().map_or(0, |a| a.questions.len()),
            current_index: self.attempt.as_ref().map(|a| a.current_index),
            answered: self
                .attempt
                .as_ref()
                .map(|a| a.answers.keys().copied().collect())
                .unwrap_or_default(),
            flagged: self
                .attempt
                .as_ref()
                .map(|a| a.flagged.iter().copied().collect())
                .unwrap_or_default(),
            listening: self.monitor.subscriptions(),
            result,
        }
    }

    /// Closes the attempt: disarms the monitor and freezes the payload.
    /// No-op once a submission is already under way.
    fn force_auto_submit(&mut self, reason: AutoSubmitReason, now: DateTime<Utc>) {
        if !self.phase.is_live() && self.phase != SessionPhase::Briefing {
            return;
        }

        tracing::warn!("Forcing submission: {}", reason);
        self.monitor.disarm();
        self.pending = Some(self.build_payload(now, Some(reason)));
        self.transition(SessionPhase::AutoSubmitting(reason));
    }

    async fn deliver_if_pending(&mut self) {
        if self.phase.is_submitting() {
            if let Err(e) = self.deliver().await {
                tracing::debug!("Forced submission left the session in error: {}", e);
            }
        }
    }

    async fn deliver(&mut self) -> Result<GradedResult, AppError> {
        let auto_reason = match &self.phase {
            SessionPhase::AutoSubmitting(reason) => Some(*reason),
            SessionPhase::ManualSubmitting => None,
            _ => return Err(self.invalid("deliver a submission")),
        };
        let (Some(attempt_id), Some(payload)) = (self.attempt_id.clone(), self.pending.clone()) else {
            return Err(AppError::Internal("no pending submission".to_string()));
        };

        self.submit_attempts += 1;
        tracing::info!(
            "Submitting attempt {} (auto: {}, try {})",
            attempt_id,
            payload.is_auto_submit,
            self.submit_attempts
        );

        match self.grading.submit(&attempt_id, &payload).await {
            Ok(result) => {
                if let Err(e) = self.store.clear(&attempt_id) {
                    tracing::error!("Failed to clear session snapshot for {}: {}", attempt_id, e);
                }
                self.pending = None;
                self.transition(SessionPhase::Submitted {
                    result: result.clone(),
                    auto_reason,
                });
                if let Err(e) = self.fullscreen.exit().await {
                    tracing::warn!("Failed to exit fullscreen: {}", e);
                }
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Submission of {} failed: {}", attempt_id, e);
                self.transition(SessionPhase::Error(SessionFailure::Submission {
                    error: e.clone(),
                    auto_reason,
                }));
                Err(e)
            }
        }
    }

    fn build_payload(&self, now: DateTime<Utc>, reason: Option<AutoSubmitReason>) -> SubmissionRequest {
        let started_at = self
            .attempt
            .as_ref()
            .and_then(|a| a.started_at)
            .or(self.activated_at)
            .unwrap_or(now);

        SubmissionRequest {
            answers: self
                .attempt
                .as_ref()
                .map(|a| a.answers.clone())
                .unwrap_or_default(),
            violations: recorder::log_lines(&self.security.violations),
            tab_switch_count: self.security.tab_switch_count,
            fullscreen_exit_count: self.security.fullscreen_exit_count,
            is_auto_submit: reason.is_some(),
            auto_submit_reason: reason.map(|r| r.to_string()),
            time_taken_seconds: (now - started_at).num_seconds().max(0),
        }
    }

    /// Snapshot write after every mutation. A failed write is logged; it must
    /// not stop escalation.
    fn persist(&self) {
        let Some(attempt_id) = self.attempt_id.as_deref() else {
            return;
        };
        if let Err(e) = self.store.save(attempt_id, &self.security) {
            tracing::error!("Failed to persist security state for {}: {}", attempt_id, e);
        }
    }

    fn active_attempt(&mut self, action: &str) -> Result<&mut Attempt, AppError> {
        if self.phase != SessionPhase::Active {
            return Err(self.invalid(action));
        }
        self.attempt
            .as_mut()
            .ok_or_else(|| AppError::Internal("active session without attempt".to_string()))
    }

    fn transition(&mut self, next: SessionPhase) {
        tracing::info!(
            "Session {}: {} -> {}",
            self.attempt_id.as_deref().unwrap_or("-"),
            self.phase.name(),
            next.name()
        );
        self.phase = next;
    }

    fn invalid(&self, action: &str) -> AppError {
        AppError::InvalidTransition {
            from: self.phase.name().to_string(),
            action: action.to_string(),
        }
    }
}
