// src/session/recorder.rs

//! Append-only violation log of one attempt.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    models::violation::{SecurityState, Violation, ViolationKind},
    utils::html::clean_log_line,
};

/// Appends a violation in detection order. No de-duplication across kinds.
pub fn record(
    state: &mut SecurityState,
    kind: ViolationKind,
    detail: Value,
    occurred_at: DateTime<Utc>,
) {
    tracing::warn!("Violation recorded: {} {}", kind, detail);
    state.violations.push(Violation {
        kind,
        detail,
        occurred_at,
    });
}

/// Serializes the log as sanitized strings for the grading service.
pub fn log_lines(violations: &[Violation]) -> Vec<String> {
    violations
        .iter()
        .map(|v| clean_log_line(&v.to_log_line()))
        .collect()
}
