// src/models/submission.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// DTO for submitting an attempt to the grading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// User's answers map.
    /// Key: Question ID. Value: selected option. Unanswered questions are absent.
    pub answers: BTreeMap<i64, String>,

    /// Violation log as plain strings; the grading schema does not accept objects.
    pub violations: Vec<String>,

    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub is_auto_submit: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_submit_reason: Option<String>,

    pub time_taken_seconds: i64,
}

/// Graded result returned by the grading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub passed: bool,
}
