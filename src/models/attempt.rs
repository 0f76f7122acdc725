// src/models/attempt.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::AppError, models::submission::GradedResult};

/// Attempt ids become storage keys and file names, so they are restricted.
static ATTEMPT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("attempt id pattern is valid"));

pub fn validate_attempt_id(attempt_id: &str) -> Result<(), AppError> {
    if ATTEMPT_ID_PATTERN.is_match(attempt_id) {
        Ok(())
    } else {
        Err(AppError::AttemptNotFound(format!(
            "'{}' is not a valid attempt id",
            attempt_id
        )))
    }
}

/// A question as delivered to the student (no answer key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    #[validate(length(min = 1, max = 1000))]
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn validate_questions(questions: &[Question]) -> Result<(), validator::ValidationError> {
    if questions.is_empty() {
        return Err(validator::ValidationError::new("attempt_has_no_questions"));
    }
    let mut seen = HashSet::new();
    for q in questions {
        if !seen.insert(q.id) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
    }
    Ok(())
}

/// Attempt as returned by the grading service.
///
/// The deadline is either an absolute `expires_at` or `started_at` plus
/// `time_limit_minutes`. `result` is present when the attempt was already
/// submitted in an earlier session.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttemptPayload {
    pub attempt_id: String,

    #[validate(nested, custom(function = validate_questions))]
    pub questions: Vec<Question>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub time_limit_minutes: Option<u32>,

    #[serde(default)]
    pub result: Option<GradedResult>,
}

/// One student's in-progress attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub questions: Vec<Question>,
    pub started_at: Option<DateTime<Utc>>,
    /// Sparse: only answered questions have an entry.
    pub answers: BTreeMap<i64, String>,
    pub flagged: BTreeSet<i64>,
    pub current_index: usize,
}

impl Attempt {
    pub fn new(payload: AttemptPayload) -> Self {
        Self {
            questions: payload.questions,
            started_at: payload.started_at,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            current_index: 0,
        }
    }

    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn unanswered(&self) -> Vec<i64> {
        self.questions
            .iter()
            .filter(|q| !self.answers.contains_key(&q.id))
            .map(|q| q.id)
            .collect()
    }

    pub fn select_answer(&mut self, question_id: i64, option: &str) -> Result<(), AppError> {
        let question = self.question(question_id).ok_or_else(|| {
            AppError::ValidationFailure(format!("question {} is not part of this attempt", question_id))
        })?;

        if !question.options.iter().any(|o| o == option) {
            return Err(AppError::ValidationFailure(format!(
                "'{}' is not an option of question {}",
                option, question_id
            )));
        }

        self.answers.insert(question_id, option.to_string());
        Ok(())
    }

    /// Returns whether the question is flagged after the toggle.
    pub fn toggle_flag(&mut self, question_id: i64) -> Result<bool, AppError> {
        if self.question(question_id).is_none() {
            return Err(AppError::ValidationFailure(format!(
                "question {} is not part of this attempt",
                question_id
            )));
        }

        if self.flagged.remove(&question_id) {
            Ok(false)
        } else {
            self.flagged.insert(question_id);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(questions: Vec<Question>) -> AttemptPayload {
        AttemptPayload {
            attempt_id: "a-1".to_string(),
            questions,
            expires_at: None,
            started_at: None,
            time_limit_minutes: Some(10),
            result: None,
        }
    }

    fn question(id: i64) -> Question {
        Question {
            id,
            content: format!("Question {}", id),
            options: vec!["A".to_string(), "B".to_string()],
        }
    }

    #[test]
    fn test_attempt_id_pattern() {
        assert!(validate_attempt_id("quiz_42-b").is_ok());
        assert!(validate_attempt_id("").is_err());
        assert!(validate_attempt_id("../etc/passwd").is_err());
        assert!(validate_attempt_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_payload_requires_questions() {
        assert!(payload(vec![]).validate().is_err());
        assert!(payload(vec![question(1)]).validate().is_ok());
    }

    #[test]
    fn test_payload_rejects_duplicate_ids_and_empty_options() {
        assert!(payload(vec![question(1), question(1)]).validate().is_err());

        let mut bad = question(2);
        bad.options.clear();
        assert!(payload(vec![bad]).validate().is_err());
    }

    #[test]
    fn test_select_answer_checks_options() {
        let mut attempt = Attempt::new(payload(vec![question(1), question(2)]));

        assert!(attempt.select_answer(1, "C").is_err());
        assert!(attempt.select_answer(9, "A").is_err());
        attempt.select_answer(1, "B").unwrap();

        assert_eq!(attempt.answers.get(&1).map(String::as_str), Some("B"));
        assert_eq!(attempt.unanswered(), vec![2]);
    }

    #[test]
    fn test_toggle_flag() {
        let mut attempt = Attempt::new(payload(vec![question(1)]));
        assert!(attempt.toggle_flag(1).unwrap());
        assert!(!attempt.toggle_flag(1).unwrap());
        assert!(attempt.toggle_flag(5).is_err());
    }
}
