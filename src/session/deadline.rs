// src/session/deadline.rs

use chrono::{DateTime, Duration, Utc};

use crate::{error::AppError, models::attempt::AttemptPayload, session::store::SessionStore};

/// Where an attempt's deadline comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineSource {
    /// Server-declared absolute expiry.
    Absolute(DateTime<Utc>),
    Relative {
        started_at: DateTime<Utc>,
        time_limit_minutes: u32,
    },
}

impl DeadlineSource {
    /// An absolute expiry wins over a start instant plus limit.
    pub fn from_payload(payload: &AttemptPayload) -> Result<Self, AppError> {
        if let Some(expires_at) = payload.expires_at {
            return Ok(DeadlineSource::Absolute(expires_at));
        }
        match (payload.started_at, payload.time_limit_minutes) {
            (Some(started_at), Some(time_limit_minutes)) => Ok(DeadlineSource::Relative {
                started_at,
                time_limit_minutes,
            }),
            _ => Err(AppError::ValidationFailure(
                "attempt declares neither an expiry nor a start time with a limit".to_string(),
            )),
        }
    }

    pub fn resolve(&self) -> DateTime<Utc> {
        match *self {
            DeadlineSource::Absolute(ends_at) => ends_at,
            DeadlineSource::Relative {
                started_at,
                time_limit_minutes,
            } => started_at + Duration::minutes(i64::from(time_limit_minutes)),
        }
    }
}

/// Result of one clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub remaining_seconds: i64,
    /// True on the single tick that first observes zero.
    pub expired: bool,
}

/// Countdown to an immutable absolute deadline.
#[derive(Debug, Clone)]
pub struct DeadlineClock {
    ends_at: DateTime<Utc>,
    expiry_emitted: bool,
}

impl DeadlineClock {
    /// Establishes the deadline for an attempt.
    ///
    /// A deadline persisted by an earlier page load is reused so a reload
    /// resumes the original countdown. Otherwise the deadline is resolved from
    /// `source` and persisted before returning.
    pub fn initialize(
        store: &SessionStore,
        attempt_id: &str,
        source: DeadlineSource,
    ) -> Result<Self, AppError> {
        if let Some(ends_at) = store.restore_deadline(attempt_id)? {
            tracing::info!("Resuming persisted deadline {} for {}", ends_at, attempt_id);
            return Ok(Self::new(ends_at));
        }

        let ends_at = source.resolve();
        store.save_deadline(attempt_id, ends_at)?;
        tracing::info!("Deadline for {} set to {}", attempt_id, ends_at);
        Ok(Self::new(ends_at))
    }

    pub fn new(ends_at: DateTime<Utc>) -> Self {
        Self {
            ends_at,
            expiry_emitted: false,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        remaining_seconds(self.ends_at, now)
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockTick {
        let remaining_seconds = self.remaining_seconds(now);
        let expired = remaining_seconds == 0 && !self.expiry_emitted;
        if expired {
            self.expiry_emitted = true;
        }
        ClockTick {
            remaining_seconds,
            expired,
        }
    }
}

/// `max(0, ceil((ends_at - now) / 1s))`.
pub fn remaining_seconds(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (ends_at - now).num_milliseconds();
    if millis <= 0 { 0 } else { (millis + 999) / 1000 }
}
