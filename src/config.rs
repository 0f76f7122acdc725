// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use url::Url;

use crate::error::AppError;

/// Number of warnings a student may receive before forced submission.
pub const WARNING_LIMIT: u32 = 3;

/// Seconds a warning dialog stays locked before it can be dismissed.
pub const WARNING_COUNTDOWN_SECS: u32 = 15;

/// Tab switches that force submission without a warning dialog.
pub const TAB_SWITCH_LIMIT: u32 = 3;

/// Blocked keyboard shortcuts that force submission.
pub const BLOCKED_SHORTCUT_LIMIT: u32 = 5;

/// Seconds the page may stay hidden or blurred before it counts as suspicious.
pub const INATTENTION_GRACE_SECS: i64 = 15;

/// Outer window width/height (px) below which the window is treated as minimized.
pub const MINIMIZED_DIMENSION_PX: u32 = 100;

/// Outer/inner size delta (px) above which a docked devtools panel is assumed.
pub const DEVTOOLS_DELTA_PX: u32 = 160;

/// Integrity thresholds applied to one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub warning_limit: u32,
    pub warning_countdown_secs: u32,
    pub tab_switch_limit: u32,
    pub blocked_shortcut_limit: u32,
    pub inattention_grace_secs: i64,
    pub minimized_dimension_px: u32,
    pub devtools_delta_px: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            warning_limit: WARNING_LIMIT,
            warning_countdown_secs: WARNING_COUNTDOWN_SECS,
            tab_switch_limit: TAB_SWITCH_LIMIT,
            blocked_shortcut_limit: BLOCKED_SHORTCUT_LIMIT,
            inattention_grace_secs: INATTENTION_GRACE_SECS,
            minimized_dimension_px: MINIMIZED_DIMENSION_PX,
            devtools_delta_px: DEVTOOLS_DELTA_PX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the grading service.
    pub grading_api_url: Url,
    /// Bearer credential forwarded to the grading service.
    pub api_token: String,
    /// Attempt hosted by this sidecar.
    pub attempt_id: String,
    /// Directory backing the persisted session store.
    pub storage_dir: PathBuf,
    pub port: u16,
    /// Origin of the client shell allowed by CORS.
    pub shell_origin: String,
    pub request_timeout_secs: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let grading_api_url = required("GRADING_API_URL")?;
        let grading_api_url = Url::parse(&grading_api_url)
            .map_err(|e| AppError::Config(format!("GRADING_API_URL is not a valid URL: {}", e)))?;

        let api_token = required("API_TOKEN")?;
        let attempt_id = required("ATTEMPT_ID")?;

        let storage_dir = env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".quiz-session"));

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4100);

        let shell_origin =
            env::var("SHELL_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(15);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            grading_api_url,
            api_token,
            attempt_id,
            storage_dir,
            port,
            shell_origin,
            request_timeout_secs,
            rust_log,
        })
    }
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Config(format!("{} must be set", name)))
}
