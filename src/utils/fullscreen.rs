// src/utils/fullscreen.rs

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::AppError;

/// Fullscreen platform primitives.
///
/// `request` is the only suspending operation in a session: callers must not
/// commit a navigation until it settles.
#[async_trait]
pub trait FullscreenControl: Send + Sync {
    fn is_active(&self) -> bool;

    async fn request(&self) -> Result<(), AppError>;

    async fn exit(&self) -> Result<(), AppError>;
}

/// Fullscreen state as reported by the client shell.
///
/// The sidecar cannot drive the browser's fullscreen API itself. `request`
/// raises the `wanted` flag (exposed in the session view so the shell can call
/// `requestFullscreen`) and only succeeds once the shell reports fullscreen
/// engaged through a fullscreen-change signal.
#[derive(Debug, Default)]
pub struct ReportedFullscreen {
    active: AtomicBool,
    wanted: AtomicBool,
}

impl ReportedFullscreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        if active {
            self.wanted.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FullscreenControl for ReportedFullscreen {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn request(&self) -> Result<(), AppError> {
        if self.is_active() {
            return Ok(());
        }
        self.wanted.store(true, Ordering::SeqCst);
        Err(AppError::FullscreenDenied(
            "fullscreen is not engaged by the client shell".to_string(),
        ))
    }

    async fn exit(&self) -> Result<(), AppError> {
        self.wanted.store(false, Ordering::SeqCst);
        Ok(())
    }
}
