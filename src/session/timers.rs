// src/session/timers.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::session::controller::QuizSession;

/// The session shared between HTTP handlers and the timer task. The mutex is
/// the single mutation path for every state field.
pub type SharedSession = Arc<Mutex<QuizSession>>;

/// Deadline and warning countdown timers for one session.
///
/// The task ends by itself once the session reaches a terminal phase, and is
/// aborted when the handle is dropped, so no stray tick can force a second
/// submission after teardown.
pub struct SessionTimers {
    handle: JoinHandle<()>,
}

impl SessionTimers {
    pub fn spawn(session: SharedSession) -> Self {
        Self::spawn_with_period(session, Duration::from_secs(1))
    }

    pub fn spawn_with_period(session: SharedSession, period: Duration) -> Self {
        let handle = tokio::spawn(run(session, period));
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(session: SharedSession, period: Duration) {
    let mut deadline = interval(period);
    deadline.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut countdown = interval(period);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = deadline.tick() => {
                let mut session = session.lock().await;
                session.tick(Utc::now()).await;
                if session.is_terminal() {
                    break;
                }
            }
            _ = countdown.tick() => {
                let mut session = session.lock().await;
                session.tick_warning(Utc::now()).await;
                if session.is_terminal() {
                    break;
                }
            }
        }
    }

    tracing::info!("Session timers stopped");
}
