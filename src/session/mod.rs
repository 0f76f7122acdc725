// src/session/mod.rs

pub mod controller;
pub mod deadline;
pub mod escalator;
pub mod monitor;
pub mod recorder;
pub mod store;
pub mod timers;

pub use controller::{QuizSession, SessionFailure, SessionPhase, SessionView};
