// src/handlers/mod.rs

pub mod session;
pub mod signals;
pub mod submission;
