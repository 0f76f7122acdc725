// src/models/mod.rs

pub mod attempt;
pub mod signal;
pub mod submission;
pub mod violation;
