// src/utils/mod.rs

pub mod fullscreen;
pub mod grading;
pub mod html;
