// src/config/mod.rs
pub mod handles;
pub mod settings;

pub use settings::{LlmBackend, LogFormat, SearchBackend, Settings};
