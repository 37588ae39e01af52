// src/core/errors.rs

//! Defines the primary error type for the supervisor.

use thiserror::Error;

/// The main error enum, representing failures that callers may want to react to.
///
/// RCON being disconnected, a command timing out, and an unparseable health
/// reply are normal operation, not errors. Those paths return empty results.
#[derive(Error, Debug)]
pub enum LaunchSiteError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RCON transport error: {0}")]
    Transport(String),

    #[error("RCON protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Update error: {0}")]
    Update(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Manifest parse error at line {line}: {message}")]
    Manifest { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
