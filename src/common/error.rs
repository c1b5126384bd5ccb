//! Error types for the scenario runner
//!
//! Messages are meant to be read by whoever authored the scenario, so
//! they carry a hint on how to fix the problem where one exists.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario runner
#[derive(Error, Debug)]
pub enum Error {
    // === Authoring Errors ===
    #[error("Unknown role '{role}'. Registered roles: {known}. Add it under [roles.{role}] in config.toml")]
    UnknownRole { role: String, known: String },

    #[error("Invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    // === Execution Errors ===
    #[error("Transport error for {method} {url}: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    #[error("Assertion failed: {predicate}: expected {expected}, got {actual}")]
    AssertionFailure {
        predicate: String,
        expected: String,
        actual: String,
    },

    #[error("Timed out after {timeout_ms} ms waiting for {condition}")]
    Timeout { condition: String, timeout_ms: u64 },

    #[error("Cancelled before completion")]
    Cancelled,

    // === UI Driver Errors ===
    #[error("Browser driver error: {0}")]
    Driver(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an unknown role error listing the roles that do exist
    pub fn unknown_role<S: AsRef<str>>(role: &str, known: &[S]) -> Self {
        let known = if known.is_empty() {
            "(none)".to_string()
        } else {
            known.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", ")
        };
        Self::UnknownRole {
            role: role.to_string(),
            known,
        }
    }

    /// Create an invalid scenario error
    pub fn invalid_scenario(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a transport error from a reqwest failure
    pub fn transport(method: &str, url: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out ({err})")
        } else if err.is_connect() {
            format!("connection failed ({err})")
        } else {
            err.to_string()
        };
        Self::Transport {
            method: method.to_string(),
            url: url.to_string(),
            message,
        }
    }

    /// Short machine-readable category for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownRole { .. } => "unknown_role",
            Error::InvalidScenario { .. } => "invalid_scenario",
            Error::Transport { .. } => "transport",
            Error::AssertionFailure { .. } => "assertion",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::Driver(_) => "driver",
            Error::Config(_) | Error::ConfigParse(_) => "config",
            _ => "internal",
        }
    }
}
